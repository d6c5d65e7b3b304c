use super::analysis::{AnalysisConsumer, AnalysisHandoff, CommandConsumer, LoggingConsumer};
use super::asset::{AssetKind, AssetSource, KindHint, sanitize_slug};
use super::downloader::{Downloader, YtDlpDownloader};
use super::retry::RetryPolicy;
use super::screenshot::{SCREENSHOT_TOKEN_ENV, ScreenshotApiCapture, ScreenshotCapture};
use super::state::{AssetRun, AssetStage, FailureRecord};
use crate::component::frame_sampler::{FrameDecoder, VideoFrameSampler};
use crate::component::image_tiler::ImageTiler;
use crate::component::metadata_recorder::{ExtractionManifest, MetadataRecorder};
use crate::config::{DownloadFormat, Settings};
use crate::context::RunContext;
use crate::error::{SegmentError, SegmentResult};
use crate::tools::ensure_directory_exists;
use crate::tools::file_naming::SOURCE_DIR;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 單一素材的處理結果
#[derive(Debug, Clone)]
pub struct AssetReport {
    pub input: String,
    pub asset_id: Option<String>,
    pub kind: Option<AssetKind>,
    pub run_dir: Option<PathBuf>,
    pub manifest_path: Option<PathBuf>,
    pub history: Vec<AssetStage>,
    pub failure: Option<FailureRecord>,
}

impl AssetReport {
    /// 尚未建立執行目錄就被拒絕的輸入
    fn rejected(input: &str, kind: Option<AssetKind>, error: &SegmentError) -> Self {
        let failure = FailureRecord::new(&sanitize_slug(input), AssetStage::Pending, error);
        error!(
            "[{}] 無法處理 {input}（{}）：{error}",
            failure.asset_id, failure.kind
        );
        Self {
            input: input.to_string(),
            asset_id: None,
            kind,
            run_dir: None,
            manifest_path: None,
            history: vec![AssetStage::Pending, AssetStage::Failed],
            failure: Some(failure),
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    #[must_use]
    pub fn exit_code(&self) -> u8 {
        self.failure.as_ref().map_or(0, |failure| failure.exit_code)
    }
}

/// 批次處理結果
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub reports: Vec<AssetReport>,
    pub duplicates_removed: usize,
}

impl BatchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &AssetReport> {
        self.reports.iter().filter(|r| r.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &FailureRecord> {
        self.reports.iter().filter_map(|r| r.failure.as_ref())
    }

    /// 全部成功為 0；失敗皆源自網路問題為 4；其餘為 1
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        let mut failures = self.failures().peekable();
        if failures.peek().is_none() {
            0
        } else if failures.all(|f| f.network_rooted) {
            4
        } else {
            1
        }
    }
}

/// 依序執行 下載 → 擷取影格／切圖 → 記錄 → 交付分析
pub struct PipelineOrchestrator {
    settings: Settings,
    sampler: VideoFrameSampler,
    tiler: ImageTiler,
    downloader: Box<dyn Downloader>,
    screenshot: Option<Box<dyn ScreenshotCapture>>,
    analysis: Box<dyn AnalysisConsumer>,
    retry: RetryPolicy,
}

impl PipelineOrchestrator {
    pub fn new(settings: Settings) -> SegmentResult<Self> {
        settings.validate()?;
        let timeout = Duration::from_secs(settings.pipeline.network_timeout_secs);

        let screenshot: Option<Box<dyn ScreenshotCapture>> =
            match ScreenshotApiCapture::from_env(settings.screenshot.clone(), timeout) {
                Ok(capture) => Some(Box::new(capture)),
                Err(e) => {
                    debug!("截圖服務未啟用: {e}");
                    None
                }
            };

        let analysis: Box<dyn AnalysisConsumer> = match &settings.pipeline.analysis_command {
            Some(command) => Box::new(CommandConsumer::new(command.clone(), timeout)?),
            None => Box::new(LoggingConsumer),
        };

        Ok(Self {
            sampler: VideoFrameSampler::new(settings.sampling),
            tiler: ImageTiler::new(settings.tiling),
            downloader: Box::new(YtDlpDownloader::new(timeout)),
            screenshot,
            analysis,
            retry: RetryPolicy::from_settings(&settings.pipeline),
            settings,
        })
    }

    #[must_use]
    pub fn with_downloader(mut self, downloader: Box<dyn Downloader>) -> Self {
        self.downloader = downloader;
        self
    }

    #[must_use]
    pub fn with_screenshot(mut self, screenshot: Box<dyn ScreenshotCapture>) -> Self {
        self.screenshot = Some(screenshot);
        self
    }

    #[must_use]
    pub fn with_analysis(mut self, analysis: Box<dyn AnalysisConsumer>) -> Self {
        self.analysis = analysis;
        self
    }

    #[must_use]
    pub fn with_frame_decoder(mut self, decoder: Box<dyn FrameDecoder>) -> Self {
        self.sampler = VideoFrameSampler::with_decoder(self.settings.sampling, decoder);
        self
    }

    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// 解析輸入字串後處理；解析失敗也回傳失敗報告
    pub fn process_input(
        &self,
        input: &str,
        hint: Option<KindHint>,
        ctx: &RunContext,
    ) -> AssetReport {
        match AssetSource::parse(input, hint) {
            Ok(source) => self.process(&source, ctx),
            Err(e) => AssetReport::rejected(input, None, &e),
        }
    }

    /// 處理單一素材，失敗時保留已產生的檔案但不留下 manifest
    pub fn process(&self, source: &AssetSource, ctx: &RunContext) -> AssetReport {
        let asset_id = match self.preflight(source).and_then(|()| source.asset_id()) {
            Ok(id) => id,
            Err(e) => return AssetReport::rejected(&source.location, Some(source.kind), &e),
        };

        let mut run = AssetRun::new(&asset_id);
        let mut run_dir = None;
        let result = self.run_stages(source, &mut run, &mut run_dir, ctx);

        let mut report = AssetReport {
            input: source.location.clone(),
            asset_id: Some(asset_id.clone()),
            kind: Some(source.kind),
            run_dir: run_dir.clone(),
            manifest_path: None,
            history: Vec::new(),
            failure: None,
        };

        match result {
            Ok(manifest_path) => {
                info!("[{asset_id}] 處理完成: {}", manifest_path.display());
                report.manifest_path = Some(manifest_path);
            }
            Err(e) => {
                if let (AssetStage::Recorded, Some(dir)) = (run.stage(), &run_dir) {
                    discard_manifest(&asset_id, dir);
                }
                // 沒有任何產出的執行目錄不保留
                if run_dir.as_deref().is_some_and(|dir| fs::remove_dir(dir).is_ok()) {
                    report.run_dir = None;
                }
                let failure = run.fail(&e);
                error!(
                    "[{asset_id}] {} 階段失敗（{}）：{e}",
                    failure.stage, failure.kind
                );
                report.failure = Some(failure);
            }
        }

        report.history = run.history().to_vec();
        report
    }

    /// 批次處理，重複的輸入只處理一次
    pub fn process_batch(
        &self,
        inputs: &[String],
        hint: Option<KindHint>,
        ctx: &RunContext,
    ) -> SegmentResult<BatchReport> {
        let (unique, duplicates_removed) = dedupe_inputs(inputs);
        if duplicates_removed > 0 {
            info!("已移除 {duplicates_removed} 筆重複的輸入");
        }
        info!(
            "開始批次處理 {} 筆素材（並行 {}）",
            unique.len(),
            self.settings.pipeline.concurrency
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.settings.pipeline.concurrency)
            .build()
            .map_err(|e| SegmentError::unrecoverable(format!("無法建立執行緒池: {e}")))?;

        let progress_bar = ProgressBar::new(unique.len() as u64);
        progress_bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
                .map_err(|e| SegmentError::unrecoverable(format!("進度條樣式錯誤: {e}")))?
                .progress_chars("#>-"),
        );
        progress_bar.set_message("處理素材中...");

        let reports: Vec<AssetReport> = pool.install(|| {
            unique
                .par_iter()
                .map(|input| {
                    let report = if ctx.is_cancelled() {
                        AssetReport::rejected(input, None, &SegmentError::Cancelled)
                    } else {
                        self.process_input(input, hint, ctx)
                    };
                    progress_bar.inc(1);
                    report
                })
                .collect()
        });
        progress_bar.finish_with_message("批次處理完成");

        let batch = BatchReport {
            reports,
            duplicates_removed,
        };
        let failed = batch.failures().count();
        info!(
            "批次處理結束 - 成功: {}, 失敗: {failed}",
            batch.succeeded().count()
        );
        for failure in batch.failures() {
            warn!(
                "[{}] {} 階段失敗（{}）：{}",
                failure.asset_id, failure.stage, failure.kind, failure.message
            );
        }

        Ok(batch)
    }

    /// 建立執行目錄之前就能判斷的錯誤
    fn preflight(&self, source: &AssetSource) -> SegmentResult<()> {
        match source.kind {
            AssetKind::VideoUrl if self.settings.download.format == DownloadFormat::Audio => {
                Err(SegmentError::validation("音訊格式無法擷取影格，請改用 mp4 或 webm"))
            }
            AssetKind::PageUrl if self.screenshot.is_none() => Err(SegmentError::validation(
                format!("缺少截圖服務金鑰，請設定 {SCREENSHOT_TOKEN_ENV}"),
            )),
            _ => Ok(()),
        }
    }

    fn run_stages(
        &self,
        source: &AssetSource,
        run: &mut AssetRun,
        run_dir: &mut Option<PathBuf>,
        ctx: &RunContext,
    ) -> SegmentResult<PathBuf> {
        ctx.check_cancelled()?;
        let asset_id = run.asset_id().to_string();
        let dir = create_run_dir(
            &self.settings.pipeline.output_root,
            &asset_id,
            &ctx.run_stamp(),
        )?;
        *run_dir = Some(dir.clone());
        info!("[{asset_id}] 開始處理 {source}，輸出至 {}", dir.display());

        let recorder = MetadataRecorder::new(&dir);
        let manifest = match source.kind {
            AssetKind::VideoUrl => {
                run.advance(AssetStage::Downloading)?;
                let source_dir = dir.join(SOURCE_DIR);
                ensure_directory_exists(&source_dir)?;
                let downloaded = self.retry.run("download", ctx, |attempt| {
                    debug!("[{asset_id}] 第 {attempt} 次下載");
                    self.downloader.download(
                        &source.location,
                        &source_dir,
                        &self.settings.download,
                        ctx,
                    )
                })?;

                run.advance(AssetStage::Sampling)?;
                let mut outcome = self.sampler.sample(&downloaded.path, &dir, ctx)?;
                outcome.asset.source.clone_from(&source.location);
                if outcome.asset.title.is_none() {
                    outcome.asset.title = downloaded.title;
                }
                recorder.record_frames(&asset_id, &outcome, self.sampler.settings(), ctx)?
            }
            AssetKind::VideoFile => {
                run.advance(AssetStage::Sampling)?;
                let outcome = self
                    .sampler
                    .sample(Path::new(&source.location), &dir, ctx)?;
                recorder.record_frames(&asset_id, &outcome, self.sampler.settings(), ctx)?
            }
            AssetKind::PageUrl => {
                run.advance(AssetStage::Downloading)?;
                let screenshot = self.screenshot.as_ref().ok_or_else(|| {
                    SegmentError::validation(format!("缺少截圖服務金鑰，請設定 {SCREENSHOT_TOKEN_ENV}"))
                })?;
                let source_dir = dir.join(SOURCE_DIR);
                ensure_directory_exists(&source_dir)?;
                let output_path =
                    source_dir.join(format!("screenshot.{}", self.settings.screenshot.file_type));
                let captured = self.retry.run("screenshot", ctx, |attempt| {
                    debug!("[{asset_id}] 第 {attempt} 次截圖");
                    screenshot.capture(&source.location, &output_path, ctx)
                })?;

                run.advance(AssetStage::Tiling)?;
                let mut outcome = self.tiler.tile(&captured, &dir, ctx)?;
                outcome.source.source.clone_from(&source.location);
                for tile in &mut outcome.tiles {
                    tile.source.clone_from(&source.location);
                }
                recorder.record_tiles(&asset_id, &outcome, self.tiler.settings(), ctx)?
            }
            AssetKind::ImageFile => {
                run.advance(AssetStage::Tiling)?;
                let outcome = self.tiler.tile(Path::new(&source.location), &dir, ctx)?;
                recorder.record_tiles(&asset_id, &outcome, self.tiler.settings(), ctx)?
            }
        };
        run.advance(AssetStage::Recorded)?;

        self.hand_off(&asset_id, &dir, &recorder, &manifest, ctx)?;
        run.advance(AssetStage::Done)?;

        Ok(recorder.manifest_path())
    }

    /// 交付前確認 manifest 列出的每個檔案都完整
    fn hand_off(
        &self,
        asset_id: &str,
        run_dir: &Path,
        recorder: &MetadataRecorder,
        manifest: &ExtractionManifest,
        ctx: &RunContext,
    ) -> SegmentResult<()> {
        let report = recorder.verify()?;
        if !report.is_intact() {
            return Err(SegmentError::unrecoverable(format!(
                "交付前驗證失敗：缺少 {}、空檔 {}、雜湊不符 {}",
                report.missing.len(),
                report.empty.len(),
                report.corrupted.len()
            )));
        }

        let manifest_path = recorder.manifest_path();
        let handoff = AnalysisHandoff {
            asset_id,
            run_dir,
            manifest_path: &manifest_path,
            manifest,
        };
        self.retry
            .run("analysis", ctx, |_| self.analysis.consume(&handoff, ctx))
    }
}

/// 建立 `<output_root>/<asset_id>_<stamp>`，已存在時加上 `_2`、`_3`…
pub fn create_run_dir(output_root: &Path, asset_id: &str, stamp: &str) -> SegmentResult<PathBuf> {
    ensure_directory_exists(output_root)?;
    let base_name = format!("{asset_id}_{stamp}");

    for suffix in 1u32.. {
        let name = if suffix == 1 {
            base_name.clone()
        } else {
            format!("{base_name}_{suffix}")
        };
        let path = output_root.join(name);
        match fs::create_dir(&path) {
            Ok(()) => return Ok(path),
            Err(e) if e.kind() == IoErrorKind::AlreadyExists => {}
            Err(e) => return Err(SegmentError::io(&path, e)),
        }
    }

    Err(SegmentError::unrecoverable(format!(
        "無法為 {asset_id} 建立執行目錄"
    )))
}

/// 去除空白行、註解行與重複輸入，保留原本順序
fn dedupe_inputs(inputs: &[String]) -> (Vec<String>, usize) {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    let mut duplicates = 0;

    for input in inputs {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if seen.insert(trimmed.to_string()) {
            unique.push(trimmed.to_string());
        } else {
            duplicates += 1;
        }
    }

    (unique, duplicates)
}

fn discard_manifest(asset_id: &str, run_dir: &Path) {
    match MetadataRecorder::new(run_dir).invalidate() {
        Ok(true) => warn!("[{asset_id}] 交付失敗，已移除 manifest"),
        Ok(false) => {}
        Err(e) => warn!("[{asset_id}] 無法移除 manifest: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_run_dir_never_overwrites() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("data");

        let first = create_run_dir(&root, "yt_abc", "20241102_153021").unwrap();
        let second = create_run_dir(&root, "yt_abc", "20241102_153021").unwrap();
        let third = create_run_dir(&root, "yt_abc", "20241102_153021").unwrap();

        assert_eq!(first, root.join("yt_abc_20241102_153021"));
        assert_eq!(second, root.join("yt_abc_20241102_153021_2"));
        assert_eq!(third, root.join("yt_abc_20241102_153021_3"));
    }

    #[test]
    fn test_dedupe_inputs() {
        let inputs = vec![
            "https://a.example".to_string(),
            "  https://a.example  ".to_string(),
            "# comment".to_string(),
            String::new(),
            "https://b.example".to_string(),
        ];
        let (unique, duplicates) = dedupe_inputs(&inputs);
        assert_eq!(unique, vec!["https://a.example", "https://b.example"]);
        assert_eq!(duplicates, 1);
    }

    fn failure(network_rooted: bool) -> AssetReport {
        let error = if network_rooted {
            SegmentError::network("503")
        } else {
            SegmentError::validation("bad")
        };
        AssetReport::rejected("x", None, &error)
    }

    #[test]
    fn test_batch_exit_codes() {
        let ok = AssetReport {
            failure: None,
            ..failure(false)
        };
        let batch = BatchReport {
            reports: vec![ok.clone()],
            duplicates_removed: 0,
        };
        assert_eq!(batch.exit_code(), 0);

        let batch = BatchReport {
            reports: vec![ok.clone(), failure(true), failure(true)],
            duplicates_removed: 0,
        };
        assert_eq!(batch.exit_code(), 4);

        let batch = BatchReport {
            reports: vec![ok, failure(true), failure(false)],
            duplicates_removed: 0,
        };
        assert_eq!(batch.exit_code(), 1);
    }
}
