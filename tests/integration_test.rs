//! 整合測試 - 以替身取代 ffmpeg、yt-dlp 與截圖服務，驗證整個處理流程

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{Rgb, RgbImage};
use media_segmenter::component::frame_sampler::{DecodedFrame, FrameDecoder, FrameStream};
use media_segmenter::component::image_tiler::ImageTiler;
use media_segmenter::component::metadata_recorder::{MetadataRecorder, SourceDescriptor};
use media_segmenter::component::pipeline::{
    AnalysisConsumer, AnalysisHandoff, AssetKind, AssetSource, AssetStage, DownloadedVideo,
    Downloader, PipelineOrchestrator, RetryPolicy, ScreenshotCapture,
};
use media_segmenter::config::{DownloadOptions, Settings, TilingSettings};
use media_segmenter::context::RunContext;
use media_segmenter::error::{ErrorKind, SegmentError, SegmentResult};
use media_segmenter::model::MediaAsset;
use tempfile::{TempDir, tempdir};

const YOUTUBE_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

fn ctx() -> RunContext {
    RunContext::new(Arc::new(AtomicBool::new(false)))
}

fn settings_in(dir: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.pipeline.output_root = dir.join("data");
    settings.pipeline.log_to_file = false;
    settings.sampling.interval_seconds = 2.0;
    settings
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    }
}

/// 10 秒、30fps 的假影片，每幀都能解碼
struct FakeDecoder;

impl FrameDecoder for FakeDecoder {
    fn probe(&self, path: &Path) -> SegmentResult<MediaAsset> {
        Ok(MediaAsset {
            source: path.to_string_lossy().to_string(),
            path: path.to_path_buf(),
            width: 16,
            height: 9,
            frame_rate: 30.0,
            total_frames: 300,
            duration_seconds: 10.0,
            codec: "h264".to_string(),
            codec_tag: None,
            title: None,
        })
    }

    fn decode(&self, _asset: &MediaAsset, targets: &[u64]) -> SegmentResult<FrameStream> {
        let frames: Vec<DecodedFrame> = targets
            .iter()
            .map(|&index| DecodedFrame {
                index,
                image: Ok(RgbImage::from_pixel(16, 9, Rgb([(index % 255) as u8, 40, 80]))),
            })
            .collect();
        Ok(Box::new(frames.into_iter()))
    }
}

/// 前 `failures` 次回傳網路錯誤，之後寫出假影片
struct FlakyDownloader {
    failures: u32,
    attempts: AtomicU32,
}

impl FlakyDownloader {
    fn new(failures: u32) -> Self {
        Self {
            failures,
            attempts: AtomicU32::new(0),
        }
    }
}

impl Downloader for FlakyDownloader {
    fn download(
        &self,
        _url: &str,
        destination: &Path,
        _options: &DownloadOptions,
        _ctx: &RunContext,
    ) -> SegmentResult<DownloadedVideo> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            return Err(SegmentError::network(format!("HTTP 503 (attempt {attempt})")));
        }

        let path = destination.join("dQw4w9WgXcQ.mp4");
        fs::write(&path, b"fake video").unwrap();
        Ok(DownloadedVideo {
            path,
            video_id: Some("dQw4w9WgXcQ".to_string()),
            title: Some("Test Video".to_string()),
            duration_seconds: Some(10.0),
            width: Some(16),
            height: Some(9),
            codec: Some("h264".to_string()),
        })
    }
}

/// 寫出一張高度 3000 的漸層圖
struct FakeScreenshot;

impl ScreenshotCapture for FakeScreenshot {
    fn capture(&self, _url: &str, output_path: &Path, _ctx: &RunContext) -> SegmentResult<PathBuf> {
        gradient(400, 3000).save(output_path).unwrap();
        Ok(output_path.to_path_buf())
    }
}

#[derive(Clone, Default)]
struct RecordingConsumer {
    received: Arc<Mutex<Vec<PathBuf>>>,
}

impl AnalysisConsumer for RecordingConsumer {
    fn consume(&self, handoff: &AnalysisHandoff<'_>, _ctx: &RunContext) -> SegmentResult<()> {
        assert!(handoff.manifest_path.exists());
        self.received
            .lock()
            .unwrap()
            .push(handoff.manifest_path.to_path_buf());
        Ok(())
    }
}

struct RejectingConsumer;

impl AnalysisConsumer for RejectingConsumer {
    fn consume(&self, _handoff: &AnalysisHandoff<'_>, _ctx: &RunContext) -> SegmentResult<()> {
        Err(SegmentError::unrecoverable("analysis rejected the manifest"))
    }
}

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    })
}

fn write_image(dir: &TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    gradient(400, 3000).save(&path).unwrap();
    path
}

fn file_names(manifest_path: &Path) -> Vec<(String, String)> {
    let run_dir = manifest_path.parent().unwrap();
    let manifest = MetadataRecorder::new(run_dir).load().unwrap();
    manifest
        .files
        .iter()
        .map(|file| {
            (
                file.path().file_name().unwrap().to_string_lossy().to_string(),
                file.blake3().to_string(),
            )
        })
        .collect()
}

/// 測試 1: 切圖後 manifest 可驗證，竄改或刪除檔案會被偵測
#[test]
fn test_tiling_manifest_detects_tampering() {
    let dir = tempdir().unwrap();
    let image_path = write_image(&dir, "page.png");
    let run_dir = dir.path().join("run");
    let ctx = ctx();

    let tiler = ImageTiler::new(TilingSettings::default());
    let outcome = tiler.tile(&image_path, &run_dir, &ctx).unwrap();
    let offsets: Vec<u32> = outcome.tiles.iter().map(|t| t.y_offset).collect();
    assert_eq!(offsets, vec![0, 924, 1848, 1976]);

    let recorder = MetadataRecorder::new(&run_dir);
    let manifest = recorder
        .record_tiles("page", &outcome, tiler.settings(), &ctx)
        .unwrap();
    assert_eq!(manifest.files.len(), 4);
    assert!(recorder.verify().unwrap().is_clean());

    fs::write(run_dir.join(&outcome.tiles[1].path), b"tampered").unwrap();
    fs::remove_file(run_dir.join(&outcome.tiles[3].path)).unwrap();

    let report = recorder.verify().unwrap();
    assert!(!report.is_intact());
    assert_eq!(report.corrupted, vec![outcome.tiles[1].path.clone()]);
    assert_eq!(report.missing, vec![outcome.tiles[3].path.clone()]);
    println!("✓ 切圖驗證測試通過");
}

/// 測試 2: 本機影片經過完整流程
#[test]
fn test_local_video_pipeline() {
    let dir = tempdir().unwrap();
    let video = dir.path().join("clip.mp4");
    fs::write(&video, b"fake video").unwrap();

    let consumer = RecordingConsumer::default();
    let orchestrator = PipelineOrchestrator::new(settings_in(dir.path()))
        .unwrap()
        .with_frame_decoder(Box::new(FakeDecoder))
        .with_analysis(Box::new(consumer.clone()));

    let report = orchestrator.process_input(&video.to_string_lossy(), None, &ctx());
    assert!(report.is_success(), "{:?}", report.failure);
    assert_eq!(report.kind, Some(AssetKind::VideoFile));
    assert_eq!(
        report.history,
        vec![
            AssetStage::Pending,
            AssetStage::Sampling,
            AssetStage::Recorded,
            AssetStage::Done
        ]
    );

    let manifest_path = report.manifest_path.unwrap();
    let names: Vec<String> = file_names(&manifest_path)
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert_eq!(
        names,
        vec![
            "timestamp_000000_frame_0000_time_0.0s.jpg",
            "timestamp_000002_frame_0060_time_2.0s.jpg",
            "timestamp_000004_frame_0120_time_4.0s.jpg",
            "timestamp_000006_frame_0180_time_6.0s.jpg",
            "timestamp_000008_frame_0240_time_8.0s.jpg",
        ]
    );
    assert_eq!(*consumer.received.lock().unwrap(), vec![manifest_path]);
    println!("✓ 本機影片流程測試通過");
}

/// 測試 3: 下載遇到暫時性網路錯誤時重試成功
#[test]
fn test_flaky_download_is_retried() {
    let dir = tempdir().unwrap();
    let downloader = Arc::new(FlakyDownloader::new(2));

    struct Shared(Arc<FlakyDownloader>);
    impl Downloader for Shared {
        fn download(
            &self,
            url: &str,
            destination: &Path,
            options: &DownloadOptions,
            ctx: &RunContext,
        ) -> SegmentResult<DownloadedVideo> {
            self.0.download(url, destination, options, ctx)
        }
    }

    let orchestrator = PipelineOrchestrator::new(settings_in(dir.path()))
        .unwrap()
        .with_downloader(Box::new(Shared(Arc::clone(&downloader))))
        .with_frame_decoder(Box::new(FakeDecoder))
        .with_retry_policy(fast_retry());

    let report = orchestrator.process_input(YOUTUBE_URL, None, &ctx());
    assert!(report.is_success(), "{:?}", report.failure);
    assert_eq!(downloader.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(report.asset_id.as_deref(), Some("yt_dQw4w9WgXcQ"));

    let run_dir = report.run_dir.unwrap();
    let manifest = MetadataRecorder::new(&run_dir).load().unwrap();
    match manifest.source {
        SourceDescriptor::Video(asset) => {
            assert_eq!(asset.source, YOUTUBE_URL);
            assert_eq!(asset.title.as_deref(), Some("Test Video"));
        }
        SourceDescriptor::Image(_) => panic!("expected video source"),
    }
    println!("✓ 下載重試測試通過");
}

/// 測試 4: 全部失敗都是網路問題時批次結束碼為 4
#[test]
fn test_network_only_failures_exit_with_4() {
    let dir = tempdir().unwrap();
    let orchestrator = PipelineOrchestrator::new(settings_in(dir.path()))
        .unwrap()
        .with_downloader(Box::new(FlakyDownloader::new(u32::MAX)))
        .with_frame_decoder(Box::new(FakeDecoder))
        .with_retry_policy(fast_retry());

    let inputs = vec![
        YOUTUBE_URL.to_string(),
        "https://youtu.be/9bZkp7q19f0".to_string(),
        format!("  {YOUTUBE_URL}  "),
    ];
    let batch = orchestrator.process_batch(&inputs, None, &ctx()).unwrap();

    assert_eq!(batch.duplicates_removed, 1);
    assert_eq!(batch.reports.len(), 2);
    assert_eq!(batch.failures().count(), 2);
    assert!(batch.failures().all(|failure| failure.network_rooted));
    assert!(
        batch
            .failures()
            .all(|failure| failure.stage == AssetStage::Downloading)
    );
    assert_eq!(batch.exit_code(), 4);
    println!("✓ 網路失敗結束碼測試通過");
}

/// 測試 5: 混合失敗時批次結束碼為 1，其他素材照常完成
#[test]
fn test_mixed_batch_isolates_failures() {
    let dir = tempdir().unwrap();
    let image_path = write_image(&dir, "page.png");
    let orchestrator = PipelineOrchestrator::new(settings_in(dir.path()))
        .unwrap()
        .with_downloader(Box::new(FlakyDownloader::new(u32::MAX)))
        .with_retry_policy(fast_retry());

    let inputs = vec![
        image_path.to_string_lossy().to_string(),
        dir.path().join("missing.png").to_string_lossy().to_string(),
        YOUTUBE_URL.to_string(),
    ];
    let batch = orchestrator.process_batch(&inputs, None, &ctx()).unwrap();

    assert_eq!(batch.succeeded().count(), 1);
    let kinds: Vec<ErrorKind> = batch.failures().map(|failure| failure.kind).collect();
    assert!(kinds.contains(&ErrorKind::Validation));
    assert_eq!(batch.exit_code(), 1);
    println!("✓ 混合批次測試通過");
}

/// 測試 6: 網頁截圖切圖，manifest 來源為原始網址
#[test]
fn test_page_url_is_tiled() {
    let dir = tempdir().unwrap();
    let orchestrator = PipelineOrchestrator::new(settings_in(dir.path()))
        .unwrap()
        .with_screenshot(Box::new(FakeScreenshot));

    let url = "https://example.com/pricing";
    let source = AssetSource::parse(url, None).unwrap();
    assert_eq!(source.kind, AssetKind::PageUrl);

    let report = orchestrator.process(&source, &ctx());
    assert!(report.is_success(), "{:?}", report.failure);

    let run_dir = report.run_dir.unwrap();
    assert!(run_dir.join("source").join("screenshot.png").exists());
    let manifest = MetadataRecorder::new(&run_dir).load().unwrap();
    assert_eq!(manifest.files.len(), 4);
    match manifest.source {
        SourceDescriptor::Image(image) => assert_eq!(image.source, url),
        SourceDescriptor::Video(_) => panic!("expected image source"),
    }
    println!("✓ 網頁切圖測試通過");
}

/// 測試 7: 重新執行產生相同的檔名與內容
#[test]
fn test_rerun_is_idempotent() {
    let dir = tempdir().unwrap();
    let image_path = write_image(&dir, "page.png");
    let orchestrator = PipelineOrchestrator::new(settings_in(dir.path())).unwrap();
    let ctx = ctx();

    let first = orchestrator.process_input(&image_path.to_string_lossy(), None, &ctx);
    let second = orchestrator.process_input(&image_path.to_string_lossy(), None, &ctx);

    let first_dir = first.run_dir.clone().unwrap();
    let second_dir = second.run_dir.clone().unwrap();
    assert_ne!(first_dir, second_dir);
    assert_eq!(first.asset_id, second.asset_id);
    assert_eq!(
        file_names(&first.manifest_path.unwrap()),
        file_names(&second.manifest_path.unwrap())
    );
    println!("✓ 重複執行測試通過");
}

/// 測試 8: 交付失敗時不留下 manifest，但保留切圖
#[test]
fn test_failed_handoff_discards_manifest() {
    let dir = tempdir().unwrap();
    let image_path = write_image(&dir, "page.png");
    let orchestrator = PipelineOrchestrator::new(settings_in(dir.path()))
        .unwrap()
        .with_analysis(Box::new(RejectingConsumer));

    let report = orchestrator.process_input(&image_path.to_string_lossy(), None, &ctx());
    let failure = report.failure.as_ref().unwrap();
    assert_eq!(failure.stage, AssetStage::Recorded);
    assert_eq!(report.exit_code(), 1);

    let run_dir = report.run_dir.unwrap();
    assert!(!run_dir.join("manifest.json").exists());
    assert_eq!(fs::read_dir(run_dir.join("tiles")).unwrap().count(), 4);
    println!("✓ 交付失敗測試通過");
}

/// 測試 9: 取消後批次中尚未開始的素材都標記為失敗
#[test]
fn test_cancelled_batch_rejects_inputs() {
    let dir = tempdir().unwrap();
    let image_path = write_image(&dir, "page.png");
    let orchestrator = PipelineOrchestrator::new(settings_in(dir.path())).unwrap();
    let ctx = RunContext::new(Arc::new(AtomicBool::new(true)));

    let inputs = vec![image_path.to_string_lossy().to_string()];
    let batch = orchestrator.process_batch(&inputs, None, &ctx).unwrap();
    assert_eq!(batch.failures().count(), 1);
    assert!(!dir.path().join("data").exists());
    println!("✓ 取消批次測試通過");
}
