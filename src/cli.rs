//! 命令列介面
//!
//! 不帶子命令時進入互動選單

use crate::component::frame_sampler::VideoFrameSampler;
use crate::component::image_tiler::ImageTiler;
use crate::component::metadata_recorder::{MetadataRecorder, VerificationReport};
use crate::component::pipeline::{
    AssetReport, AssetSource, BatchReport, KindHint, PipelineOrchestrator, create_run_dir,
};
use crate::config::{DownloadFormat, Settings, VideoQuality};
use crate::context::RunContext;
use crate::error::{SegmentError, SegmentResult};
use crate::init;
use crate::tools::ensure_directory_exists;
use clap::{Args, Parser, Subcommand};
use console::style;
use log::info;
use rust_i18n::t;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(
    name = "media_segmenter",
    version,
    about = "Sample video frames and tile full-page screenshots into analyzable image sets"
)]
pub struct Cli {
    /// 設定檔路徑（預設為工作目錄的 settings.json）
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Extract frames from a local video
    Sample(SampleArgs),
    /// Split a tall image into overlapping tiles
    Tile(TileArgs),
    /// Process one asset through the whole pipeline
    Run(RunArgs),
    /// Process every asset listed in a file
    Batch(BatchArgs),
    /// Check a run directory against its manifest
    Verify(VerifyArgs),
}

#[derive(Debug, Args)]
pub struct SampleArgs {
    pub video: PathBuf,

    /// 直接作為執行目錄；未指定時在 output_root 下建立
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    #[arg(long)]
    pub interval: Option<f64>,

    #[arg(long)]
    pub jpeg_quality: Option<u8>,
}

#[derive(Debug, Args)]
pub struct TileArgs {
    pub image: PathBuf,

    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    #[arg(long)]
    pub tile_height: Option<u32>,

    #[arg(long)]
    pub tile_width: Option<u32>,

    #[arg(long)]
    pub overlap: Option<u32>,
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct RunTarget {
    #[arg(long)]
    pub url: Option<String>,

    #[arg(long)]
    pub file: Option<PathBuf>,
}

/// run 與 batch 共用的設定覆寫
#[derive(Debug, Args, Default)]
pub struct OverrideArgs {
    /// 強制指定素材類型
    #[arg(long, value_enum)]
    pub kind: Option<KindHint>,

    #[arg(long, value_enum)]
    pub quality: Option<VideoQuality>,

    #[arg(long, value_enum)]
    pub format: Option<DownloadFormat>,

    /// 字幕語言代碼，例如 en、zh-Hant
    #[arg(long)]
    pub subtitles: Option<String>,

    #[arg(long)]
    pub interval: Option<f64>,

    #[arg(long)]
    pub jpeg_quality: Option<u8>,

    #[arg(long)]
    pub tile_height: Option<u32>,

    #[arg(long)]
    pub tile_width: Option<u32>,

    #[arg(long)]
    pub overlap: Option<u32>,

    #[arg(long)]
    pub output_root: Option<PathBuf>,

    #[arg(long)]
    pub concurrency: Option<usize>,

    #[arg(long)]
    pub max_attempts: Option<u32>,
}

impl OverrideArgs {
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(quality) = self.quality {
            settings.download.quality = quality;
        }
        if let Some(format) = self.format {
            settings.download.format = format;
        }
        if let Some(subtitles) = &self.subtitles {
            settings.download.subtitles = Some(subtitles.clone());
        }
        if let Some(interval) = self.interval {
            settings.sampling.interval_seconds = interval;
        }
        if let Some(quality) = self.jpeg_quality {
            settings.sampling.jpeg_quality = quality;
        }
        if let Some(height) = self.tile_height {
            settings.tiling.tile_height = height;
        }
        if self.tile_width.is_some() {
            settings.tiling.tile_width = self.tile_width;
        }
        if let Some(overlap) = self.overlap {
            settings.tiling.overlap = overlap;
        }
        if let Some(root) = &self.output_root {
            settings.pipeline.output_root.clone_from(root);
        }
        if let Some(concurrency) = self.concurrency {
            settings.pipeline.concurrency = concurrency;
        }
        if let Some(max_attempts) = self.max_attempts {
            settings.pipeline.max_attempts = max_attempts;
        }
    }
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub target: RunTarget,

    #[command(flatten)]
    pub overrides: OverrideArgs,
}

#[derive(Debug, Args)]
pub struct BatchArgs {
    /// 每行一筆網址或檔案路徑，可加 `video:`／`page:` 前綴，`#` 開頭為註解
    pub input_file: PathBuf,

    #[command(flatten)]
    pub overrides: OverrideArgs,
}

#[derive(Debug, Args)]
pub struct VerifyArgs {
    pub run_dir: PathBuf,
}

/// 執行子命令並回傳結束碼
#[must_use]
pub fn dispatch(command: Commands, settings: Settings, ctx: &RunContext) -> u8 {
    let result = match command {
        Commands::Sample(args) => run_sample(args, settings, ctx),
        Commands::Tile(args) => run_tile(args, settings, ctx),
        Commands::Run(args) => run_single(args, settings, ctx),
        Commands::Batch(args) => run_batch(args, settings, ctx),
        Commands::Verify(args) => run_verify(&args, &settings, ctx),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {e}", style(t!("common.error_prefix")).red().bold());
            e.exit_code()
        }
    }
}

fn start_logging(settings: &Settings, ctx: &RunContext) {
    let log_file = settings.pipeline.log_to_file.then(|| {
        settings
            .pipeline
            .output_root
            .join("logs")
            .join(format!("pipeline_{}.log", ctx.run_stamp()))
    });
    init::init(log_file.as_deref());
}

fn run_sample(args: SampleArgs, mut settings: Settings, ctx: &RunContext) -> SegmentResult<u8> {
    if let Some(interval) = args.interval {
        settings.sampling.interval_seconds = interval;
    }
    if let Some(quality) = args.jpeg_quality {
        settings.sampling.jpeg_quality = quality;
    }
    settings.validate()?;
    start_logging(&settings, ctx);

    let source = AssetSource::parse(&args.video.to_string_lossy(), Some(KindHint::Video))?;
    let asset_id = source.asset_id()?;
    let (run_dir, created_root) = prepare_run_dir(args.output_dir, &settings, &asset_id, ctx)?;

    let sampler = VideoFrameSampler::new(settings.sampling);
    let outcome = match sampler.sample(&args.video, &run_dir, ctx) {
        Ok(outcome) => outcome,
        Err(e) => {
            cleanup_empty_run_dir(&run_dir, created_root.as_deref());
            return Err(e);
        }
    };
    let manifest = MetadataRecorder::new(&run_dir).record_frames(
        &asset_id,
        &outcome,
        sampler.settings(),
        ctx,
    )?;

    println!(
        "{}",
        style(t!(
            "cli.sample_done",
            count = outcome.samples.len(),
            skipped = outcome.skipped_frames.len()
        ))
        .green()
    );
    println!("  {}", run_dir.display());
    info!("[{asset_id}] manifest 共 {} 個檔案", manifest.files.len());
    Ok(0)
}

fn run_tile(args: TileArgs, mut settings: Settings, ctx: &RunContext) -> SegmentResult<u8> {
    if let Some(height) = args.tile_height {
        settings.tiling.tile_height = height;
    }
    if args.tile_width.is_some() {
        settings.tiling.tile_width = args.tile_width;
    }
    if let Some(overlap) = args.overlap {
        settings.tiling.overlap = overlap;
    }
    settings.validate()?;
    start_logging(&settings, ctx);

    let source = AssetSource::parse(&args.image.to_string_lossy(), Some(KindHint::Page))?;
    let asset_id = source.asset_id()?;
    let (run_dir, created_root) = prepare_run_dir(args.output_dir, &settings, &asset_id, ctx)?;

    let tiler = ImageTiler::new(settings.tiling);
    let outcome = match tiler.tile(&args.image, &run_dir, ctx) {
        Ok(outcome) => outcome,
        Err(e) => {
            cleanup_empty_run_dir(&run_dir, created_root.as_deref());
            return Err(e);
        }
    };
    MetadataRecorder::new(&run_dir).record_tiles(&asset_id, &outcome, tiler.settings(), ctx)?;

    println!(
        "{}",
        style(t!("cli.tile_done", count = outcome.tiles.len())).green()
    );
    println!("  {}", run_dir.display());
    Ok(0)
}

fn run_single(args: RunArgs, mut settings: Settings, ctx: &RunContext) -> SegmentResult<u8> {
    args.overrides.apply(&mut settings);
    settings.validate()?;
    start_logging(&settings, ctx);

    let input = match (&args.target.url, &args.target.file) {
        (Some(url), _) => url.clone(),
        (None, Some(file)) => file.to_string_lossy().to_string(),
        (None, None) => return Err(SegmentError::validation("必須指定 --url 或 --file")),
    };
    let source = AssetSource::parse(&input, args.overrides.kind)?;

    let orchestrator = PipelineOrchestrator::new(settings)?;
    let report = orchestrator.process(&source, ctx);
    print_asset_report(&report);
    Ok(report.exit_code())
}

fn run_batch(args: BatchArgs, mut settings: Settings, ctx: &RunContext) -> SegmentResult<u8> {
    args.overrides.apply(&mut settings);
    settings.validate()?;

    let content =
        fs::read_to_string(&args.input_file).map_err(|e| SegmentError::io(&args.input_file, e))?;
    let inputs: Vec<String> = content.lines().map(str::to_string).collect();
    start_logging(&settings, ctx);

    let orchestrator = PipelineOrchestrator::new(settings)?;
    let batch = orchestrator.process_batch(&inputs, args.overrides.kind, ctx)?;
    print_batch_report(&batch);
    Ok(batch.exit_code())
}

fn run_verify(args: &VerifyArgs, settings: &Settings, ctx: &RunContext) -> SegmentResult<u8> {
    start_logging(settings, ctx);
    let report = MetadataRecorder::new(&args.run_dir).verify()?;
    print_verification_report(&report);
    Ok(if report.is_clean() { 0 } else { 1 })
}

/// 指定的輸出資料夾直接使用；否則建立新的執行目錄
///
/// 回傳的第二個值是本次新建的最外層資料夾，失敗時由 `cleanup_empty_run_dir` 收回
fn prepare_run_dir(
    output_dir: Option<PathBuf>,
    settings: &Settings,
    asset_id: &str,
    ctx: &RunContext,
) -> SegmentResult<(PathBuf, Option<PathBuf>)> {
    match output_dir {
        Some(dir) => {
            let created_root = dir
                .ancestors()
                .take_while(|p| !p.as_os_str().is_empty() && !p.exists())
                .last()
                .map(Path::to_path_buf);
            ensure_directory_exists(&dir)?;
            Ok((dir, created_root))
        }
        None => {
            let dir = create_run_dir(&settings.pipeline.output_root, asset_id, &ctx.run_stamp())?;
            let created_root = Some(dir.clone());
            Ok((dir, created_root))
        }
    }
}

/// 由內而外移除空資料夾，最多到本次新建的那一層
fn cleanup_empty_run_dir(run_dir: &Path, created_root: Option<&Path>) {
    let Some(root) = created_root else {
        return;
    };
    for dir in run_dir.ancestors() {
        if fs::remove_dir(dir).is_err() || dir == root {
            break;
        }
    }
}

pub fn print_asset_report(report: &AssetReport) {
    match (&report.failure, &report.manifest_path) {
        (None, Some(manifest_path)) => {
            println!(
                "{} {}",
                style(t!("cli.asset_done")).green().bold(),
                manifest_path.display()
            );
        }
        (Some(failure), _) => {
            println!(
                "{} [{}] {} ({}): {}",
                style(t!("cli.asset_failed")).red().bold(),
                failure.asset_id,
                failure.stage,
                failure.kind,
                failure.message
            );
        }
        (None, None) => {}
    }
}

pub fn print_batch_report(batch: &BatchReport) {
    println!();
    println!("{}", style(t!("cli.batch_summary")).cyan().bold());
    println!(
        "  {}",
        t!(
            "cli.batch_counts",
            total = batch.reports.len(),
            succeeded = batch.succeeded().count(),
            failed = batch.failures().count()
        )
    );
    if batch.duplicates_removed > 0 {
        println!(
            "  {}",
            style(t!("cli.batch_duplicates", count = batch.duplicates_removed)).dim()
        );
    }
    for failure in batch.failures() {
        println!(
            "  {} [{}] {} ({}): {}",
            style("✗").red(),
            failure.asset_id,
            failure.stage,
            failure.kind,
            failure.message
        );
    }
}

pub fn print_verification_report(report: &VerificationReport) {
    if report.is_clean() {
        println!(
            "{}",
            style(t!("cli.verify_ok", count = report.checked)).green()
        );
        return;
    }

    println!("{}", style(t!("cli.verify_failed")).red().bold());
    for (label, paths) in [
        ("missing", &report.missing),
        ("empty", &report.empty),
        ("corrupted", &report.corrupted),
        ("unlisted", &report.unlisted),
    ] {
        for path in paths {
            println!("  {label:<10} {}", path.display());
        }
    }
}
