//! 素材處理流程
//!
//! 下載（yt-dlp）或網頁截圖 → 影格擷取／切圖 → manifest → 交付分析，
//! 每筆素材獨立處理，外部操作僅在網路錯誤時重試

mod analysis;
mod asset;
mod downloader;
mod main;
mod retry;
mod screenshot;
mod state;

pub use analysis::{AnalysisConsumer, AnalysisHandoff, CommandConsumer, LoggingConsumer};
pub use asset::{AssetKind, AssetSource, KindHint, sanitize_slug, youtube_video_id};
pub use downloader::{DownloadedVideo, Downloader, YtDlpDownloader};
pub use main::{AssetReport, BatchReport, PipelineOrchestrator, create_run_dir};
pub use retry::RetryPolicy;
pub use screenshot::{SCREENSHOT_TOKEN_ENV, ScreenshotApiCapture, ScreenshotCapture};
pub use state::{AssetRun, AssetStage, FailureRecord};
