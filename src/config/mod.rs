pub mod load;
pub mod save;
pub mod types;

pub use load::DEFAULT_SETTINGS_FILE;
pub use types::{
    Config, DownloadFormat, DownloadOptions, Language, PipelineSettings, SamplingSettings,
    ScreenshotOptions, Settings, TilingSettings, VideoQuality,
};
