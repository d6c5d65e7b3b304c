use crate::error::{SegmentError, SegmentResult};
use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;

pub const DEFAULT_TILE_HEIGHT: u32 = 1024;
pub const DEFAULT_TILE_OVERLAP: u32 = 100;
pub const DEFAULT_JPEG_QUALITY: u8 = 95;
pub const DEFAULT_PROGRESS_EVERY: u64 = 100;

static REGEX_LANGUAGE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]{2,3}([-_][A-Za-z0-9]{2,8})*$").expect("Invalid regex"));

/// 介面語言
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Language {
    #[default]
    #[serde(rename = "en-US")]
    EnUs,
    #[serde(rename = "zh-TW")]
    ZhTw,
}

impl Language {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EnUs => "en-US",
            Self::ZhTw => "zh-TW",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnUs => write!(f, "English"),
            Self::ZhTw => write!(f, "繁體中文"),
        }
    }
}

/// 影格擷取設定
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingSettings {
    /// 擷取間隔（秒），0 代表每一幀
    pub interval_seconds: f64,
    pub jpeg_quality: u8,
    /// 每處理幾幀輸出一次進度
    pub progress_every: u64,
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self {
            interval_seconds: 0.0,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }
}

impl SamplingSettings {
    pub fn validate(&self) -> SegmentResult<()> {
        if !self.interval_seconds.is_finite() || self.interval_seconds < 0.0 {
            return Err(SegmentError::validation(format!(
                "擷取間隔必須是大於或等於 0 的數值: {}",
                self.interval_seconds
            )));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(SegmentError::validation(format!(
                "JPEG 品質必須介於 1 到 100: {}",
                self.jpeg_quality
            )));
        }
        if self.progress_every == 0 {
            return Err(SegmentError::validation("進度輸出頻率必須大於 0"));
        }
        Ok(())
    }
}

/// 圖片切割設定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TilingSettings {
    pub tile_height: u32,
    /// 未指定時使用原圖寬度
    pub tile_width: Option<u32>,
    pub overlap: u32,
}

impl Default for TilingSettings {
    fn default() -> Self {
        Self {
            tile_height: DEFAULT_TILE_HEIGHT,
            tile_width: None,
            overlap: DEFAULT_TILE_OVERLAP,
        }
    }
}

impl TilingSettings {
    pub fn validate(&self) -> SegmentResult<()> {
        if self.tile_height == 0 {
            return Err(SegmentError::validation("切片高度必須大於 0"));
        }
        if self.tile_width == Some(0) {
            return Err(SegmentError::validation("切片寬度必須大於 0"));
        }
        if self.overlap >= self.tile_height {
            return Err(SegmentError::validation(format!(
                "重疊像素 ({}) 必須小於切片高度 ({})",
                self.overlap, self.tile_height
            )));
        }
        Ok(())
    }
}

/// 下載畫質上限
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum, Default)]
pub enum VideoQuality {
    #[serde(rename = "4K")]
    #[value(name = "4K", alias = "4k")]
    Uhd4k,
    #[default]
    #[serde(rename = "1080p")]
    #[value(name = "1080p")]
    P1080,
    #[serde(rename = "720p")]
    #[value(name = "720p")]
    P720,
    #[serde(rename = "480p")]
    #[value(name = "480p")]
    P480,
    #[serde(rename = "360p")]
    #[value(name = "360p")]
    P360,
}

impl VideoQuality {
    #[must_use]
    pub const fn max_height(self) -> u32 {
        match self {
            Self::Uhd4k => 2160,
            Self::P1080 => 1080,
            Self::P720 => 720,
            Self::P480 => 480,
            Self::P360 => 360,
        }
    }
}

impl fmt::Display for VideoQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uhd4k => write!(f, "4K"),
            other => write!(f, "{}p", other.max_height()),
        }
    }
}

/// 下載格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum, Default)]
#[serde(rename_all = "lowercase")]
#[value(rename_all = "lower")]
pub enum DownloadFormat {
    #[default]
    Mp4,
    Webm,
    Audio,
}

impl fmt::Display for DownloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mp4 => write!(f, "mp4"),
            Self::Webm => write!(f, "webm"),
            Self::Audio => write!(f, "audio"),
        }
    }
}

/// 交給下載工具的選項
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DownloadOptions {
    pub quality: VideoQuality,
    pub format: DownloadFormat,
    /// 字幕語言代碼，未指定則不下載字幕
    pub subtitles: Option<String>,
}

impl DownloadOptions {
    pub fn validate(&self) -> SegmentResult<()> {
        match &self.subtitles {
            Some(language) if !REGEX_LANGUAGE_CODE.is_match(language) => Err(
                SegmentError::validation(format!("字幕語言代碼格式錯誤: {language}")),
            ),
            _ => Ok(()),
        }
    }
}

/// 網頁截圖服務選項
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenshotOptions {
    pub endpoint: String,
    pub width: u32,
    pub height: u32,
    pub full_page: bool,
    /// 等待動態內容載入的毫秒數
    pub delay_ms: u64,
    pub file_type: String,
    pub block_ads: bool,
}

impl Default for ScreenshotOptions {
    fn default() -> Self {
        Self {
            endpoint: "https://shot.screenshotapi.net/screenshot".to_string(),
            width: 1920,
            height: 3240,
            full_page: true,
            delay_ms: 12_000,
            file_type: "png".to_string(),
            block_ads: true,
        }
    }
}

impl ScreenshotOptions {
    pub fn validate(&self) -> SegmentResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(SegmentError::validation("截圖尺寸必須大於 0"));
        }
        if !matches!(self.file_type.as_str(), "png" | "jpg" | "jpeg" | "webp") {
            return Err(SegmentError::validation(format!(
                "不支援的截圖格式: {}",
                self.file_type
            )));
        }
        Ok(())
    }
}

/// 批次流程設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub output_root: PathBuf,
    /// 同時處理的素材數量
    pub concurrency: usize,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub network_timeout_secs: u64,
    /// 交付分析的外部指令，會在最後附上 manifest 路徑
    pub analysis_command: Option<Vec<String>>,
    pub log_to_file: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("data"),
            concurrency: 2,
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            network_timeout_secs: 600,
            analysis_command: None,
            log_to_file: true,
        }
    }
}

impl PipelineSettings {
    pub fn validate(&self) -> SegmentResult<()> {
        if self.concurrency == 0 {
            return Err(SegmentError::validation("並行數量必須大於 0"));
        }
        if self.max_attempts == 0 {
            return Err(SegmentError::validation("重試次數必須至少為 1"));
        }
        if self.network_timeout_secs == 0 {
            return Err(SegmentError::validation("網路逾時必須大於 0 秒"));
        }
        if self.output_root.as_os_str().is_empty() {
            return Err(SegmentError::validation("輸出根目錄不可為空"));
        }
        if self
            .analysis_command
            .as_ref()
            .is_some_and(|command| command.is_empty())
        {
            return Err(SegmentError::validation("分析指令不可為空陣列"));
        }
        Ok(())
    }
}

/// 使用者設定（settings.json）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub language: Language,
    pub sampling: SamplingSettings,
    pub tiling: TilingSettings,
    pub download: DownloadOptions,
    pub screenshot: ScreenshotOptions,
    pub pipeline: PipelineSettings,
}

impl Settings {
    /// 在邊界一次性驗證所有階段設定
    pub fn validate(&self) -> SegmentResult<()> {
        self.sampling.validate()?;
        self.tiling.validate()?;
        self.download.validate()?;
        self.screenshot.validate()?;
        self.pipeline.validate()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub settings: Settings,
    pub settings_path: PathBuf,
}
