//! 擷取流程共用的資料模型

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 影片來源描述（載入後不再變動）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaAsset {
    /// 來源識別：本機路徑或下載網址
    pub source: String,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub total_frames: u64,
    pub duration_seconds: f64,
    pub codec: String,
    /// 四字元編碼標籤（例如 avc1）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// 圖片來源描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAsset {
    pub source: String,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub color_type: String,
}

/// 已寫出的單一影格
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSample {
    pub frame_index: u64,
    pub timestamp_seconds: f64,
    /// 相對於執行目錄的路徑
    pub path: PathBuf,
}

/// 已寫出的單一切片
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileSpec {
    pub source: String,
    pub tile_index: u32,
    pub y_offset: u32,
    pub height: u32,
    pub width: u32,
    pub overlap_with_previous: u32,
    /// 相對於執行目錄的路徑
    pub path: PathBuf,
}
