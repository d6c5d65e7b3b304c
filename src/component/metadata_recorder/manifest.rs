use crate::model::{ImageAsset, MediaAsset};
use crate::tools::file_naming::{
    FRAME_NAME_FIELDS, FRAME_NAME_PATTERN, TILE_NAME_FIELDS, TILE_NAME_PATTERN,
};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const MANIFEST_VERSION: u32 = 1;

/// 影格取樣的邊界規則說明，寫入 manifest 供下游工具判讀
pub const BOUNDARY_POLICY: &str = "greedy-from-zero: next frame is the first with time >= previous + interval; \
     stop when the frame index does not exist or its time exceeds the duration";

/// 擷取結果描述檔（manifest.json）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionManifest {
    pub version: u32,
    pub asset_id: String,
    pub source: SourceDescriptor,
    pub settings: ExtractionSettings,
    pub naming_convention: NamingConvention,
    pub files: Vec<ProducedFile>,
    #[serde(default)]
    pub skipped_frames: Vec<u64>,
    pub processed_at: DateTime<Local>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceDescriptor {
    Video(MediaAsset),
    Image(ImageAsset),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ExtractionSettings {
    Frames {
        interval_seconds: f64,
        boundary_policy: String,
        jpeg_quality: u8,
    },
    /// 實際使用的切片尺寸（寬度已依原圖調整）
    Tiles {
        tile_height: u32,
        tile_width: u32,
        overlap: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingField {
    pub placeholder: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingConvention {
    pub pattern: String,
    pub fields: Vec<NamingField>,
}

impl NamingConvention {
    #[must_use]
    pub fn frames() -> Self {
        Self::from_table(FRAME_NAME_PATTERN, &FRAME_NAME_FIELDS)
    }

    #[must_use]
    pub fn tiles() -> Self {
        Self::from_table(TILE_NAME_PATTERN, &TILE_NAME_FIELDS)
    }

    fn from_table(pattern: &str, fields: &[(&str, &str)]) -> Self {
        Self {
            pattern: pattern.to_string(),
            fields: fields
                .iter()
                .map(|(placeholder, description)| NamingField {
                    placeholder: (*placeholder).to_string(),
                    description: (*description).to_string(),
                })
                .collect(),
        }
    }
}

/// 已寫出的檔案，路徑相對於執行目錄
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProducedFile {
    Frame {
        path: PathBuf,
        frame_index: u64,
        timestamp_seconds: f64,
        bytes: u64,
        blake3: String,
    },
    Tile {
        path: PathBuf,
        tile_index: u32,
        y_offset: u32,
        width: u32,
        height: u32,
        overlap_with_previous: u32,
        bytes: u64,
        blake3: String,
    },
}

impl ProducedFile {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Frame { path, .. } | Self::Tile { path, .. } => path,
        }
    }

    #[must_use]
    pub const fn bytes(&self) -> u64 {
        match self {
            Self::Frame { bytes, .. } | Self::Tile { bytes, .. } => *bytes,
        }
    }

    #[must_use]
    pub fn blake3(&self) -> &str {
        match self {
            Self::Frame { blake3, .. } | Self::Tile { blake3, .. } => blake3,
        }
    }
}
