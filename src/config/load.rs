use crate::config::types::{Config, Settings};
use crate::error::{SegmentError, SegmentResult};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_SETTINGS_FILE: &str = "settings.json";

impl Config {
    /// 從工作目錄的 settings.json 載入設定
    pub fn new() -> SegmentResult<Self> {
        Self::from_path(Path::new(DEFAULT_SETTINGS_FILE))
    }

    /// 檔案不存在時使用預設值，格式錯誤或數值不合法時回傳驗證錯誤
    pub fn from_path(path: &Path) -> SegmentResult<Self> {
        let settings = Self::load_settings(path)?;
        settings.validate()?;

        Ok(Self {
            settings,
            settings_path: path.to_path_buf(),
        })
    }

    fn load_settings(path: &Path) -> SegmentResult<Settings> {
        if !path.exists() {
            return Ok(Settings::default());
        }

        let content = fs::read_to_string(path).map_err(|e| SegmentError::io(path, e))?;

        serde_json::from_str(&content).map_err(|e| {
            SegmentError::validation(format!("設定檔格式錯誤 {}: {e}", path.display()))
        })
    }

    #[must_use]
    pub fn resolve_path(config_path: Option<PathBuf>) -> PathBuf {
        config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE))
    }
}
