use crate::config::types::Config;
use crate::error::{SegmentError, SegmentResult};
use std::fs;

impl Config {
    /// 將目前設定寫回原本讀取的設定檔
    pub fn save(&self) -> SegmentResult<()> {
        self.settings.validate()?;
        let content = serde_json::to_string_pretty(&self.settings)
            .map_err(|e| SegmentError::unrecoverable(format!("無法序列化設定: {e}")))?;

        fs::write(&self.settings_path, content)
            .map_err(|e| SegmentError::io(&self.settings_path, e))
    }
}
