use crate::error::{ErrorKind, SegmentError, SegmentResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 單一素材的處理階段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStage {
    Pending,
    Downloading,
    Sampling,
    Tiling,
    Recorded,
    Done,
    Failed,
}

impl AssetStage {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// 本機檔案從 Pending 直接進入 Sampling／Tiling
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (from, Self::Failed) => !from.is_terminal(),
            (Self::Pending, Self::Downloading | Self::Sampling | Self::Tiling)
            | (Self::Downloading, Self::Sampling | Self::Tiling)
            | (Self::Sampling | Self::Tiling, Self::Recorded)
            | (Self::Recorded, Self::Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for AssetStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Sampling => "sampling",
            Self::Tiling => "tiling",
            Self::Recorded => "recorded",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// 失敗紀錄，保留批次結束時輸出摘要所需的資訊
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub asset_id: String,
    pub stage: AssetStage,
    pub kind: ErrorKind,
    pub message: String,
    pub exit_code: u8,
    pub network_rooted: bool,
}

impl FailureRecord {
    #[must_use]
    pub fn new(asset_id: &str, stage: AssetStage, error: &SegmentError) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            stage,
            kind: error.kind(),
            message: error.to_string(),
            exit_code: error.exit_code(),
            network_rooted: error.is_network_rooted(),
        }
    }
}

/// 追蹤單一素材的狀態轉換
#[derive(Debug, Clone)]
pub struct AssetRun {
    asset_id: String,
    stage: AssetStage,
    history: Vec<AssetStage>,
}

impl AssetRun {
    #[must_use]
    pub fn new(asset_id: &str) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            stage: AssetStage::Pending,
            history: vec![AssetStage::Pending],
        }
    }

    #[must_use]
    pub fn asset_id(&self) -> &str {
        &self.asset_id
    }

    #[must_use]
    pub const fn stage(&self) -> AssetStage {
        self.stage
    }

    #[must_use]
    pub fn history(&self) -> &[AssetStage] {
        &self.history
    }

    /// 不合法的轉換視為程式錯誤
    pub fn advance(&mut self, next: AssetStage) -> SegmentResult<()> {
        if !self.stage.can_transition_to(next) {
            return Err(SegmentError::unrecoverable(format!(
                "[{}] 不合法的狀態轉換: {} -> {next}",
                self.asset_id, self.stage
            )));
        }
        self.stage = next;
        self.history.push(next);
        Ok(())
    }

    /// 標記失敗並回傳失敗當下所在階段的紀錄
    pub fn fail(&mut self, error: &SegmentError) -> FailureRecord {
        let record = FailureRecord::new(&self.asset_id, self.stage, error);
        if !self.stage.is_terminal() {
            self.stage = AssetStage::Failed;
            self.history.push(AssetStage::Failed);
        }
        record
    }
}
