use crate::error::{SegmentError, SegmentResult};
use chrono::{DateTime, Local};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// 單次執行的環境：啟動時間與中斷信號，明確傳入每個元件
#[derive(Debug, Clone)]
pub struct RunContext {
    started_at: DateTime<Local>,
    shutdown_signal: Arc<AtomicBool>,
}

impl RunContext {
    #[must_use]
    pub fn new(shutdown_signal: Arc<AtomicBool>) -> Self {
        Self::with_start_time(Local::now(), shutdown_signal)
    }

    #[must_use]
    pub const fn with_start_time(
        started_at: DateTime<Local>,
        shutdown_signal: Arc<AtomicBool>,
    ) -> Self {
        Self {
            started_at,
            shutdown_signal,
        }
    }

    #[must_use]
    pub const fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// 執行目錄使用的時間戳記，例如 `20241102_153021`
    #[must_use]
    pub fn run_stamp(&self) -> String {
        self.started_at.format("%Y%m%d_%H%M%S").to_string()
    }

    #[must_use]
    pub fn shutdown_signal(&self) -> &Arc<AtomicBool> {
        &self.shutdown_signal
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.shutdown_signal.load(Ordering::SeqCst)
    }

    pub fn check_cancelled(&self) -> SegmentResult<()> {
        if self.is_cancelled() {
            return Err(SegmentError::Cancelled);
        }
        Ok(())
    }
}
