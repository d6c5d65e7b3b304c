use crate::error::{SegmentError, SegmentResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// 註冊 Ctrl-C 處理器，收到信號後各元件在下一個檢查點停止
pub fn setup_shutdown_signal() -> SegmentResult<Arc<AtomicBool>> {
    let shutdown_signal = Arc::new(AtomicBool::new(false));
    let signal_clone = Arc::clone(&shutdown_signal);

    ctrlc::set_handler(move || {
        signal_clone.store(true, Ordering::SeqCst);
        eprintln!("\n收到中斷信號，正在安全關閉...");
    })
    .map_err(|e| SegmentError::unrecoverable(format!("無法設定 Ctrl-C 處理器: {e}")))?;

    Ok(shutdown_signal)
}
