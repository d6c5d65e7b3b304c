//! 影片影格擷取元件
//!
//! 1. 驗證設定與輸入檔案
//! 2. 取得影片資訊（ffprobe）
//! 3. 依間隔選取目標影格
//! 4. 單次串流解碼並輸出 JPEG

mod frame_decoder;
mod main;
mod target_selector;

pub use frame_decoder::{DecodedFrame, FfmpegFrameDecoder, FrameDecoder, FrameStream};
pub use main::{SamplingOutcome, VideoFrameSampler};
pub use target_selector::{FrameTarget, select_frame_targets};
