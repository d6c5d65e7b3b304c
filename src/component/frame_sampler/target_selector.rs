/// 浮點誤差容許值，避免 2.0 * 30 被算成 60.000000001 而多跳一幀
const STEP_EPSILON: f64 = 1e-9;

/// 預計擷取的影格
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTarget {
    pub index: u64,
    pub timestamp_seconds: f64,
}

/// 依間隔選出要擷取的影格
///
/// - `interval_seconds == 0`：每一幀都擷取
/// - `interval_seconds > 0`：從第 0 幀開始，下一個目標是時間大於等於
///   「前一個取樣時間 + 間隔」的第一幀；索引超出影格總數或時間超過影片長度即停止
///
/// 影格時間以 `index / frame_rate` 計算，因此每次前進的幀數固定
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn select_frame_targets(
    frame_rate: f64,
    total_frames: u64,
    duration_seconds: f64,
    interval_seconds: f64,
) -> Vec<FrameTarget> {
    if frame_rate <= 0.0 || total_frames == 0 || duration_seconds <= 0.0 {
        return Vec::new();
    }

    let target_at = |index: u64| FrameTarget {
        index,
        timestamp_seconds: index as f64 / frame_rate,
    };

    if interval_seconds <= 0.0 {
        return (0..total_frames).map(target_at).collect();
    }

    let step = ((interval_seconds * frame_rate - STEP_EPSILON).ceil() as u64).max(1);

    let mut targets = Vec::new();
    let mut index = 0u64;
    while index < total_frames {
        let target = target_at(index);
        if target.timestamp_seconds > duration_seconds + STEP_EPSILON {
            break;
        }
        targets.push(target);
        index = match index.checked_add(step) {
            Some(next) => next,
            None => break,
        };
    }

    targets
}
