use crate::config::PipelineSettings;
use crate::context::RunContext;
use crate::error::{SegmentError, SegmentResult};
use log::warn;
use std::thread;
use std::time::{Duration, Instant};

const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// 外部操作的重試策略：只重試網路錯誤，間隔指數成長並設上限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&PipelineSettings::default())
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn from_settings(settings: &PipelineSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
        }
    }

    /// 第 `attempt` 次失敗後的等待時間（1s、2s、4s…）
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// 執行操作，網路錯誤時依策略重試
    ///
    /// 重試次數用盡時回傳包裝最後一次錯誤的 `RetriesExhausted`
    pub fn run<T, F>(&self, operation: &str, ctx: &RunContext, mut op: F) -> SegmentResult<T>
    where
        F: FnMut(u32) -> SegmentResult<T>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            ctx.check_cancelled()?;

            let error = match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if !e.kind().is_retryable() => return Err(e),
                Err(e) => e,
            };

            if attempt >= max_attempts {
                return Err(SegmentError::RetriesExhausted {
                    operation: operation.to_string(),
                    attempts: attempt,
                    last: Box::new(error),
                });
            }

            let delay = self.delay_for(attempt);
            warn!(
                "{operation} 第 {attempt}/{max_attempts} 次失敗，{:.1} 秒後重試: {error}",
                delay.as_secs_f64()
            );
            sleep_unless_cancelled(delay, ctx)?;
            attempt += 1;
        }
    }
}

fn sleep_unless_cancelled(delay: Duration, ctx: &RunContext) -> SegmentResult<()> {
    let deadline = Instant::now() + delay;
    loop {
        ctx.check_cancelled()?;
        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}
