use crate::component::metadata_recorder::ExtractionManifest;
use crate::context::RunContext;
use crate::error::{SegmentError, SegmentResult};
use crate::tools::run_with_timeout;
use log::info;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

/// 交給下游分析工具的內容
#[derive(Debug, Clone, Copy)]
pub struct AnalysisHandoff<'a> {
    pub asset_id: &'a str,
    pub run_dir: &'a Path,
    pub manifest_path: &'a Path,
    pub manifest: &'a ExtractionManifest,
}

/// 下游分析工具
pub trait AnalysisConsumer: Send + Sync {
    fn consume(&self, handoff: &AnalysisHandoff<'_>, ctx: &RunContext) -> SegmentResult<()>;
}

/// 只記錄交付資訊
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingConsumer;

impl AnalysisConsumer for LoggingConsumer {
    fn consume(&self, handoff: &AnalysisHandoff<'_>, _ctx: &RunContext) -> SegmentResult<()> {
        info!(
            "[{}] 可供分析：{}（{} 個檔案，目錄 {}）",
            handoff.asset_id,
            handoff.manifest_path.display(),
            handoff.manifest.files.len(),
            handoff.run_dir.display()
        );
        Ok(())
    }
}

/// 執行外部指令，最後一個參數為 manifest 路徑
#[derive(Debug, Clone)]
pub struct CommandConsumer {
    command: Vec<String>,
    timeout: Duration,
}

impl CommandConsumer {
    pub fn new(command: Vec<String>, timeout: Duration) -> SegmentResult<Self> {
        if command.first().is_none_or(|program| program.trim().is_empty()) {
            return Err(SegmentError::validation("分析指令不可為空"));
        }
        Ok(Self { command, timeout })
    }
}

impl AnalysisConsumer for CommandConsumer {
    fn consume(&self, handoff: &AnalysisHandoff<'_>, ctx: &RunContext) -> SegmentResult<()> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| SegmentError::validation("分析指令不可為空"))?;

        let output = run_with_timeout(
            Command::new(program)
                .args(args)
                .arg(handoff.manifest_path),
            self.timeout,
            ctx.shutdown_signal(),
        )?;

        if !output.success() {
            return Err(SegmentError::network(format!(
                "分析指令失敗 ({}): {}",
                output.status,
                output.stderr_tail(3)
            )));
        }

        info!("[{}] 分析指令完成: {program}", handoff.asset_id);
        Ok(())
    }
}
