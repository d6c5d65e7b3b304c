use crate::error::SegmentError;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("無法啟動 {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} 執行超過 {} 秒，已終止", .timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },

    #[error("{program} 因中斷信號而終止")]
    Cancelled { program: String },

    #[error("等待 {program} 結束失敗: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<ProcessError> for SegmentError {
    /// 找不到執行檔屬於 I/O 錯誤；逾時視為網路錯誤以便重試
    fn from(error: ProcessError) -> Self {
        match error {
            ProcessError::Spawn { program, source } | ProcessError::Wait { program, source } => {
                Self::io(program, source)
            }
            timed_out @ ProcessError::TimedOut { .. } => Self::network(timed_out.to_string()),
            ProcessError::Cancelled { .. } => Self::Cancelled,
        }
    }
}

#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// 取 stderr 最後幾行，用於錯誤訊息
    #[must_use]
    pub fn stderr_tail(&self, lines: usize) -> String {
        let collected: Vec<&str> = self.stderr.lines().rev().take(lines).collect();
        collected.into_iter().rev().collect::<Vec<_>>().join("\n")
    }
}

/// 執行外部程式，逾時或收到中斷信號時終止子程序
pub fn run_with_timeout(
    command: &mut Command,
    timeout: Duration,
    shutdown_signal: &Arc<AtomicBool>,
) -> Result<ProcessOutput, ProcessError> {
    let program = command.get_program().to_string_lossy().to_string();

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;

    // 持續讀取輸出，避免管線緩衝區塞滿造成子程序卡住
    let stdout_reader = spawn_reader(child.stdout.take());
    let stderr_reader = spawn_reader(child.stderr.take());

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if shutdown_signal.load(Ordering::SeqCst) {
                    terminate(&mut child);
                    return Err(ProcessError::Cancelled { program });
                }
                if started.elapsed() >= timeout {
                    terminate(&mut child);
                    return Err(ProcessError::TimedOut { program, timeout });
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(source) => {
                terminate(&mut child);
                return Err(ProcessError::Wait { program, source });
            }
        }
    };

    Ok(ProcessOutput {
        status,
        stdout: join_reader(stdout_reader),
        stderr: join_reader(stderr_reader),
    })
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = pipe.read_to_end(&mut buffer);
            String::from_utf8_lossy(&buffer).into_owned()
        })
    })
}

fn join_reader(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

fn terminate(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
