use crate::error::{SegmentError, SegmentResult};
use crate::model::MediaAsset;
use crate::tools::probe_media;
use image::RgbImage;
use log::debug;
use std::collections::{BTreeSet, VecDeque};
use std::io::{BufReader, ErrorKind as IoErrorKind, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};

/// 單一影格的解碼結果
#[derive(Debug)]
pub struct DecodedFrame {
    pub index: u64,
    pub image: SegmentResult<RgbImage>,
}

pub type FrameStream = Box<dyn Iterator<Item = DecodedFrame> + Send>;

/// 影片解碼來源
///
/// `decode` 依影格索引遞增順序回傳每個目標恰好一次
pub trait FrameDecoder: Send + Sync {
    fn probe(&self, path: &Path) -> SegmentResult<MediaAsset>;

    fn decode(&self, asset: &MediaAsset, targets: &[u64]) -> SegmentResult<FrameStream>;
}

/// 以 ffmpeg 輸出 rgb24 原始影格，單次串流讀取所有目標
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegFrameDecoder;

impl FrameDecoder for FfmpegFrameDecoder {
    fn probe(&self, path: &Path) -> SegmentResult<MediaAsset> {
        probe_media(path)
    }

    fn decode(&self, asset: &MediaAsset, targets: &[u64]) -> SegmentResult<FrameStream> {
        let targets: VecDeque<u64> = targets
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if targets.is_empty() {
            return Ok(Box::new(std::iter::empty()));
        }

        let mut child = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-noautorotate", "-i"])
            .arg(&asset.path)
            .args([
                "-map",
                "0:v:0",
                "-an",
                "-sn",
                "-dn",
                "-fps_mode",
                "passthrough",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == IoErrorKind::NotFound {
                    SegmentError::io("ffmpeg", e)
                } else {
                    SegmentError::io(&asset.path, e)
                }
            })?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SegmentError::unrecoverable("無法取得 ffmpeg 輸出管線"));
        };

        let stderr_reader = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut buffer = String::new();
                let _ = stderr.read_to_string(&mut buffer);
                buffer
            })
        });

        let frame_bytes = asset.width as usize * asset.height as usize * 3;
        debug!(
            "開始串流解碼 {}：{} 個目標影格，每幀 {} bytes",
            asset.path.display(),
            targets.len(),
            frame_bytes
        );

        Ok(Box::new(FfmpegFrameStream {
            child,
            stdout: BufReader::with_capacity(frame_bytes.max(8192), stdout),
            stderr_reader,
            width: asset.width,
            height: asset.height,
            buffer: vec![0u8; frame_bytes],
            targets,
            next_index: 0,
            end_reason: None,
        }))
    }
}

struct FfmpegFrameStream {
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr_reader: Option<JoinHandle<String>>,
    width: u32,
    height: u32,
    buffer: Vec<u8>,
    targets: VecDeque<u64>,
    next_index: u64,
    /// 串流結束後剩餘目標一律回報此原因
    end_reason: Option<String>,
}

impl FfmpegFrameStream {
    fn finish(&mut self, read_error: &std::io::Error) -> String {
        let _ = self.child.wait();
        let stderr = self
            .stderr_reader
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        let stderr = stderr.trim();

        if read_error.kind() == IoErrorKind::UnexpectedEof {
            if stderr.is_empty() {
                format!("影片串流在第 {} 幀提前結束", self.next_index)
            } else {
                format!("影片串流在第 {} 幀提前結束: {stderr}", self.next_index)
            }
        } else {
            format!("讀取 ffmpeg 輸出失敗: {read_error}")
        }
    }
}

impl Iterator for FfmpegFrameStream {
    type Item = DecodedFrame;

    fn next(&mut self) -> Option<Self::Item> {
        let target = *self.targets.front()?;

        while self.end_reason.is_none() {
            if let Err(e) = self.stdout.read_exact(&mut self.buffer) {
                self.end_reason = Some(self.finish(&e));
                break;
            }

            let index = self.next_index;
            self.next_index += 1;
            if index < target {
                continue;
            }

            self.targets.pop_front();
            let image = RgbImage::from_raw(self.width, self.height, self.buffer.clone())
                .ok_or_else(|| SegmentError::decode(index, "影格大小與解析度不符"));
            return Some(DecodedFrame { index, image });
        }

        self.targets.pop_front();
        let reason = self.end_reason.clone().unwrap_or_default();
        Some(DecodedFrame {
            index: target,
            image: Err(SegmentError::decode(target, reason)),
        })
    }
}

impl Drop for FfmpegFrameStream {
    fn drop(&mut self) {
        // 已取得所有目標或提前中止時不需等 ffmpeg 解完整部影片
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
