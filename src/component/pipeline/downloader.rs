use crate::config::{DownloadFormat, DownloadOptions};
use crate::context::RunContext;
use crate::error::{SegmentError, SegmentResult};
use crate::tools::run_with_timeout;
use log::{debug, info};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

/// 下載後不視為影片本體的副檔名
const SIDE_FILE_EXTENSIONS: [&str; 8] = ["vtt", "srt", "ass", "lrc", "json", "part", "ytdl", "jpg"];

/// 下載完成的影片
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadedVideo {
    pub path: PathBuf,
    pub video_id: Option<String>,
    pub title: Option<String>,
    pub duration_seconds: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub codec: Option<String>,
}

/// 影片下載工具
pub trait Downloader: Send + Sync {
    fn download(
        &self,
        url: &str,
        destination: &Path,
        options: &DownloadOptions,
        ctx: &RunContext,
    ) -> SegmentResult<DownloadedVideo>;
}

/// yt-dlp 的 `--dump-json` 輸出中用到的欄位
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    width: Option<u32>,
    height: Option<u32>,
    vcodec: Option<String>,
}

/// 呼叫 yt-dlp 下載單一影片
#[derive(Debug, Clone)]
pub struct YtDlpDownloader {
    program: String,
    timeout: Duration,
}

impl YtDlpDownloader {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: "yt-dlp".to_string(),
            timeout,
        }
    }

    fn build_args(url: &str, destination: &Path, options: &DownloadOptions) -> Vec<String> {
        let height = options.quality.max_height();
        let mut args: Vec<String> = [
            "--no-playlist",
            "--no-simulate",
            "--dump-json",
            "--no-progress",
            "--restrict-filenames",
        ]
        .iter()
        .map(ToString::to_string)
        .collect();

        match options.format {
            DownloadFormat::Mp4 => {
                args.push("-f".to_string());
                args.push(format!(
                    "bestvideo[height<={height}][ext=mp4]+bestaudio[ext=m4a]/best[height<={height}][ext=mp4]/best[height<={height}]"
                ));
                args.push("--merge-output-format".to_string());
                args.push("mp4".to_string());
            }
            DownloadFormat::Webm => {
                args.push("-f".to_string());
                args.push(format!(
                    "bestvideo[height<={height}][ext=webm]+bestaudio[ext=webm]/best[height<={height}][ext=webm]/best[height<={height}]"
                ));
                args.push("--merge-output-format".to_string());
                args.push("webm".to_string());
            }
            DownloadFormat::Audio => {
                args.push("-f".to_string());
                args.push("bestaudio/best".to_string());
                args.push("--extract-audio".to_string());
                args.push("--audio-format".to_string());
                args.push("m4a".to_string());
            }
        }

        if let Some(language) = &options.subtitles {
            args.push("--write-subs".to_string());
            args.push("--sub-langs".to_string());
            args.push(language.clone());
        }

        args.push("-P".to_string());
        args.push(destination.display().to_string());
        args.push("-o".to_string());
        args.push("%(id)s.%(ext)s".to_string());
        args.push("--".to_string());
        args.push(url.to_string());
        args
    }
}

impl Downloader for YtDlpDownloader {
    fn download(
        &self,
        url: &str,
        destination: &Path,
        options: &DownloadOptions,
        ctx: &RunContext,
    ) -> SegmentResult<DownloadedVideo> {
        let args = Self::build_args(url, destination, options);
        debug!("{} {}", self.program, args.join(" "));
        info!("開始下載 {url}（{}，{}）", options.quality, options.format);

        let output = run_with_timeout(
            Command::new(&self.program).args(&args),
            self.timeout,
            ctx.shutdown_signal(),
        )?;

        if !output.success() {
            return Err(SegmentError::network(format!(
                "yt-dlp 下載失敗 ({}): {}",
                output.status,
                output.stderr_tail(5)
            )));
        }

        let info = parse_dump_json(&output.stdout)?;
        let path = locate_download(destination, info.id.as_deref())?;
        info!("下載完成: {}", path.display());

        Ok(DownloadedVideo {
            path,
            video_id: info.id,
            title: info.title,
            duration_seconds: info.duration,
            width: info.width,
            height: info.height,
            codec: info.vcodec.filter(|codec| codec != "none"),
        })
    }
}

/// 取 stdout 中最後一行 JSON（yt-dlp 可能在前面輸出警告）
fn parse_dump_json(stdout: &str) -> SegmentResult<YtDlpInfo> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| line.starts_with('{'))
        .ok_or_else(|| SegmentError::network("yt-dlp 沒有輸出影片資訊"))?;

    serde_json::from_str(line)
        .map_err(|e| SegmentError::network(format!("無法解析 yt-dlp 輸出: {e}")))
}

/// 在下載資料夾中找出影片本體（排除字幕等附屬檔）
fn locate_download(destination: &Path, video_id: Option<&str>) -> SegmentResult<PathBuf> {
    let entries = fs::read_dir(destination).map_err(|e| SegmentError::io(destination, e))?;

    let mut candidates: Vec<(u64, PathBuf)> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            let extension = path
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase)
                .unwrap_or_default();
            !SIDE_FILE_EXTENSIONS.contains(&extension.as_str())
        })
        .filter(|path| {
            video_id.is_none_or(|id| {
                path.file_stem()
                    .and_then(|s| s.to_str())
                    .is_some_and(|stem| stem == id)
            })
        })
        .filter_map(|path| fs::metadata(&path).ok().map(|m| (m.len(), path)))
        .collect();

    candidates.sort();
    candidates
        .pop()
        .map(|(_, path)| path)
        .ok_or_else(|| SegmentError::unreadable(destination, "找不到下載後的影片檔"))
}
