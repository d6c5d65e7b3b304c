use crate::error::{SegmentError, SegmentResult};
use crate::model::MediaAsset;
use serde::Deserialize;
use std::io::ErrorKind as IoErrorKind;
use std::path::Path;
use std::process::Command;

#[derive(Deserialize)]
struct FfprobeOutput {
    format: Option<FormatInfo>,
    streams: Option<Vec<StreamInfo>>,
}

#[derive(Deserialize)]
struct FormatInfo {
    duration: Option<String>,
    tags: Option<FormatTags>,
}

#[derive(Deserialize)]
struct FormatTags {
    title: Option<String>,
}

#[derive(Deserialize)]
struct StreamInfo {
    codec_type: Option<String>,
    codec_name: Option<String>,
    codec_tag_string: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

/// 使用 ffprobe 取得影片資訊
///
/// 幀率或長度無法取得時回傳 0，由呼叫端決定是否為驗證錯誤
pub fn probe_media(path: &Path) -> SegmentResult<MediaAsset> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .map_err(|e| {
            if e.kind() == IoErrorKind::NotFound {
                SegmentError::io("ffprobe", e)
            } else {
                SegmentError::io(path, e)
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SegmentError::unreadable(
            path,
            format!("ffprobe 執行失敗: {}", stderr.trim()),
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_probe_output(path, &stdout)
}

fn parse_probe_output(path: &Path, json: &str) -> SegmentResult<MediaAsset> {
    let probe: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| SegmentError::unreadable(path, format!("無法解析 ffprobe 輸出: {e}")))?;

    // 找到視訊串流
    let video_stream = probe
        .streams
        .as_ref()
        .and_then(|streams| {
            streams
                .iter()
                .find(|s| s.codec_type.as_deref() == Some("video"))
        })
        .ok_or_else(|| SegmentError::unreadable(path, "找不到視訊串流"))?;

    let (Some(width), Some(height)) = (video_stream.width, video_stream.height) else {
        return Err(SegmentError::unreadable(path, "無法取得影片解析度"));
    };

    // 影片長度優先從 format 取得，其次從 stream
    let duration_seconds = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(video_stream.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    // 可變幀率的影片 r_frame_rate 可能是 0/0，改用平均幀率
    let frame_rate = video_stream
        .r_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .filter(|fps| *fps > 0.0)
        .or_else(|| {
            video_stream
                .avg_frame_rate
                .as_deref()
                .and_then(parse_frame_rate)
        })
        .unwrap_or(0.0);

    let total_frames = video_stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<u64>().ok())
        .filter(|n| *n > 0)
        .unwrap_or_else(|| estimate_frame_count(duration_seconds, frame_rate));

    let title = probe
        .format
        .and_then(|f| f.tags)
        .and_then(|t| t.title)
        .filter(|t| !t.trim().is_empty());

    Ok(MediaAsset {
        source: path.display().to_string(),
        path: path.to_path_buf(),
        width,
        height,
        frame_rate,
        total_frames,
        duration_seconds,
        codec: video_stream
            .codec_name
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        codec_tag: video_stream
            .codec_tag_string
            .clone()
            .filter(|tag| !tag.starts_with("[0]")),
        title,
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn estimate_frame_count(duration_seconds: f64, frame_rate: f64) -> u64 {
    if duration_seconds <= 0.0 || frame_rate <= 0.0 {
        return 0;
    }
    (duration_seconds * frame_rate).round() as u64
}

/// 解析幀率字串（例如 "30/1" 或 "30000/1001"）
fn parse_frame_rate(rate: &str) -> Option<f64> {
    if let Some((num_str, den_str)) = rate.split_once('/') {
        let num: f64 = num_str.parse().ok()?;
        let den: f64 = den_str.parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    rate.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const SAMPLE_OUTPUT: &str = r#"{
        "streams": [
            {"codec_type": "audio", "codec_name": "aac"},
            {
                "codec_type": "video",
                "codec_name": "h264",
                "codec_tag_string": "avc1",
                "width": 1920,
                "height": 1080,
                "r_frame_rate": "30000/1001",
                "avg_frame_rate": "30000/1001",
                "nb_frames": "300"
            }
        ],
        "format": {"duration": "10.010000", "tags": {"title": "demo clip"}}
    }"#;

    #[test]
    fn test_parse_frame_rate_fraction() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
    }

    #[test]
    fn test_parse_frame_rate_invalid() {
        assert!(parse_frame_rate("invalid").is_none());
        assert!(parse_frame_rate("0/0").is_none());
        assert!((parse_frame_rate("60").unwrap() - 60.0).abs() < 0.01);
    }

    #[test]
    fn test_parse_probe_output() {
        let asset = parse_probe_output(Path::new("/tmp/demo.mp4"), SAMPLE_OUTPUT).unwrap();
        assert_eq!(asset.width, 1920);
        assert_eq!(asset.height, 1080);
        assert_eq!(asset.total_frames, 300);
        assert_eq!(asset.codec, "h264");
        assert_eq!(asset.codec_tag.as_deref(), Some("avc1"));
        assert_eq!(asset.title.as_deref(), Some("demo clip"));
        assert!((asset.duration_seconds - 10.01).abs() < 1e-9);
    }

    #[test]
    fn test_frame_count_falls_back_to_estimate() {
        let json = r#"{
            "streams": [{"codec_type": "video", "width": 64, "height": 48,
                         "r_frame_rate": "0/0", "avg_frame_rate": "25/1"}],
            "format": {"duration": "4.0"}
        }"#;
        let asset = parse_probe_output(Path::new("a.webm"), json).unwrap();
        assert!((asset.frame_rate - 25.0).abs() < 1e-9);
        assert_eq!(asset.total_frames, 100);
        assert!(asset.codec_tag.is_none());
    }

    #[test]
    fn test_missing_video_stream_is_unreadable() {
        let json = r#"{"streams": [{"codec_type": "audio"}], "format": {"duration": "3.0"}}"#;
        let error = parse_probe_output(Path::new("song.mp3"), json).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Io);
    }
}
