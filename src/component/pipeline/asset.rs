use crate::error::{SegmentError, SegmentResult};
use crate::tools::{short_file_digest, short_text_digest, validate_file_exists};
use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

const VIDEO_EXTENSIONS: [&str; 10] = [
    "mp4", "mkv", "webm", "mov", "avi", "m4v", "flv", "wmv", "ts", "mpg",
];
const IMAGE_EXTENSIONS: [&str; 8] = ["png", "jpg", "jpeg", "gif", "bmp", "tif", "tiff", "webp"];
const MAX_SLUG_LENGTH: usize = 48;

static REGEX_YOUTUBE_VIDEO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^https?://(?:www\.|m\.|music\.)?(?:youtube\.com/(?:watch\?(?:[^#]*&)?v=|shorts/|embed/|live/)|youtu\.be/)([A-Za-z0-9_-]{11})",
    )
    .expect("Invalid regex")
});

static REGEX_YOUTUBE_CHANNEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(?:www\.|m\.)?youtube\.com/@([A-Za-z0-9._-]+)").expect("Invalid regex")
});

static REGEX_URL_SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://").expect("Invalid regex"));

static REGEX_SLUG_INVALID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_-]+").expect("Invalid regex"));

/// 強制指定的素材類型（批次檔 `video:`／`page:` 前綴或 `--kind`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KindHint {
    Video,
    Page,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    VideoUrl,
    VideoFile,
    PageUrl,
    ImageFile,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::VideoUrl => "video_url",
            Self::VideoFile => "video_file",
            Self::PageUrl => "page_url",
            Self::ImageFile => "image_file",
        };
        f.write_str(name)
    }
}

/// 一筆待處理的素材
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetSource {
    /// 去除前綴後的網址或本機路徑
    pub location: String,
    pub kind: AssetKind,
}

impl AssetSource {
    /// 解析輸入字串，支援 `video:`／`page:` 前綴
    pub fn parse(input: &str, hint: Option<KindHint>) -> SegmentResult<Self> {
        let trimmed = input.trim();
        let (prefix_hint, location) = split_kind_prefix(trimmed);
        let hint = hint.or(prefix_hint);
        let location = location.trim();

        if location.is_empty() {
            return Err(SegmentError::validation("輸入不可為空"));
        }

        if REGEX_URL_SCHEME.is_match(location) {
            let lower = location.to_ascii_lowercase();
            if !lower.starts_with("http://") && !lower.starts_with("https://") {
                return Err(SegmentError::validation(format!(
                    "只支援 http／https 網址: {location}"
                )));
            }
            let kind = match hint {
                Some(KindHint::Video) => AssetKind::VideoUrl,
                Some(KindHint::Page) => AssetKind::PageUrl,
                None if REGEX_YOUTUBE_VIDEO.is_match(location) => AssetKind::VideoUrl,
                None => AssetKind::PageUrl,
            };
            return Ok(Self {
                location: location.to_string(),
                kind,
            });
        }

        let path = Path::new(location);
        validate_file_exists(path)?;
        let kind = match hint {
            Some(KindHint::Video) => AssetKind::VideoFile,
            Some(KindHint::Page) => AssetKind::ImageFile,
            None => kind_from_extension(path).ok_or_else(|| {
                SegmentError::validation(format!("無法依副檔名判斷素材類型: {location}"))
            })?,
        };

        Ok(Self {
            location: location.to_string(),
            kind,
        })
    }

    /// 穩定的素材識別碼
    ///
    /// - YouTube 影片：`yt_<影片 ID>`
    /// - YouTube 頻道頁：`channel_<handle>`
    /// - 其他網址：網址 slug + 網址雜湊前 8 碼
    /// - 本機檔案：檔名 slug + 內容雜湊前 8 碼
    pub fn asset_id(&self) -> SegmentResult<String> {
        match self.kind {
            AssetKind::VideoUrl | AssetKind::PageUrl => Ok(url_asset_id(&self.location)),
            AssetKind::VideoFile | AssetKind::ImageFile => {
                let path = Path::new(&self.location);
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_default();
                Ok(format!("{}_{}", sanitize_slug(&stem), short_file_digest(path)?))
            }
        }
    }
}

impl fmt::Display for AssetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.location, self.kind)
    }
}

fn split_kind_prefix(input: &str) -> (Option<KindHint>, &str) {
    if let Some(rest) = input.strip_prefix("video:") {
        return (Some(KindHint::Video), rest);
    }
    if let Some(rest) = input.strip_prefix("page:") {
        return (Some(KindHint::Page), rest);
    }
    (None, input)
}

fn kind_from_extension(path: &Path) -> Option<AssetKind> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
        Some(AssetKind::VideoFile)
    } else if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        Some(AssetKind::ImageFile)
    } else {
        None
    }
}

#[must_use]
pub fn youtube_video_id(url: &str) -> Option<&str> {
    REGEX_YOUTUBE_VIDEO
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

#[must_use]
pub fn youtube_channel_handle(url: &str) -> Option<&str> {
    REGEX_YOUTUBE_CHANNEL
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn url_asset_id(url: &str) -> String {
    if let Some(id) = youtube_video_id(url) {
        return format!("yt_{id}");
    }
    if let Some(handle) = youtube_channel_handle(url) {
        return format!("channel_{}", sanitize_slug(handle));
    }

    let without_scheme = url
        .split_once("://")
        .map_or(url, |(_, rest)| rest)
        .trim_start_matches("www.");
    format!(
        "{}_{}",
        sanitize_slug(without_scheme),
        short_text_digest(url)
    )
}

/// 只保留英數、底線與連字號，其他字元合併為單一底線
#[must_use]
pub fn sanitize_slug(text: &str) -> String {
    let replaced = REGEX_SLUG_INVALID.replace_all(text, "_");
    let mut slug: String = replaced.trim_matches('_').chars().take(MAX_SLUG_LENGTH).collect();
    while slug.ends_with('_') {
        slug.pop();
    }
    if slug.is_empty() {
        "asset".to_string()
    } else {
        slug
    }
}
