//! 輸出檔案命名規則

use regex::Regex;
use std::sync::LazyLock;

pub const FRAMES_DIR: &str = "frames";
pub const TILES_DIR: &str = "tiles";
pub const SOURCE_DIR: &str = "source";
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

pub const FRAME_NAME_PATTERN: &str = "timestamp_HHMMSS_frame_XXXX_time_S.Ss.jpg";
pub const FRAME_NAME_FIELDS: [(&str, &str); 3] = [
    ("HHMMSS", "取樣時間（時分秒，各兩位數）"),
    ("XXXX", "影格索引，從 0 起算，至少四位數補零"),
    ("S.Ss", "取樣時間（秒），保留一位小數"),
];

pub const TILE_NAME_PATTERN: &str = "tile_NNN_yOOOOOO.<ext>";
pub const TILE_NAME_FIELDS: [(&str, &str); 3] = [
    ("NNN", "切片索引，從 0 起算，至少三位數補零"),
    ("OOOOOO", "切片上緣在原圖中的垂直像素位置，六位數補零"),
    ("ext", "輸出格式副檔名，依原圖格式決定"),
];

static REGEX_FRAME_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^timestamp_(\d{6,})_frame_(\d{4,})_time_(\d+\.\d)s\.jpg$").expect("Invalid regex")
});

static REGEX_TILE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^tile_(\d{3,})_y(\d{6,})\.[A-Za-z0-9]+$").expect("Invalid regex")
});

/// 產生影格檔名，例如 `timestamp_000102_frame_1860_time_62.0s.jpg`
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn frame_file_name(frame_index: u64, timestamp_seconds: f64) -> String {
    let whole_seconds = timestamp_seconds.max(0.0).floor() as u64;
    let hours = whole_seconds / 3600;
    let minutes = (whole_seconds % 3600) / 60;
    let seconds = whole_seconds % 60;
    format!(
        "timestamp_{hours:02}{minutes:02}{seconds:02}_frame_{frame_index:04}_time_{timestamp_seconds:.1}s.jpg"
    )
}

/// 產生切片檔名，例如 `tile_002_y001848.png`
#[must_use]
pub fn tile_file_name(tile_index: u32, y_offset: u32, extension: &str) -> String {
    format!("tile_{tile_index:03}_y{y_offset:06}.{extension}")
}

#[must_use]
pub fn is_frame_file_name(name: &str) -> bool {
    REGEX_FRAME_NAME.is_match(name)
}

#[must_use]
pub fn is_tile_file_name(name: &str) -> bool {
    REGEX_TILE_NAME.is_match(name)
}
