use crate::config::TilingSettings;
use crate::error::{SegmentError, SegmentResult};

/// 單一切片在原圖中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePlacement {
    pub index: u32,
    pub y_offset: u32,
    pub width: u32,
    pub height: u32,
    pub overlap_with_previous: u32,
}

/// 計算垂直切片位置
///
/// 每片往下移動 `tile_height - overlap`，最後一片貼齊圖片底部，
/// 因此最後一片與前一片的重疊可能大於設定值。
/// 圖片高度不超過切片高度時只產生一片完整原圖。
pub fn plan_tiles(
    image_width: u32,
    image_height: u32,
    settings: &TilingSettings,
) -> SegmentResult<Vec<TilePlacement>> {
    settings.validate()?;
    if image_width == 0 || image_height == 0 {
        return Err(SegmentError::validation(format!(
            "圖片尺寸無效: {image_width}x{image_height}"
        )));
    }

    let tile_height = settings.tile_height;
    if image_height <= tile_height {
        return Ok(vec![TilePlacement {
            index: 0,
            y_offset: 0,
            width: image_width,
            height: image_height,
            overlap_with_previous: 0,
        }]);
    }

    // 指定寬度大於原圖時以原圖寬度為準
    let width = settings
        .tile_width
        .map_or(image_width, |w| w.min(image_width));
    let stride = tile_height - settings.overlap;

    let mut placements: Vec<TilePlacement> = Vec::new();
    let mut y_offset = 0u32;
    loop {
        let is_last = y_offset.saturating_add(tile_height) >= image_height;
        if is_last {
            y_offset = image_height - tile_height;
        }

        let overlap_with_previous = placements
            .last()
            .map_or(0, |prev| prev.y_offset + tile_height - y_offset);
        let index = u32::try_from(placements.len())
            .map_err(|_| SegmentError::validation("切片數量超出上限"))?;

        placements.push(TilePlacement {
            index,
            y_offset,
            width,
            height: tile_height,
            overlap_with_previous,
        });

        if is_last {
            break;
        }
        y_offset += stride;
    }

    Ok(placements)
}
