use super::tile_planner::{TilePlacement, plan_tiles};
use crate::component::metadata_recorder::MetadataRecorder;
use crate::config::TilingSettings;
use crate::context::RunContext;
use crate::error::{SegmentError, SegmentResult};
use crate::model::{ImageAsset, TileSpec};
use crate::tools::file_naming::{TILES_DIR, is_tile_file_name};
use crate::tools::{ensure_directory_exists, tile_file_name, validate_file_exists};
use image::{DynamicImage, ImageError, ImageFormat, ImageReader};
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

/// 單次切圖的結果
#[derive(Debug, Clone)]
pub struct TilingOutcome {
    pub source: ImageAsset,
    pub tiles: Vec<TileSpec>,
}

pub struct ImageTiler {
    settings: TilingSettings,
}

impl ImageTiler {
    #[must_use]
    pub const fn new(settings: TilingSettings) -> Self {
        Self { settings }
    }

    #[must_use]
    pub const fn settings(&self) -> &TilingSettings {
        &self.settings
    }

    /// 將長圖切成上下重疊的切片，輸出到 `<run_dir>/tiles/`
    pub fn tile(
        &self,
        image_path: &Path,
        run_dir: &Path,
        ctx: &RunContext,
    ) -> SegmentResult<TilingOutcome> {
        self.settings.validate()?;
        validate_file_exists(image_path)?;
        ctx.check_cancelled()?;

        let (image, detected_format) = open_image(image_path)?;
        let placements = plan_tiles(image.width(), image.height(), &self.settings)?;

        let (output_format, extension) = output_format_for(image_path);
        let source = ImageAsset {
            source: image_path.display().to_string(),
            path: image_path.to_path_buf(),
            width: image.width(),
            height: image.height(),
            format: detected_format.map_or_else(
                || "unknown".to_string(),
                |f| f.extensions_str().first().copied().unwrap_or("unknown").to_string(),
            ),
            color_type: format!("{:?}", image.color()),
        };
        info!(
            "圖片 {}：{}x{}，切成 {} 片（高度 {}，重疊 {}）",
            image_path.display(),
            source.width,
            source.height,
            placements.len(),
            self.settings.tile_height,
            self.settings.overlap
        );

        MetadataRecorder::new(run_dir).invalidate()?;
        let tiles_dir = run_dir.join(TILES_DIR);
        ensure_directory_exists(&tiles_dir)?;
        remove_stale_tiles(&tiles_dir)?;

        let mut tiles = Vec::with_capacity(placements.len());
        for placement in &placements {
            ctx.check_cancelled()?;

            let file_name = tile_file_name(placement.index, placement.y_offset, extension);
            let output_path = tiles_dir.join(&file_name);
            let tile = crop_for_format(&image, placement, output_format);
            tile.save_with_format(&output_path, output_format)
                .map_err(|e| map_write_error(&output_path, e))?;
            debug!("已輸出切片 {file_name}");

            tiles.push(TileSpec {
                source: source.source.clone(),
                tile_index: placement.index,
                y_offset: placement.y_offset,
                height: placement.height,
                width: placement.width,
                overlap_with_previous: placement.overlap_with_previous,
                path: PathBuf::from(TILES_DIR).join(file_name),
            });
        }

        info!("切圖完成：共 {} 片", tiles.len());
        Ok(TilingOutcome { source, tiles })
    }
}

fn open_image(path: &Path) -> SegmentResult<(DynamicImage, Option<ImageFormat>)> {
    let reader = ImageReader::open(path)
        .map_err(|e| SegmentError::io(path, e))?
        .with_guessed_format()
        .map_err(|e| SegmentError::io(path, e))?;
    let format = reader.format();
    let image = reader
        .decode()
        .map_err(|e| SegmentError::unreadable(path, format!("無法解碼圖片: {e}")))?;
    Ok((image, format))
}

/// 依原圖副檔名決定輸出格式，無法辨識時使用 JPEG
fn output_format_for(path: &Path) -> (ImageFormat, &'static str) {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "png" => (ImageFormat::Png, "png"),
        "gif" => (ImageFormat::Gif, "gif"),
        "bmp" => (ImageFormat::Bmp, "bmp"),
        "tif" | "tiff" => (ImageFormat::Tiff, "tiff"),
        "webp" => (ImageFormat::WebP, "webp"),
        "jpeg" => (ImageFormat::Jpeg, "jpeg"),
        _ => (ImageFormat::Jpeg, "jpg"),
    }
}

/// 裁切並轉成輸出格式可編碼的色彩型別
fn crop_for_format(
    image: &DynamicImage,
    placement: &TilePlacement,
    format: ImageFormat,
) -> DynamicImage {
    let tile = image.crop_imm(0, placement.y_offset, placement.width, placement.height);
    match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(tile.to_rgb8()),
        ImageFormat::Gif => DynamicImage::ImageRgba8(tile.to_rgba8()),
        ImageFormat::Bmp | ImageFormat::WebP => {
            if tile.color().has_alpha() {
                DynamicImage::ImageRgba8(tile.to_rgba8())
            } else {
                DynamicImage::ImageRgb8(tile.to_rgb8())
            }
        }
        _ => tile,
    }
}

fn map_write_error(path: &Path, error: ImageError) -> SegmentError {
    match error {
        ImageError::IoError(source) => SegmentError::io(path, source),
        other => SegmentError::unrecoverable(format!(
            "無法寫出切片 {}: {other}",
            path.display()
        )),
    }
}

fn remove_stale_tiles(tiles_dir: &Path) -> SegmentResult<()> {
    let entries = fs::read_dir(tiles_dir).map_err(|e| SegmentError::io(tiles_dir, e))?;
    for entry in entries {
        let path = entry.map_err(|e| SegmentError::io(tiles_dir, e))?.path();
        let is_stale = path.is_file()
            && path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(is_tile_file_name);
        if is_stale {
            fs::remove_file(&path).map_err(|e| SegmentError::io(&path, e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage};
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use tempfile::tempdir;

    fn ctx() -> RunContext {
        RunContext::new(Arc::new(AtomicBool::new(false)))
    }

    /// 每一列的紅色值等於列號，方便檢查切片位置
    fn write_gradient(path: &Path, width: u32, height: u32) {
        let image = RgbImage::from_fn(width, height, |_, y| Rgb([(y % 256) as u8, 0, 0]));
        image.save(path).unwrap();
    }

    fn tiler(tile_height: u32, tile_width: Option<u32>, overlap: u32) -> ImageTiler {
        ImageTiler::new(TilingSettings {
            tile_height,
            tile_width,
            overlap,
        })
    }

    #[test]
    fn test_tiles_written_top_to_bottom() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("page.png");
        write_gradient(&source, 40, 300);

        let outcome = tiler(100, None, 10)
            .tile(&source, &dir.path().join("run"), &ctx())
            .unwrap();

        let offsets: Vec<u32> = outcome.tiles.iter().map(|t| t.y_offset).collect();
        assert_eq!(offsets, vec![0, 90, 180, 200]);
        assert_eq!(outcome.source.height, 300);
        assert_eq!(
            outcome.tiles[3].path,
            PathBuf::from("tiles/tile_003_y000200.png")
        );

        let last = image::open(dir.path().join("run").join(&outcome.tiles[3].path)).unwrap();
        assert_eq!(last.dimensions(), (40, 100));
        assert_eq!(last.to_rgb8().get_pixel(0, 0)[0], 200);
    }

    #[test]
    fn test_short_image_is_single_tile() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("short.png");
        write_gradient(&source, 20, 50);

        let outcome = tiler(100, Some(10), 10)
            .tile(&source, dir.path(), &ctx())
            .unwrap();
        assert_eq!(outcome.tiles.len(), 1);
        assert_eq!((outcome.tiles[0].width, outcome.tiles[0].height), (20, 50));
    }

    #[test]
    fn test_unknown_extension_defaults_to_jpeg() {
        let dir = tempdir().unwrap();
        let png = dir.path().join("capture.png");
        write_gradient(&png, 16, 64);
        let source = dir.path().join("capture.dat");
        fs::rename(&png, &source).unwrap();

        let outcome = tiler(32, None, 8)
            .tile(&source, dir.path(), &ctx())
            .unwrap();
        assert!(outcome.tiles.iter().all(|t| t.path.extension().unwrap() == "jpg"));
        assert_eq!(outcome.source.format, "png");
    }

    #[test]
    fn test_rerun_with_new_geometry_drops_old_manifest() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("page.png");
        write_gradient(&source, 64, 200);
        let run_dir = dir.path().join("run");
        let ctx = ctx();

        let first = tiler(32, None, 8);
        let outcome = first.tile(&source, &run_dir, &ctx).unwrap();
        let recorder = MetadataRecorder::new(&run_dir);
        recorder
            .record_tiles("page", &outcome, first.settings(), &ctx)
            .unwrap();

        let rerun = tiler(100, None, 10).tile(&source, &run_dir, &ctx).unwrap();
        assert!(!recorder.manifest_path().exists());
        assert_eq!(rerun.tiles.len(), 3);
        let on_disk = fs::read_dir(run_dir.join(TILES_DIR)).unwrap().count();
        assert_eq!(on_disk, rerun.tiles.len());
    }

    #[test]
    fn test_corrupt_image_is_io_error() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("broken.png");
        fs::write(&source, b"not really a png").unwrap();

        let error = tiler(100, None, 10)
            .tile(&source, dir.path(), &ctx())
            .unwrap_err();
        assert_eq!(error.kind(), crate::error::ErrorKind::Io);
    }

    #[test]
    fn test_invalid_overlap_is_rejected_before_reading() {
        let dir = tempdir().unwrap();
        let error = tiler(100, None, 100)
            .tile(&dir.path().join("missing.png"), dir.path(), &ctx())
            .unwrap_err();
        assert!(matches!(error, SegmentError::Validation(_)));
        assert!(!dir.path().join(TILES_DIR).exists());
    }
}
