use super::manifest::{
    BOUNDARY_POLICY, ExtractionManifest, ExtractionSettings, MANIFEST_VERSION, NamingConvention,
    ProducedFile, SourceDescriptor,
};
use crate::component::frame_sampler::SamplingOutcome;
use crate::component::image_tiler::TilingOutcome;
use crate::config::{SamplingSettings, TilingSettings};
use crate::context::RunContext;
use crate::error::{SegmentError, SegmentResult};
use crate::tools::calculate_file_hash;
use crate::tools::file_naming::{
    FRAMES_DIR, MANIFEST_FILE_NAME, TILES_DIR, is_frame_file_name, is_tile_file_name,
};
use chrono::Local;
use log::{info, warn};
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;
use walkdir::WalkDir;

/// manifest 與實際檔案的比對結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationReport {
    pub checked: usize,
    pub missing: Vec<PathBuf>,
    pub empty: Vec<PathBuf>,
    pub corrupted: Vec<PathBuf>,
    /// 符合命名規則但未列在 manifest 中的檔案
    pub unlisted: Vec<PathBuf>,
}

impl VerificationReport {
    /// 所有列出的檔案都存在、非空且雜湊相符
    #[must_use]
    pub fn is_intact(&self) -> bool {
        self.missing.is_empty() && self.empty.is_empty() && self.corrupted.is_empty()
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.is_intact() && self.unlisted.is_empty()
    }
}

/// 負責單一執行目錄的 manifest.json
pub struct MetadataRecorder {
    run_dir: PathBuf,
}

impl MetadataRecorder {
    #[must_use]
    pub fn new(run_dir: &Path) -> Self {
        Self {
            run_dir: run_dir.to_path_buf(),
        }
    }

    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.run_dir.join(MANIFEST_FILE_NAME)
    }

    pub fn record_frames(
        &self,
        asset_id: &str,
        outcome: &SamplingOutcome,
        settings: &SamplingSettings,
        ctx: &RunContext,
    ) -> SegmentResult<ExtractionManifest> {
        let files = outcome
            .samples
            .par_iter()
            .map(|sample| -> SegmentResult<ProducedFile> {
                let (bytes, blake3) = self.describe_file(&sample.path)?;
                Ok(ProducedFile::Frame {
                    path: sample.path.clone(),
                    frame_index: sample.frame_index,
                    timestamp_seconds: sample.timestamp_seconds,
                    bytes,
                    blake3,
                })
            })
            .collect::<SegmentResult<Vec<_>>>()?;

        let manifest = ExtractionManifest {
            version: MANIFEST_VERSION,
            asset_id: asset_id.to_string(),
            source: SourceDescriptor::Video(outcome.asset.clone()),
            settings: ExtractionSettings::Frames {
                interval_seconds: settings.interval_seconds,
                boundary_policy: BOUNDARY_POLICY.to_string(),
                jpeg_quality: settings.jpeg_quality,
            },
            naming_convention: NamingConvention::frames(),
            files,
            skipped_frames: outcome.skipped_frames.clone(),
            processed_at: Local::now(),
        };

        self.write(&manifest, ctx)?;
        Ok(manifest)
    }

    pub fn record_tiles(
        &self,
        asset_id: &str,
        outcome: &TilingOutcome,
        settings: &TilingSettings,
        ctx: &RunContext,
    ) -> SegmentResult<ExtractionManifest> {
        let files = outcome
            .tiles
            .par_iter()
            .map(|tile| -> SegmentResult<ProducedFile> {
                let (bytes, blake3) = self.describe_file(&tile.path)?;
                Ok(ProducedFile::Tile {
                    path: tile.path.clone(),
                    tile_index: tile.tile_index,
                    y_offset: tile.y_offset,
                    width: tile.width,
                    height: tile.height,
                    overlap_with_previous: tile.overlap_with_previous,
                    bytes,
                    blake3,
                })
            })
            .collect::<SegmentResult<Vec<_>>>()?;

        let tile_width = outcome
            .tiles
            .first()
            .map_or(outcome.source.width, |tile| tile.width);

        let manifest = ExtractionManifest {
            version: MANIFEST_VERSION,
            asset_id: asset_id.to_string(),
            source: SourceDescriptor::Image(outcome.source.clone()),
            settings: ExtractionSettings::Tiles {
                tile_height: settings.tile_height,
                tile_width,
                overlap: settings.overlap,
            },
            naming_convention: NamingConvention::tiles(),
            files,
            skipped_frames: Vec::new(),
            processed_at: Local::now(),
        };

        self.write(&manifest, ctx)?;
        Ok(manifest)
    }

    /// 移除既有的 manifest.json，回傳是否真的有檔案被移除
    ///
    /// 在刪除或覆寫執行目錄中的產出之前呼叫，避免 manifest 列出已不存在的檔案
    pub fn invalidate(&self) -> SegmentResult<bool> {
        let path = self.manifest_path();
        match fs::remove_file(&path) {
            Ok(()) => {
                info!("已移除舊的 {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SegmentError::io(&path, e)),
        }
    }

    /// 先寫入同目錄的暫存檔並 fsync，再以 rename 取代 manifest.json
    pub fn write(&self, manifest: &ExtractionManifest, ctx: &RunContext) -> SegmentResult<PathBuf> {
        ctx.check_cancelled()?;

        let content = serde_json::to_string_pretty(manifest)
            .map_err(|e| SegmentError::unrecoverable(format!("無法序列化 manifest: {e}")))?;

        let target = self.manifest_path();
        let temp_path = self
            .run_dir
            .join(format!(".{MANIFEST_FILE_NAME}.{}.tmp", Uuid::new_v4()));

        let written = write_and_sync(&temp_path, content.as_bytes())
            .and_then(|()| fs::rename(&temp_path, &target).map_err(|e| SegmentError::io(&target, e)));
        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }

        info!(
            "已寫入 {}（{} 個檔案）",
            target.display(),
            manifest.files.len()
        );
        Ok(target)
    }

    pub fn load(&self) -> SegmentResult<ExtractionManifest> {
        let path = self.manifest_path();
        let content = fs::read_to_string(&path).map_err(|e| SegmentError::io(&path, e))?;
        serde_json::from_str(&content).map_err(|e| {
            SegmentError::validation(format!("manifest 格式錯誤 {}: {e}", path.display()))
        })
    }

    /// 比對 manifest 與執行目錄中的實際檔案
    pub fn verify(&self) -> SegmentResult<VerificationReport> {
        let manifest = self.load()?;

        let results: Vec<(PathBuf, FileCheck)> = manifest
            .files
            .par_iter()
            .map(|file| (file.path().to_path_buf(), self.check_file(file)))
            .collect();

        let mut report = VerificationReport {
            checked: results.len(),
            ..VerificationReport::default()
        };
        for (path, check) in results {
            match check {
                FileCheck::Ok => {}
                FileCheck::Missing => report.missing.push(path),
                FileCheck::Empty => report.empty.push(path),
                FileCheck::Corrupted => report.corrupted.push(path),
            }
        }

        let listed: HashSet<&Path> = manifest.files.iter().map(ProducedFile::path).collect();
        for relative in self.produced_files_on_disk() {
            if !listed.contains(relative.as_path()) {
                report.unlisted.push(relative);
            }
        }
        report.unlisted.sort();

        if !report.is_clean() {
            warn!(
                "manifest 驗證失敗 {}：缺少 {}、空檔 {}、雜湊不符 {}、未列出 {}",
                self.run_dir.display(),
                report.missing.len(),
                report.empty.len(),
                report.corrupted.len(),
                report.unlisted.len()
            );
        }

        Ok(report)
    }

    fn describe_file(&self, relative: &Path) -> SegmentResult<(u64, String)> {
        let path = self.run_dir.join(relative);
        let metadata = fs::metadata(&path).map_err(|e| SegmentError::io(&path, e))?;
        let blake3 = calculate_file_hash(&path)?;
        Ok((metadata.len(), blake3))
    }

    fn check_file(&self, file: &ProducedFile) -> FileCheck {
        let path = self.run_dir.join(file.path());
        let Ok(metadata) = fs::metadata(&path) else {
            return FileCheck::Missing;
        };
        if metadata.len() == 0 {
            return FileCheck::Empty;
        }
        match calculate_file_hash(&path) {
            Ok(hash) if hash == file.blake3() && metadata.len() == file.bytes() => FileCheck::Ok,
            Ok(_) => FileCheck::Corrupted,
            Err(_) => FileCheck::Missing,
        }
    }

    /// 列出 frames/ 與 tiles/ 中符合命名規則的檔案（相對路徑）
    fn produced_files_on_disk(&self) -> Vec<PathBuf> {
        let mut found = Vec::new();
        for (dir_name, matches_convention) in [
            (FRAMES_DIR, is_frame_file_name as fn(&str) -> bool),
            (TILES_DIR, is_tile_file_name as fn(&str) -> bool),
        ] {
            let dir = self.run_dir.join(dir_name);
            if !dir.is_dir() {
                continue;
            }
            for entry in WalkDir::new(&dir)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
            {
                let name = entry.file_name().to_string_lossy();
                if matches_convention(&name) {
                    found.push(PathBuf::from(dir_name).join(name.as_ref()));
                }
            }
        }
        found
    }
}

enum FileCheck {
    Ok,
    Missing,
    Empty,
    Corrupted,
}

fn write_and_sync(path: &Path, content: &[u8]) -> SegmentResult<()> {
    let mut file = File::create(path).map_err(|e| SegmentError::io(path, e))?;
    file.write_all(content)
        .map_err(|e| SegmentError::io(path, e))?;
    file.sync_all().map_err(|e| SegmentError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FrameSample, MediaAsset};
    use crate::tools::frame_file_name;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use tempfile::tempdir;

    fn ctx() -> RunContext {
        RunContext::new(Arc::new(AtomicBool::new(false)))
    }

    fn outcome_with_files(run_dir: &Path, count: u64) -> SamplingOutcome {
        fs::create_dir_all(run_dir.join(FRAMES_DIR)).unwrap();
        let samples = (0..count)
            .map(|i| {
                let path = PathBuf::from(FRAMES_DIR).join(frame_file_name(i * 30, i as f64));
                fs::write(run_dir.join(&path), format!("frame {i}")).unwrap();
                FrameSample {
                    frame_index: i * 30,
                    timestamp_seconds: i as f64,
                    path,
                }
            })
            .collect();

        SamplingOutcome {
            asset: MediaAsset {
                source: "clip.mp4".to_string(),
                path: PathBuf::from("clip.mp4"),
                width: 8,
                height: 8,
                frame_rate: 30.0,
                total_frames: 300,
                duration_seconds: 10.0,
                codec: "h264".to_string(),
                codec_tag: Some("avc1".to_string()),
                title: Some("demo".to_string()),
            },
            samples,
            skipped_frames: vec![90],
        }
    }

    #[test]
    fn test_record_and_load() {
        let dir = tempdir().unwrap();
        let recorder = MetadataRecorder::new(dir.path());
        let outcome = outcome_with_files(dir.path(), 3);

        let written = recorder
            .record_frames("clip_1234abcd", &outcome, &SamplingSettings::default(), &ctx())
            .unwrap();
        let loaded = recorder.load().unwrap();

        assert_eq!(loaded, written);
        assert_eq!(loaded.files.len(), 3);
        assert_eq!(loaded.skipped_frames, vec![90]);
        assert_eq!(loaded.files[1].bytes(), "frame 1".len() as u64);
        assert!(matches!(loaded.source, SourceDescriptor::Video(_)));
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempdir().unwrap();
        let recorder = MetadataRecorder::new(dir.path());
        let outcome = outcome_with_files(dir.path(), 2);
        let settings = SamplingSettings::default();

        recorder.record_frames("a", &outcome, &settings, &ctx()).unwrap();
        recorder.record_frames("a", &outcome, &settings, &ctx()).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
        assert!(recorder.manifest_path().is_file());
    }

    #[test]
    fn test_verify_detects_problems() {
        let dir = tempdir().unwrap();
        let recorder = MetadataRecorder::new(dir.path());
        let outcome = outcome_with_files(dir.path(), 4);
        recorder
            .record_frames("a", &outcome, &SamplingSettings::default(), &ctx())
            .unwrap();

        let report = recorder.verify().unwrap();
        assert!(report.is_clean());
        assert_eq!(report.checked, 4);

        fs::remove_file(dir.path().join(&outcome.samples[0].path)).unwrap();
        fs::write(dir.path().join(&outcome.samples[1].path), b"").unwrap();
        fs::write(dir.path().join(&outcome.samples[2].path), b"tampered").unwrap();
        let extra = PathBuf::from(FRAMES_DIR).join(frame_file_name(5000, 166.7));
        fs::write(dir.path().join(&extra), b"extra").unwrap();

        let report = recorder.verify().unwrap();
        assert!(!report.is_intact());
        assert_eq!(report.missing, vec![outcome.samples[0].path.clone()]);
        assert_eq!(report.empty, vec![outcome.samples[1].path.clone()]);
        assert_eq!(report.corrupted, vec![outcome.samples[2].path.clone()]);
        assert_eq!(report.unlisted, vec![extra]);
    }

    #[test]
    fn test_load_missing_manifest_is_io_error() {
        let dir = tempdir().unwrap();
        let error = MetadataRecorder::new(dir.path()).load().unwrap_err();
        assert!(matches!(error, SegmentError::Io { .. }));
    }
}
