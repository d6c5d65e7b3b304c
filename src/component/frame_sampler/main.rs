use super::frame_decoder::{FfmpegFrameDecoder, FrameDecoder};
use super::target_selector::{FrameTarget, select_frame_targets};
use crate::component::metadata_recorder::MetadataRecorder;
use crate::config::SamplingSettings;
use crate::context::RunContext;
use crate::error::{SegmentError, SegmentResult};
use crate::model::{FrameSample, MediaAsset};
use crate::tools::file_naming::{FRAMES_DIR, is_frame_file_name};
use crate::tools::{ensure_directory_exists, frame_file_name, validate_file_exists};
use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;
use log::{debug, info, warn};
use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// 單次影格擷取的結果
#[derive(Debug, Clone)]
pub struct SamplingOutcome {
    pub asset: MediaAsset,
    pub samples: Vec<FrameSample>,
    /// 無法解碼或編碼而略過的影格索引（遞增）
    pub skipped_frames: Vec<u64>,
}

pub struct VideoFrameSampler {
    settings: SamplingSettings,
    decoder: Box<dyn FrameDecoder>,
}

impl VideoFrameSampler {
    #[must_use]
    pub fn new(settings: SamplingSettings) -> Self {
        Self::with_decoder(settings, Box::new(FfmpegFrameDecoder))
    }

    #[must_use]
    pub fn with_decoder(settings: SamplingSettings, decoder: Box<dyn FrameDecoder>) -> Self {
        Self { settings, decoder }
    }

    #[must_use]
    pub const fn settings(&self) -> &SamplingSettings {
        &self.settings
    }

    /// 從影片擷取影格到 `<run_dir>/frames/`
    ///
    /// 驗證與探測都完成之後才會建立輸出資料夾
    pub fn sample(
        &self,
        video_path: &Path,
        run_dir: &Path,
        ctx: &RunContext,
    ) -> SegmentResult<SamplingOutcome> {
        self.settings.validate()?;
        validate_file_exists(video_path)?;
        ctx.check_cancelled()?;

        let asset = self.decoder.probe(video_path)?;
        validate_asset(&asset)?;

        let targets = select_frame_targets(
            asset.frame_rate,
            asset.total_frames,
            asset.duration_seconds,
            self.settings.interval_seconds,
        );
        info!(
            "影片 {}：{}x{} {:.3} fps，共 {} 幀 {:.2} 秒，預計擷取 {} 幀",
            video_path.display(),
            asset.width,
            asset.height,
            asset.frame_rate,
            asset.total_frames,
            asset.duration_seconds,
            targets.len()
        );

        MetadataRecorder::new(run_dir).invalidate()?;
        let frames_dir = run_dir.join(FRAMES_DIR);
        ensure_directory_exists(&frames_dir)?;
        let removed = remove_stale_frames(&frames_dir)?;
        if removed > 0 {
            info!("已移除 {removed} 個舊的影格檔案");
        }

        let result = self.extract(&asset, &targets, &frames_dir, ctx);
        let (samples, skipped_frames) = match result {
            Ok(extracted) => extracted,
            Err(e) => {
                remove_if_empty(&frames_dir);
                return Err(e);
            }
        };

        if samples.is_empty() {
            remove_if_empty(&frames_dir);
            return Err(SegmentError::unreadable(
                video_path,
                format!("{} 個目標影格皆無法解碼", targets.len()),
            ));
        }

        info!(
            "影格擷取完成：成功 {} 幀，略過 {} 幀",
            samples.len(),
            skipped_frames.len()
        );

        Ok(SamplingOutcome {
            asset,
            samples,
            skipped_frames,
        })
    }

    fn extract(
        &self,
        asset: &MediaAsset,
        targets: &[FrameTarget],
        frames_dir: &Path,
        ctx: &RunContext,
    ) -> SegmentResult<(Vec<FrameSample>, Vec<u64>)> {
        let timestamps: HashMap<u64, f64> = targets
            .iter()
            .map(|t| (t.index, t.timestamp_seconds))
            .collect();
        let indices: Vec<u64> = targets.iter().map(|t| t.index).collect();

        let mut samples = Vec::with_capacity(targets.len());
        let mut skipped = BTreeSet::new();
        let mut processed = 0u64;

        for frame in self.decoder.decode(asset, &indices)? {
            ctx.check_cancelled()?;

            let Some(&timestamp) = timestamps.get(&frame.index) else {
                debug!("忽略非目標影格 {}", frame.index);
                continue;
            };
            processed += 1;

            match frame.image {
                Ok(image) => {
                    let file_name = frame_file_name(frame.index, timestamp);
                    let output_path = frames_dir.join(&file_name);
                    if write_jpeg(&image, &output_path, self.settings.jpeg_quality)? {
                        samples.push(FrameSample {
                            frame_index: frame.index,
                            timestamp_seconds: timestamp,
                            path: PathBuf::from(FRAMES_DIR).join(file_name),
                        });
                    } else {
                        skipped.insert(frame.index);
                    }
                }
                Err(e) => {
                    warn!("略過第 {} 幀: {e}", frame.index);
                    skipped.insert(frame.index);
                }
            }

            if processed % self.settings.progress_every == 0 {
                info!("已處理 {processed}/{} 幀", targets.len());
            }
        }

        // 解碼來源沒有回傳的目標也視為略過
        let produced: BTreeSet<u64> = samples.iter().map(|s| s.frame_index).collect();
        for index in indices {
            if !produced.contains(&index) && skipped.insert(index) {
                warn!("第 {index} 幀未出現在解碼串流中，已略過");
            }
        }

        samples.sort_by_key(|s| s.frame_index);
        Ok((samples, skipped.into_iter().collect()))
    }
}

fn validate_asset(asset: &MediaAsset) -> SegmentResult<()> {
    if !asset.frame_rate.is_finite() || asset.frame_rate <= 0.0 {
        return Err(SegmentError::validation(format!(
            "影片幀率無效 ({}): {}",
            asset.frame_rate,
            asset.path.display()
        )));
    }
    if !asset.duration_seconds.is_finite() || asset.duration_seconds <= 0.0 {
        return Err(SegmentError::validation(format!(
            "影片長度無效 ({}): {}",
            asset.duration_seconds,
            asset.path.display()
        )));
    }
    if asset.total_frames == 0 {
        return Err(SegmentError::validation(format!(
            "影片沒有任何影格: {}",
            asset.path.display()
        )));
    }
    Ok(())
}

/// 寫出 JPEG；編碼失敗回傳 `Ok(false)` 讓呼叫端略過該幀
fn write_jpeg(image: &RgbImage, output_path: &Path, quality: u8) -> SegmentResult<bool> {
    let file = File::create(output_path).map_err(|e| SegmentError::io(output_path, e))?;
    let mut writer = BufWriter::new(file);

    let mut encoder = JpegEncoder::new_with_quality(&mut writer, quality);
    let encoded = encoder.encode_image(image).map_err(|e| e.to_string());
    let encoded = encoded.and_then(|()| writer.flush().map_err(|e| e.to_string()));

    match encoded {
        Ok(()) => Ok(true),
        Err(message) => {
            warn!("影格編碼失敗 {}: {message}", output_path.display());
            drop(writer);
            let _ = fs::remove_file(output_path);
            Ok(false)
        }
    }
}

/// 移除符合影格命名規則的舊檔案，其他檔案保留
fn remove_stale_frames(frames_dir: &Path) -> SegmentResult<usize> {
    let entries = fs::read_dir(frames_dir).map_err(|e| SegmentError::io(frames_dir, e))?;
    let mut removed = 0;

    for entry in entries {
        let entry = entry.map_err(|e| SegmentError::io(frames_dir, e))?;
        let path = entry.path();
        let is_stale = path.is_file()
            && path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(is_frame_file_name);
        if is_stale {
            fs::remove_file(&path).map_err(|e| SegmentError::io(&path, e))?;
            removed += 1;
        }
    }

    Ok(removed)
}

fn remove_if_empty(dir: &Path) {
    let is_empty = fs::read_dir(dir).is_ok_and(|mut entries| entries.next().is_none());
    if is_empty {
        let _ = fs::remove_dir(dir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::frame_sampler::frame_decoder::{DecodedFrame, FrameStream};
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use tempfile::tempdir;

    struct ScriptedDecoder {
        asset: MediaAsset,
        broken: Vec<u64>,
    }

    impl FrameDecoder for ScriptedDecoder {
        fn probe(&self, path: &Path) -> SegmentResult<MediaAsset> {
            Ok(MediaAsset {
                path: path.to_path_buf(),
                ..self.asset.clone()
            })
        }

        fn decode(&self, _asset: &MediaAsset, targets: &[u64]) -> SegmentResult<FrameStream> {
            let broken = self.broken.clone();
            let frames: Vec<DecodedFrame> = targets
                .iter()
                .map(|&index| DecodedFrame {
                    index,
                    image: if broken.contains(&index) {
                        Err(SegmentError::decode(index, "corrupt packet"))
                    } else {
                        Ok(RgbImage::from_pixel(8, 6, image::Rgb([10, 20, 30])))
                    },
                })
                .collect();
            Ok(Box::new(frames.into_iter()))
        }
    }

    fn asset(frame_rate: f64, total_frames: u64, duration_seconds: f64) -> MediaAsset {
        MediaAsset {
            source: "clip.mp4".to_string(),
            path: PathBuf::from("clip.mp4"),
            width: 8,
            height: 6,
            frame_rate,
            total_frames,
            duration_seconds,
            codec: "h264".to_string(),
            codec_tag: None,
            title: None,
        }
    }

    fn sampler(interval: f64, asset: MediaAsset, broken: Vec<u64>) -> VideoFrameSampler {
        let settings = SamplingSettings {
            interval_seconds: interval,
            ..SamplingSettings::default()
        };
        VideoFrameSampler::with_decoder(settings, Box::new(ScriptedDecoder { asset, broken }))
    }

    fn ctx() -> RunContext {
        RunContext::new(Arc::new(AtomicBool::new(false)))
    }

    #[test]
    fn test_samples_every_interval() {
        let dir = tempdir().unwrap();
        let video = dir.path().join("clip.mp4");
        fs::write(&video, b"fake").unwrap();
        let run_dir = dir.path().join("run");

        let outcome = sampler(2.0, asset(30.0, 300, 10.0), vec![])
            .sample(&video, &run_dir, &ctx())
            .unwrap();

        let times: Vec<f64> = outcome.samples.iter().map(|s| s.timestamp_seconds).collect();
        assert_eq!(times, vec![0.0, 2.0, 4.0, 6.0, 8.0]);
        assert!(outcome.skipped_frames.is_empty());
        for sample in &outcome.samples {
            assert!(run_dir.join(&sample.path).is_file());
        }
        assert_eq!(
            outcome.samples[1].path,
            PathBuf::from("frames/timestamp_000002_frame_0060_time_2.0s.jpg")
        );
    }

    #[test]
    fn test_corrupt_frames_are_skipped() {
        let dir = tempdir().unwrap();
        let video = dir.path().join("clip.mp4");
        fs::write(&video, b"fake").unwrap();

        let outcome = sampler(0.0, asset(10.0, 20, 2.0), vec![3, 7])
            .sample(&video, &dir.path().join("run"), &ctx())
            .unwrap();

        assert_eq!(outcome.samples.len(), 18);
        assert_eq!(outcome.skipped_frames, vec![3, 7]);
    }

    #[test]
    fn test_all_frames_broken_is_unreadable() {
        let dir = tempdir().unwrap();
        let video = dir.path().join("clip.mp4");
        fs::write(&video, b"fake").unwrap();
        let run_dir = dir.path().join("run");

        let error = sampler(0.0, asset(10.0, 2, 0.2), vec![0, 1])
            .sample(&video, &run_dir, &ctx())
            .unwrap_err();
        assert!(matches!(error, SegmentError::UnreadableMedia { .. }));
        assert!(!run_dir.join(FRAMES_DIR).exists());
    }

    #[test]
    fn test_zero_frame_rate_creates_nothing() {
        let dir = tempdir().unwrap();
        let video = dir.path().join("clip.mp4");
        fs::write(&video, b"fake").unwrap();
        let run_dir = dir.path().join("run");

        let error = sampler(1.0, asset(0.0, 100, 10.0), vec![])
            .sample(&video, &run_dir, &ctx())
            .unwrap_err();
        assert!(matches!(error, SegmentError::Validation(_)));
        assert!(!run_dir.exists());
    }

    #[test]
    fn test_missing_video_is_validation_error() {
        let dir = tempdir().unwrap();
        let error = sampler(1.0, asset(30.0, 30, 1.0), vec![])
            .sample(&dir.path().join("missing.mp4"), dir.path(), &ctx())
            .unwrap_err();
        assert!(matches!(error, SegmentError::Validation(_)));
    }

    #[test]
    fn test_rerun_removes_stale_frames_only() {
        let dir = tempdir().unwrap();
        let video = dir.path().join("clip.mp4");
        fs::write(&video, b"fake").unwrap();
        let run_dir = dir.path().join("run");
        let frames_dir = run_dir.join(FRAMES_DIR);
        fs::create_dir_all(&frames_dir).unwrap();
        let stale = frames_dir.join(frame_file_name(999, 99.9));
        fs::write(&stale, b"old").unwrap();
        let note = frames_dir.join("notes.txt");
        fs::write(&note, b"keep").unwrap();

        sampler(1.0, asset(10.0, 20, 2.0), vec![])
            .sample(&video, &run_dir, &ctx())
            .unwrap();

        assert!(!stale.exists());
        assert!(note.exists());
    }

    #[test]
    fn test_failed_rerun_leaves_no_manifest() {
        let dir = tempdir().unwrap();
        let video = dir.path().join("clip.mp4");
        fs::write(&video, b"fake").unwrap();
        let run_dir = dir.path().join("run");
        let ctx = ctx();

        let first = sampler(1.0, asset(10.0, 20, 2.0), vec![]);
        let outcome = first.sample(&video, &run_dir, &ctx).unwrap();
        let recorder = MetadataRecorder::new(&run_dir);
        recorder
            .record_frames("clip", &outcome, first.settings(), &ctx)
            .unwrap();
        assert!(recorder.manifest_path().exists());

        let error = sampler(1.0, asset(10.0, 20, 2.0), vec![0, 10])
            .sample(&video, &run_dir, &ctx)
            .unwrap_err();
        assert!(matches!(error, SegmentError::UnreadableMedia { .. }));
        assert!(!recorder.manifest_path().exists());
        assert!(outcome.samples.iter().all(|s| !run_dir.join(&s.path).exists()));
    }

    #[test]
    fn test_cancelled_run_stops() {
        let dir = tempdir().unwrap();
        let video = dir.path().join("clip.mp4");
        fs::write(&video, b"fake").unwrap();
        let ctx = RunContext::new(Arc::new(AtomicBool::new(true)));

        let error = sampler(1.0, asset(10.0, 20, 2.0), vec![])
            .sample(&video, &dir.path().join("run"), &ctx)
            .unwrap_err();
        assert!(matches!(error, SegmentError::Cancelled));
    }
}
