//! Frame extractor module
//!
//! Extracts one still JPEG per selected timestamp by invoking an external
//! decoder (ffmpeg by default). Decodes run concurrently, bounded by a
//! semaphore, and each timestamp reports its own outcome so a single bad
//! timestamp never fails the batch.

use field_report_common::{
    frame_file_name, ExtractedFrame, FrameTimestamps, ProcessingError, Result, TimestampSelection,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Name of the reference file written next to the frames directory
pub const TIMESTAMPS_FILE_NAME: &str = "frame_timestamps.json";

/// Frame extractor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameExtractorConfig {
    /// Decoder executable, resolved through `PATH` when not absolute
    pub decoder_path: PathBuf,
    /// Upper bound on decoder processes running at once
    pub max_concurrent_decodes: usize,
    /// JPEG quality scale passed as `-q:v` (2 is near lossless)
    pub jpeg_quality: u8,
}

impl Default for FrameExtractorConfig {
    fn default() -> Self {
        Self {
            decoder_path: PathBuf::from("ffmpeg"),
            max_concurrent_decodes: std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(4),
            jpeg_quality: 2,
        }
    }
}

/// What happened to one requested timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum FrameStatus {
    Extracted { path: PathBuf },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameOutcome {
    pub timestamp: f64,
    pub file_name: String,
    #[serde(flatten)]
    pub status: FrameStatus,
}

impl FrameOutcome {
    #[must_use]
    pub fn is_extracted(&self) -> bool {
        matches!(self.status, FrameStatus::Extracted { .. })
    }
}

/// Frames written to disk plus one outcome per distinct requested frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameExtraction {
    pub frames: Vec<ExtractedFrame>,
    pub outcomes: Vec<FrameOutcome>,
}

impl FrameExtraction {
    pub fn failures(&self) -> impl Iterator<Item = &FrameOutcome> {
        self.outcomes.iter().filter(|o| !o.is_extracted())
    }
}

/// Extracts still frames from a video at given timestamps
#[derive(Debug, Clone)]
pub struct FrameExtractor {
    config: FrameExtractorConfig,
}

impl Default for FrameExtractor {
    fn default() -> Self {
        Self::new(FrameExtractorConfig::default())
    }
}

impl FrameExtractor {
    #[must_use]
    pub fn new(config: FrameExtractorConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &FrameExtractorConfig {
        &self.config
    }

    /// Extract frames for a list of selections.
    ///
    /// Fails with [`ProcessingError::NoTimestamps`] when `timestamps` is empty.
    /// Also writes `frame_timestamps.json` into the parent of `output_dir`.
    pub async fn extract_frames(
        &self,
        video_path: &Path,
        timestamps: &[TimestampSelection],
        output_dir: &Path,
    ) -> Result<FrameExtraction> {
        if timestamps.is_empty() {
            return Err(ProcessingError::NoTimestamps);
        }
        ensure_readable(video_path).await?;
        tokio::fs::create_dir_all(output_dir).await?;

        let reference = output_dir
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(TIMESTAMPS_FILE_NAME);
        let listing = FrameTimestamps {
            timestamps: timestamps.to_vec(),
        };
        tokio::fs::write(&reference, serde_json::to_vec_pretty(&listing)?).await?;
        debug!("Wrote timestamp reference to {}", reference.display());

        self.run(video_path, timestamps, output_dir).await
    }

    /// Extract frames for the selections listed in a `frame_timestamps.json` file.
    ///
    /// A file listing zero timestamps yields an empty result rather than an error.
    pub async fn extract_frames_from_file(
        &self,
        video_path: &Path,
        timestamps_path: &Path,
        output_dir: &Path,
    ) -> Result<FrameExtraction> {
        ensure_readable(video_path).await?;

        let raw = tokio::fs::read(timestamps_path).await?;
        let listing: FrameTimestamps =
            serde_json::from_slice(&raw).map_err(|e| ProcessingError::InvalidTimestampData {
                path: timestamps_path.to_path_buf(),
                message: e.to_string(),
            })?;

        if listing.timestamps.is_empty() {
            info!(
                "No timestamps listed in {}, nothing to extract",
                timestamps_path.display()
            );
            return Ok(FrameExtraction::default());
        }

        self.run(video_path, &listing.timestamps, output_dir).await
    }

    async fn run(
        &self,
        video_path: &Path,
        timestamps: &[TimestampSelection],
        output_dir: &Path,
    ) -> Result<FrameExtraction> {
        tokio::fs::create_dir_all(output_dir).await?;

        // Two selections rounding to the same file name would race on one output file
        let mut seen = HashSet::new();
        let unique: Vec<f64> = timestamps
            .iter()
            .map(|s| s.timestamp)
            .filter(|t| seen.insert(frame_file_name(*t)))
            .collect();

        info!(
            "Extracting {} frames from {} (max {} concurrent decodes)",
            unique.len(),
            video_path.display(),
            self.config.max_concurrent_decodes
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_decodes.max(1)));
        let mut handles = Vec::with_capacity(unique.len());

        // Handles are awaited, never aborted; dropping this future leaves decodes running
        for timestamp in &unique {
            let timestamp = *timestamp;
            let semaphore = Arc::clone(&semaphore);
            let config = self.config.clone();
            let video_path = video_path.to_path_buf();
            let output_path = output_dir.join(frame_file_name(timestamp));

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                decode_frame(&config, &video_path, timestamp, &output_path).await
            }));
        }

        let mut extraction = FrameExtraction::default();
        for (timestamp, handle) in unique.into_iter().zip(handles) {
            let file_name = frame_file_name(timestamp);
            let status = match handle.await {
                Ok(Ok(path)) => FrameStatus::Extracted { path },
                Ok(Err(reason)) => {
                    warn!("Frame at {timestamp:.2}s not extracted: {reason}");
                    FrameStatus::Failed { reason }
                }
                Err(e) => FrameStatus::Failed {
                    reason: format!("decode task failed: {e}"),
                },
            };

            if let FrameStatus::Extracted { path } = &status {
                extraction.frames.push(ExtractedFrame {
                    timestamp,
                    file_path: path.clone(),
                });
            }
            extraction.outcomes.push(FrameOutcome {
                timestamp,
                file_name,
                status,
            });
        }

        info!(
            "Extracted {}/{} frames",
            extraction.frames.len(),
            extraction.outcomes.len()
        );
        Ok(extraction)
    }
}

async fn ensure_readable(video_path: &Path) -> Result<()> {
    let not_found = |source| ProcessingError::VideoNotFound {
        path: video_path.to_path_buf(),
        source,
    };

    let file = tokio::fs::File::open(video_path).await.map_err(not_found)?;
    let metadata = file.metadata().await.map_err(not_found)?;
    if !metadata.is_file() {
        return Err(not_found(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "not a regular file",
        )));
    }
    Ok(())
}

/// Run the decoder once; `Err` carries a human-readable reason
async fn decode_frame(
    config: &FrameExtractorConfig,
    video_path: &Path,
    timestamp: f64,
    output_path: &Path,
) -> std::result::Result<PathBuf, String> {
    if !timestamp.is_finite() || timestamp < 0.0 {
        return Err(format!("invalid timestamp {timestamp}"));
    }

    // Input before -ss: decode up to the exact frame instead of the nearest keyframe
    let output = Command::new(&config.decoder_path)
        .args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
        .arg(video_path)
        .arg("-ss")
        .arg(format!("{timestamp:.6}"))
        .args(["-frames:v", "1", "-q:v"])
        .arg(config.jpeg_quality.to_string())
        .arg(output_path)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| {
            format!(
                "failed to execute {}: {e}",
                config.decoder_path.display()
            )
        })?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if !output.status.success() {
        return Err(format!("decoder exited with {}: {stderr}", output.status));
    }
    if !stderr.is_empty() {
        debug!("Decoder stderr at {timestamp:.2}s: {stderr}");
    }

    match tokio::fs::metadata(output_path).await {
        Ok(meta) if meta.len() > 0 => Ok(output_path.to_path_buf()),
        _ => Err("decoder produced no frame".to_string()),
    }
}
