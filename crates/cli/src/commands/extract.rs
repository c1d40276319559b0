//! `extract`: decode the frames listed in a timestamps file

use anyhow::{Context as _, Result};
use clap::Args;
use field_report_frames::{FrameExtraction, FrameExtractor, FrameExtractorConfig};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Args)]
pub struct ExtractCommand {
    /// Source video
    #[arg(long)]
    pub video: PathBuf,

    /// JSON file with `{"timestamps": [{"timestamp": 1.5, "reason": "..."}]}`
    #[arg(long)]
    pub timestamps: PathBuf,

    /// Directory the frames are written to
    #[arg(long)]
    pub output_dir: PathBuf,

    /// Decoder executable
    #[arg(long, env = "FIELD_REPORT_DECODER", default_value = "ffmpeg")]
    pub decoder: PathBuf,

    /// Maximum concurrent decodes (defaults to available cores)
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

impl ExtractCommand {
    fn extractor(&self) -> FrameExtractor {
        let mut config = FrameExtractorConfig {
            decoder_path: self.decoder.clone(),
            ..FrameExtractorConfig::default()
        };
        if let Some(jobs) = self.jobs {
            config.max_concurrent_decodes = jobs.max(1);
        }
        FrameExtractor::new(config)
    }

    pub async fn execute(self) -> Result<()> {
        let extraction = self
            .extractor()
            .extract_frames_from_file(&self.video, &self.timestamps, &self.output_dir)
            .await
            .with_context(|| format!("Frame extraction from {} failed", self.video.display()))?;

        report(&extraction)?;
        Ok(())
    }
}

fn report(extraction: &FrameExtraction) -> Result<()> {
    for failed in extraction.failures() {
        warn!("Frame {} at {:.2}s failed", failed.file_name, failed.timestamp);
    }
    info!(
        "Extracted {}/{} frames",
        extraction.frames.len(),
        extraction.outcomes.len()
    );
    println!("{}", serde_json::to_string_pretty(&extraction.outcomes)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_timestamps_file_extracts_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let video = dir.path().join("walk.mp4");
        let timestamps = dir.path().join("ts.json");
        std::fs::write(&video, b"video").unwrap();
        std::fs::write(&timestamps, br#"{"timestamps": []}"#).unwrap();

        let cmd = ExtractCommand {
            video,
            timestamps,
            output_dir: dir.path().join("frames"),
            decoder: PathBuf::from("does-not-exist"),
            jobs: Some(0),
        };
        assert_eq!(cmd.extractor().config().max_concurrent_decodes, 1);
        cmd.execute().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_video_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let timestamps = dir.path().join("ts.json");
        std::fs::write(&timestamps, br#"{"timestamps": []}"#).unwrap();

        let cmd = ExtractCommand {
            video: dir.path().join("missing.mp4"),
            timestamps,
            output_dir: dir.path().join("frames"),
            decoder: PathBuf::from("ffmpeg"),
            jobs: None,
        };
        assert!(cmd.execute().await.is_err());
    }
}
