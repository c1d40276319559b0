//! Ingestion controller and report image operations

use crate::narrative::{GeneratedNarrative, NarrativeGenerator};
use crate::transient::TransientVideo;
use crate::viewer::{ViewerPublisher, ViewerTemplates};
use crate::{content_type_for, IngestionError, Result};
use chrono::{DateTime, Utc};
use field_report_common::{
    timestamp_label, ExtractedFrame, ImageAsset, ReportDocument, ReportMetadata,
    TimestampSelection,
};
use field_report_frames::FrameExtractor;
use field_report_storage::key_scheme::{user_prefix, FRAMES_DIR, TIMESTAMPS_FILE};
use field_report_storage::{
    check_ownership, sibling_key, AssetUrls, ImageMutation, ImageMutationOutcome, ObjectStorage,
    PutOptions, ReportDocumentStore, ReportLocation,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Parent of the per-request scratch directories (system temp dir when unset)
    pub work_dir: Option<PathBuf>,
    /// Copy the uploaded video into the report folder
    pub upload_source_video: bool,
    /// Copy `frame_timestamps.json` into the report folder
    pub upload_timestamps: bool,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            work_dir: None,
            upload_source_video: true,
            upload_timestamps: true,
        }
    }
}

/// Keys and URLs of a freshly ingested report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionResult {
    pub report_json_key: String,
    pub editor_url: String,
    pub viewer_url: String,
}

/// An operator image stored and linked into a report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedImage {
    pub file_name: String,
    pub url: String,
    pub images: Vec<ImageAsset>,
}

/// Drives report creation and the follow-up edits on existing reports
#[derive(Clone)]
pub struct IngestionController {
    store: ReportDocumentStore,
    extractor: FrameExtractor,
    generator: Arc<dyn NarrativeGenerator>,
    viewer: ViewerPublisher,
    urls: AssetUrls,
    config: IngestionConfig,
}

impl IngestionController {
    pub fn new(
        store: ReportDocumentStore,
        extractor: FrameExtractor,
        generator: Arc<dyn NarrativeGenerator>,
        urls: AssetUrls,
    ) -> Self {
        let viewer = ViewerPublisher::new(Arc::clone(store.storage()), ViewerTemplates::default());
        Self {
            store,
            extractor,
            generator,
            viewer,
            urls,
            config: IngestionConfig::default(),
        }
    }

    #[must_use]
    pub fn with_viewer(mut self, viewer: ViewerPublisher) -> Self {
        self.viewer = viewer;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: IngestionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &ReportDocumentStore {
        &self.store
    }

    pub fn urls(&self) -> &AssetUrls {
        &self.urls
    }

    fn storage(&self) -> &Arc<dyn ObjectStorage> {
        self.store.storage()
    }

    /// Build a report from `video`.
    ///
    /// The transient video is removed before this returns, whatever the outcome.
    pub async fn ingest(
        &self,
        caller: &str,
        video: TransientVideo,
        customer: &str,
        project: &str,
    ) -> Result<IngestionResult> {
        let started = Instant::now();
        let outcome = self.run_ingestion(caller, &video, customer, project).await;

        if let Err(e) = video.cleanup() {
            warn!("Failed to remove transient video: {e}");
        }

        match &outcome {
            Ok(result) => info!(
                "User {caller}: report {} ready in {:.1}s",
                result.report_json_key,
                started.elapsed().as_secs_f64()
            ),
            Err(e) => error!("User {caller}: report generation failed: {e}"),
        }
        outcome
    }

    async fn run_ingestion(
        &self,
        caller: &str,
        video: &TransientVideo,
        customer: &str,
        project: &str,
    ) -> Result<IngestionResult> {
        check_ownership(caller, &user_prefix(caller))?;

        let generated_at = Utc::now();
        let location = ReportLocation::new(caller, customer, project, generated_at);
        let report_json_key = location.report_json_key();
        let work_dir = self.create_work_dir()?;
        info!(
            "User {caller}: ingesting {} into {}",
            video.path().display(),
            location.base_key()
        );

        let GeneratedNarrative {
            timestamps,
            narrative,
            work_completed,
            issues,
            materials,
            safety_observations,
            next_steps,
            report_title,
        } = self.generator.generate(video.path()).await?;

        let frames_dir = work_dir.path().join(FRAMES_DIR);
        let extraction = self
            .extractor
            .extract_frames(video.path(), &timestamps, &frames_dir)
            .await?;
        for failed in extraction.failures() {
            warn!("Skipping frame {}: {:?}", failed.file_name, failed.status);
        }

        let images = self
            .upload_frames(&location, &timestamps, &extraction.frames)
            .await;

        let document = ReportDocument {
            metadata: ReportMetadata {
                generated_at,
                customer: location.customer.clone(),
                project: location.project.clone(),
                report_title,
                report_date: Some(generated_at.format("%Y-%m-%d").to_string()),
                prepared_by: None,
            },
            narrative,
            work_completed,
            issues,
            materials,
            safety_observations,
            next_steps,
            images,
            asset_base_url: self.urls.url_for(&location.base_key()),
            extra: serde_json::Map::new(),
        };
        self.store.put(caller, &report_json_key, &document).await?;

        if self.config.upload_timestamps {
            let reference = work_dir.path().join(TIMESTAMPS_FILE);
            self.upload_optional(&location.timestamps_key(), &reference).await;
        }
        if self.config.upload_source_video {
            let key = location.source_video_key(video.extension());
            self.upload_optional(&key, video.path()).await;
        }

        let viewer_key = self.viewer.publish_viewer(&report_json_key, &document).await?;
        let editor_key = self.viewer.publish_editor(&report_json_key, &document).await?;

        if let Err(e) = work_dir.close() {
            warn!("Failed to remove work directory: {e}");
        }

        Ok(IngestionResult {
            report_json_key,
            editor_url: self.urls.url_for(&editor_key),
            viewer_url: self.urls.url_for(&viewer_key),
        })
    }

    fn create_work_dir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("report-");
        let dir = match &self.config.work_dir {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        Ok(dir)
    }

    /// Upload frames that have a caption; a failed upload drops only that frame
    async fn upload_frames(
        &self,
        location: &ReportLocation,
        selections: &[TimestampSelection],
        frames: &[ExtractedFrame],
    ) -> Vec<ImageAsset> {
        let mut captions: HashMap<String, &str> = HashMap::new();
        for selection in selections {
            captions
                .entry(timestamp_label(selection.timestamp))
                .or_insert(selection.reason.as_str());
        }

        let mut images = Vec::with_capacity(frames.len());
        for frame in frames {
            let Some(file_name) = frame.file_name() else {
                continue;
            };
            let Some(caption) = captions.get(&timestamp_label(frame.timestamp)) else {
                warn!("No caption for frame {file_name}, skipping");
                continue;
            };

            let key = location.frame_key(file_name);
            match self
                .storage()
                .store_file_from_path(&key, &frame.file_path, PutOptions::content_type("image/jpeg"))
                .await
            {
                Ok(_) => images.push(ImageAsset {
                    file_name: file_name.to_string(),
                    caption: (*caption).to_string(),
                    url: self.urls.url_for(&key),
                }),
                Err(e) => warn!("Failed to upload frame {file_name}, skipping: {e}"),
            }
        }

        images.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        debug!("Uploaded {}/{} frames", images.len(), frames.len());
        images
    }

    async fn upload_optional(&self, key: &str, path: &Path) {
        let options = PutOptions::content_type(content_type_for(path));
        if let Err(e) = self.storage().store_file_from_path(key, path, options).await {
            warn!("Optional upload of {key} failed: {e}");
        }
    }

    /// Replace a report and refresh its viewer page.
    ///
    /// A viewer failure is logged; the document write has already succeeded.
    pub async fn save_report(
        &self,
        caller: &str,
        report_json_key: &str,
        document: &ReportDocument,
    ) -> Result<()> {
        self.store.put(caller, report_json_key, document).await?;
        if let Err(e) = self.viewer.publish_viewer(report_json_key, document).await {
            warn!("User {caller}: viewer refresh for {report_json_key} failed: {e}");
        }
        Ok(())
    }

    /// Store an operator-supplied image under `extracted_frames/` and link it
    pub async fn add_image(
        &self,
        caller: &str,
        report_json_key: &str,
        original_name: Option<&str>,
        bytes: &[u8],
        content_type: Option<&str>,
    ) -> Result<AddedImage> {
        check_ownership(caller, report_json_key)?;
        if bytes.is_empty() {
            return Err(IngestionError::InvalidUpload("image is empty".to_string()));
        }

        let file_name = upload_file_name(original_name, Utc::now());
        let image_key = sibling_key(report_json_key, &format!("{FRAMES_DIR}/{file_name}"));
        let content_type = content_type
            .filter(|ct| !ct.is_empty())
            .unwrap_or_else(|| content_type_for(&file_name));

        self.storage()
            .store_file(&image_key, bytes, PutOptions::content_type(content_type))
            .await?;
        info!("User {caller}: stored report image {image_key}");

        let url = self.urls.url_for(&image_key);
        let image = ImageAsset {
            file_name: file_name.clone(),
            caption: String::new(),
            url: url.clone(),
        };
        match self
            .store
            .mutate_images(caller, report_json_key, ImageMutation::Add(image))
            .await
        {
            Ok(outcome) => Ok(AddedImage {
                file_name,
                url,
                images: outcome.images,
            }),
            Err(e) => {
                // The image is unreachable without the document entry
                if let Err(cleanup) = self.storage().delete_file(&image_key).await {
                    warn!("Failed to remove orphaned image {image_key}: {cleanup}");
                }
                Err(e.into())
            }
        }
    }

    /// Drop an image from the report's list. The stored object is kept.
    pub async fn remove_image(
        &self,
        caller: &str,
        report_json_key: &str,
        file_name: &str,
    ) -> Result<ImageMutationOutcome> {
        let outcome = self
            .store
            .mutate_images(
                caller,
                report_json_key,
                ImageMutation::Remove {
                    file_name: file_name.to_string(),
                },
            )
            .await?;
        Ok(outcome)
    }

    /// Raw bytes of an owned object and the content type to serve it with
    pub async fn fetch_asset(&self, caller: &str, key: &str) -> Result<(Vec<u8>, &'static str)> {
        check_ownership(caller, key)?;
        let bytes = self.storage().retrieve_file(key).await?;
        Ok((bytes, content_type_for(key)))
    }
}

/// `upload_{unixMillis}-{random}{ext}` with whitespace runs replaced by `_`
#[must_use]
pub fn upload_file_name(original_name: Option<&str>, now: DateTime<Utc>) -> String {
    let ext = original_name
        .map(Path::new)
        .and_then(Path::extension)
        .and_then(|e| e.to_str())
        .filter(|e| !e.trim().is_empty())
        .map_or_else(|| ".jpg".to_string(), |e| format!(".{e}"));
    let random = uuid::Uuid::new_v4().as_u128() % 1_000_000;

    format!("upload_{}-{random}{ext}", now.timestamp_millis())
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}
