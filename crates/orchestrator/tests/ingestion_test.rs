//! End-to-end ingestion against in-memory storage and a stand-in decoder
#![cfg(unix)]

use async_trait::async_trait;
use field_report_common::TimestampSelection;
use field_report_frames::{FrameExtractor, FrameExtractorConfig};
use field_report_orchestrator::viewer::NO_CACHE;
use field_report_orchestrator::*;
use field_report_storage::{
    AssetUrls, InMemoryObjectStorage, ObjectStorage, ReportDocumentStore, StorageError,
};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

// Writes a stub JPEG unless asked for 3.000000
const FAKE_DECODER: &str = r#"#!/bin/sh
prev=""
ts=""
out=""
for arg in "$@"; do
  if [ "$prev" = "-ss" ]; then ts="$arg"; fi
  prev="$arg"
  out="$arg"
done
if [ "$ts" = "3.000000" ]; then exit 1; fi
printf 'JPEG' > "$out"
"#;

struct ScriptedGenerator {
    timestamps: Vec<TimestampSelection>,
    fail: bool,
}

#[async_trait]
impl NarrativeGenerator for ScriptedGenerator {
    async fn generate(&self, video_path: &Path) -> Result<GeneratedNarrative> {
        assert!(video_path.exists(), "video must exist while generating");
        if self.fail {
            return Err(IngestionError::Generator("model unavailable".to_string()));
        }
        Ok(GeneratedNarrative {
            timestamps: self.timestamps.clone(),
            narrative: "Framing continued on level 2.".to_string(),
            work_completed: vec!["Level 2 framing".to_string()],
            safety_observations: "Harnesses in use.".to_string(),
            report_title: Some("Tower daily".to_string()),
            ..Default::default()
        })
    }
}

struct Harness {
    _dir: TempDir,
    work_dir: PathBuf,
    upload_dir: PathBuf,
    storage: Arc<InMemoryObjectStorage>,
    controller: IngestionController,
}

fn harness(generator: ScriptedGenerator) -> Harness {
    let dir = TempDir::new().unwrap();
    let decoder = dir.path().join("fake-ffmpeg");
    std::fs::write(&decoder, FAKE_DECODER).unwrap();
    std::fs::set_permissions(&decoder, std::fs::Permissions::from_mode(0o755)).unwrap();

    let work_dir = dir.path().join("work");
    let upload_dir = dir.path().join("uploads");
    std::fs::create_dir_all(&upload_dir).unwrap();

    let storage = Arc::new(InMemoryObjectStorage::new());
    let store = ReportDocumentStore::new(storage.clone());
    let extractor = FrameExtractor::new(FrameExtractorConfig {
        decoder_path: decoder,
        max_concurrent_decodes: 2,
        jpeg_quality: 2,
    });
    let controller = IngestionController::new(
        store,
        extractor,
        Arc::new(generator),
        AssetUrls::new("https://assets.example"),
    )
    .with_config(IngestionConfig {
        work_dir: Some(work_dir.clone()),
        upload_source_video: true,
        upload_timestamps: true,
    });

    Harness {
        _dir: dir,
        work_dir,
        upload_dir,
        storage,
        controller,
    }
}

fn selections() -> Vec<TimestampSelection> {
    vec![
        TimestampSelection::new(3.0, "crane lift"),
        TimestampSelection::new(1.5, "slab pour"),
        TimestampSelection::new(4.25, "rebar stack"),
    ]
}

async fn upload(h: &Harness) -> TransientVideo {
    TransientVideo::from_bytes(Some(&h.upload_dir), Some("walk.mov"), b"video bytes")
        .await
        .unwrap()
}

fn dir_is_empty(path: &Path) -> bool {
    std::fs::read_dir(path).map_or(true, |mut d| d.next().is_none())
}

#[tokio::test]
async fn test_ingest_builds_report() {
    let h = harness(ScriptedGenerator {
        timestamps: selections(),
        fail: false,
    });
    let video = upload(&h).await;
    let video_path = video.path().to_path_buf();

    let result = h
        .controller
        .ingest("u1", video, "Acme", "")
        .await
        .unwrap();

    let location = field_report_storage::ReportLocation::parse(&result.report_json_key).unwrap();
    assert_eq!(location.user_id, "u1");
    assert_eq!(location.customer, "Acme");
    assert_eq!(location.project, "UnknownProject");
    assert_eq!(
        result.viewer_url,
        format!("https://assets.example/{}", location.viewer_key())
    );
    assert_eq!(
        result.editor_url,
        format!("https://assets.example/{}", location.editor_key())
    );

    let doc = h
        .controller
        .store()
        .get("u1", &result.report_json_key)
        .await
        .unwrap();
    // Failed frame at 3.00 is skipped, the rest are sorted by file name
    let names: Vec<&str> = doc.images.iter().map(|i| i.file_name.as_str()).collect();
    assert_eq!(names, vec!["frame_1.50.jpg", "frame_4.25.jpg"]);
    assert_eq!(doc.images[0].caption, "slab pour");
    assert_eq!(
        doc.images[0].url,
        format!(
            "https://assets.example/{}",
            location.frame_key("frame_1.50.jpg")
        )
    );
    assert_eq!(doc.metadata.report_title.as_deref(), Some("Tower daily"));

    for key in [
        location.frame_key("frame_1.50.jpg"),
        location.timestamps_key(),
        location.source_video_key("mov"),
    ] {
        assert!(h.storage.file_exists(&key).await.unwrap(), "{key}");
    }
    let viewer = h.storage.object(&location.viewer_key()).await.unwrap();
    assert_eq!(viewer.cache_control.as_deref(), Some(NO_CACHE));
    assert!(String::from_utf8(viewer.data).unwrap().contains("Framing continued"));

    assert!(!video_path.exists());
    assert!(dir_is_empty(&h.work_dir));
}

#[tokio::test]
async fn test_failed_generation_still_cleans_up() {
    let h = harness(ScriptedGenerator {
        timestamps: selections(),
        fail: true,
    });
    let video = upload(&h).await;
    let video_path = video.path().to_path_buf();

    let err = h
        .controller
        .ingest("u1", video, "Acme", "Tower")
        .await
        .unwrap_err();
    assert!(matches!(err, IngestionError::Generator(_)));

    assert!(!video_path.exists());
    assert!(dir_is_empty(&h.work_dir));
    assert!(h.storage.is_empty().await);
}

#[tokio::test]
async fn test_no_selected_moments_fails() {
    let h = harness(ScriptedGenerator {
        timestamps: vec![],
        fail: false,
    });
    let video = upload(&h).await;

    let err = h
        .controller
        .ingest("u1", video, "Acme", "Tower")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IngestionError::Processing(field_report_common::ProcessingError::NoTimestamps)
    ));
    assert!(dir_is_empty(&h.upload_dir));
}

#[tokio::test]
async fn test_operator_images() {
    let h = harness(ScriptedGenerator {
        timestamps: vec![TimestampSelection::new(1.0, "a")],
        fail: false,
    });
    let video = upload(&h).await;
    let key = h
        .controller
        .ingest("u1", video, "Acme", "Tower")
        .await
        .unwrap()
        .report_json_key;

    let added = h
        .controller
        .add_image("u1", &key, Some("crack detail.jpg"), b"img", Some("image/jpeg"))
        .await
        .unwrap();
    assert!(added.file_name.starts_with("upload_"));
    assert!(added.file_name.ends_with(".jpg"));
    assert_eq!(added.images.len(), 2);
    assert_eq!(added.images[1].caption, "");

    let removed = h
        .controller
        .remove_image("u1", &key, "frame_1.00.jpg")
        .await
        .unwrap();
    assert!(removed.changed);
    assert_eq!(removed.images.len(), 1);
    assert_eq!(removed.images[0].file_name, added.file_name);

    let untouched = h
        .controller
        .remove_image("u1", &key, "not-there.jpg")
        .await
        .unwrap();
    assert!(!untouched.changed);
    assert_eq!(untouched.images, removed.images);

    let (bytes, content_type) = h
        .controller
        .fetch_asset("u1", &added.url.replace("https://assets.example/", ""))
        .await
        .unwrap();
    assert_eq!(bytes, b"img");
    assert_eq!(content_type, "image/jpeg");
}

#[tokio::test]
async fn test_add_image_to_missing_report_leaves_no_orphan() {
    let h = harness(ScriptedGenerator {
        timestamps: vec![],
        fail: false,
    });
    let key = "users/u1/Acme/Tower/report_missing/daily_report.json";

    let err = h
        .controller
        .add_image("u1", key, Some("a.png"), b"img", None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IngestionError::Storage(StorageError::NotFound(_))
    ));
    assert!(h.storage.is_empty().await);
}

#[tokio::test]
async fn test_foreign_keys_are_rejected_before_io() {
    let h = harness(ScriptedGenerator {
        timestamps: vec![],
        fail: false,
    });
    let foreign = "users/u2/Acme/Tower/report_x/daily_report.json";

    let err = h
        .controller
        .add_image("u1", foreign, Some("a.png"), b"img", None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IngestionError::Storage(StorageError::Forbidden { .. })
    ));
    assert!(h.controller.fetch_asset("u1", foreign).await.is_err());
    assert!(h
        .controller
        .remove_image("u1", foreign, "a.png")
        .await
        .is_err());
    assert_eq!(h.storage.operation_count(), 0);
}
