//! Storage key layout for reports
//!
//! ```text
//! users/{userId}/{customer}/{project}/report_{timestamp}/
//!     daily_report.json
//!     report-viewer.html
//!     report-editor.html
//!     frame_timestamps.json
//!     source_video.{ext}
//!     extracted_frames/frame_1.50.jpg
//! ```

use crate::{StorageError, StorageResult};
use chrono::{DateTime, Utc};

pub const USERS_ROOT: &str = "users";
pub const REPORT_FOLDER_PREFIX: &str = "report_";
pub const REPORT_JSON_FILE: &str = "daily_report.json";
pub const VIEWER_FILE: &str = "report-viewer.html";
pub const EDITOR_FILE: &str = "report-editor.html";
pub const TIMESTAMPS_FILE: &str = "frame_timestamps.json";
pub const FRAMES_DIR: &str = "extracted_frames";
pub const SOURCE_VIDEO_STEM: &str = "source_video";
pub const DEFAULT_CUSTOMER: &str = "UnknownCustomer";
pub const DEFAULT_PROJECT: &str = "UnknownProject";

/// Prefix every key owned by `user_id` starts with
#[must_use]
pub fn user_prefix(user_id: &str) -> String {
    format!("{USERS_ROOT}/{user_id}/")
}

/// Reject keys outside the caller's `users/{caller}/` hierarchy.
///
/// Pure string check; callers run it before any storage access so a foreign
/// key is refused whether or not it exists.
pub fn check_ownership(caller: &str, key: &str) -> StorageResult<()> {
    let valid_caller = !caller.is_empty() && !caller.contains('/');
    if valid_caller && key.starts_with(&user_prefix(caller)) {
        Ok(())
    } else {
        Err(StorageError::Forbidden {
            caller: caller.to_string(),
            key: key.to_string(),
        })
    }
}

/// Replace the trailing file name of `key` with `file_name`
#[must_use]
pub fn sibling_key(key: &str, file_name: &str) -> String {
    match key.rfind('/') {
        Some(idx) => format!("{}/{}", &key[..idx], file_name),
        None => file_name.to_string(),
    }
}

/// Folder name for a report generated at `at`, e.g. `report_2025-01-01T12-34-56-789Z`
#[must_use]
pub fn report_folder_name(at: DateTime<Utc>) -> String {
    format!(
        "{REPORT_FOLDER_PREFIX}{}",
        at.format("%Y-%m-%dT%H-%M-%S-%3fZ")
    )
}

fn normalize_segment(value: &str, default: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        default.to_string()
    } else {
        trimmed.replace('/', "_")
    }
}

/// Location of one report folder in the bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLocation {
    pub user_id: String,
    pub customer: String,
    pub project: String,
    pub folder: String,
}

impl ReportLocation {
    pub fn new(user_id: &str, customer: &str, project: &str, generated_at: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            customer: normalize_segment(customer, DEFAULT_CUSTOMER),
            project: normalize_segment(project, DEFAULT_PROJECT),
            folder: report_folder_name(generated_at),
        }
    }

    /// Recover the location from any key inside a report folder
    pub fn parse(key: &str) -> StorageResult<Self> {
        let parts: Vec<&str> = key.splitn(6, '/').collect();
        match parts.as_slice() {
            [root, user, customer, project, folder, file]
                if *root == USERS_ROOT
                    && !user.is_empty()
                    && !customer.is_empty()
                    && !project.is_empty()
                    && folder.starts_with(REPORT_FOLDER_PREFIX)
                    && !file.is_empty() =>
            {
                Ok(Self {
                    user_id: (*user).to_string(),
                    customer: (*customer).to_string(),
                    project: (*project).to_string(),
                    folder: (*folder).to_string(),
                })
            }
            _ => Err(StorageError::InvalidKey(key.to_string())),
        }
    }

    /// `users/{user}/{customer}/{project}/{folder}`
    #[must_use]
    pub fn base_key(&self) -> String {
        format!(
            "{}{}/{}/{}",
            user_prefix(&self.user_id),
            self.customer,
            self.project,
            self.folder
        )
    }

    #[must_use]
    pub fn report_json_key(&self) -> String {
        format!("{}/{REPORT_JSON_FILE}", self.base_key())
    }

    #[must_use]
    pub fn viewer_key(&self) -> String {
        sibling_key(&self.report_json_key(), VIEWER_FILE)
    }

    #[must_use]
    pub fn editor_key(&self) -> String {
        sibling_key(&self.report_json_key(), EDITOR_FILE)
    }

    #[must_use]
    pub fn timestamps_key(&self) -> String {
        sibling_key(&self.report_json_key(), TIMESTAMPS_FILE)
    }

    /// `ext` may be given with or without the leading dot
    #[must_use]
    pub fn source_video_key(&self, ext: &str) -> String {
        let ext = ext.trim_start_matches('.');
        let name = if ext.is_empty() {
            SOURCE_VIDEO_STEM.to_string()
        } else {
            format!("{SOURCE_VIDEO_STEM}.{ext}")
        };
        sibling_key(&self.report_json_key(), &name)
    }

    /// Prefix of the frames folder, ending with `/`
    #[must_use]
    pub fn frames_prefix(&self) -> String {
        format!("{}/{FRAMES_DIR}/", self.base_key())
    }

    #[must_use]
    pub fn frame_key(&self, file_name: &str) -> String {
        format!("{}{file_name}", self.frames_prefix())
    }
}

/// Maps storage keys to URLs clients can fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetUrls {
    base_url: String,
}

impl AssetUrls {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Virtual-hosted style URL of a bucket
    pub fn for_s3_bucket(bucket: &str, region: &str) -> Self {
        Self::new(&format!("https://{bucket}.s3.{region}.amazonaws.com"))
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key.trim_start_matches('/'))
    }
}
