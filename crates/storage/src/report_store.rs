//! Ownership-checked access to report documents
//!
//! The document is one JSON object per report folder; every change is a
//! whole-object replace. Read-modify-write cycles that go through the same
//! [`ReportDocumentStore`] are serialized per key. Writers in other processes
//! are not coordinated with and the last write wins.

use crate::key_scheme::{check_ownership, user_prefix};
use crate::object_storage::{ObjectStorage, PutOptions};
use crate::{StorageError, StorageResult};
use field_report_common::{ImageAsset, ReportDocument};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

const JSON_CONTENT_TYPE: &str = "application/json";

/// Change applied to a document's image list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageMutation {
    Add(ImageAsset),
    Remove { file_name: String },
}

/// Image list after a mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMutationOutcome {
    pub images: Vec<ImageAsset>,
    /// False when the mutation was a no-op and nothing was written
    pub changed: bool,
}

/// Async mutex per key, dropped again once nobody holds or waits on it
#[derive(Default)]
struct KeyLocks {
    inner: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

struct KeyGuard {
    key: String,
    table: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl KeyLocks {
    async fn lock(&self, key: &str) -> KeyGuard {
        let mutex = {
            let mut table = self
                .inner
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            Arc::clone(table.entry(key.to_string()).or_default())
        };
        let guard = mutex.lock_owned().await;
        KeyGuard {
            key: key.to_string(),
            table: Arc::clone(&self.inner),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut table = self
            .table
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        // Only the table itself still references the mutex
        if table
            .get(&self.key)
            .is_some_and(|m| Arc::strong_count(m) == 1)
        {
            table.remove(&self.key);
        }
    }
}

/// Get/put/mutate of report documents held in object storage
#[derive(Clone)]
pub struct ReportDocumentStore {
    storage: Arc<dyn ObjectStorage>,
    locks: Arc<KeyLocks>,
}

impl ReportDocumentStore {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self {
            storage,
            locks: Arc::new(KeyLocks::default()),
        }
    }

    pub fn storage(&self) -> &Arc<dyn ObjectStorage> {
        &self.storage
    }

    /// Fetch and decode the document at `key`
    pub async fn get(&self, caller: &str, key: &str) -> StorageResult<ReportDocument> {
        check_ownership(caller, key)?;
        self.read(key).await
    }

    /// Replace the document at `key`
    pub async fn put(&self, caller: &str, key: &str, document: &ReportDocument) -> StorageResult<()> {
        check_ownership(caller, key)?;
        let _guard = self.locks.lock(key).await;
        self.write(key, document).await?;
        info!(key, images = document.images.len(), "Saved report document");
        Ok(())
    }

    /// Add or remove one image and write the document back
    pub async fn mutate_images(
        &self,
        caller: &str,
        key: &str,
        mutation: ImageMutation,
    ) -> StorageResult<ImageMutationOutcome> {
        check_ownership(caller, key)?;
        let _guard = self.locks.lock(key).await;

        let mut document = self.read(key).await?;
        let changed = match mutation {
            ImageMutation::Add(image) => {
                if document.image(&image.file_name).is_some() {
                    return Err(StorageError::DuplicateImage(image.file_name));
                }
                document.images.push(image);
                true
            }
            ImageMutation::Remove { file_name } => {
                let before = document.images.len();
                document.images.retain(|img| img.file_name != file_name);
                if document.images.len() == before {
                    debug!(key, file_name = %file_name, "Image not in report, nothing to remove");
                }
                document.images.len() != before
            }
        };

        if changed {
            self.write(key, &document).await?;
            info!(key, images = document.images.len(), "Updated report images");
        }

        Ok(ImageMutationOutcome {
            images: document.images,
            changed,
        })
    }

    /// Names one level below `users/{caller}/[customer/[project/]]`.
    ///
    /// Returns customer or project or report folder names when the level has
    /// sub-folders, otherwise the JSON documents stored directly at that level.
    pub async fn browse(
        &self,
        caller: &str,
        customer: Option<&str>,
        project: Option<&str>,
    ) -> StorageResult<Vec<String>> {
        // A project without a customer does not address a level
        if customer.is_none() && project.is_some() {
            return Err(StorageError::InvalidKey(
                "project given without customer".to_string(),
            ));
        }
        let mut prefix = user_prefix(caller);
        for segment in [customer, project].into_iter().flatten() {
            if segment.is_empty() || segment.contains('/') || segment == ".." {
                return Err(StorageError::InvalidKey(segment.to_string()));
            }
            prefix.push_str(segment);
            prefix.push('/');
        }
        check_ownership(caller, &prefix)?;

        let listing = self.storage.list(&prefix, Some("/")).await?;
        let mut items: Vec<String> = if listing.common_prefixes.is_empty() {
            listing
                .keys
                .iter()
                .filter_map(|k| k.strip_prefix(prefix.as_str()))
                .filter(|name| name.ends_with(".json") && *name != "profile.json")
                .map(str::to_string)
                .collect()
        } else {
            listing
                .common_prefixes
                .iter()
                .filter_map(|p| p.strip_prefix(prefix.as_str()))
                .map(|p| p.trim_end_matches('/').to_string())
                .filter(|name| !name.is_empty())
                .collect()
        };
        items.sort();
        debug!(prefix = %prefix, count = items.len(), "Browsed reports");
        Ok(items)
    }

    async fn read(&self, key: &str) -> StorageResult<ReportDocument> {
        let bytes = self.storage.retrieve_file(key).await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::SerializationError(format!("{key}: {e}")))
    }

    async fn write(&self, key: &str, document: &ReportDocument) -> StorageResult<()> {
        let body = serde_json::to_vec_pretty(document)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        self.storage
            .store_file(key, &body, PutOptions::content_type(JSON_CONTENT_TYPE))
            .await?;
        Ok(())
    }
}
