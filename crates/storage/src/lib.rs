//! Storage layer for field reports
//!
//! This crate owns everything that touches the remote object store:
//! - **Object Storage (S3/MinIO or in-memory)**: frames, report JSON, viewer pages, source videos
//! - **Key scheme**: the `users/{userId}/{customer}/{project}/report_{ts}/...` hierarchy
//! - **Report document store**: ownership-checked get/put/mutate of the report JSON
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use field_report_storage::{InMemoryObjectStorage, ObjectStorage, ReportDocumentStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let storage: Arc<dyn ObjectStorage> = Arc::new(InMemoryObjectStorage::new());
//!     let store = ReportDocumentStore::new(storage);
//!
//!     let key = "users/u1/Acme/Tower/report_2025-01-01T00-00-00-000Z/daily_report.json";
//!     match store.get("u1", key).await {
//!         Err(e) if e.is_not_found() => println!("report not created yet"),
//!         other => println!("{other:?}"),
//!     }
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub mod key_scheme;
pub mod object_storage;
pub mod report_store;

pub use key_scheme::{check_ownership, sibling_key, AssetUrls, ReportLocation};
pub use object_storage::{
    InMemoryObjectStorage, ObjectListing, ObjectStorage, PutOptions, S3Config, S3ObjectStorage,
};
pub use report_store::{ImageMutation, ImageMutationOutcome, ReportDocumentStore};

/// Storage layer errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("S3 error: {0}")]
    S3Error(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Forbidden: caller {caller} does not own key {key}")]
    Forbidden { caller: String, key: String },

    #[error("Image already present in report: {0}")]
    DuplicateImage(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl StorageError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }

    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        matches!(self, StorageError::Forbidden { .. })
    }

    /// Backend failures the caller may retry; this crate never retries on its own
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::S3Error(_) | StorageError::IoError(_))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Which object storage implementation to use
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    S3,
    Memory,
}

/// Complete storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// S3/MinIO configuration for object storage
    #[serde(default)]
    pub s3: S3Config,

    /// Base URL used when building public asset URLs.
    /// Defaults to the virtual-hosted S3 endpoint of the bucket.
    #[serde(default)]
    pub public_base_url: Option<String>,
}

impl StorageConfig {
    /// URL builder for objects in the configured bucket
    #[must_use]
    pub fn asset_urls(&self) -> AssetUrls {
        match &self.public_base_url {
            Some(base) => AssetUrls::new(base),
            None => AssetUrls::for_s3_bucket(&self.s3.bucket, &self.s3.region),
        }
    }
}

/// Build the configured object storage backend
pub async fn connect(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStorage>> {
    match config.backend {
        StorageBackend::S3 => {
            if config.s3.bucket.is_empty() {
                return Err(StorageError::InvalidConfig(
                    "S3 bucket name is empty".to_string(),
                ));
            }
            let storage = S3ObjectStorage::new(config.s3.clone()).await?;
            Ok(Arc::new(storage))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory object storage; reports are lost on restart");
            Ok(Arc::new(InMemoryObjectStorage::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_config_default() {
        let config = StorageConfig::default();
        assert_eq!(config.backend, StorageBackend::S3);
        assert_eq!(config.s3.bucket, "field-reports");
        assert!(config.public_base_url.is_none());
    }

    #[test]
    fn test_asset_urls_default_to_bucket_endpoint() {
        let config = StorageConfig::default();
        let urls = config.asset_urls();
        assert_eq!(
            urls.url_for("users/u1/a.jpg"),
            "https://field-reports.s3.us-west-2.amazonaws.com/users/u1/a.jpg"
        );
    }

    #[test]
    fn test_asset_urls_honour_public_base() {
        let config = StorageConfig {
            public_base_url: Some("http://localhost:9000/field-reports/".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.asset_urls().url_for("users/u1/a.jpg"),
            "http://localhost:9000/field-reports/users/u1/a.jpg"
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(StorageError::NotFound("k".into()).is_not_found());
        assert!(StorageError::S3Error("timeout".into()).is_transient());
        let forbidden = StorageError::Forbidden {
            caller: "u1".into(),
            key: "users/u2/x".into(),
        };
        assert!(forbidden.is_forbidden());
        assert!(!forbidden.is_transient());
    }

    #[tokio::test]
    async fn test_connect_rejects_empty_bucket() {
        let mut config = StorageConfig::default();
        config.s3.bucket.clear();
        assert!(matches!(
            connect(&config).await,
            Err(StorageError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_memory_backend() {
        let config = StorageConfig {
            backend: StorageBackend::Memory,
            ..Default::default()
        };
        let storage = connect(&config).await.unwrap();
        storage
            .store_file("k", b"v", PutOptions::default())
            .await
            .unwrap();
        assert_eq!(storage.retrieve_file("k").await.unwrap(), b"v");
    }
}
