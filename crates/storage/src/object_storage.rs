//! Object storage implementation using S3/MinIO
//!
//! Everything a report consists of (frames, report JSON, viewer page, source
//! video) lives in one bucket. Keys passed to [`ObjectStorage`] are logical
//! keys; a configured prefix is applied on the way in and stripped on the way out.

use crate::{StorageError, StorageResult};
use aws_sdk_s3::{
    config::{BehaviorVersion, Credentials, Region},
    error::DisplayErrorContext,
    operation::{get_object::GetObjectError, head_object::HeadObjectError},
    primitives::ByteStream,
    Client,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

/// S3/MinIO configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    /// S3 bucket name
    pub bucket: String,

    /// AWS region (e.g., "us-west-2") or "us-east-1" for `MinIO`
    pub region: String,

    /// S3 endpoint (custom for `MinIO`, empty for AWS S3)
    pub endpoint: Option<String>,

    /// AWS access key ID. Empty means the default AWS credential chain.
    pub access_key_id: String,

    /// AWS secret access key
    pub secret_access_key: String,

    /// Path prefix for all objects (e.g., "staging/")
    pub prefix: String,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: "field-reports".to_string(),
            region: "us-west-2".to_string(),
            endpoint: None,
            access_key_id: std::env::var("AWS_ACCESS_KEY_ID").unwrap_or_default(),
            secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").unwrap_or_default(),
            prefix: String::new(),
        }
    }
}

/// Per-object headers applied on write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOptions {
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
}

impl PutOptions {
    pub fn content_type(content_type: impl Into<String>) -> Self {
        Self {
            content_type: Some(content_type.into()),
            cache_control: None,
        }
    }

    #[must_use]
    pub fn with_cache_control(mut self, cache_control: impl Into<String>) -> Self {
        self.cache_control = Some(cache_control.into());
        self
    }
}

/// Result of a delimited listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectListing {
    /// Object keys directly under the prefix
    pub keys: Vec<String>,
    /// "Folders" under the prefix, each ending with the delimiter
    pub common_prefixes: Vec<String>,
}

/// Object storage trait
#[async_trait::async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store a file from bytes, returns the logical key
    async fn store_file(&self, key: &str, data: &[u8], options: PutOptions)
        -> StorageResult<String>;

    /// Store a file from local path
    async fn store_file_from_path(
        &self,
        key: &str,
        path: &Path,
        options: PutOptions,
    ) -> StorageResult<String> {
        let data = tokio::fs::read(path).await?;
        self.store_file(key, &data, options).await
    }

    /// Retrieve a file as bytes
    async fn retrieve_file(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// List keys under a prefix. With a delimiter, deeper keys are folded
    /// into `common_prefixes`.
    async fn list(&self, prefix: &str, delimiter: Option<&str>) -> StorageResult<ObjectListing>;

    /// Delete a file
    async fn delete_file(&self, key: &str) -> StorageResult<()>;

    /// Check if a file exists
    async fn file_exists(&self, key: &str) -> StorageResult<bool>;
}

/// S3/MinIO object storage implementation
pub struct S3ObjectStorage {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3ObjectStorage {
    /// Create a new S3 object storage client
    pub async fn new(config: S3Config) -> StorageResult<Self> {
        let region = Region::new(config.region.clone());

        let mut s3_config_builder = if config.access_key_id.is_empty() {
            let shared = aws_config::defaults(BehaviorVersion::latest())
                .region(region)
                .load()
                .await;
            aws_sdk_s3::config::Builder::from(&shared)
        } else {
            let credentials = Credentials::new(
                &config.access_key_id,
                &config.secret_access_key,
                None,
                None,
                "field-report-storage",
            );
            aws_sdk_s3::Config::builder()
                .credentials_provider(credentials)
                .region(region)
                .behavior_version_latest()
        };

        // Set custom endpoint for MinIO
        if let Some(endpoint) = config.endpoint {
            s3_config_builder = s3_config_builder
                .endpoint_url(endpoint)
                .force_path_style(true); // Required for MinIO
        }

        let client = Client::from_conf(s3_config_builder.build());

        Ok(Self {
            client,
            bucket: config.bucket,
            prefix: config.prefix,
        })
    }

    /// Combine prefix with key
    fn full_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}", self.prefix, key)
        }
    }

    fn logical_key(&self, full_key: &str) -> String {
        full_key
            .strip_prefix(self.prefix.as_str())
            .unwrap_or(full_key)
            .to_string()
    }
}

fn s3_error(e: impl std::error::Error) -> StorageError {
    StorageError::S3Error(DisplayErrorContext(e).to_string())
}

#[async_trait::async_trait]
impl ObjectStorage for S3ObjectStorage {
    async fn store_file(
        &self,
        key: &str,
        data: &[u8],
        options: PutOptions,
    ) -> StorageResult<String> {
        let full_key = self.full_key(key);
        let byte_stream = ByteStream::from(data.to_vec());

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .body(byte_stream)
            .set_content_type(options.content_type)
            .set_cache_control(options.cache_control)
            .send()
            .await
            .map_err(s3_error)?;

        debug!(key = %full_key, bytes = data.len(), "Stored object");
        Ok(key.to_string())
    }

    async fn retrieve_file(&self, key: &str) -> StorageResult<Vec<u8>> {
        let full_key = self.full_key(key);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(GetObjectError::is_no_such_key) {
                    StorageError::NotFound(key.to_string())
                } else {
                    s3_error(e)
                }
            })?;

        let bytes = response.body.collect().await.map_err(s3_error)?;

        Ok(bytes.to_vec())
    }

    async fn list(&self, prefix: &str, delimiter: Option<&str>) -> StorageResult<ObjectListing> {
        let full_prefix = self.full_key(prefix);
        let mut listing = ObjectListing::default();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&full_prefix)
                .set_delimiter(delimiter.map(str::to_string))
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(s3_error)?;

            listing.keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|obj| obj.key())
                    .map(|k| self.logical_key(k)),
            );
            listing.common_prefixes.extend(
                response
                    .common_prefixes()
                    .iter()
                    .filter_map(|p| p.prefix())
                    .map(|p| self.logical_key(p)),
            );

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(listing)
    }

    async fn delete_file(&self, key: &str) -> StorageResult<()> {
        let full_key = self.full_key(key);

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .send()
            .await
            .map_err(s3_error)?;

        Ok(())
    }

    async fn file_exists(&self, key: &str) -> StorageResult<bool> {
        let full_key = self.full_key(key);

        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(HeadObjectError::is_not_found) => Ok(false),
            Err(e) => Err(s3_error(e)),
        }
    }
}

/// An object held by [`InMemoryObjectStorage`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
}

/// Process-local object storage for development and tests
#[derive(Debug, Default)]
pub struct InMemoryObjectStorage {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    operations: AtomicUsize,
}

impl InMemoryObjectStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of storage calls served so far
    pub fn operation_count(&self) -> usize {
        self.operations.load(Ordering::SeqCst)
    }

    /// Raw object including its headers
    pub async fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    fn record_operation(&self) {
        self.operations.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn store_file(
        &self,
        key: &str,
        data: &[u8],
        options: PutOptions,
    ) -> StorageResult<String> {
        self.record_operation();
        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                data: data.to_vec(),
                content_type: options.content_type,
                cache_control: options.cache_control,
            },
        );
        Ok(key.to_string())
    }

    async fn retrieve_file(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.record_operation();
        self.objects
            .read()
            .await
            .get(key)
            .map(|obj| obj.data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn list(&self, prefix: &str, delimiter: Option<&str>) -> StorageResult<ObjectListing> {
        self.record_operation();
        let objects = self.objects.read().await;
        let mut keys = Vec::new();
        let mut common_prefixes = BTreeSet::new();

        for key in objects.keys().filter(|k| k.starts_with(prefix)) {
            let rest = &key[prefix.len()..];
            match delimiter.and_then(|d| rest.find(d).map(|idx| idx + d.len())) {
                Some(end) => {
                    common_prefixes.insert(format!("{prefix}{}", &rest[..end]));
                }
                None => keys.push(key.clone()),
            }
        }

        Ok(ObjectListing {
            keys,
            common_prefixes: common_prefixes.into_iter().collect(),
        })
    }

    async fn delete_file(&self, key: &str) -> StorageResult<()> {
        self.record_operation();
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn file_exists(&self, key: &str) -> StorageResult<bool> {
        self.record_operation();
        Ok(self.objects.read().await.contains_key(key))
    }
}
