//! Server configuration
//!
//! Loaded from an optional YAML file, then overridden by environment variables.

use crate::{ApiState, StaticTokenResolver, UploadLimits};
use anyhow::{Context, Result};
use field_report_frames::{FrameExtractor, FrameExtractorConfig};
use field_report_orchestrator::{
    HttpNarrativeGenerator, IngestionConfig, IngestionController, NarrativeServiceConfig,
    ViewerPublisher, ViewerTemplates,
};
use field_report_storage::{connect, ReportDocumentStore, StorageBackend, StorageConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Bearer tokens accepted by the server, mapped to user ids
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub tokens: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
    pub max_video_bytes: usize,
    pub max_image_bytes: usize,
    pub upload_dir: Option<PathBuf>,
    /// Origin the editor page calls back to; empty means same origin
    pub public_api_url: String,
    /// Overrides for `report-viewer.html` / `report-editor.html`
    pub templates_dir: Option<PathBuf>,
    pub storage: StorageConfig,
    pub frames: FrameExtractorConfig,
    pub ingestion: IngestionConfig,
    pub narrative: NarrativeServiceConfig,
    pub auth: AuthConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let limits = UploadLimits::default();
        Self {
            addr: "0.0.0.0:8080".to_string(),
            max_video_bytes: limits.max_video_bytes,
            max_image_bytes: limits.max_image_bytes,
            upload_dir: None,
            public_api_url: String::new(),
            templates_dir: None,
            storage: StorageConfig::default(),
            frames: FrameExtractorConfig::default(),
            ingestion: IngestionConfig::default(),
            narrative: NarrativeServiceConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Read `path` (defaults when `None`) and apply process environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                Self::from_yaml(&raw)
                    .with_context(|| format!("Failed to parse config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("API_SERVER_ADDR") {
            self.addr = addr;
        }
        if let Some(bucket) = lookup("AWS_S3_BUCKET") {
            self.storage.s3.bucket = bucket;
        }
        if let Some(region) = lookup("AWS_REGION") {
            self.storage.s3.region = region;
        }
        if let Some(endpoint) = lookup("AWS_ENDPOINT_URL") {
            self.storage.s3.endpoint = Some(endpoint);
        }
        if let Some(backend) = lookup("FIELD_REPORT_STORAGE_BACKEND") {
            self.storage.backend = match backend.to_ascii_lowercase().as_str() {
                "s3" => StorageBackend::S3,
                "memory" => StorageBackend::Memory,
                other => anyhow::bail!("Unknown storage backend {other:?}"),
            };
        }
        if let Some(base) = lookup("FIELD_REPORT_PUBLIC_BASE_URL") {
            self.storage.public_base_url = Some(base);
        }
        if let Some(decoder) = lookup("FIELD_REPORT_DECODER") {
            self.frames.decoder_path = PathBuf::from(decoder);
        }
        if let Some(limit) = lookup("FIELD_REPORT_MAX_CONCURRENT_DECODES") {
            self.frames.max_concurrent_decodes = limit
                .parse()
                .with_context(|| format!("Invalid FIELD_REPORT_MAX_CONCURRENT_DECODES {limit:?}"))?;
        }
        if let Some(url) = lookup("FIELD_REPORT_NARRATIVE_URL") {
            self.narrative.endpoint = url;
        }
        if let Some(key) = lookup("FIELD_REPORT_NARRATIVE_API_KEY") {
            self.narrative.api_key = Some(key).filter(|k| !k.is_empty());
        }
        if let Some(upload) = lookup("FIELD_REPORT_UPLOAD_SOURCE_VIDEO") {
            self.ingestion.upload_source_video = upload != "false";
        }
        if let Some(url) = lookup("FIELD_REPORT_PUBLIC_API_URL") {
            self.public_api_url = url;
        }
        if let Some(tokens) = lookup("FIELD_REPORT_API_TOKENS") {
            self.auth.tokens.extend(parse_tokens(&tokens)?);
        }
        Ok(())
    }

    #[must_use]
    pub fn limits(&self) -> UploadLimits {
        UploadLimits {
            max_video_bytes: self.max_video_bytes,
            max_image_bytes: self.max_image_bytes,
        }
    }
}

/// `token:user,token:user`
fn parse_tokens(raw: &str) -> Result<HashMap<String, String>> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (token, user) = pair
                .split_once(':')
                .with_context(|| format!("Token entry {pair:?} is not token:user"))?;
            Ok((token.trim().to_string(), user.trim().to_string()))
        })
        .collect()
}

/// Wire storage, extractor, generator and viewer into server state
pub async fn build_state(config: &ServerConfig) -> Result<ApiState> {
    let storage = connect(&config.storage)
        .await
        .context("Failed to connect object storage")?;
    let store = ReportDocumentStore::new(Arc::clone(&storage));
    let extractor = FrameExtractor::new(config.frames.clone());
    let generator = HttpNarrativeGenerator::new(config.narrative.clone())
        .context("Failed to create narrative client")?;

    let templates = match &config.templates_dir {
        Some(dir) => ViewerTemplates::from_dir(dir)
            .await
            .with_context(|| format!("Failed to load templates from {}", dir.display()))?,
        None => ViewerTemplates::default(),
    };
    let viewer = ViewerPublisher::new(storage, templates).with_api_base_url(&config.public_api_url);

    let controller = IngestionController::new(
        store,
        extractor,
        Arc::new(generator),
        config.storage.asset_urls(),
    )
    .with_viewer(viewer)
    .with_config(config.ingestion.clone());

    let resolver = StaticTokenResolver::new(config.auth.tokens.clone());
    if resolver.is_empty() {
        warn!("No API tokens configured; every /api request will be rejected");
    }
    info!(
        "Storage backend {:?}, decoder {}, narrative service {}",
        config.storage.backend,
        config.frames.decoder_path.display(),
        config.narrative.endpoint
    );

    Ok(ApiState::new(controller, Arc::new(resolver))
        .with_upload_dir(config.upload_dir.clone())
        .with_limits(config.limits()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CallerResolver;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_yaml_fills_missing_fields_with_defaults() {
        let config = ServerConfig::from_yaml(
            "addr: 127.0.0.1:9000\nstorage:\n  backend: memory\nauth:\n  tokens:\n    abc: u1\n",
        )
        .unwrap();
        assert_eq!(config.addr, "127.0.0.1:9000");
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.auth.tokens.get("abc").map(String::as_str), Some("u1"));
        assert_eq!(config.max_video_bytes, 200 * 1024 * 1024);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ServerConfig::default();
        config
            .apply_env(env(&[
                ("API_SERVER_ADDR", "127.0.0.1:1234"),
                ("AWS_S3_BUCKET", "site-reports"),
                ("AWS_REGION", "eu-west-1"),
                ("FIELD_REPORT_STORAGE_BACKEND", "Memory"),
                ("FIELD_REPORT_DECODER", "/opt/ffmpeg"),
                ("FIELD_REPORT_MAX_CONCURRENT_DECODES", "3"),
                ("FIELD_REPORT_API_TOKENS", "t1:u1, t2:u2"),
                ("FIELD_REPORT_NARRATIVE_API_KEY", "secret"),
                ("FIELD_REPORT_UPLOAD_SOURCE_VIDEO", "false"),
            ]))
            .unwrap();

        assert_eq!(config.addr, "127.0.0.1:1234");
        assert_eq!(config.storage.s3.bucket, "site-reports");
        assert_eq!(config.storage.s3.region, "eu-west-1");
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.frames.decoder_path, PathBuf::from("/opt/ffmpeg"));
        assert_eq!(config.frames.max_concurrent_decodes, 3);
        assert_eq!(config.auth.tokens.len(), 2);
        assert_eq!(config.auth.tokens["t2"], "u2");
        assert_eq!(config.narrative.api_key.as_deref(), Some("secret"));
        assert!(!config.ingestion.upload_source_video);
    }

    #[test]
    fn test_defaults_ignore_unset_env() {
        let mut config = ServerConfig::default();
        config.apply_env(env(&[])).unwrap();
        assert!(config.ingestion.upload_source_video);
        assert!(config.narrative.api_key.is_none());
        assert_eq!(config.addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_bad_env_values_are_errors() {
        let mut config = ServerConfig::default();
        assert!(config
            .apply_env(env(&[("FIELD_REPORT_STORAGE_BACKEND", "disk")]))
            .is_err());
        assert!(config
            .apply_env(env(&[("FIELD_REPORT_MAX_CONCURRENT_DECODES", "many")]))
            .is_err());
        assert!(config
            .apply_env(env(&[("FIELD_REPORT_API_TOKENS", "no-separator")]))
            .is_err());
    }

    #[tokio::test]
    async fn test_build_state_with_memory_backend() {
        let mut config = ServerConfig::default();
        config.storage.backend = StorageBackend::Memory;
        config.auth.tokens.insert("t".to_string(), "u1".to_string());

        let state = build_state(&config).await.unwrap();
        assert_eq!(state.limits, UploadLimits::default());
        assert_eq!(state.auth.resolve("t").await.as_deref(), Some("u1"));
    }
}
