//! Narrative generation
//!
//! The component that watches the video and decides what happened on site is
//! external. It returns the report text together with the moments worth a
//! photo; this module only defines that contract and an HTTP client for it.

use crate::{IngestionError, Result};
use async_trait::async_trait;
use field_report_common::{IssueItem, MaterialItem, TimestampSelection};
use reqwest::multipart::{Form, Part};
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Report content produced for one video
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeneratedNarrative {
    /// Moments to extract frames at, in the generator's order
    pub timestamps: Vec<TimestampSelection>,
    pub narrative: String,
    pub work_completed: Vec<String>,
    pub issues: Vec<IssueItem>,
    pub materials: Vec<MaterialItem>,
    pub safety_observations: String,
    pub next_steps: Vec<String>,
    pub report_title: Option<String>,
}

#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    async fn generate(&self, video_path: &Path) -> Result<GeneratedNarrative>;
}

/// Connection settings for [`HttpNarrativeGenerator`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrativeServiceConfig {
    /// Endpoint accepting a multipart `video` upload
    pub endpoint: String,
    /// Sent as a bearer token when set
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for NarrativeServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8090/v1/narratives".to_string(),
            api_key: None,
            timeout_secs: 600,
        }
    }
}

/// Posts the video to a narrative service and decodes its JSON answer
pub struct HttpNarrativeGenerator {
    client: HttpClient,
    config: NarrativeServiceConfig,
}

impl HttpNarrativeGenerator {
    pub fn new(config: NarrativeServiceConfig) -> Result<Self> {
        if !config.endpoint.starts_with("http://") && !config.endpoint.starts_with("https://") {
            return Err(IngestionError::Generator(format!(
                "invalid narrative endpoint {}",
                config.endpoint
            )));
        }

        let client = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| IngestionError::Generator(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl NarrativeGenerator for HttpNarrativeGenerator {
    async fn generate(&self, video_path: &Path) -> Result<GeneratedNarrative> {
        let bytes = tokio::fs::read(video_path).await?;
        let file_name = video_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("video")
            .to_string();
        let mime = crate::content_type_for(video_path);

        info!(
            "Requesting narrative for {} ({} bytes) from {}",
            file_name,
            bytes.len(),
            self.config.endpoint
        );

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime)
            .map_err(|e| IngestionError::Generator(e.to_string()))?;
        let mut request = self
            .client
            .post(&self.config.endpoint)
            .multipart(Form::new().part("video", part));
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| IngestionError::Generator(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(IngestionError::Generator(format!(
                "narrative service returned {}",
                response.status()
            )));
        }

        let narrative: GeneratedNarrative = response
            .json()
            .await
            .map_err(|e| IngestionError::Generator(format!("invalid response body: {e}")))?;
        debug!("Narrative selected {} timestamps", narrative.timestamps.len());
        Ok(narrative)
    }
}
