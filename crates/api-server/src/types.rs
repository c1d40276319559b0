//! API request and response types

use field_report_common::ImageAsset;
use serde::{Deserialize, Serialize};

/// `?key=` of the report a request addresses
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeyQuery {
    pub key: Option<String>,
}

/// `?key=&fileName=` for image removal
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageQuery {
    pub key: Option<String>,
    pub file_name: Option<String>,
}

/// Browse level: no customer lists customers, a customer lists projects,
/// both list report folders
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BrowseQuery {
    pub customer: Option<String>,
    pub project: Option<String>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAddedResponse {
    pub file_name: String,
    pub url: String,
    pub updated_images: Vec<ImageAsset>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRemovedResponse {
    pub message: String,
    pub updated_images: Vec<ImageAsset>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowseResponse {
    pub items: Vec<String>,
}
