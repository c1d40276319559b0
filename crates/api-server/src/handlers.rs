//! HTTP request handlers for API endpoints

use axum::{
    extract::{rejection::JsonRejection, Multipart, Query, State},
    http::header::CONTENT_TYPE,
    response::IntoResponse,
    Json,
};
use field_report_common::ReportDocument;
use field_report_orchestrator::{IngestionResult, TransientVideo};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::{
    auth::AuthenticatedUser,
    error::ApiError,
    types::{
        BrowseQuery, BrowseResponse, HealthResponse, ImageAddedResponse, ImageQuery,
        ImageRemovedResponse, KeyQuery, MessageResponse,
    },
    ApiState,
};

/// Multipart field carrying the site video
pub const VIDEO_FIELD: &str = "video";
/// Multipart field carrying an operator image
pub const IMAGE_FIELD: &str = "reportImage";

fn required(value: Option<String>, name: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::missing_query(name))
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Receive a site video and turn it into a report.
///
/// The video is streamed to a transient file; `customer` and `project` may
/// arrive before or after it.
pub async fn upload_video(
    State(state): State<ApiState>,
    AuthenticatedUser(user): AuthenticatedUser,
    mut multipart: Multipart,
) -> Result<Json<IngestionResult>, ApiError> {
    let mut video: Option<TransientVideo> = None;
    let mut customer = String::new();
    let mut project = String::new();

    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            VIDEO_FIELD => {
                let file_name = field.file_name().map(str::to_string);
                let staged = TransientVideo::create(state.upload_dir.as_deref(), file_name.as_deref())
                    .map_err(|e| ApiError::internal(format!("Failed to stage upload: {e}")))?;
                let mut writer = staged
                    .writer()
                    .map_err(|e| ApiError::internal(format!("Failed to stage upload: {e}")))?;

                let mut size = 0usize;
                while let Some(chunk) = field.chunk().await? {
                    size += chunk.len();
                    writer
                        .write_all(&chunk)
                        .await
                        .map_err(|e| ApiError::internal(format!("Failed to stage upload: {e}")))?;
                }
                writer
                    .flush()
                    .await
                    .map_err(|e| ApiError::internal(format!("Failed to stage upload: {e}")))?;

                if size == 0 {
                    return Err(ApiError::bad_request("Uploaded video is empty."));
                }
                debug!("User {user}: received {size} byte video {:?}", file_name);
                video = Some(staged);
            }
            "customer" => customer = field.text().await?,
            "project" => project = field.text().await?,
            other => debug!("Ignoring multipart field {other:?}"),
        }
    }

    let video = video.ok_or_else(|| {
        ApiError::bad_request("No video file uploaded. Please include a 'video' field.")
    })?;

    info!("User {user}: starting report generation");
    let result = state
        .controller
        .ingest(&user, video, &customer, &project)
        .await?;
    Ok(Json(result))
}

/// Fetch a report document
pub async fn get_report(
    State(state): State<ApiState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<KeyQuery>,
) -> Result<Json<ReportDocument>, ApiError> {
    let key = required(query.key, "key")?;
    let document = state.controller.store().get(&user, &key).await?;
    Ok(Json(document))
}

/// Overwrite a report document and refresh its viewer page
pub async fn save_report(
    State(state): State<ApiState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<KeyQuery>,
    body: Result<Json<ReportDocument>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let key = required(query.key, "key")?;
    let Json(document) =
        body.map_err(|e| ApiError::bad_request(format!("Invalid report JSON: {}", e.body_text())))?;

    state.controller.save_report(&user, &key, &document).await?;
    info!("User {user}: saved report {key}");
    Ok(Json(MessageResponse {
        message: "Report saved successfully.".to_string(),
    }))
}

/// Store an operator image and append it to the report
pub async fn add_report_image(
    State(state): State<ApiState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<KeyQuery>,
    mut multipart: Multipart,
) -> Result<Json<ImageAddedResponse>, ApiError> {
    let key = required(query.key, "key")?;

    let mut image = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await?;
        image = Some((file_name, content_type, bytes));
    }
    let (file_name, content_type, bytes) = image.ok_or_else(|| {
        ApiError::bad_request("No image file uploaded. Please include a 'reportImage' field.")
    })?;

    let added = state
        .controller
        .add_image(
            &user,
            &key,
            file_name.as_deref(),
            &bytes,
            content_type.as_deref(),
        )
        .await?;
    Ok(Json(ImageAddedResponse {
        file_name: added.file_name,
        url: added.url,
        updated_images: added.images,
    }))
}

/// Drop an image reference from the report
pub async fn delete_report_image(
    State(state): State<ApiState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<ImageQuery>,
) -> Result<Json<ImageRemovedResponse>, ApiError> {
    let key = required(query.key, "key")?;
    let file_name = required(query.file_name, "fileName")?;

    let outcome = state
        .controller
        .remove_image(&user, &key, &file_name)
        .await?;
    let message = if outcome.changed {
        "Image reference removed successfully from report."
    } else {
        "Image not found in report, no changes made."
    };
    Ok(Json(ImageRemovedResponse {
        message: message.to_string(),
        updated_images: outcome.images,
    }))
}

/// List customers, projects or report folders under the caller's prefix
pub async fn browse_reports(
    State(state): State<ApiState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<BrowseQuery>,
) -> Result<Json<BrowseResponse>, ApiError> {
    let customer = query.customer.filter(|c| !c.is_empty());
    let project = query.project.filter(|p| !p.is_empty());
    let items = state
        .controller
        .store()
        .browse(&user, customer.as_deref(), project.as_deref())
        .await?;
    Ok(Json(BrowseResponse { items }))
}

/// Serve an owned object with a content type derived from its extension
pub async fn get_asset(
    State(state): State<ApiState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<KeyQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let key = required(query.key, "key")?;
    let (bytes, content_type) = state.controller.fetch_asset(&user, &key).await?;
    Ok(([(CONTENT_TYPE, content_type)], bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_rejects_blank() {
        assert_eq!(required(Some("k".into()), "key").unwrap(), "k");
        let err = required(Some("  ".into()), "key").unwrap_err();
        assert_eq!(err.message, "Missing 'key' query parameter.");
        assert!(required(None, "fileName").is_err());
    }
}
