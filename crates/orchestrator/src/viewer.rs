//! Static viewer and editor pages stored next to each report
//!
//! Templates carry placeholders that are filled once per upload:
//! `{{REPORT_DATA_JSON}}`, `{{LOGO_URL}}`, `{{REPORT_JSON_KEY}}` and `{{API_BASE_URL}}`.
//! The two JSON placeholders are replaced by JSON literals (the key as a quoted string).

use crate::Result;
use field_report_common::ReportDocument;
use field_report_storage::key_scheme::{EDITOR_FILE, VIEWER_FILE};
use field_report_storage::{sibling_key, ObjectStorage, PutOptions};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

const BUILTIN_VIEWER: &str = include_str!("../templates/report-viewer.html");
const BUILTIN_EDITOR: &str = include_str!("../templates/report-editor.html");

/// Pages must never be served stale after a report edit
pub const NO_CACHE: &str = "no-cache, no-store, must-revalidate";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerTemplates {
    pub viewer: String,
    pub editor: String,
}

impl Default for ViewerTemplates {
    fn default() -> Self {
        Self {
            viewer: BUILTIN_VIEWER.to_string(),
            editor: BUILTIN_EDITOR.to_string(),
        }
    }
}

impl ViewerTemplates {
    /// Load `report-viewer.html` and `report-editor.html` from `dir`,
    /// keeping the built-in page for any file that is absent
    pub async fn from_dir(dir: &Path) -> Result<Self> {
        let mut templates = Self::default();
        for (name, slot) in [
            (VIEWER_FILE, &mut templates.viewer),
            (EDITOR_FILE, &mut templates.editor),
        ] {
            match tokio::fs::read_to_string(dir.join(name)).await {
                Ok(content) => *slot = content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(templates)
    }
}

/// Logo URL an editor may have stored under `reportAssetsS3Urls.logoUrl`.
///
/// Only http(s) URLs are used, escaped for a double-quoted attribute.
fn logo_url(document: &ReportDocument) -> String {
    document
        .extra
        .get("reportAssetsS3Urls")
        .and_then(|assets| assets.get("logoUrl"))
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|url| url.starts_with("https://") || url.starts_with("http://"))
        .map(escape_attribute)
        .unwrap_or_default()
}

fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            // Keeps placeholder syntax out of the rendered page
            '{' => escaped.push_str("&#123;"),
            '}' => escaped.push_str("&#125;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// JSON that is safe to embed inside a `<script>` element
fn script_safe_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?.replace('<', "\\u003c"))
}

/// Fill `template` for `document`, stored at `report_json_key`
pub fn render(
    template: &str,
    document: &ReportDocument,
    report_json_key: &str,
    api_base_url: &str,
) -> Result<String> {
    // Data goes in last so placeholder-like text inside the report is left alone
    Ok(template
        .replace("{{LOGO_URL}}", &logo_url(document))
        .replace("{{REPORT_JSON_KEY}}", &script_safe_json(report_json_key)?)
        .replace("{{API_BASE_URL}}", api_base_url.trim_end_matches('/'))
        .replacen("{{REPORT_DATA_JSON}}", &script_safe_json(document)?, 1))
}

/// Renders pages and uploads them beside the report JSON
#[derive(Clone)]
pub struct ViewerPublisher {
    storage: Arc<dyn ObjectStorage>,
    templates: Arc<ViewerTemplates>,
    api_base_url: String,
}

impl ViewerPublisher {
    pub fn new(storage: Arc<dyn ObjectStorage>, templates: ViewerTemplates) -> Self {
        Self {
            storage,
            templates: Arc::new(templates),
            api_base_url: String::new(),
        }
    }

    /// Origin the editor page sends its API calls to
    #[must_use]
    pub fn with_api_base_url(mut self, api_base_url: impl Into<String>) -> Self {
        self.api_base_url = api_base_url.into();
        self
    }

    /// Upload `report-viewer.html`, returns its key
    pub async fn publish_viewer(
        &self,
        report_json_key: &str,
        document: &ReportDocument,
    ) -> Result<String> {
        self.publish(&self.templates.viewer, VIEWER_FILE, report_json_key, document)
            .await
    }

    /// Upload `report-editor.html`, returns its key
    pub async fn publish_editor(
        &self,
        report_json_key: &str,
        document: &ReportDocument,
    ) -> Result<String> {
        self.publish(&self.templates.editor, EDITOR_FILE, report_json_key, document)
            .await
    }

    async fn publish(
        &self,
        template: &str,
        file_name: &str,
        report_json_key: &str,
        document: &ReportDocument,
    ) -> Result<String> {
        let key = sibling_key(report_json_key, file_name);
        let html = render(template, document, report_json_key, &self.api_base_url)?;
        self.storage
            .store_file(
                &key,
                html.as_bytes(),
                PutOptions::content_type("text/html; charset=utf-8").with_cache_control(NO_CACHE),
            )
            .await?;
        info!("Published {} ({} bytes)", key, html.len());
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use field_report_common::ReportMetadata;

    fn document() -> ReportDocument {
        ReportDocument {
            metadata: ReportMetadata {
                generated_at: chrono::Utc::now(),
                customer: "Acme".to_string(),
                project: "Tower".to_string(),
                report_title: None,
                report_date: None,
                prepared_by: None,
            },
            narrative: "Watch for </script> in text".to_string(),
            work_completed: vec![],
            issues: vec![],
            materials: vec![],
            safety_observations: String::new(),
            next_steps: vec![],
            images: vec![],
            asset_base_url: String::new(),
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_render_fills_placeholders() {
        let mut doc = document();
        doc.extra.insert(
            "reportAssetsS3Urls".to_string(),
            serde_json::json!({"logoUrl": "https://cdn/logo.png"}),
        );
        let html = render(
            "<img src=\"{{LOGO_URL}}\"><script>{{REPORT_DATA_JSON}}</script>{{REPORT_JSON_KEY}}|{{API_BASE_URL}}",
            &doc,
            "users/u1/k.json",
            "https://api.example/",
        )
        .unwrap();

        assert!(html.contains("src=\"https://cdn/logo.png\""));
        assert!(html.contains("\"narrative\":\"Watch for \\u003c/script> in text\""));
        assert!(html.ends_with("\"users/u1/k.json\"|https://api.example"));
        assert!(!html.contains("{{"));
    }

    #[test]
    fn test_missing_logo_renders_empty() {
        let html = render("[{{LOGO_URL}}]", &document(), "k", "").unwrap();
        assert_eq!(html, "[]");
    }

    fn with_logo(url: &str) -> ReportDocument {
        let mut doc = document();
        doc.extra.insert(
            "reportAssetsS3Urls".to_string(),
            serde_json::json!({ "logoUrl": url }),
        );
        doc
    }

    #[test]
    fn test_logo_url_cannot_leave_the_attribute() {
        let doc = with_logo("https://cdn/logo.png\" onerror=\"alert(document.cookie)");
        let html = render(&ViewerTemplates::default().viewer, &doc, "k", "").unwrap();
        assert!(!html.contains("onerror=\"alert"));
        assert!(html.contains(
            "src=\"https://cdn/logo.png&quot; onerror=&quot;alert(document.cookie)\""
        ));
    }

    #[test]
    fn test_non_http_logo_is_dropped() {
        for url in ["javascript:alert(1)", "x\" onerror=\"alert(1)", "data:image/png;base64,AA"] {
            let html = render("[{{LOGO_URL}}]", &with_logo(url), "k", "").unwrap();
            assert_eq!(html, "[]", "{url}");
        }
    }

    #[test]
    fn test_logo_url_cannot_capture_report_data() {
        let doc = with_logo("https://cdn/{{REPORT_DATA_JSON}}.png");
        let html = render(
            "<img src=\"{{LOGO_URL}}\"><script>{{REPORT_DATA_JSON}}</script>",
            &doc,
            "k",
            "",
        )
        .unwrap();
        assert!(html.starts_with("<img src=\"https://cdn/&#123;&#123;REPORT_DATA_JSON&#125;&#125;.png\">"));
        assert!(html.contains("<script>{\""));
    }

    #[test]
    fn test_builtin_templates_have_placeholders() {
        let templates = ViewerTemplates::default();
        assert!(templates.viewer.contains("{{REPORT_DATA_JSON}}"));
        assert!(templates.viewer.contains("{{LOGO_URL}}"));
        assert!(templates.editor.contains("{{REPORT_JSON_KEY}}"));
    }

    #[tokio::test]
    async fn test_templates_from_dir_fall_back_to_builtin() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join(VIEWER_FILE), "custom {{REPORT_DATA_JSON}}").unwrap();

        let templates = ViewerTemplates::from_dir(dir.path()).await.unwrap();
        assert_eq!(templates.viewer, "custom {{REPORT_DATA_JSON}}");
        assert_eq!(templates.editor, ViewerTemplates::default().editor);
    }
}
