use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DexError {
    #[error("An export is already in progress")]
    Busy,

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error(
        "Invalid element size {width}x{height} (tag: {tag}, class: {class_name:?}, id: {id:?}, offset: {offset_width}x{offset_height})"
    )]
    InvalidElementSize {
        tag: String,
        class_name: String,
        id: String,
        offset_width: f32,
        offset_height: f32,
        width: f32,
        height: f32,
    },

    #[error("Capture timed out after {0:?}")]
    CaptureTimeout(Duration),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Failed to decode captured image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Document assembly error: {0}")]
    Document(String),

    #[error("Navigation to {path} failed: {message}")]
    Navigation { path: String, message: String },

    #[error("Export was cancelled")]
    Cancelled,

    #[error("Page host error: {0}")]
    Host(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unexpected error: {0}")]
    Unknown(String),
}

impl DexError {
    pub fn precondition(message: impl Into<String>) -> Self {
        DexError::Precondition(message.into())
    }

    pub fn capture(message: impl Into<String>) -> Self {
        DexError::Capture(message.into())
    }

    pub fn host(message: impl Into<String>) -> Self {
        DexError::Host(message.into())
    }

    pub fn document(message: impl Into<String>) -> Self {
        DexError::Document(message.into())
    }

    pub fn navigation(path: impl Into<String>, message: impl Into<String>) -> Self {
        DexError::Navigation {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn to_payload(&self) -> ErrorPayload {
        match self {
            DexError::Busy => ErrorPayload::new(
                ErrorCategory::Busy,
                self.to_string(),
                "Wait for the running export to finish or cancel it before starting another.",
            ),
            DexError::Precondition(msg) => {
                let lower = msg.to_ascii_lowercase();
                let remediation = if lower.contains("navigator") {
                    "Exporting all pages needs a navigator; start the export from a browser session."
                } else if lower.contains("no exportable pages") {
                    "Add [[pages]] entries to the config or pass --pages with a YAML page list."
                } else if lower.contains("no pages captured") {
                    "Every page failed to capture; rerun with --verbose to see per-page errors."
                } else {
                    "Check the export inputs and rerun with --verbose."
                };
                ErrorPayload::new(ErrorCategory::Config, msg.to_string(), remediation)
            }
            DexError::InvalidElementSize { .. } => ErrorPayload::new(
                ErrorCategory::Capture,
                self.to_string(),
                "The content element has no size; make sure the page is rendered and visible at the configured viewport.",
            ),
            DexError::CaptureTimeout(_) => ErrorPayload::new(
                ErrorCategory::Capture,
                self.to_string(),
                "Increase --capture-timeout or reduce --scale for heavy pages.",
            ),
            DexError::Capture(msg) => ErrorPayload::new(
                ErrorCategory::Capture,
                msg.to_string(),
                "Rerun with --verbose; check that the page renders without errors.",
            ),
            DexError::Decode(e) => ErrorPayload::new(
                ErrorCategory::Capture,
                e.to_string(),
                "Cross-origin assets may break rasterization; configure --proxy-url.",
            ),
            DexError::Document(msg) => ErrorPayload::new(
                ErrorCategory::Document,
                msg.to_string(),
                "Try a lower --quality or --scale.",
            ),
            DexError::Pdf(e) => ErrorPayload::new(
                ErrorCategory::Document,
                e.to_string(),
                "Try a lower --quality or --scale.",
            ),
            DexError::Navigation { .. } => ErrorPayload::new(
                ErrorCategory::Navigation,
                self.to_string(),
                "Verify the page path exists under --url and loads in a browser.",
            ),
            DexError::Cancelled => ErrorPayload::new(
                ErrorCategory::Cancelled,
                self.to_string(),
                "Start the export again when ready.",
            ),
            DexError::Host(msg) | DexError::Config(msg) => {
                let lower = msg.to_ascii_lowercase();
                if lower.contains("playwright npm package is missing") {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.to_string(),
                        "Install Playwright (e.g., `npm install playwright` and `npx playwright install chromium`).",
                    )
                } else if lower.contains("chromium executable") {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.to_string(),
                        "Run `npx playwright install chromium` to download the browser.",
                    )
                } else if lower.contains("spawn playwright helper")
                    || lower.contains("node command")
                    || lower.contains("not found on path")
                {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.to_string(),
                        "Install Node.js and ensure the node binary is on PATH; rerun after installing Playwright if needed.",
                    )
                } else if lower.contains("timeout") || lower.contains("timed out") {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.to_string(),
                        "Raise [browser] navigation_timeout/process_timeout in the config, or make sure the page loads without blocking.",
                    )
                } else {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.to_string(),
                        "Check flags/paths (e.g., --viewport WIDTHxHEIGHT, --url) and the config file.",
                    )
                }
            }
            DexError::Io(e) => ErrorPayload::new(
                ErrorCategory::Config,
                e.to_string(),
                "Check file paths/permissions for --output-dir and --config.",
            ),
            DexError::Image(e) => ErrorPayload::new(
                ErrorCategory::Capture,
                e.to_string(),
                "Rerun with --verbose for details.",
            ),
            DexError::Serialization(e) => ErrorPayload::new(
                ErrorCategory::Config,
                e.to_string(),
                "Check JSON/serialization inputs; run with --verbose for details.",
            ),
            DexError::Unknown(msg) => ErrorPayload::new(
                ErrorCategory::Unknown,
                msg.to_string(),
                "Re-run with --verbose; file an issue if persistent.",
            ),
        }
    }
}

pub type Result<T> = std::result::Result<T, DexError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Busy,
    Config,
    Capture,
    Document,
    Navigation,
    Cancelled,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub category: ErrorCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl ErrorPayload {
    pub fn new(category: ErrorCategory, message: String, remediation: impl Into<String>) -> Self {
        Self {
            category,
            message,
            remediation: Some(remediation.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_payload_uses_busy_category() {
        let payload = DexError::Busy.to_payload();
        assert_eq!(payload.category, ErrorCategory::Busy);
        assert!(payload.message.contains("already in progress"));
    }

    #[test]
    fn precondition_payload_mentions_pages_config() {
        let err = DexError::precondition("no exportable pages");
        let remediation = err.to_payload().remediation.unwrap_or_default();
        assert!(
            remediation.contains("[[pages]]"),
            "expected page list remediation, got: {remediation}"
        );
    }

    #[test]
    fn invalid_size_message_includes_element_diagnostics() {
        let err = DexError::InvalidElementSize {
            tag: "DIV".to_string(),
            class_name: "page-content".to_string(),
            id: "slide".to_string(),
            offset_width: 0.0,
            offset_height: 0.0,
            width: 0.0,
            height: 0.0,
        };
        let msg = err.to_string();
        assert!(msg.contains("0x0"), "got: {msg}");
        assert!(msg.contains("DIV"));
        assert!(msg.contains("page-content"));
        assert!(msg.contains("slide"));
        assert_eq!(err.to_payload().category, ErrorCategory::Capture);
    }

    #[test]
    fn config_payload_includes_playwright_remediation() {
        let err = DexError::Config(
            "Playwright npm package is missing; install with `npm install playwright`.".to_string(),
        );
        let payload = err.to_payload();
        assert_eq!(payload.category, ErrorCategory::Config);
        let remediation = payload.remediation.unwrap_or_default();
        assert!(
            remediation.contains("npm install playwright"),
            "expected remediation to mention npm install playwright, got: {remediation}"
        );
    }

    #[test]
    fn host_payload_includes_node_install_hint() {
        let err = DexError::host("Unable to spawn Playwright helper; 'node' was not found on PATH");
        let remediation = err.to_payload().remediation.unwrap_or_default();
        assert!(
            remediation.to_ascii_lowercase().contains("node"),
            "expected node install/path remediation, got: {remediation}"
        );
    }

    #[test]
    fn config_payload_uses_default_remediation_for_other_messages() {
        let err = DexError::Config("Some other config issue".to_string());
        let remediation = err.to_payload().remediation.unwrap_or_default();
        assert!(remediation.contains("Check flags/paths"));
    }

    #[test]
    fn capture_timeout_payload_suggests_longer_timeout() {
        let err = DexError::CaptureTimeout(Duration::from_millis(15000));
        let payload = err.to_payload();
        assert_eq!(payload.category, ErrorCategory::Capture);
        assert!(payload
            .remediation
            .unwrap_or_default()
            .contains("--capture-timeout"));
    }

    #[test]
    fn navigation_helper_formats_path() {
        let err = DexError::navigation("/intro", "net::ERR_ABORTED");
        assert_eq!(
            err.to_string(),
            "Navigation to /intro failed: net::ERR_ABORTED"
        );
        assert_eq!(err.to_payload().category, ErrorCategory::Navigation);
    }
}
