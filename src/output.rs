//! JSON payloads printed by the `dex` binary.

use crate::error::ErrorPayload;
use crate::types::{ExportMode, ExportResult, PageDescriptor};
use serde::{Deserialize, Serialize};

/// Schema version for output payloads.
pub const DEX_OUTPUT_VERSION: &str = "0.1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DexOutput {
    Export(ExportOutput),
    Pages(PagesOutput),
    Error(ErrorOutput),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOutput {
    pub version: String,
    pub mode: ExportMode,
    pub url: String,
    pub result: ExportResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageEntry {
    #[serde(flatten)]
    pub page: PageDescriptor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagesOutput {
    pub version: String,
    pub total: usize,
    pub pages: Vec<PageEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorOutput {
    pub version: String,
    pub error: ErrorPayload,
}

impl ErrorOutput {
    pub fn new(error: ErrorPayload) -> Self {
        Self {
            version: DEX_OUTPUT_VERSION.to_string(),
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DexError;

    #[test]
    fn export_output_is_tagged() {
        let output = DexOutput::Export(ExportOutput {
            version: DEX_OUTPUT_VERSION.to_string(),
            mode: ExportMode::All,
            url: "http://localhost:5173".into(),
            result: ExportResult {
                success: true,
                task_id: "task-1".into(),
                filename: "deck.pdf".into(),
                page_count: 3,
                duration_ms: 1200,
                file_size: Some(2048),
                location: None,
            },
        });
        let json = serde_json::to_string(&output).unwrap();
        assert!(json.contains("\"kind\":\"export\""));
        assert!(json.contains("\"mode\":\"all\""));
        assert!(json.contains("\"pageCount\":3"));
        assert!(!json.contains("location"));
    }

    #[test]
    fn page_entries_flatten_descriptor() {
        let output = DexOutput::Pages(PagesOutput {
            version: DEX_OUTPUT_VERSION.to_string(),
            total: 1,
            pages: vec![PageEntry {
                page: PageDescriptor::new("/intro", "Intro", 1),
                previous: None,
                next: Some("/agenda".into()),
            }],
        });
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["kind"], "pages");
        assert_eq!(json["pages"][0]["path"], "/intro");
        assert_eq!(json["pages"][0]["pageNumber"], 1);
        assert_eq!(json["pages"][0]["next"], "/agenda");
    }

    #[test]
    fn error_output_carries_category() {
        let output = DexOutput::Error(ErrorOutput::new(DexError::Busy.to_payload()));
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["kind"], "error");
        assert_eq!(json["error"]["category"], "busy");
    }
}
