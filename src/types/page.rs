use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One navigable page, as reported by a [`crate::PageSource`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageDescriptor {
    pub path: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub order: u32,
    #[serde(default, alias = "page_number")]
    pub page_number: Option<u32>,
    #[serde(default)]
    pub hidden: bool,
}

impl PageDescriptor {
    pub fn new(path: impl Into<String>, title: impl Into<String>, page_number: u32) -> Self {
        Self {
            path: path.into(),
            title: title.into(),
            order: page_number,
            page_number: Some(page_number),
            hidden: false,
        }
    }
}

/// Record of one successfully captured page within a task.
///
/// The bitmap itself is handed to the document assembler and released once
/// placed; the record keeps its pixel dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageCapture {
    pub id: String,
    pub task_id: String,
    pub page_title: String,
    pub page_route: String,
    /// Dense 0-based placement index in the output document.
    pub order: usize,
    pub captured_at: DateTime<Utc>,
    pub width: u32,
    pub height: u32,
}
