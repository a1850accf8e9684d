//! Export task bookkeeping.
//!
//! An [`ExportTask`] is created when an export call begins, mutated while
//! pages are processed, and dropped when the export settles. Status only
//! moves forward: `Pending -> InProgress -> {Completed | Failed | Cancelled}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::config::{Orientation, PdfFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportMode {
    Single,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl ExportStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExportStatus::Completed | ExportStatus::Failed | ExportStatus::Cancelled
        )
    }

    pub fn can_transition_to(self, next: ExportStatus) -> bool {
        match (self, next) {
            (ExportStatus::Pending, ExportStatus::InProgress) => true,
            (ExportStatus::Pending | ExportStatus::InProgress, ExportStatus::Failed) => true,
            (ExportStatus::Pending | ExportStatus::InProgress, ExportStatus::Cancelled) => true,
            (ExportStatus::InProgress, ExportStatus::Completed) => true,
            _ => false,
        }
    }
}

/// One export run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportTask {
    pub id: String,
    pub mode: ExportMode,
    pub status: ExportStatus,
    pub progress: u8,
    pub filename: String,
    pub total_pages: usize,
    pub completed_pages: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExportTask {
    pub fn new(mode: ExportMode, filename: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: format!("task-{}", Uuid::new_v4().simple()),
            mode,
            status: ExportStatus::Pending,
            progress: 0,
            filename: filename.into(),
            total_pages: match mode {
                ExportMode::Single => 1,
                ExportMode::All => 0,
            },
            completed_pages: 0,
            created_at: now,
            updated_at: now,
            error: None,
        }
    }

    /// Applies a forward transition; returns `false` (and changes nothing)
    /// when the transition is not allowed.
    pub fn transition(&mut self, next: ExportStatus, error: Option<String>) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        if error.is_some() {
            self.error = error;
        }
        self.touch();
        true
    }

    pub fn set_total_pages(&mut self, total: usize) {
        self.total_pages = total;
        self.completed_pages = self.completed_pages.min(total);
        self.recompute_progress();
    }

    /// Records how many pages have been processed so far (captured or skipped).
    pub fn set_completed_pages(&mut self, completed: usize) {
        self.completed_pages = completed.min(self.total_pages);
        self.recompute_progress();
    }

    fn recompute_progress(&mut self) {
        self.progress = percentage(self.completed_pages, self.total_pages);
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// `round(current / total * 100)`, or 0 when there is nothing to do.
pub fn percentage(current: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((current as f64 / total as f64) * 100.0).round().min(100.0) as u8
}

/// Progress reported before each page of an all-pages export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportProgress {
    /// Zero-based index of the page about to be processed.
    pub current: usize,
    pub total: usize,
    pub percentage: u8,
    pub current_page_title: String,
    pub current_page_route: String,
}

impl ExportProgress {
    pub fn new(current: usize, total: usize, title: &str, route: &str) -> Self {
        Self {
            current,
            total,
            percentage: percentage(current, total),
            current_page_title: title.to_string(),
            current_page_route: route.to_string(),
        }
    }
}

/// Per-call overrides merged over the service's [`crate::ExportConfig`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportOptions {
    pub filename: Option<String>,
    pub quality: Option<f32>,
    pub format: Option<PdfFormat>,
    pub orientation: Option<Orientation>,
}

impl ExportOptions {
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResult {
    pub success: bool,
    pub task_id: String,
    pub filename: String,
    pub page_count: usize,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportEventKind {
    Start,
    Progress,
    Complete,
    Error,
    Cancel,
}

/// Lifecycle event broadcast by [`crate::ExportService::subscribe`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportEvent {
    pub kind: ExportEventKind,
    pub task_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ExportProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ExportResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExportEvent {
    pub fn new(kind: ExportEventKind, task_id: &str) -> Self {
        Self {
            kind,
            task_id: task_id.to_string(),
            timestamp: Utc::now(),
            progress: None,
            result: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_only_moves_forward() {
        use ExportStatus::*;
        assert!(Pending.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Failed));
        assert!(InProgress.can_transition_to(Cancelled));
        assert!(!InProgress.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Completed));
        for terminal in [Completed, Failed, Cancelled] {
            assert!(terminal.is_terminal());
            for next in [Pending, InProgress, Completed, Failed, Cancelled] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn rejected_transition_leaves_task_untouched() {
        let mut task = ExportTask::new(ExportMode::Single, "a.pdf");
        assert!(task.transition(ExportStatus::InProgress, None));
        assert!(task.transition(ExportStatus::Failed, Some("boom".into())));
        assert!(!task.transition(ExportStatus::Completed, None));
        assert_eq!(task.status, ExportStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("boom"));
    }

    #[test]
    fn single_task_starts_with_one_page() {
        let task = ExportTask::new(ExportMode::Single, "a.pdf");
        assert_eq!(task.total_pages, 1);
        assert_eq!(task.completed_pages, 0);
        assert!(task.id.starts_with("task-"));
    }

    #[test]
    fn progress_tracks_completed_pages() {
        let mut task = ExportTask::new(ExportMode::All, "a.pdf");
        task.set_total_pages(3);
        task.set_completed_pages(1);
        assert_eq!(task.progress, 33);
        task.set_completed_pages(5);
        assert_eq!(task.completed_pages, 3);
        assert_eq!(task.progress, 100);
    }

    #[test]
    fn progress_percentages_for_four_pages() {
        let seq: Vec<u8> = (0..4)
            .map(|i| ExportProgress::new(i, 4, "t", "/r").percentage)
            .collect();
        assert_eq!(seq, vec![0, 25, 50, 75]);
    }

    #[test]
    fn percentage_handles_zero_total() {
        assert_eq!(percentage(0, 0), 0);
        assert_eq!(percentage(2, 3), 67);
    }
}
