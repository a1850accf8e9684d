use std::sync::Arc;

use dex_lib::{ExportProgress, ProgressCallback};

pub fn format_progress(progress: &ExportProgress) -> String {
    format!(
        "[{}/{}] {:>3}% {} ({})",
        progress.current + 1,
        progress.total,
        progress.percentage,
        progress.current_page_title,
        progress.current_page_route
    )
}

/// Writes one line per page to stderr, keeping stdout for the JSON result.
pub fn stderr_progress() -> ProgressCallback {
    Arc::new(|progress: &ExportProgress| eprintln!("{}", format_progress(progress)))
}
