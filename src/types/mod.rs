//! Core data types for the export pipeline.
//!
//! - [`task`] - Export task record, status machine, progress and results
//! - [`page`] - Navigable page descriptors and per-page capture records
//! - [`dom`] - Element handles and the DOM facts the pipeline observes

pub mod dom;
pub mod page;
pub mod task;

pub use dom::{
    BoundingBox, ComputedStyle, DocumentState, ElementInfo, ElementRef, ImageInfo, InlineStyle,
    ReadyState, StyleProperty,
};
pub use page::{PageCapture, PageDescriptor};
pub use task::{
    ExportEvent, ExportEventKind, ExportMode, ExportOptions, ExportProgress, ExportResult,
    ExportStatus, ExportTask,
};

pub use crate::viewport::Viewport;
