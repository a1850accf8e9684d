//! Deck Exporter (dex) Library
//!
//! Captures rendered presentation pages and assembles them into a PDF. The
//! pipeline observes the page only through the [`PageHost`] and
//! [`Navigator`] traits, so a headless browser ([`browser::PlaywrightHost`])
//! and the scripted in-memory host (`memory`, behind the `test-support`
//! feature) are interchangeable.
//!
//! # Module Overview
//!
//! - [`export`] - Export orchestration, the export slot, progress and events
//! - [`capture`] - Element capture with guaranteed style rollback
//! - [`locator`] - Content element discovery
//! - [`readiness`] - Best-effort page and image readiness waits
//! - [`canvas`] - Bitmaps and aspect-ratio cropping
//! - [`document`] - PDF page sizing and assembly
//! - [`browser`] - Playwright-backed page host
//! - [`config`] - Configuration file support
//! - [`types`] - Core data types
//! - [`output`] - JSON output schemas
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use dex_lib::{Config, ExportOptions, ExportService, FileDownload, StaticPages};
//! use dex_lib::browser::{LaunchOptions, PlaywrightHost};
//!
//! # async fn example() -> dex_lib::Result<()> {
//! let config = Config::default();
//! let host = Arc::new(
//!     PlaywrightHost::launch(
//!         "http://localhost:5173/",
//!         &LaunchOptions {
//!             browser: config.browser.clone(),
//!             scale: config.export.capture.scale,
//!             proxy_url: None,
//!         },
//!     )
//!     .await?,
//! );
//! let service = ExportService::new(
//!     host.clone(),
//!     Arc::new(StaticPages::new(config.pages.clone())),
//!     Arc::new(FileDownload::new("out")),
//!     config.export.clone(),
//! )
//! .with_navigator(host);
//!
//! let result = service.export_all_pages(ExportOptions::default(), None).await?;
//! println!("{} pages -> {}", result.page_count, result.filename);
//! # Ok(())
//! # }
//! ```

pub mod browser;
pub mod canvas;
pub mod capture;
pub mod config;
pub mod document;
pub mod download;
pub mod error;
pub mod export;
pub mod filename;
pub mod host;
pub mod locator;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod output;
pub mod readiness;
pub mod routes;
pub mod types;
pub mod viewport;

pub use canvas::{crop_region, crop_to_aspect, Bitmap, CropRegion};
pub use capture::{CaptureEngine, CaptureOptions};
pub use config::{
    BrowserConfig, CaptureConfig, Config, ConfigError, ExportConfig, FileConfig, Margin,
    Orientation, PdfConfig, PdfFormat, ReadinessConfig,
};
pub use document::{DocumentAssembler, PageGeometry, PdfDocument};
pub use download::{FileDownload, MemoryDownload};
pub use error::{DexError, ErrorCategory, ErrorPayload, Result};
pub use export::{ExportService, ProgressCallback};
pub use filename::generate_filename;
pub use host::{DeliveredFile, DownloadSink, ImageLoad, Navigator, PageHost, PageSource, RasterRequest};
pub use locator::{locate_content_element, ContentLocator};
pub use output::{DexOutput, ErrorOutput, ExportOutput, PageEntry, PagesOutput, DEX_OUTPUT_VERSION};
pub use readiness::{wait_for_images_loaded, wait_for_ready, Readiness, ReadinessOptions};
pub use routes::StaticPages;
pub use types::{
    ExportEvent, ExportEventKind, ExportMode, ExportOptions, ExportProgress, ExportResult,
    ExportStatus, ExportTask, PageCapture, PageDescriptor,
};
pub use viewport::Viewport;
