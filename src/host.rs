//! Capabilities the export pipeline depends on.
//!
//! The pipeline only observes a rendered page through these traits, so a
//! real browser session and an in-memory fake are interchangeable.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::types::{
    DocumentState, ElementInfo, ElementRef, ImageInfo, InlineStyle, PageDescriptor, StyleProperty,
};
use crate::Result;

/// Parameters for one DOM-to-raster render call.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterRequest {
    pub scale: f32,
    /// Fetch cross-origin assets with CORS.
    pub use_cors: bool,
    pub proxy_url: Option<String>,
}

/// Outcome of waiting on a single image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageLoad {
    Loaded,
    Failed,
}

/// A rendered document the pipeline can inspect, mutate and rasterize.
#[async_trait]
pub trait PageHost: Send + Sync {
    async fn document_state(&self) -> Result<DocumentState>;

    /// First element matching `selector`, if any.
    async fn query_selector(&self, selector: &str) -> Result<Option<ElementRef>>;

    async fn first_element_child(&self, element: ElementRef) -> Result<Option<ElementRef>>;

    async fn body(&self) -> Result<ElementRef>;

    /// Layout viewport size in CSS pixels.
    async fn viewport_size(&self) -> Result<(u32, u32)>;

    async fn describe(&self, element: ElementRef) -> Result<ElementInfo>;

    async fn inline_style(
        &self,
        element: ElementRef,
        properties: &[StyleProperty],
    ) -> Result<InlineStyle>;

    /// Applies inline values; an empty value removes the property.
    async fn set_inline_style(&self, element: ElementRef, style: &InlineStyle) -> Result<()>;

    /// All `<img>` elements in the subtree, in document order.
    async fn images(&self, element: ElementRef) -> Result<Vec<ImageInfo>>;

    /// Copies `src` into the image's active source (when it has none) and
    /// drops any lazy-loading hint.
    async fn activate_lazy_image(
        &self,
        element: ElementRef,
        index: usize,
        src: Option<&str>,
    ) -> Result<()>;

    /// Resolves once the image fires load or error. Callers bound the wait.
    async fn wait_for_image(&self, element: ElementRef, index: usize) -> Result<ImageLoad>;

    /// Renders the element into encoded image bytes (PNG).
    async fn rasterize(&self, element: ElementRef, request: &RasterRequest) -> Result<Vec<u8>>;
}

/// Moves the host between routed pages.
#[async_trait]
pub trait Navigator: Send + Sync {
    /// Resolves once `path` is the active route.
    async fn navigate(&self, path: &str) -> Result<()>;

    async fn current_path(&self) -> Result<String>;
}

/// Ordered list of exportable pages.
pub trait PageSource: Send + Sync {
    /// Visible pages sorted by page number.
    fn pages(&self) -> Vec<PageDescriptor>;

    fn page_by_number(&self, number: u32) -> Option<PageDescriptor> {
        self.pages()
            .into_iter()
            .find(|p| p.page_number == Some(number))
    }

    fn number_for_path(&self, path: &str) -> Option<u32> {
        self.pages()
            .into_iter()
            .find(|p| p.path == path)
            .and_then(|p| p.page_number)
    }
}

/// Where a finished document ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredFile {
    pub location: Option<PathBuf>,
    pub size: u64,
}

/// Delivers a finished document to the user.
#[async_trait]
pub trait DownloadSink: Send + Sync {
    async fn deliver(&self, filename: &str, bytes: Vec<u8>) -> Result<DeliveredFile>;
}
