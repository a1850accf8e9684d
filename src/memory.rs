//! In-memory page host.
//!
//! [`MemoryHost`] implements [`PageHost`] and [`Navigator`] over a scripted
//! element table, so the pipeline can run without a browser. Each route
//! path owns its own selector map and raster outputs; navigation swaps the
//! active route.
//!
//! Compiled for unit tests and with the `test-support` feature.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::Mutex;

use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};

use crate::host::{ImageLoad, Navigator, PageHost, RasterRequest};
use crate::types::{
    BoundingBox, ComputedStyle, DocumentState, ElementInfo, ElementRef, ImageInfo, InlineStyle,
    ReadyState, StyleProperty,
};
use crate::{DexError, Result};

/// How `wait_for_image` behaves for one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageWait {
    Load,
    Error,
    Hang,
}

/// What one `rasterize` call produces.
#[derive(Debug, Clone, PartialEq)]
pub enum RasterOutput {
    Png(Vec<u8>),
    /// Bytes no decoder accepts.
    Corrupt,
    /// Never resolves.
    Hang,
    Fail(String),
}

impl RasterOutput {
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        RasterOutput::Png(encode_png(&RgbaImage::from_pixel(width, height, Rgba(rgba))))
    }
}

pub fn encode_png(img: &RgbaImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    // Writing PNG into a Vec only fails on allocation failure.
    let _ = DynamicImage::ImageRgba8(img.clone()).write_to(&mut buf, ImageOutputFormat::Png);
    buf.into_inner()
}

#[derive(Debug, Clone)]
pub struct MemoryElement {
    pub info: ElementInfo,
    pub first_child: Option<ElementRef>,
    pub inline: InlineStyle,
    pub images: Vec<ImageInfo>,
    pub image_waits: Vec<ImageWait>,
}

impl MemoryElement {
    pub fn sized(tag: &str, class_name: &str, width: f32, height: f32) -> Self {
        Self {
            info: ElementInfo {
                tag: tag.to_string(),
                class_name: class_name.to_string(),
                id: String::new(),
                offset_width: width,
                offset_height: height,
                bounding_box: BoundingBox {
                    x: 0.0,
                    y: 0.0,
                    width,
                    height,
                },
                computed_style: ComputedStyle::default(),
            },
            first_child: None,
            inline: InlineStyle::new(),
            images: Vec::new(),
            image_waits: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.info.id = id.to_string();
        self
    }

    pub fn with_style(mut self, style: ComputedStyle) -> Self {
        self.info.computed_style = style;
        self
    }

    pub fn with_inline(mut self, property: StyleProperty, value: &str) -> Self {
        self.inline.set(property, value);
        self
    }

    pub fn with_child(mut self, child: ElementRef) -> Self {
        self.first_child = Some(child);
        self
    }

    pub fn with_image(mut self, mut image: ImageInfo, wait: ImageWait) -> Self {
        image.index = self.images.len();
        self.images.push(image);
        self.image_waits.push(wait);
        self
    }

    fn computed(&self) -> ComputedStyle {
        let mut style = self.info.computed_style.clone();
        if let Some(display) = self.inline.get(StyleProperty::Display).filter(|v| !v.is_empty()) {
            style.display = display.to_string();
        }
        if let Some(visibility) = self
            .inline
            .get(StyleProperty::Visibility)
            .filter(|v| !v.is_empty())
        {
            style.visibility = visibility.to_string();
        }
        if let Some(opacity) = self
            .inline
            .get(StyleProperty::Opacity)
            .and_then(|v| v.parse::<f32>().ok())
        {
            style.opacity = opacity;
        }
        style
    }
}

#[derive(Debug, Default)]
struct Route {
    selectors: HashMap<String, ElementRef>,
    body: Option<ElementRef>,
    fail_navigation: Option<String>,
}

#[derive(Debug)]
struct MemoryState {
    next_id: u64,
    elements: HashMap<ElementRef, MemoryElement>,
    routes: HashMap<String, Route>,
    current_path: String,
    document_states: VecDeque<DocumentState>,
    rasters: HashMap<ElementRef, VecDeque<RasterOutput>>,
    raster_calls: Vec<(ElementRef, RasterRequest)>,
    image_waits: HashMap<ElementRef, Vec<usize>>,
    style_writes: Vec<(ElementRef, InlineStyle)>,
    navigations: Vec<String>,
}

/// Scripted, in-memory [`PageHost`] + [`Navigator`].
#[derive(Debug)]
pub struct MemoryHost {
    state: Mutex<MemoryState>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    /// A host on route `/` whose document is immediately ready.
    pub fn new() -> Self {
        let mut routes = HashMap::new();
        routes.insert("/".to_string(), Route::default());
        Self {
            state: Mutex::new(MemoryState {
                next_id: 1,
                elements: HashMap::new(),
                routes,
                current_path: "/".to_string(),
                document_states: VecDeque::from([DocumentState {
                    ready_state: ReadyState::Complete,
                    app_mounted: true,
                }]),
                rasters: HashMap::new(),
                raster_calls: Vec::new(),
                image_waits: HashMap::new(),
                style_writes: Vec::new(),
                navigations: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A poisoned lock only means a test panicked mid-call; keep the data.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_element(&self, element: MemoryElement) -> ElementRef {
        let mut state = self.lock();
        let id = ElementRef(state.next_id);
        state.next_id += 1;
        state.elements.insert(id, element);
        id
    }

    /// Registers a route (if new) and binds `selector` on it.
    pub fn bind_selector(&self, path: &str, selector: &str, element: ElementRef) {
        let mut state = self.lock();
        state
            .routes
            .entry(path.to_string())
            .or_default()
            .selectors
            .insert(selector.to_string(), element);
    }

    pub fn set_body(&self, path: &str, element: ElementRef) {
        let mut state = self.lock();
        state.routes.entry(path.to_string()).or_default().body = Some(element);
    }

    pub fn add_route(&self, path: &str) {
        self.lock().routes.entry(path.to_string()).or_default();
    }

    pub fn fail_navigation(&self, path: &str, message: &str) {
        let mut state = self.lock();
        state
            .routes
            .entry(path.to_string())
            .or_default()
            .fail_navigation = Some(message.to_string());
    }

    /// States returned by successive probes; the last one repeats.
    pub fn queue_document_states(&self, states: impl IntoIterator<Item = DocumentState>) {
        let mut state = self.lock();
        state.document_states = states.into_iter().collect();
    }

    /// Outputs returned by successive rasterize calls on `element`; the last
    /// one repeats.
    pub fn queue_rasters(&self, element: ElementRef, outputs: impl IntoIterator<Item = RasterOutput>) {
        let mut state = self.lock();
        state.rasters.insert(element, outputs.into_iter().collect());
    }

    pub fn inline_of(&self, element: ElementRef) -> InlineStyle {
        self.lock()
            .elements
            .get(&element)
            .map(|e| e.inline.clone())
            .unwrap_or_default()
    }

    pub fn image(&self, element: ElementRef, index: usize) -> Option<ImageInfo> {
        self.lock()
            .elements
            .get(&element)
            .and_then(|e| e.images.get(index).cloned())
    }

    pub fn raster_calls(&self) -> Vec<(ElementRef, RasterRequest)> {
        self.lock().raster_calls.clone()
    }

    pub fn image_waits(&self, element: ElementRef) -> Vec<usize> {
        self.lock()
            .image_waits
            .get(&element)
            .cloned()
            .unwrap_or_default()
    }

    /// Every `set_inline_style` call, in order.
    pub fn style_writes(&self) -> Vec<(ElementRef, InlineStyle)> {
        self.lock().style_writes.clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.lock().navigations.clone()
    }

    fn with_element<T>(
        &self,
        element: ElementRef,
        f: impl FnOnce(&mut MemoryElement) -> T,
    ) -> Result<T> {
        let mut state = self.lock();
        state
            .elements
            .get_mut(&element)
            .map(f)
            .ok_or_else(|| DexError::host(format!("unknown {element}")))
    }
}

fn next_from<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

#[async_trait]
impl PageHost for MemoryHost {
    async fn document_state(&self) -> Result<DocumentState> {
        let mut state = self.lock();
        next_from(&mut state.document_states)
            .ok_or_else(|| DexError::host("no document state scripted"))
    }

    async fn query_selector(&self, selector: &str) -> Result<Option<ElementRef>> {
        let state = self.lock();
        Ok(state
            .routes
            .get(&state.current_path)
            .and_then(|route| route.selectors.get(selector).copied()))
    }

    async fn first_element_child(&self, element: ElementRef) -> Result<Option<ElementRef>> {
        self.with_element(element, |e| e.first_child)
    }

    async fn body(&self) -> Result<ElementRef> {
        let body = {
            let state = self.lock();
            state
                .routes
                .get(&state.current_path)
                .and_then(|route| route.body)
        };
        match body {
            Some(body) => Ok(body),
            None => {
                let body = self.add_element(MemoryElement::sized("BODY", "", 1440.0, 900.0));
                let path = self.lock().current_path.clone();
                self.set_body(&path, body);
                Ok(body)
            }
        }
    }

    async fn viewport_size(&self) -> Result<(u32, u32)> {
        Ok((1440, 900))
    }

    async fn describe(&self, element: ElementRef) -> Result<ElementInfo> {
        self.with_element(element, |e| {
            let mut info = e.info.clone();
            info.computed_style = e.computed();
            info
        })
    }

    async fn inline_style(
        &self,
        element: ElementRef,
        properties: &[StyleProperty],
    ) -> Result<InlineStyle> {
        self.with_element(element, |e| {
            let mut style = InlineStyle::new();
            for property in properties {
                style.set(*property, e.inline.get(*property).unwrap_or_default());
            }
            style
        })
    }

    async fn set_inline_style(&self, element: ElementRef, style: &InlineStyle) -> Result<()> {
        self.lock().style_writes.push((element, style.clone()));
        self.with_element(element, |e| {
            for (property, value) in style.iter() {
                e.inline.set(property, value);
            }
        })
    }

    async fn images(&self, element: ElementRef) -> Result<Vec<ImageInfo>> {
        self.with_element(element, |e| e.images.clone())
    }

    async fn activate_lazy_image(
        &self,
        element: ElementRef,
        index: usize,
        src: Option<&str>,
    ) -> Result<()> {
        self.with_element(element, |e| {
            if let Some(img) = e.images.get_mut(index) {
                if let Some(src) = src {
                    if img.src.is_empty() {
                        img.src = src.to_string();
                    }
                }
                img.lazy = false;
            }
        })
    }

    async fn wait_for_image(&self, element: ElementRef, index: usize) -> Result<ImageLoad> {
        let wait = {
            let mut state = self.lock();
            state.image_waits.entry(element).or_default().push(index);
            state
                .elements
                .get(&element)
                .and_then(|e| e.image_waits.get(index).copied())
                .unwrap_or(ImageWait::Load)
        };
        match wait {
            ImageWait::Load => Ok(ImageLoad::Loaded),
            ImageWait::Error => Ok(ImageLoad::Failed),
            ImageWait::Hang => std::future::pending().await,
        }
    }

    async fn rasterize(&self, element: ElementRef, request: &RasterRequest) -> Result<Vec<u8>> {
        let output = {
            let mut state = self.lock();
            state.raster_calls.push((element, request.clone()));
            state.rasters.get_mut(&element).and_then(next_from)
        };
        match output {
            Some(RasterOutput::Png(bytes)) => Ok(bytes),
            Some(RasterOutput::Corrupt) => Ok(b"not an image".to_vec()),
            Some(RasterOutput::Hang) => std::future::pending().await,
            Some(RasterOutput::Fail(message)) => Err(DexError::host(message)),
            None => {
                let info = self.describe(element).await?;
                let width = (info.bounding_box.width * request.scale).round().max(1.0) as u32;
                let height = (info.bounding_box.height * request.scale).round().max(1.0) as u32;
                Ok(encode_png(&RgbaImage::from_pixel(
                    width,
                    height,
                    Rgba([32, 64, 128, 255]),
                )))
            }
        }
    }
}

#[async_trait]
impl Navigator for MemoryHost {
    async fn navigate(&self, path: &str) -> Result<()> {
        let mut state = self.lock();
        state.navigations.push(path.to_string());
        match state.routes.get(path) {
            Some(route) => {
                if let Some(message) = &route.fail_navigation {
                    return Err(DexError::navigation(path, message.clone()));
                }
            }
            None => return Err(DexError::navigation(path, "no such route")),
        }
        state.current_path = path.to_string();
        Ok(())
    }

    async fn current_path(&self) -> Result<String> {
        Ok(self.lock().current_path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn selectors_are_scoped_to_the_current_route() {
        let host = MemoryHost::new();
        let a = host.add_element(MemoryElement::sized("DIV", "page-content", 800.0, 600.0));
        let b = host.add_element(MemoryElement::sized("DIV", "page-content", 800.0, 600.0));
        host.bind_selector("/a", ".page-content", a);
        host.bind_selector("/b", ".page-content", b);

        assert_eq!(host.query_selector(".page-content").await.unwrap(), None);
        host.navigate("/a").await.unwrap();
        assert_eq!(host.query_selector(".page-content").await.unwrap(), Some(a));
        host.navigate("/b").await.unwrap();
        assert_eq!(host.query_selector(".page-content").await.unwrap(), Some(b));
        assert_eq!(host.navigations(), vec!["/a", "/b"]);
    }

    #[tokio::test]
    async fn inline_display_feeds_computed_style() {
        let host = MemoryHost::new();
        let el = host.add_element(
            MemoryElement::sized("DIV", "x", 10.0, 10.0).with_style(ComputedStyle {
                display: "none".into(),
                ..ComputedStyle::default()
            }),
        );
        assert!(host.describe(el).await.unwrap().computed_style.is_hidden());
        host.set_inline_style(el, &InlineStyle::new().with(StyleProperty::Display, "block"))
            .await
            .unwrap();
        assert!(!host.describe(el).await.unwrap().computed_style.is_hidden());
    }

    #[tokio::test]
    async fn unknown_route_fails_navigation() {
        let host = MemoryHost::new();
        let err = host.navigate("/missing").await.unwrap_err();
        assert!(matches!(err, DexError::Navigation { .. }));
        assert_eq!(host.current_path().await.unwrap(), "/");
    }
}
