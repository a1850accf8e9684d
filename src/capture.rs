//! Capture engine: turns one content element into a [`Bitmap`].
//!
//! Every inline style the engine touches is snapshotted first and restored
//! before [`CaptureEngine::capture_element`] returns, on success and failure
//! alike.

use image::Rgba;
use palette::Srgb;
use std::time::Duration;
use tokio::time::{sleep, timeout};

use crate::canvas::Bitmap;
use crate::config::CaptureConfig;
use crate::host::{PageHost, RasterRequest};
use crate::readiness::{
    wait_for_images_loaded, wait_for_ready, ReadinessOptions, DEFAULT_IMAGE_TIMEOUT,
};
use crate::types::{ComputedStyle, ElementInfo, ElementRef, InlineStyle, StyleProperty};
use crate::{DexError, Result};

pub const DEFAULT_SCALE: f32 = 2.0;
pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_millis(15_000);
pub const DEFAULT_CAPTURE_SETTLE: Duration = Duration::from_millis(500);

/// Side of the corner square sampled for the empty-canvas warning.
const CORNER_SAMPLE: u32 = 100;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureOptions {
    pub scale: f32,
    pub timeout: Duration,
    pub use_cors: bool,
    pub wait_for_images: bool,
    pub image_timeout: Duration,
    /// CSS colour painted under the raster; `transparent` skips the fill.
    pub background_color: String,
    pub proxy_url: Option<String>,
    pub full_bleed: bool,
    pub readiness: ReadinessOptions,
    pub target_width: Option<u32>,
    pub target_height: Option<u32>,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            scale: DEFAULT_SCALE,
            timeout: DEFAULT_CAPTURE_TIMEOUT,
            use_cors: true,
            wait_for_images: true,
            image_timeout: DEFAULT_IMAGE_TIMEOUT,
            background_color: "#ffffff".to_string(),
            proxy_url: None,
            full_bleed: true,
            readiness: ReadinessOptions {
                settle_delay: DEFAULT_CAPTURE_SETTLE,
                ..ReadinessOptions::default()
            },
            target_width: None,
            target_height: None,
        }
    }
}

impl From<&CaptureConfig> for CaptureOptions {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            scale: config.scale,
            timeout: config.timeout,
            use_cors: config.use_cors,
            wait_for_images: config.wait_for_images,
            image_timeout: config.image_timeout,
            background_color: config.background_color.clone(),
            proxy_url: config.proxy_url.clone().filter(|u| !u.trim().is_empty()),
            full_bleed: config.full_bleed,
            readiness: ReadinessOptions {
                timeout: config.readiness_timeout,
                settle_delay: config.settle_delay,
                ..ReadinessOptions::default()
            },
            target_width: None,
            target_height: None,
        }
    }
}

/// Parses a CSS colour (hex or named). `None` means no background fill.
pub fn parse_background(color: &str) -> Option<Rgba<u8>> {
    let color = color.trim();
    if color.is_empty() || color.eq_ignore_ascii_case("transparent") {
        return None;
    }
    let parsed = color
        .parse::<Srgb<u8>>()
        .ok()
        .or_else(|| palette::named::from_str(&color.to_ascii_lowercase()));
    match parsed {
        Some(rgb) => Some(Rgba([rgb.red, rgb.green, rgb.blue, 255])),
        None => {
            tracing::warn!(color, "unrecognised background colour; using white");
            Some(WHITE)
        }
    }
}

/// Original inline values to put back once a capture settles.
#[derive(Debug, Default)]
struct StyleRollback {
    saved: Vec<(ElementRef, InlineStyle)>,
}

impl StyleRollback {
    async fn snapshot(&mut self, host: &dyn PageHost, element: ElementRef) -> Result<()> {
        if self.saved.iter().any(|(el, _)| *el == element) {
            return Ok(());
        }
        let original = host.inline_style(element, &StyleProperty::ALL).await?;
        self.saved.push((element, original));
        Ok(())
    }

    /// Restores in reverse order. Failures are logged; they must not mask
    /// the capture outcome.
    async fn restore(self, host: &dyn PageHost) {
        for (element, original) in self.saved.into_iter().rev() {
            if let Err(err) = host.set_inline_style(element, &original).await {
                tracing::warn!(%element, error = %err, "failed to restore inline styles");
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CaptureEngine {
    options: CaptureOptions,
}

impl CaptureEngine {
    pub fn new(options: CaptureOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CaptureOptions {
        &self.options
    }

    pub async fn capture_element(
        &self,
        host: &dyn PageHost,
        element: ElementRef,
    ) -> Result<Bitmap> {
        let mut rollback = StyleRollback::default();
        let outcome = self.capture_inner(host, element, &mut rollback).await;
        rollback.restore(host).await;
        outcome
    }

    async fn capture_inner(
        &self,
        host: &dyn PageHost,
        element: ElementRef,
        rollback: &mut StyleRollback,
    ) -> Result<Bitmap> {
        rollback.snapshot(host, element).await?;
        let info = host.describe(element).await?;

        let reveal = reveal_style(&info.computed_style);
        if !reveal.is_empty() {
            tracing::debug!(%element, "forcing hidden element visible for capture");
            host.set_inline_style(element, &reveal).await?;
        }

        self.activate_lazy_images(host, element).await?;

        if self.options.full_bleed && info.looks_like_page_content() {
            self.strip_decoration(host, element, rollback).await?;
        }

        wait_for_ready(host, &self.options.readiness).await;
        if self.options.wait_for_images {
            wait_for_images_loaded(host, element, self.options.image_timeout).await;
        }

        let info = host.describe(element).await?;
        if info.bounding_box.is_empty() {
            return Err(invalid_size(&info));
        }

        let decoded = self.render(host, element).await?;
        let mut bitmap = Bitmap::composite(&decoded, parse_background(&self.options.background_color));
        if let Some(resized) =
            bitmap.resized_to_target(self.options.target_width, self.options.target_height)
        {
            bitmap = resized;
        }

        if bitmap.width() == 0 || bitmap.height() == 0 {
            return Err(DexError::capture("captured image has zero dimensions"));
        }
        if bitmap.corner_looks_empty(CORNER_SAMPLE) {
            tracing::warn!(
                %element,
                width = bitmap.width(),
                height = bitmap.height(),
                "captured image looks empty in the top-left corner"
            );
        }

        tracing::debug!(%element, width = bitmap.width(), height = bitmap.height(), "element captured");
        Ok(bitmap)
    }

    async fn activate_lazy_images(&self, host: &dyn PageHost, element: ElementRef) -> Result<()> {
        for image in host.images(element).await? {
            if image.is_deferred() {
                host.activate_lazy_image(element, image.index, image.data_src.as_deref())
                    .await?;
            }
        }
        Ok(())
    }

    async fn strip_decoration(
        &self,
        host: &dyn PageHost,
        element: ElementRef,
        rollback: &mut StyleRollback,
    ) -> Result<()> {
        let mut style = InlineStyle::new();
        for property in StyleProperty::DECORATIVE {
            if let Some(value) = property.full_bleed_value() {
                style.set(property, value);
            }
        }

        host.set_inline_style(element, &style).await?;
        if let Some(child) = host.first_element_child(element).await? {
            rollback.snapshot(host, child).await?;
            host.set_inline_style(child, &style).await?;
        }
        Ok(())
    }

    /// Rasterizes and decodes, retrying once through the proxy when the
    /// first result cannot be decoded.
    async fn render(&self, host: &dyn PageHost, element: ElementRef) -> Result<image::DynamicImage> {
        let request = RasterRequest {
            scale: self.options.scale,
            use_cors: self.options.use_cors,
            proxy_url: self.options.proxy_url.clone(),
        };

        let bytes = self.rasterize(host, element, &request).await?;
        match image::load_from_memory(&bytes) {
            Ok(decoded) => Ok(decoded),
            Err(err) if request.proxy_url.is_some() => {
                tracing::warn!(%element, error = %err, "decode failed; retrying through proxy");
                // Let in-flight proxied asset fetches land before re-rendering.
                sleep(Duration::from_millis(100)).await;
                let bytes = self.rasterize(host, element, &request).await?;
                image::load_from_memory(&bytes).map_err(DexError::Decode)
            }
            Err(err) => Err(DexError::Decode(err)),
        }
    }

    async fn rasterize(
        &self,
        host: &dyn PageHost,
        element: ElementRef,
        request: &RasterRequest,
    ) -> Result<Vec<u8>> {
        match timeout(self.options.timeout, host.rasterize(element, request)).await {
            Ok(result) => result,
            Err(_) => Err(DexError::CaptureTimeout(self.options.timeout)),
        }
    }
}

/// Overrides only the properties that hide the element, leaving its layout
/// mode alone.
fn reveal_style(style: &ComputedStyle) -> InlineStyle {
    let mut reveal = InlineStyle::new();
    if style.display == "none" {
        reveal.set(StyleProperty::Display, "block");
    }
    if style.visibility == "hidden" {
        reveal.set(StyleProperty::Visibility, "visible");
    }
    if style.opacity <= 0.0 {
        reveal.set(StyleProperty::Opacity, "1");
    }
    reveal
}

fn invalid_size(info: &ElementInfo) -> DexError {
    DexError::InvalidElementSize {
        tag: info.tag.clone(),
        class_name: info.class_name.clone(),
        id: info.id.clone(),
        offset_width: info.offset_width,
        offset_height: info.offset_height,
        width: info.bounding_box.width,
        height: info.bounding_box.height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryElement, MemoryHost, RasterOutput};
    use crate::types::{ComputedStyle, ImageInfo};

    fn engine() -> CaptureEngine {
        CaptureEngine::new(CaptureOptions {
            readiness: ReadinessOptions {
                settle_delay: Duration::ZERO,
                ..ReadinessOptions::default()
            },
            ..CaptureOptions::default()
        })
    }

    #[test]
    fn background_parsing() {
        assert_eq!(parse_background("#ffffff"), Some(WHITE));
        assert_eq!(parse_background("#102030"), Some(Rgba([16, 32, 48, 255])));
        assert_eq!(parse_background("Black"), Some(Rgba([0, 0, 0, 255])));
        assert_eq!(parse_background("transparent"), None);
        assert_eq!(parse_background("not-a-colour"), Some(WHITE));
    }

    #[tokio::test(start_paused = true)]
    async fn captures_at_scale_and_restores_styles() {
        let host = MemoryHost::new();
        let child = host.add_element(
            MemoryElement::sized("SECTION", "slide", 640.0, 360.0)
                .with_inline(StyleProperty::Padding, "24px"),
        );
        let el = host.add_element(
            MemoryElement::sized("DIV", "page-content", 640.0, 360.0)
                .with_inline(StyleProperty::Margin, "8px")
                .with_child(child),
        );

        let bitmap = engine().capture_element(&host, el).await.unwrap();

        assert_eq!((bitmap.width(), bitmap.height()), (1280, 720));
        assert_eq!(host.inline_of(el).get(StyleProperty::Margin), Some("8px"));
        assert_eq!(host.inline_of(el).get(StyleProperty::Overflow), Some(""));
        assert_eq!(host.inline_of(child).get(StyleProperty::Padding), Some("24px"));
        let calls = host.raster_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1.scale, 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_sized_element_fails_with_diagnostics() {
        let host = MemoryHost::new();
        let el = host.add_element(
            MemoryElement::sized("DIV", "page-content", 0.0, 0.0).with_id("deck"),
        );

        let err = engine().capture_element(&host, el).await.unwrap_err();
        match err {
            DexError::InvalidElementSize { tag, id, .. } => {
                assert_eq!(tag, "DIV");
                assert_eq!(id, "deck");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(host.raster_calls().is_empty());
        assert_eq!(host.inline_of(el).get(StyleProperty::Padding), Some(""));
    }

    #[tokio::test(start_paused = true)]
    async fn hidden_element_is_shown_then_restored() {
        let host = MemoryHost::new();
        let el = host.add_element(
            MemoryElement::sized("DIV", "slide", 200.0, 100.0)
                .with_style(ComputedStyle {
                    display: "none".into(),
                    ..ComputedStyle::default()
                })
                .with_inline(StyleProperty::Display, "none"),
        );

        engine().capture_element(&host, el).await.unwrap();
        assert_eq!(host.inline_of(el).get(StyleProperty::Display), Some("none"));
    }

    #[tokio::test(start_paused = true)]
    async fn faded_flex_element_keeps_its_display() {
        let host = MemoryHost::new();
        let el = host.add_element(MemoryElement::sized("DIV", "slide", 200.0, 100.0).with_style(
            ComputedStyle {
                display: "flex".into(),
                visibility: "visible".into(),
                opacity: 0.0,
            },
        ));

        engine().capture_element(&host, el).await.unwrap();

        let (target, first) = host.style_writes().into_iter().next().expect("reveal write");
        assert_eq!(target, el);
        assert_eq!(first, InlineStyle::new().with(StyleProperty::Opacity, "1"));
        assert_eq!(first.get(StyleProperty::Display), None);
        assert_eq!(host.inline_of(el).get(StyleProperty::Opacity), Some(""));
    }

    #[test]
    fn reveal_touches_only_hiding_properties() {
        assert!(reveal_style(&ComputedStyle::default()).is_empty());

        let reveal = reveal_style(&ComputedStyle {
            display: "none".into(),
            visibility: "hidden".into(),
            opacity: 1.0,
        });
        assert_eq!(reveal.get(StyleProperty::Display), Some("block"));
        assert_eq!(reveal.get(StyleProperty::Visibility), Some("visible"));
        assert_eq!(reveal.get(StyleProperty::Opacity), None);
    }

    #[tokio::test(start_paused = true)]
    async fn renderer_timeout_is_a_hard_failure() {
        let host = MemoryHost::new();
        let el = host.add_element(MemoryElement::sized("DIV", "slide", 200.0, 100.0));
        host.queue_rasters(el, [RasterOutput::Hang]);

        let err = engine().capture_element(&host, el).await.unwrap_err();
        assert!(matches!(err, DexError::CaptureTimeout(d) if d == DEFAULT_CAPTURE_TIMEOUT));
    }

    #[tokio::test(start_paused = true)]
    async fn decode_failure_without_proxy_propagates() {
        let host = MemoryHost::new();
        let el = host.add_element(MemoryElement::sized("DIV", "slide", 200.0, 100.0));
        host.queue_rasters(el, [RasterOutput::Corrupt]);

        let err = engine().capture_element(&host, el).await.unwrap_err();
        assert!(matches!(err, DexError::Decode(_)));
        assert_eq!(host.raster_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn decode_failure_with_proxy_retries_once() {
        let host = MemoryHost::new();
        let el = host.add_element(MemoryElement::sized("DIV", "slide", 200.0, 100.0));
        host.queue_rasters(
            el,
            [RasterOutput::Corrupt, RasterOutput::solid(50, 25, [9, 9, 9, 255])],
        );

        let mut options = engine().options().clone();
        options.proxy_url = Some("https://proxy.local/?url=".into());
        let bitmap = CaptureEngine::new(options)
            .capture_element(&host, el)
            .await
            .unwrap();

        assert_eq!((bitmap.width(), bitmap.height()), (50, 25));
        let calls = host.raster_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].1.proxy_url.as_deref(), Some("https://proxy.local/?url="));
    }

    #[tokio::test(start_paused = true)]
    async fn lazy_images_are_activated_and_target_size_applied() {
        let host = MemoryHost::new();
        let el = host.add_element(
            MemoryElement::sized("DIV", "slide", 400.0, 200.0).with_image(
                ImageInfo {
                    data_src: Some("hero.png".into()),
                    lazy: true,
                    ..ImageInfo::default()
                },
                crate::memory::ImageWait::Load,
            ),
        );

        let mut options = engine().options().clone();
        options.target_width = Some(200);
        let bitmap = CaptureEngine::new(options)
            .capture_element(&host, el)
            .await
            .unwrap();

        let image = host.image(el, 0).unwrap();
        assert_eq!(image.src, "hero.png");
        assert!(!image.lazy);
        assert_eq!((bitmap.width(), bitmap.height()), (200, 100));
    }
}
