//! [`PageHost`] and [`Navigator`] backed by a Playwright helper session.

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use url::Url;

use super::playwright::{ensure_node_available, ensure_playwright_available, HELPER_SCRIPT};
use super::session::HelperSession;
use crate::config::BrowserConfig;
use crate::host::{ImageLoad, Navigator, PageHost, RasterRequest};
use crate::types::{
    DocumentState, ElementInfo, ElementRef, ImageInfo, InlineStyle, StyleProperty,
};
use crate::{DexError, Result};

#[derive(Deserialize)]
struct RasterReply {
    data: String,
}

#[derive(Deserialize)]
struct ViewportReply {
    width: u32,
    height: u32,
}

/// Launch parameters that are fixed for the life of the browser.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub browser: BrowserConfig,
    /// Device scale factor; rasters come out at this multiple of layout size.
    pub scale: f32,
    pub proxy_url: Option<String>,
}

pub struct PlaywrightHost {
    session: HelperSession,
    base_url: Url,
    scale: f32,
}

impl PlaywrightHost {
    /// Opens `url` in a fresh headless page.
    pub async fn launch(url: &str, options: &LaunchOptions) -> Result<Self> {
        let base_url = Url::parse(url)
            .map_err(|e| DexError::Config(format!("invalid presentation URL {url:?}: {e}")))?;
        let node = &options.browser.node_command;
        ensure_node_available(node).await?;
        ensure_playwright_available(node).await?;

        let viewport = options.browser.viewport;
        let args = vec![
            base_url.to_string(),
            viewport.width.to_string(),
            viewport.height.to_string(),
            options.browser.navigation_timeout.as_millis().to_string(),
            if options.browser.headless { "1" } else { "0" }.to_string(),
            options.scale.to_string(),
            options.proxy_url.clone().unwrap_or_default(),
        ];

        tracing::info!(url = %base_url, %viewport, scale = options.scale, "launching browser");
        let session = HelperSession::spawn(
            node,
            HELPER_SCRIPT,
            &args,
            options.browser.process_timeout,
            options.browser.navigation_timeout + options.browser.process_timeout,
        )
        .await?;

        Ok(Self {
            session,
            base_url,
            scale: options.scale,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn close(self) {
        self.session.shutdown().await;
    }

    async fn element(&self, op: &str, params: Value) -> Result<Option<ElementRef>> {
        let handle: Option<u64> = self.session.call(op, params).await?;
        Ok(handle.map(ElementRef))
    }
}

#[async_trait]
impl PageHost for PlaywrightHost {
    async fn document_state(&self) -> Result<DocumentState> {
        self.session.call("documentState", Value::Null).await
    }

    async fn query_selector(&self, selector: &str) -> Result<Option<ElementRef>> {
        self.element("querySelector", json!({ "selector": selector }))
            .await
    }

    async fn first_element_child(&self, element: ElementRef) -> Result<Option<ElementRef>> {
        self.element("firstElementChild", json!({ "handle": element.0 }))
            .await
    }

    async fn body(&self) -> Result<ElementRef> {
        self.element("body", Value::Null)
            .await?
            .ok_or_else(|| DexError::host("document has no body"))
    }

    async fn viewport_size(&self) -> Result<(u32, u32)> {
        let viewport: ViewportReply = self.session.call("viewport", Value::Null).await?;
        Ok((viewport.width, viewport.height))
    }

    async fn describe(&self, element: ElementRef) -> Result<ElementInfo> {
        self.session
            .call("describe", json!({ "handle": element.0 }))
            .await
    }

    async fn inline_style(
        &self,
        element: ElementRef,
        properties: &[StyleProperty],
    ) -> Result<InlineStyle> {
        let names: Vec<&str> = properties.iter().map(|p| p.css_name()).collect();
        let values: BTreeMap<String, String> = self
            .session
            .call(
                "inlineStyle",
                json!({ "handle": element.0, "properties": names }),
            )
            .await?;

        let mut style = InlineStyle::new();
        for property in properties {
            let value = values.get(property.css_name()).cloned().unwrap_or_default();
            style.set(*property, value);
        }
        Ok(style)
    }

    async fn set_inline_style(&self, element: ElementRef, style: &InlineStyle) -> Result<()> {
        if style.is_empty() {
            return Ok(());
        }
        let _: Value = self
            .session
            .call(
                "setInlineStyle",
                json!({ "handle": element.0, "style": style.to_css_map() }),
            )
            .await?;
        Ok(())
    }

    async fn images(&self, element: ElementRef) -> Result<Vec<ImageInfo>> {
        self.session
            .call("images", json!({ "handle": element.0 }))
            .await
    }

    async fn activate_lazy_image(
        &self,
        element: ElementRef,
        index: usize,
        src: Option<&str>,
    ) -> Result<()> {
        let _: Value = self
            .session
            .call(
                "activateLazyImage",
                json!({ "handle": element.0, "index": index, "src": src }),
            )
            .await?;
        Ok(())
    }

    async fn wait_for_image(&self, element: ElementRef, index: usize) -> Result<ImageLoad> {
        let state: String = self
            .session
            .call("waitForImage", json!({ "handle": element.0, "index": index }))
            .await?;
        Ok(if state == "loaded" {
            ImageLoad::Loaded
        } else {
            ImageLoad::Failed
        })
    }

    async fn rasterize(&self, element: ElementRef, request: &RasterRequest) -> Result<Vec<u8>> {
        if (request.scale - self.scale).abs() > f32::EPSILON {
            tracing::debug!(
                requested = request.scale,
                launched = self.scale,
                "raster scale is fixed at launch; using the launch scale"
            );
        }
        let reply: RasterReply = self
            .session
            .call("rasterize", json!({ "handle": element.0 }))
            .await?;
        base64::engine::general_purpose::STANDARD
            .decode(reply.data)
            .map_err(|e| DexError::capture(format!("invalid raster payload: {e}")))
    }
}

#[async_trait]
impl Navigator for PlaywrightHost {
    async fn navigate(&self, path: &str) -> Result<()> {
        tracing::debug!(path, "navigating");
        let _: Value = self
            .session
            .call("navigate", json!({ "path": path }))
            .await
            .map_err(|err| DexError::navigation(path, err.to_string()))?;
        Ok(())
    }

    async fn current_path(&self) -> Result<String> {
        self.session.call("currentPath", Value::Null).await
    }
}
