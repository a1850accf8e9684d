//! Locates the element that represents "the page content".

use crate::host::PageHost;
use crate::types::{ElementInfo, ElementRef};
use crate::Result;

/// Selectors tried in order; the first valid match wins.
pub const DEFAULT_CONTENT_SELECTORS: &[&str] = &[
    ".page-content",
    ".main-content",
    ".content-wrapper",
    ".container",
    ".app-content",
    "[data-content]",
    "[role=\"main\"]",
    ".content",
    "main",
    "#app > div:first-child",
    "#app > .layout",
    "#app > main",
    "#app",
];

/// The wrapper whose first child is preferred over the wrapper itself.
pub const PRIMARY_CONTENT_SELECTOR: &str = ".page-content";

/// Smallest bounding box, per side, accepted as page content.
pub const MIN_CONTENT_SIZE: f32 = 100.0;

/// Visible and at least `min_size` x `min_size` layout pixels.
pub fn is_valid_content(info: &ElementInfo, min_size: f32) -> bool {
    let bbox = &info.bounding_box;
    !bbox.is_empty()
        && !info.computed_style.is_hidden()
        && bbox.width >= min_size
        && bbox.height >= min_size
}

#[derive(Debug, Clone)]
pub struct ContentLocator {
    selectors: Vec<String>,
    primary: String,
    min_size: f32,
}

impl Default for ContentLocator {
    fn default() -> Self {
        Self {
            selectors: DEFAULT_CONTENT_SELECTORS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            primary: PRIMARY_CONTENT_SELECTOR.to_string(),
            min_size: MIN_CONTENT_SIZE,
        }
    }
}

impl ContentLocator {
    pub fn new(selectors: Vec<String>) -> Self {
        Self {
            selectors,
            ..Self::default()
        }
    }

    pub fn selectors(&self) -> &[String] {
        &self.selectors
    }

    /// Returns the best content element, falling back to the document body.
    ///
    /// Lookup errors for individual selectors are logged and skipped; only a
    /// failure to resolve the body itself is returned.
    pub async fn locate(&self, host: &dyn PageHost) -> Result<ElementRef> {
        for selector in &self.selectors {
            match self.try_selector(host, selector).await {
                Ok(Some(element)) => {
                    tracing::debug!(selector = %selector, %element, "content element located");
                    return Ok(element);
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(selector = %selector, error = %err, "content lookup failed");
                }
            }
        }

        tracing::warn!("no suitable content element found; capturing the document body");
        host.body().await
    }

    async fn try_selector(
        &self,
        host: &dyn PageHost,
        selector: &str,
    ) -> Result<Option<ElementRef>> {
        let Some(element) = host.query_selector(selector).await? else {
            return Ok(None);
        };
        if !self.validates(host, element).await? {
            return Ok(None);
        }

        // Skip the decorative shell around the real page when its child holds up.
        if selector == self.primary {
            if let Some(child) = host.first_element_child(element).await? {
                if self.validates(host, child).await? {
                    return Ok(Some(child));
                }
            }
        }
        Ok(Some(element))
    }

    async fn validates(&self, host: &dyn PageHost, element: ElementRef) -> Result<bool> {
        let info = host.describe(element).await?;
        Ok(is_valid_content(&info, self.min_size))
    }
}

/// Locates content with the default selector list.
pub async fn locate_content_element(host: &dyn PageHost) -> Result<ElementRef> {
    ContentLocator::default().locate(host).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryElement, MemoryHost};
    use crate::types::ComputedStyle;

    #[tokio::test]
    async fn prefers_first_child_of_page_content() {
        let host = MemoryHost::new();
        let child = host.add_element(MemoryElement::sized("SECTION", "slide", 1280.0, 720.0));
        let wrapper = host.add_element(
            MemoryElement::sized("DIV", "page-content", 1300.0, 740.0).with_child(child),
        );
        host.bind_selector("/", ".page-content", wrapper);

        assert_eq!(locate_content_element(&host).await.unwrap(), child);
    }

    #[tokio::test]
    async fn keeps_wrapper_when_child_is_too_small() {
        let host = MemoryHost::new();
        let child = host.add_element(MemoryElement::sized("SPAN", "", 40.0, 20.0));
        let wrapper = host.add_element(
            MemoryElement::sized("DIV", "page-content", 1300.0, 740.0).with_child(child),
        );
        host.bind_selector("/", ".page-content", wrapper);

        assert_eq!(locate_content_element(&host).await.unwrap(), wrapper);
    }

    #[tokio::test]
    async fn skips_hidden_and_small_candidates() {
        let host = MemoryHost::new();
        let hidden = host.add_element(
            MemoryElement::sized("DIV", "main-content", 1000.0, 800.0).with_style(ComputedStyle {
                visibility: "hidden".into(),
                ..ComputedStyle::default()
            }),
        );
        let small = host.add_element(MemoryElement::sized("DIV", "container", 99.0, 400.0));
        let main = host.add_element(MemoryElement::sized("MAIN", "", 1000.0, 800.0));
        host.bind_selector("/", ".main-content", hidden);
        host.bind_selector("/", ".container", small);
        host.bind_selector("/", "main", main);

        assert_eq!(locate_content_element(&host).await.unwrap(), main);
    }

    #[tokio::test]
    async fn falls_back_to_body() {
        let host = MemoryHost::new();
        let body = host.add_element(MemoryElement::sized("BODY", "", 1440.0, 900.0));
        host.set_body("/", body);

        assert_eq!(locate_content_element(&host).await.unwrap(), body);
    }

    #[test]
    fn validity_requires_minimum_size() {
        let info = |w: f32, h: f32| MemoryElement::sized("DIV", "", w, h).info;
        assert!(is_valid_content(&info(100.0, 100.0), MIN_CONTENT_SIZE));
        assert!(!is_valid_content(&info(100.0, 99.5), MIN_CONTENT_SIZE));
        assert!(!is_valid_content(&info(0.0, 0.0), MIN_CONTENT_SIZE));
    }
}
