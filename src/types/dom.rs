//! DOM facts observed by the export pipeline.
//!
//! The pipeline never touches a live DOM directly; a [`crate::PageHost`]
//! reports these values for opaque [`ElementRef`] handles.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque handle to an element owned by a page host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementRef(pub u64);

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "element#{}", self.0)
    }
}

/// Rectangle bounds for an element, in layout pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn aspect_ratio(&self) -> Option<f64> {
        if self.is_empty() {
            None
        } else {
            Some(self.width as f64 / self.height as f64)
        }
    }
}

/// The subset of computed CSS the pipeline cares about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputedStyle {
    pub display: String,
    pub visibility: String,
    pub opacity: f32,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: "block".to_string(),
            visibility: "visible".to_string(),
            opacity: 1.0,
        }
    }
}

impl ComputedStyle {
    pub fn is_hidden(&self) -> bool {
        self.display == "none" || self.visibility == "hidden" || self.opacity <= 0.0
    }
}

/// Everything the locator and capture engine need to know about one element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementInfo {
    pub tag: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub offset_width: f32,
    #[serde(default)]
    pub offset_height: f32,
    pub bounding_box: BoundingBox,
    #[serde(default)]
    pub computed_style: ComputedStyle,
}

impl ElementInfo {
    /// Class-name heuristic for "this element is the page content wrapper".
    pub fn looks_like_page_content(&self) -> bool {
        let class = self.class_name.to_ascii_lowercase();
        class.split_whitespace().any(|c| c == "page-content")
            || class.contains("page")
            || class.contains("content")
    }
}

/// Load state of one `<img>` inside a subtree, indexed in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInfo {
    pub index: usize,
    #[serde(default)]
    pub src: String,
    #[serde(default)]
    pub data_src: Option<String>,
    #[serde(default)]
    pub lazy: bool,
    #[serde(default)]
    pub complete: bool,
    #[serde(default)]
    pub natural_width: u32,
    #[serde(default)]
    pub natural_height: u32,
}

impl ImageInfo {
    pub fn is_loaded(&self) -> bool {
        self.complete && self.natural_width > 0
    }

    pub fn is_deferred(&self) -> bool {
        self.lazy || self.data_src.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadyState {
    Loading,
    Interactive,
    Complete,
}

/// Document load state plus the "application mounted" heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentState {
    pub ready_state: ReadyState,
    pub app_mounted: bool,
}

impl DocumentState {
    pub fn is_ready(&self) -> bool {
        self.ready_state == ReadyState::Complete && self.app_mounted
    }
}

/// Inline style properties the capture engine mutates and later restores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StyleProperty {
    Position,
    Visibility,
    Opacity,
    Display,
    Padding,
    Margin,
    BoxShadow,
    BorderRadius,
    Overflow,
    BackgroundClip,
}

impl StyleProperty {
    pub const ALL: [StyleProperty; 10] = [
        StyleProperty::Position,
        StyleProperty::Visibility,
        StyleProperty::Opacity,
        StyleProperty::Display,
        StyleProperty::Padding,
        StyleProperty::Margin,
        StyleProperty::BoxShadow,
        StyleProperty::BorderRadius,
        StyleProperty::Overflow,
        StyleProperty::BackgroundClip,
    ];

    /// Properties stripped to get a full-bleed capture.
    pub const DECORATIVE: [StyleProperty; 5] = [
        StyleProperty::Padding,
        StyleProperty::Margin,
        StyleProperty::BoxShadow,
        StyleProperty::BorderRadius,
        StyleProperty::Overflow,
    ];

    pub fn css_name(self) -> &'static str {
        match self {
            StyleProperty::Position => "position",
            StyleProperty::Visibility => "visibility",
            StyleProperty::Opacity => "opacity",
            StyleProperty::Display => "display",
            StyleProperty::Padding => "padding",
            StyleProperty::Margin => "margin",
            StyleProperty::BoxShadow => "box-shadow",
            StyleProperty::BorderRadius => "border-radius",
            StyleProperty::Overflow => "overflow",
            StyleProperty::BackgroundClip => "background-clip",
        }
    }

    /// Value that removes decoration for a full-bleed capture.
    pub fn full_bleed_value(self) -> Option<&'static str> {
        match self {
            StyleProperty::Padding | StyleProperty::Margin => Some("0"),
            StyleProperty::BoxShadow => Some("none"),
            StyleProperty::BorderRadius => Some("0"),
            StyleProperty::Overflow => Some("hidden"),
            StyleProperty::BackgroundClip => Some("border-box"),
            _ => None,
        }
    }
}

/// Inline style values keyed by property. An empty string means "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineStyle {
    values: BTreeMap<StyleProperty, String>,
}

impl InlineStyle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, property: StyleProperty, value: impl Into<String>) {
        self.values.insert(property, value.into());
    }

    pub fn with(mut self, property: StyleProperty, value: impl Into<String>) -> Self {
        self.set(property, value);
        self
    }

    pub fn get(&self, property: StyleProperty) -> Option<&str> {
        self.values.get(&property).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StyleProperty, &str)> {
        self.values.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// CSS-name keyed view, as sent to a browser.
    pub fn to_css_map(&self) -> BTreeMap<&'static str, String> {
        self.values
            .iter()
            .map(|(k, v)| (k.css_name(), v.clone()))
            .collect()
    }
}
