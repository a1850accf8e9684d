//! Configuration file support.
//!
//! A TOML file provides defaults for capture, document, file naming,
//! readiness and browser settings plus the static page list. CLI flags
//! override individual values when explicitly given.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::PageDescriptor;
use crate::Viewport;

/// Environment variable consulted for the cross-origin proxy prefix.
pub const PROXY_URL_ENV: &str = "DEX_PROXY_URL";

/// Upper bound applied to the lossy encoding quality.
pub const MAX_ENCODE_QUALITY: f32 = 0.95;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(flatten)]
    pub export: ExportConfig,
    pub browser: BrowserConfig,
    pub pages: Vec<PageDescriptor>,
}

/// Settings the export pipeline consumes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub pdf: PdfConfig,
    pub capture: CaptureConfig,
    pub file: FileConfig,
    pub readiness: ReadinessConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PdfFormat {
    #[default]
    A4,
    A3,
    Letter,
}

impl PdfFormat {
    /// Portrait width and height in millimetres.
    pub fn portrait_mm(self) -> (f64, f64) {
        match self {
            PdfFormat::A4 => (210.0, 297.0),
            PdfFormat::A3 => (297.0, 420.0),
            PdfFormat::Letter => (215.9, 279.4),
        }
    }

    pub fn oriented_mm(self, orientation: Orientation) -> (f64, f64) {
        let (w, h) = self.portrait_mm();
        match orientation {
            Orientation::Portrait => (w, h),
            Orientation::Landscape => (h, w),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    #[default]
    Landscape,
}

/// Page margins in millimetres.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Margin {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Margin {
    pub fn is_zero(&self) -> bool {
        self.top == 0.0 && self.right == 0.0 && self.bottom == 0.0 && self.left == 0.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    pub format: PdfFormat,
    pub orientation: Orientation,
    pub margin: Margin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub quality: f32,
    pub scale: f32,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub wait_for_images: bool,
    pub use_cors: bool,
    pub background_color: String,
    pub proxy_url: Option<String>,
    pub full_bleed: bool,
    #[serde(with = "humantime_serde")]
    pub readiness_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub settle_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub image_timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            quality: MAX_ENCODE_QUALITY,
            scale: 2.0,
            timeout: Duration::from_millis(15_000),
            wait_for_images: true,
            use_cors: true,
            background_color: "#ffffff".to_string(),
            proxy_url: None,
            full_bleed: true,
            readiness_timeout: Duration::from_millis(15_000),
            settle_delay: Duration::from_millis(500),
            image_timeout: Duration::from_millis(5_000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub name_template: String,
    pub include_timestamp: bool,
    pub compression: bool,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            name_template: "export-{timestamp}".to_string(),
            include_timestamp: true,
            compression: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Soft timeout for the readiness wait after each navigation.
    #[serde(with = "humantime_serde")]
    pub page_ready_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Delay after the document reports ready, to absorb late layout.
    #[serde(with = "humantime_serde")]
    pub settle_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub post_navigation_delay: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            page_ready_timeout: Duration::from_millis(2_000),
            poll_interval: Duration::from_millis(100),
            settle_delay: Duration::from_millis(300),
            post_navigation_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub node_command: String,
    pub headless: bool,
    pub viewport: Viewport,
    #[serde(with = "humantime_serde")]
    pub navigation_timeout: Duration,
    /// Upper bound for any single request to the browser helper.
    #[serde(with = "humantime_serde")]
    pub process_timeout: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            node_command: "node".to_string(),
            headless: true,
            viewport: Viewport::default(),
            navigation_timeout: Duration::from_secs(30),
            process_timeout: Duration::from_secs(45),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{0}")]
    Invalid(String),
}

impl Config {
    /// `~/.config/dex/config.toml`, when a config directory is known.
    pub fn central_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("dex").join("config.toml"))
    }

    /// Priority: explicit path > central config (if it exists) > defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut cfg = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::central_config_path() {
                Some(central) if central.is_file() => Self::from_file(&central)?,
                _ => Self::default(),
            },
        };
        cfg.apply_env();
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    fn apply_env(&mut self) {
        if self.export.capture.proxy_url.is_none() {
            if let Ok(proxy) = std::env::var(PROXY_URL_ENV) {
                if !proxy.trim().is_empty() {
                    self.export.capture.proxy_url = Some(proxy);
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.export.validate()?;
        if self.browser.node_command.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "browser.node_command must not be empty".to_string(),
            ));
        }
        if self.browser.navigation_timeout.is_zero() || self.browser.process_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "browser timeouts must be greater than zero".to_string(),
            ));
        }
        for page in &self.pages {
            if page.path.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "page '{}' has an empty path",
                    page.title
                )));
            }
        }
        Ok(())
    }
}

impl ExportConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let capture = &self.capture;
        if !(capture.scale > 0.0) || !capture.scale.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "capture.scale must be positive (got {})",
                capture.scale
            )));
        }
        if !(capture.quality > 0.0 && capture.quality <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "capture.quality must be in (0, 1] (got {})",
                capture.quality
            )));
        }
        if capture.timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "capture.timeout must be greater than zero".to_string(),
            ));
        }
        if self.readiness.poll_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "readiness.poll_interval must be greater than zero".to_string(),
            ));
        }
        if self.file.name_template.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "file.name_template must not be empty".to_string(),
            ));
        }
        let margin = &self.pdf.margin;
        if [margin.top, margin.right, margin.bottom, margin.left]
            .iter()
            .any(|m| *m < 0.0)
        {
            return Err(ConfigError::Invalid(
                "pdf.margin values must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values_match_expected() {
        let cfg = Config::default();

        assert_eq!(cfg.browser.viewport.width, 1440);
        assert_eq!(cfg.browser.viewport.height, 900);
        assert!((cfg.export.capture.scale - 2.0).abs() < f32::EPSILON);
        assert!((cfg.export.capture.quality - 0.95).abs() < f32::EPSILON);
        assert_eq!(cfg.export.capture.timeout, Duration::from_millis(15_000));
        assert_eq!(cfg.export.capture.background_color, "#ffffff");
        assert_eq!(cfg.export.pdf.format, PdfFormat::A4);
        assert_eq!(cfg.export.pdf.orientation, Orientation::Landscape);
        assert!(cfg.export.pdf.margin.is_zero());
        assert_eq!(cfg.export.file.name_template, "export-{timestamp}");
        assert!(cfg.pages.is_empty());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn parses_sections_and_pages() {
        let cfg = Config::from_toml_str(
            r##"
[capture]
scale = 1.5
timeout = "20s"
background_color = "#000000"

[pdf]
format = "letter"
orientation = "portrait"

[pdf.margin]
top = 5.0

[file]
name_template = "deck-{timestamp}"

[browser]
headless = false
viewport = { width = 1280, height = 720 }

[[pages]]
path = "/intro"
title = "Intro"
pageNumber = 1

[[pages]]
path = "/outro"
title = "Outro"
pageNumber = 2
hidden = true
"##,
        )
        .expect("config parses");

        assert!((cfg.export.capture.scale - 1.5).abs() < f32::EPSILON);
        assert_eq!(cfg.export.capture.timeout, Duration::from_secs(20));
        assert_eq!(cfg.export.pdf.format, PdfFormat::Letter);
        assert_eq!(cfg.export.pdf.orientation, Orientation::Portrait);
        assert_eq!(cfg.export.pdf.margin.top, 5.0);
        assert_eq!(cfg.export.file.name_template, "deck-{timestamp}");
        assert!(!cfg.browser.headless);
        assert_eq!(cfg.browser.viewport.width, 1280);
        assert_eq!(cfg.pages.len(), 2);
        assert_eq!(cfg.pages[0].page_number, Some(1));
        assert!(cfg.pages[1].hidden);
        // untouched defaults survive
        assert_eq!(cfg.export.capture.image_timeout, Duration::from_secs(5));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = Config::default();
        cfg.export.capture.scale = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.export.capture.quality = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.export.file.name_template = "  ".into();
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.export.pdf.margin.left = -1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn oriented_dimensions_swap_for_landscape() {
        assert_eq!(
            PdfFormat::A4.oriented_mm(Orientation::Landscape),
            (297.0, 210.0)
        );
        assert_eq!(PdfFormat::A4.oriented_mm(Orientation::Portrait), (210.0, 297.0));
    }

    #[test]
    fn load_missing_explicit_path_fails() {
        let err = Config::load(Some(Path::new("/definitely/not/here.toml")));
        assert!(matches!(err, Err(ConfigError::Read { .. })));
    }
}
