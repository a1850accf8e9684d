use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Browser viewport in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1440,
            height: 900,
        }
    }
}

impl Viewport {
    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height.max(1) as f64
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ViewportParseError {
    #[error("expected WIDTHxHEIGHT (e.g. 1440x900), got {0:?}")]
    InvalidFormat(String),
    #[error("invalid {axis}: {value:?}")]
    InvalidNumber { axis: &'static str, value: String },
    #[error("viewport dimensions must be positive")]
    Zero,
}

impl FromStr for Viewport {
    type Err = ViewportParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('×', "x");
        let Some((w, h)) = normalized.split_once('x') else {
            return Err(ViewportParseError::InvalidFormat(s.to_string()));
        };
        if h.contains('x') {
            return Err(ViewportParseError::InvalidFormat(s.to_string()));
        }

        let parse = |axis: &'static str, value: &str| {
            value
                .trim()
                .parse::<u32>()
                .map_err(|_| ViewportParseError::InvalidNumber {
                    axis,
                    value: value.trim().to_string(),
                })
        };
        let viewport = Viewport {
            width: parse("width", w)?,
            height: parse("height", h)?,
        };
        if viewport.width == 0 || viewport.height == 0 {
            return Err(ViewportParseError::Zero);
        }
        Ok(viewport)
    }
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Accepts `"1280x720"` as well as `{ width = 1280, height = 720 }`.
impl<'de> Deserialize<'de> for Viewport {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Table { width: u32, height: u32 },
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
            Raw::Table { width, height } => {
                if width == 0 || height == 0 {
                    Err(serde::de::Error::custom(ViewportParseError::Zero))
                } else {
                    Ok(Viewport { width, height })
                }
            }
        }
    }
}
