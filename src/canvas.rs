//! Raster surfaces and aspect-ratio cropping.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ColorType, DynamicImage, Rgba, RgbaImage};

use crate::{DexError, Result};

/// An in-memory RGBA raster.
#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap {
    image: RgbaImage,
}

impl Bitmap {
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    /// A surface of `width` x `height` filled with `color`.
    pub fn filled(width: u32, height: u32, color: Rgba<u8>) -> Self {
        Self::new(RgbaImage::from_pixel(width, height, color))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width() as f64 / self.height().max(1) as f64
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Draws `source` at the origin of a new surface sized to it, over an
    /// optional opaque background.
    pub fn composite(source: &DynamicImage, background: Option<Rgba<u8>>) -> Self {
        let source = source.to_rgba8();
        let (width, height) = source.dimensions();
        let mut base = match background {
            Some(color) => RgbaImage::from_pixel(width, height, color),
            None => RgbaImage::new(width, height),
        };
        imageops::overlay(&mut base, &source, 0, 0);
        Self::new(base)
    }

    /// High-quality resample to exactly `width` x `height`.
    pub fn resized(&self, width: u32, height: u32) -> Self {
        Self::new(imageops::resize(
            &self.image,
            width.max(1),
            height.max(1),
            FilterType::Lanczos3,
        ))
    }

    /// Resample to a requested size, deriving a missing side from the
    /// current aspect ratio. Returns `None` when neither side is given.
    pub fn resized_to_target(&self, width: Option<u32>, height: Option<u32>) -> Option<Self> {
        let aspect = self.aspect_ratio();
        let (out_w, out_h) = match (width, height) {
            (None, None) => return None,
            (Some(w), Some(h)) => (w as f64, h as f64),
            (Some(w), None) => (w as f64, (w as f64 / aspect).round()),
            (None, Some(h)) => ((h as f64 * aspect).round(), h as f64),
        };
        let out_w = out_w.round().max(1.0) as u32;
        let out_h = out_h.round().max(1.0) as u32;
        Some(self.resized(out_w, out_h))
    }

    /// True when every pixel in the top-left `sample` x `sample` corner is
    /// transparent or pure black.
    pub fn corner_looks_empty(&self, sample: u32) -> bool {
        let w = self.width().min(sample);
        let h = self.height().min(sample);
        if w == 0 || h == 0 {
            return true;
        }
        (0..h).all(|y| {
            (0..w).all(|x| {
                let Rgba([r, g, b, a]) = *self.image.get_pixel(x, y);
                a == 0 || (r == 0 && g == 0 && b == 0)
            })
        })
    }

    /// Encodes as baseline JPEG. `quality` is in (0, 1].
    pub fn encode_jpeg(&self, quality: f32) -> Result<Vec<u8>> {
        let q = (quality.clamp(0.01, 1.0) * 100.0).round() as u8;
        let rgb = DynamicImage::ImageRgba8(self.image.clone()).to_rgb8();
        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, q)
            .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
            .map_err(|e| DexError::document(format!("JPEG encoding failed: {e}")))?;
        Ok(buf)
    }
}

/// Source rectangle inside a bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub sx: u32,
    pub sy: u32,
    pub width: u32,
    pub height: u32,
}

/// Centered crop of a `src_width` x `src_height` surface that matches the
/// `target_width / target_height` aspect ratio. Only the relatively longer
/// dimension is trimmed, evenly on both sides.
pub fn crop_region(
    src_width: u32,
    src_height: u32,
    target_width: f64,
    target_height: f64,
) -> CropRegion {
    let full = CropRegion {
        sx: 0,
        sy: 0,
        width: src_width,
        height: src_height,
    };
    if src_width == 0 || src_height == 0 || !(target_width > 0.0) || !(target_height > 0.0) {
        return full;
    }

    let target_ratio = target_width / target_height;
    let src_ratio = src_width as f64 / src_height as f64;

    if src_ratio > target_ratio {
        let width = ((src_height as f64 * target_ratio).round() as u32).clamp(1, src_width);
        let sx = ((src_width - width) as f64 / 2.0).round() as u32;
        CropRegion {
            sx,
            sy: 0,
            width,
            height: src_height,
        }
    } else if src_ratio < target_ratio {
        let height = ((src_width as f64 / target_ratio).round() as u32).clamp(1, src_height);
        let sy = ((src_height - height) as f64 / 2.0).round() as u32;
        CropRegion {
            sx: 0,
            sy,
            width: src_width,
            height,
        }
    } else {
        full
    }
}

/// Crops `bitmap` to the target aspect ratio without stretching. The result
/// keeps the crop's pixel size, not the target's, to avoid a second resample.
pub fn crop_to_aspect(bitmap: &Bitmap, target_width: f64, target_height: f64) -> Bitmap {
    let region = crop_region(bitmap.width(), bitmap.height(), target_width, target_height);
    if region.width == bitmap.width() && region.height == bitmap.height() {
        return bitmap.clone();
    }
    Bitmap::new(
        imageops::crop_imm(
            bitmap.as_image(),
            region.sx,
            region.sy,
            region.width,
            region.height,
        )
        .to_image(),
    )
}
