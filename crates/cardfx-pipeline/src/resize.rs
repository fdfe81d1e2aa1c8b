//! Downscaling for previews, thumbnails and blurred placeholders.
//!
//! Images are only ever shrunk: if the longest side is already within
//! the requested bound the buffer is returned unchanged.

use std::fmt;

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::types::RgbaImage;

/// Resampling filter used when downscaling.
///
/// Ordered from fastest/lowest-quality to slowest/highest-quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResizeFilter {
    /// Nearest-neighbor: fastest, blocky artifacts.
    Nearest,
    /// Bilinear interpolation: fast, decent quality.
    #[default]
    Triangle,
    /// Bicubic (Catmull-Rom): moderate speed, good quality.
    CatmullRom,
    /// Gaussian: moderate speed, smooth output.
    Gaussian,
    /// Lanczos with 3 lobes: slowest, sharpest/best for photos.
    Lanczos3,
}

impl ResizeFilter {
    /// Convert to the `image` crate's `FilterType`.
    const fn to_image_filter(self) -> image::imageops::FilterType {
        match self {
            Self::Nearest => image::imageops::FilterType::Nearest,
            Self::Triangle => image::imageops::FilterType::Triangle,
            Self::CatmullRom => image::imageops::FilterType::CatmullRom,
            Self::Gaussian => image::imageops::FilterType::Gaussian,
            Self::Lanczos3 => image::imageops::FilterType::Lanczos3,
        }
    }
}

impl fmt::Display for ResizeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => f.write_str("Nearest"),
            Self::Triangle => f.write_str("Triangle"),
            Self::CatmullRom => f.write_str("CatmullRom"),
            Self::Gaussian => f.write_str("Gaussian"),
            Self::Lanczos3 => f.write_str("Lanczos3"),
        }
    }
}

/// Target size that fits `(width, height)` within `max_dimension` on its
/// longest side, preserving aspect ratio. Never upsizes; never returns a
/// zero side for a non-empty input.
#[must_use]
pub fn fit_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_dimension || longest == 0 {
        return (width, height);
    }
    let scale = f64::from(max_dimension) / f64::from(longest);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let scaled = |side: u32| ((f64::from(side) * scale).round() as u32).max(1);
    (scaled(width), scaled(height))
}

/// Downscale so the longest side is at most `max_dimension`.
///
/// Returns the (possibly unchanged) image and whether resizing was
/// actually applied.
#[must_use]
pub fn fit_within(image: &RgbaImage, max_dimension: u32, filter: ResizeFilter) -> (RgbaImage, bool) {
    let (w, h) = image.dimensions();
    let (tw, th) = fit_dimensions(w, h, max_dimension);
    if (tw, th) == (w, h) {
        return (image.clone(), false);
    }
    (
        image::imageops::resize(image, tw, th, filter.to_image_filter()),
        true,
    )
}

/// Tiny, blurred stand-in shown while the real preview loads.
///
/// Downscales to `size` on the longest side, then applies a Gaussian
/// blur with `sigma`. Non-positive sigma skips the blur, since
/// `imageproc`'s blur panics on `sigma <= 0.0`.
#[must_use]
pub fn placeholder(image: &RgbaImage, size: u32, sigma: f32) -> RgbaImage {
    let (small, _) = fit_within(image, size, ResizeFilter::Triangle);
    if sigma <= 0.0 || small.width() == 0 || small.height() == 0 {
        return small;
    }
    gaussian_blur_rgba(&small, sigma)
}

/// Blur each RGBA channel independently with
/// [`imageproc::filter::gaussian_blur_f32`], which works on single-channel
/// images.
fn gaussian_blur_rgba(image: &RgbaImage, sigma: f32) -> RgbaImage {
    let (w, h) = image.dimensions();
    let blurred: [GrayImage; 4] = std::array::from_fn(|c| {
        let channel = GrayImage::from_fn(w, h, |x, y| image::Luma([image.get_pixel(x, y).0[c]]));
        imageproc::filter::gaussian_blur_f32(&channel, sigma)
    });
    RgbaImage::from_fn(w, h, |x, y| {
        image::Rgba(std::array::from_fn(|c| blurred[c].get_pixel(x, y).0[0]))
    })
}
