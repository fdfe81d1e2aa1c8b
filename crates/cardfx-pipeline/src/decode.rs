//! Image decoding into an RGBA pixel buffer.
//!
//! Accepts raw image bytes (PNG, JPEG, BMP, WebP) and produces the
//! `RgbaImage` every later stage works on. This is the first step of any
//! processing run: raw bytes in, pixels out.

use serde::{Deserialize, Serialize};

use crate::types::{PipelineError, RgbaImage};

/// A decoded source image and what we learned while decoding it.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    /// The decoded pixels.
    pub pixels: RgbaImage,
    /// Metadata about the encoded source.
    pub source: SourceInfo,
}

/// Facts about the encoded input, reported in job metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    /// Detected container format (lowercase), if recognised.
    pub format: Option<String>,
    /// Size of the encoded input in bytes.
    pub byte_len: usize,
}

/// Decode raw image bytes into RGBA.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
pub fn decode_rgba(bytes: &[u8]) -> Result<DecodedImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let format = image::guess_format(bytes)
        .ok()
        .map(|f| format!("{f:?}").to_lowercase());
    let img = image::load_from_memory(bytes)?;
    log::debug!(
        "decoded {} bytes ({}) to {}x{}",
        bytes.len(),
        format.as_deref().unwrap_or("unknown"),
        img.width(),
        img.height(),
    );

    Ok(DecodedImage {
        pixels: img.to_rgba8(),
        source: SourceInfo {
            format,
            byte_len: bytes.len(),
        },
    })
}

/// Encode an RGBA buffer as PNG bytes.
///
/// Shared by tests and by callers that need to hand pixels to something
/// expecting an encoded file.
///
/// # Errors
///
/// Returns the underlying `image` error if encoding fails.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    use image::ImageEncoder;

    let mut buf = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut buf);
    encoder.write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ExtendedColorType::Rgba8,
    )?;
    Ok(buf)
}
