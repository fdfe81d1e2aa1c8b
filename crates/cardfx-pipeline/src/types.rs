//! Shared types for the cardfx image processing pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::enhance::EnhancementOptions;
use crate::filter::FilterOptions;
use crate::pipeline::StageKind;
use crate::resize::ResizeFilter;

/// Re-export `RgbaImage` so downstream crates can reference pixel
/// buffers without depending on `image` directly.
pub use image::RgbaImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of an RGBA buffer.
    #[must_use]
    pub fn of(image: &RgbaImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }

    /// Returns `true` if either side is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// What kind of subject a [`DetectedRegion`] is believed to contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RegionKind {
    /// Block dominated by skin-tone pixels.
    Face,
    /// Highest-contrast block in the image.
    Object,
}

/// A rectangular area of interest found by the subject detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectedRegion {
    /// Left edge in pixels.
    pub x: u32,
    /// Top edge in pixels.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Detection confidence in `[0, 1]`.
    pub confidence: f64,
    /// Region classification.
    pub kind: RegionKind,
}

impl DetectedRegion {
    /// Horizontal and vertical center of the region.
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (
            f64::from(self.x) + f64::from(self.width) / 2.0,
            f64::from(self.y) + f64::from(self.height) / 2.0,
        )
    }
}

/// The composition rule that produced a [`CropSuggestion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CropRule {
    /// Anchored on the upper-left rule-of-thirds intersection.
    Thirds,
    /// Largest centered rectangle.
    Center,
    /// Framed around a detected subject.
    SubjectFocused,
}

impl fmt::Display for CropRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Thirds => f.write_str("thirds"),
            Self::Center => f.write_str("center"),
            Self::SubjectFocused => f.write_str("subject"),
        }
    }
}

/// A proposed crop rectangle at a fixed aspect ratio.
///
/// Geometry is kept in floating point so that `width / height` matches
/// the requested ratio exactly; use [`to_pixel_rect`](Self::to_pixel_rect)
/// to obtain an integer rectangle for cropping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropSuggestion {
    /// Left edge in pixels.
    pub x: f64,
    /// Top edge in pixels.
    pub y: f64,
    /// Width in pixels.
    pub width: f64,
    /// Height in pixels.
    pub height: f64,
    /// The requested `width / height` ratio.
    pub aspect_ratio: f64,
    /// Which rule produced the suggestion.
    pub rule: CropRule,
    /// Ranking confidence in `[0, 1]`.
    pub confidence: f64,
}

impl CropSuggestion {
    /// Round to an integer rectangle that lies inside `bounds`.
    ///
    /// The origin is rounded down and the size rounded to nearest, then
    /// both are clamped so that the rectangle is at least 1×1 (for
    /// non-empty bounds) and never leaves the image.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn to_pixel_rect(&self, bounds: Dimensions) -> PixelRect {
        let x = (self.x.max(0.0).floor() as u32).min(bounds.width.saturating_sub(1));
        let y = (self.y.max(0.0).floor() as u32).min(bounds.height.saturating_sub(1));
        let width = (self.width.round().max(1.0) as u32).min(bounds.width - x.min(bounds.width));
        let height =
            (self.height.round().max(1.0) as u32).min(bounds.height - y.min(bounds.height));
        PixelRect {
            x,
            y,
            width,
            height,
        }
    }
}

/// An integer rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    /// Left edge in pixels.
    pub x: u32,
    /// Top edge in pixels.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// A validated target aspect ratio (`width / height`).
///
/// Always finite and strictly positive. Serialized as a plain number.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct AspectRatio(f64);

impl AspectRatio {
    /// The standard trading card ratio, 2.5in × 3.5in.
    pub const CARD: Self = Self(2.5 / 3.5);

    /// Build from a `width:height` pair.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if either side is not
    /// finite and strictly positive.
    pub fn new(width: f64, height: f64) -> Result<Self, PipelineError> {
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "aspect ratio sides must be positive, got {width}:{height}"
            )));
        }
        Self::from_ratio(width / height)
    }

    /// Build from a precomputed `width / height` value.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `ratio` is not finite
    /// and strictly positive.
    pub fn from_ratio(ratio: f64) -> Result<Self, PipelineError> {
        if ratio.is_finite() && ratio > 0.0 {
            Ok(Self(ratio))
        } else {
            Err(PipelineError::InvalidConfig(format!(
                "aspect ratio must be positive and finite, got {ratio}"
            )))
        }
    }

    /// The ratio as `width / height`.
    #[must_use]
    pub const fn get(self) -> f64 {
        self.0
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self::CARD
    }
}

impl TryFrom<f64> for AspectRatio {
    type Error = PipelineError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::from_ratio(value)
    }
}

impl From<AspectRatio> for f64 {
    fn from(value: AspectRatio) -> Self {
        value.0
    }
}

impl FromStr for AspectRatio {
    type Err = PipelineError;

    /// Accepts `"2.5:3.5"`, `"2.5/3.5"` or a bare ratio like `"0.714"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |part: &str| {
            part.trim().parse::<f64>().map_err(|e| {
                PipelineError::InvalidConfig(format!("invalid aspect ratio {s:?}: {e}"))
            })
        };
        match s.split_once([':', '/']) {
            Some((w, h)) => Self::new(parse(w)?, parse(h)?),
            None => Self::from_ratio(parse(s)?),
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

/// Configuration for a full processing run.
///
/// Names which stages run, in which order, and the per-stage options.
/// All parameters have defaults suitable for trading card artwork.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Stages to run, in order.
    pub stages: Vec<StageKind>,

    /// Target crop aspect ratio. `None` disables crop suggestions.
    pub aspect_ratio: Option<AspectRatio>,

    /// Whether the processing stage crops to the best suggestion.
    pub apply_crop: bool,

    /// Optional filter effect applied after cropping.
    pub filter: Option<FilterOptions>,

    /// Brightness/contrast/saturation/sharpen adjustments.
    pub enhancements: EnhancementOptions,

    /// Longest side of the preview image in pixels.
    pub preview_max_dimension: u32,

    /// Longest side of the thumbnail image in pixels.
    pub thumbnail_max_dimension: u32,

    /// Resampling filter for previews and thumbnails.
    pub resize_filter: ResizeFilter,

    /// Longest side of the blurred low-quality placeholder in pixels.
    pub placeholder_size: u32,

    /// Gaussian sigma used to blur the placeholder.
    pub placeholder_sigma: f32,
}

impl PipelineConfig {
    /// Default preview size (longest side, pixels).
    pub const DEFAULT_PREVIEW_MAX_DIMENSION: u32 = 512;

    /// Default thumbnail size (longest side, pixels).
    pub const DEFAULT_THUMBNAIL_MAX_DIMENSION: u32 = 200;

    /// Default placeholder size (longest side, pixels).
    pub const DEFAULT_PLACEHOLDER_SIZE: u32 = 20;

    /// Default placeholder blur sigma.
    pub const DEFAULT_PLACEHOLDER_SIGMA: f32 = 1.5;

    /// Check ranges that the type system does not enforce.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] describing the first
    /// offending field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.stages.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "at least one stage must be configured".into(),
            ));
        }
        if self.preview_max_dimension == 0 || self.thumbnail_max_dimension == 0 {
            return Err(PipelineError::InvalidConfig(
                "preview and thumbnail sizes must be non-zero".into(),
            ));
        }
        if self.placeholder_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "placeholder size must be non-zero".into(),
            ));
        }
        if !self.placeholder_sigma.is_finite() || self.placeholder_sigma < 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "placeholder sigma must be finite and non-negative, got {}",
                self.placeholder_sigma
            )));
        }
        if let Some(filter) = &self.filter {
            filter.validate()?;
        }
        self.enhancements.validate()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stages: StageKind::DEFAULT_ORDER.to_vec(),
            aspect_ratio: Some(AspectRatio::CARD),
            apply_crop: true,
            filter: None,
            enhancements: EnhancementOptions::default(),
            preview_max_dimension: Self::DEFAULT_PREVIEW_MAX_DIMENSION,
            thumbnail_max_dimension: Self::DEFAULT_THUMBNAIL_MAX_DIMENSION,
            resize_filter: ResizeFilter::default(),
            placeholder_size: Self::DEFAULT_PLACEHOLDER_SIZE,
            placeholder_sigma: Self::DEFAULT_PLACEHOLDER_SIGMA,
        }
    }
}

/// Errors that can occur during pipeline processing.
///
/// Uses custom `Serialize`/`Deserialize` because `image::ImageError`
/// does not implement serde traits. The `ImageDecode` variant is
/// serialized as its `Display` string.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
}

impl PipelineError {
    /// Whether this error means the input could not be decoded at all.
    #[must_use]
    pub const fn is_decode_error(&self) -> bool {
        matches!(self, Self::ImageDecode(_) | Self::EmptyInput)
    }
}

/// Serde-compatible proxy for `PipelineError`.
#[derive(Serialize, Deserialize)]
enum PipelineErrorProxy {
    ImageDecode(String),
    EmptyInput,
    InvalidConfig(String),
}

impl Serialize for PipelineError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self {
            Self::ImageDecode(e) => PipelineErrorProxy::ImageDecode(e.to_string()),
            Self::EmptyInput => PipelineErrorProxy::EmptyInput,
            Self::InvalidConfig(s) => PipelineErrorProxy::InvalidConfig(s.clone()),
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PipelineError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = PipelineErrorProxy::deserialize(deserializer)?;
        Ok(match proxy {
            // The typed image::ImageError cannot be rebuilt; keep the message.
            PipelineErrorProxy::ImageDecode(msg) => {
                Self::ImageDecode(image::ImageError::Decoding(
                    image::error::DecodingError::new(
                        image::error::ImageFormatHint::Unknown,
                        msg,
                    ),
                ))
            }
            PipelineErrorProxy::EmptyInput => Self::EmptyInput,
            PipelineErrorProxy::InvalidConfig(s) => Self::InvalidConfig(s),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn aspect_ratio_parses_colon_and_slash() {
        let colon: AspectRatio = "2.5:3.5".parse().unwrap();
        let slash: AspectRatio = "2.5/3.5".parse().unwrap();
        assert!((colon.get() - 2.5 / 3.5).abs() < 1e-12);
        assert!((slash.get() - colon.get()).abs() < 1e-12);
    }

    #[test]
    fn aspect_ratio_parses_bare_number() {
        let ratio: AspectRatio = "1.5".parse().unwrap();
        assert!((ratio.get() - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn aspect_ratio_rejects_zero_and_garbage() {
        assert!("0:1".parse::<AspectRatio>().is_err());
        assert!("1:0".parse::<AspectRatio>().is_err());
        assert!("wide".parse::<AspectRatio>().is_err());
        assert!(AspectRatio::from_ratio(f64::NAN).is_err());
        assert!(AspectRatio::from_ratio(-1.0).is_err());
    }

    #[test]
    fn aspect_ratio_serde_rejects_invalid() {
        let ok: AspectRatio = serde_json::from_str("0.5").unwrap();
        assert!((ok.get() - 0.5).abs() < f64::EPSILON);
        assert!(serde_json::from_str::<AspectRatio>("0").is_err());
    }

    #[test]
    fn pixel_rect_stays_inside_bounds() {
        let suggestion = CropSuggestion {
            x: 14.285,
            y: 0.0,
            width: 71.43,
            height: 100.0,
            aspect_ratio: 0.7143,
            rule: CropRule::Center,
            confidence: 0.5,
        };
        let rect = suggestion.to_pixel_rect(Dimensions {
            width: 100,
            height: 100,
        });
        assert_eq!(rect.x, 14);
        assert_eq!(rect.y, 0);
        assert_eq!(rect.width, 71);
        assert_eq!(rect.height, 100);
    }

    #[test]
    fn default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn config_without_stages_is_rejected() {
        let config = PipelineConfig {
            stages: Vec::new(),
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = PipelineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn partial_config_json_uses_defaults() {
        let config: PipelineConfig = serde_json::from_str(r#"{"applyCrop": false}"#).unwrap();
        assert!(!config.apply_crop);
        assert_eq!(config.stages, StageKind::DEFAULT_ORDER.to_vec());
    }

    #[test]
    fn error_serializes_with_message() {
        let err = PipelineError::InvalidConfig("bad".into());
        let json = serde_json::to_string(&err).unwrap();
        let back: PipelineError = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, PipelineError::InvalidConfig(ref s) if s == "bad"));
    }
}
