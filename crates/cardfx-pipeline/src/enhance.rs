//! Tone adjustments: brightness, contrast, saturation and auto-enhance.
//!
//! Each adjustment is an independent in-place pass over the buffer. They
//! compose, but order matters; [`apply_enhancements`] fixes the order as
//! auto-enhance, brightness, contrast, saturation, sharpen.

use serde::{Deserialize, Serialize};

use crate::color::{luminance, to_channel};
use crate::sharpen::apply_sharpen;
use crate::types::{PipelineError, RgbaImage};

/// Allowed range for brightness, contrast and saturation amounts.
pub const ADJUSTMENT_RANGE: std::ops::RangeInclusive<f32> = -100.0..=100.0;

/// Share of dark pixels above which auto-enhance brightens.
pub const AUTO_DARK_FRACTION: f64 = 0.3;

/// Share of bright pixels below which auto-enhance adds contrast.
pub const AUTO_BRIGHT_FRACTION: f64 = 0.1;

/// Brightness added by auto-enhance for dark images.
pub const AUTO_BRIGHTNESS: f32 = 20.0;

/// Contrast added by auto-enhance for flat images.
pub const AUTO_CONTRAST: f32 = 15.0;

/// Tone adjustments for the processing stage.
///
/// The default value changes nothing.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EnhancementOptions {
    /// Additive brightness, `-100..=100`.
    pub brightness: f32,
    /// Contrast amount, `-100..=100`.
    pub contrast: f32,
    /// Saturation amount, `-100..=100` (`-100` is grayscale).
    pub saturation: f32,
    /// Run the 3×3 sharpen kernel last.
    pub sharpen: bool,
    /// Run the histogram-driven auto-enhance pre-pass.
    pub auto_enhance: bool,
}

impl EnhancementOptions {
    /// Whether applying these options would leave the image unchanged.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.brightness == 0.0
            && self.contrast == 0.0
            && self.saturation == 0.0
            && !self.sharpen
            && !self.auto_enhance
    }

    /// Check that every amount lies in [`ADJUSTMENT_RANGE`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the bad field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        for (name, value) in [
            ("brightness", self.brightness),
            ("contrast", self.contrast),
            ("saturation", self.saturation),
        ] {
            if !ADJUSTMENT_RANGE.contains(&value) {
                return Err(PipelineError::InvalidConfig(format!(
                    "{name} must be within [-100, 100], got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// What the auto-enhance pre-pass measured and applied.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoCorrection {
    /// Fraction of pixels with brightness in the bottom quarter.
    pub dark_fraction: f64,
    /// Fraction of pixels with brightness in the top quarter.
    pub bright_fraction: f64,
    /// Brightness that was added (0 or [`AUTO_BRIGHTNESS`]).
    pub brightness: f32,
    /// Contrast that was added (0 or [`AUTO_CONTRAST`]).
    pub contrast: f32,
}

/// Add `amount` to every colour channel.
pub fn adjust_brightness(image: &mut RgbaImage, amount: f32) {
    map_rgb(image, |c, _| c + amount);
}

/// Scale channel distance from 128 by the standard contrast gain
/// `259 (c + 255) / (255 (259 - c))`.
pub fn adjust_contrast(image: &mut RgbaImage, amount: f32) {
    let factor = contrast_factor(amount);
    map_rgb(image, |c, _| (c - 128.0).mul_add(factor, 128.0));
}

/// Blend each channel with the pixel's luminance by `(amount + 100) / 100`.
pub fn adjust_saturation(image: &mut RgbaImage, amount: f32) {
    let factor = (amount + 100.0) / 100.0;
    map_rgb(image, |c, lum| (c - lum).mul_add(factor, lum));
}

/// Contrast gain for an amount in `-255..259`.
#[must_use]
pub fn contrast_factor(amount: f32) -> f32 {
    (259.0 * (amount + 255.0)) / (255.0 * (259.0 - amount))
}

/// 256-bin histogram of unweighted per-pixel brightness.
#[must_use]
pub fn brightness_histogram(image: &RgbaImage) -> [u64; 256] {
    let mut bins = [0u64; 256];
    for pixel in image.pixels() {
        let [r, g, b, _] = pixel.0;
        let mean = (u16::from(r) + u16::from(g) + u16::from(b)) / 3;
        bins[usize::from(mean)] += 1;
    }
    bins
}

/// Histogram-driven correction for under-exposed or flat images.
///
/// More than 30% of pixels in the bottom quarter of the brightness range
/// adds +20 brightness; fewer than 10% in the top quarter adds +15
/// contrast. The thresholds are fixed.
pub fn auto_enhance(image: &mut RgbaImage) -> AutoCorrection {
    let bins = brightness_histogram(image);
    let total: u64 = bins.iter().sum();
    if total == 0 {
        return AutoCorrection::default();
    }

    #[allow(clippy::cast_precision_loss)]
    let fraction = |range: std::ops::Range<usize>| {
        bins[range].iter().sum::<u64>() as f64 / total as f64
    };
    let mut correction = AutoCorrection {
        dark_fraction: fraction(0..64),
        bright_fraction: fraction(192..256),
        ..AutoCorrection::default()
    };

    if correction.dark_fraction > AUTO_DARK_FRACTION {
        adjust_brightness(image, AUTO_BRIGHTNESS);
        correction.brightness = AUTO_BRIGHTNESS;
    }
    if correction.bright_fraction < AUTO_BRIGHT_FRACTION {
        adjust_contrast(image, AUTO_CONTRAST);
        correction.contrast = AUTO_CONTRAST;
    }
    log::debug!("auto-enhance: {correction:?}");
    correction
}

/// Apply every configured adjustment in order.
///
/// Returns the auto-enhance correction, or the default (nothing applied)
/// when auto-enhance is off.
pub fn apply_enhancements(image: &mut RgbaImage, options: &EnhancementOptions) -> AutoCorrection {
    let correction = if options.auto_enhance {
        auto_enhance(image)
    } else {
        AutoCorrection::default()
    };
    if options.brightness != 0.0 {
        adjust_brightness(image, options.brightness);
    }
    if options.contrast != 0.0 {
        adjust_contrast(image, options.contrast);
    }
    if options.saturation != 0.0 {
        adjust_saturation(image, options.saturation);
    }
    if options.sharpen {
        *image = apply_sharpen(image);
    }
    correction
}

/// Map R, G and B through `f(channel, luminance)`, leaving alpha alone.
fn map_rgb(image: &mut RgbaImage, f: impl Fn(f32, f32) -> f32) {
    for pixel in image.pixels_mut() {
        let [r, g, b, _] = pixel.0.map(f32::from);
        let lum = luminance(r, g, b);
        for (c, value) in [r, g, b].into_iter().enumerate() {
            pixel.0[c] = to_channel(f(value, lum));
        }
    }
}
