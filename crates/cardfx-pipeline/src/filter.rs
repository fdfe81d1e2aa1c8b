//! Named per-pixel filter effects.
//!
//! Each [`FilterKind`] is a closed-form function of a pixel's `(r, g, b)`.
//! The fully transformed value is clamped to `[0, 255]` and then blended
//! with the original by the filter intensity:
//!
//! ```text
//! out = orig + (transformed - orig) * intensity
//! ```
//!
//! so intensity `0.0` leaves the buffer untouched and intensity `1.0`
//! yields exactly the rounded closed form. Alpha is never modified.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::color::{HexColor, luminance, to_channel};
use crate::types::{PipelineError, RgbaImage};

/// The available filter effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterKind {
    /// Warm, faded print look.
    Vintage,
    /// Classic sepia tone matrix.
    Sepia,
    /// BT.601 grayscale.
    BlackAndWhite,
    /// Grayscale tinted toward a team colour.
    TeamColors,
    /// Saturation boost followed by a contrast stretch.
    Hdr,
    /// Half-desaturated, strong contrast.
    Dramatic,
    /// Lifted blacks, reduced contrast.
    Soft,
    /// Strong saturation boost.
    Vivid,
}

impl FilterKind {
    /// Every filter, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::Vintage,
        Self::Sepia,
        Self::BlackAndWhite,
        Self::TeamColors,
        Self::Hdr,
        Self::Dramatic,
        Self::Soft,
        Self::Vivid,
    ];

    /// Stable lowercase name (matches the serde representation).
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Vintage => "vintage",
            Self::Sepia => "sepia",
            Self::BlackAndWhite => "blackAndWhite",
            Self::TeamColors => "teamColors",
            Self::Hdr => "hdr",
            Self::Dramatic => "dramatic",
            Self::Soft => "soft",
            Self::Vivid => "vivid",
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which filter to apply and how strongly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    /// The effect.
    #[serde(rename = "type")]
    pub kind: FilterKind,
    /// Blend factor in `[0, 1]` between original and filtered pixels.
    pub intensity: f32,
    /// Tint for [`FilterKind::TeamColors`]; ignored by other filters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_color: Option<HexColor>,
}

impl FilterOptions {
    /// Full-strength options for `kind`.
    #[must_use]
    pub const fn new(kind: FilterKind) -> Self {
        Self {
            kind,
            intensity: 1.0,
            team_color: None,
        }
    }

    /// Set the blend intensity.
    #[must_use]
    pub const fn with_intensity(mut self, intensity: f32) -> Self {
        self.intensity = intensity;
        self
    }

    /// Set the team colour.
    #[must_use]
    pub const fn with_team_color(mut self, color: HexColor) -> Self {
        self.team_color = Some(color);
        self
    }

    /// Check that the intensity is a finite value in `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] otherwise.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if (0.0..=1.0).contains(&self.intensity) {
            Ok(())
        } else {
            Err(PipelineError::InvalidConfig(format!(
                "filter intensity must be within [0, 1], got {}",
                self.intensity
            )))
        }
    }
}

/// Apply a filter effect to every pixel of `image` in place.
///
/// Out-of-range intensities are clamped into `[0, 1]`; NaN counts as 0.
pub fn apply_filter(image: &mut RgbaImage, options: &FilterOptions) {
    let intensity = if options.intensity.is_nan() {
        0.0
    } else {
        options.intensity.clamp(0.0, 1.0)
    };
    if intensity == 0.0 {
        return;
    }

    let tint = options.team_color.unwrap_or(HexColor::WHITE);
    for pixel in image.pixels_mut() {
        let [r, g, b, _] = pixel.0;
        let orig = [f32::from(r), f32::from(g), f32::from(b)];
        let full = transform(options.kind, orig, tint);
        for c in 0..3 {
            let target = full[c].clamp(0.0, 255.0);
            let blended = if intensity >= 1.0 {
                target
            } else {
                (target - orig[c]).mul_add(intensity, orig[c])
            };
            pixel.0[c] = to_channel(blended);
        }
    }
}

/// The full-strength closed form of `kind`, before clamping.
#[must_use]
pub fn transform(kind: FilterKind, [r, g, b]: [f32; 3], tint: HexColor) -> [f32; 3] {
    match kind {
        FilterKind::Vintage => [
            0.1f32.mul_add(g, 0.9 * r) + 30.0,
            0.1f32.mul_add(r, 0.85 * g) + 20.0,
            0.7f32.mul_add(b, 10.0),
        ],
        FilterKind::Sepia => [
            0.393f32.mul_add(r, 0.769f32.mul_add(g, 0.189 * b)),
            0.349f32.mul_add(r, 0.686f32.mul_add(g, 0.168 * b)),
            0.272f32.mul_add(r, 0.534f32.mul_add(g, 0.131 * b)),
        ],
        FilterKind::BlackAndWhite => {
            let lum = luminance(r, g, b);
            [lum, lum, lum]
        }
        FilterKind::TeamColors => {
            let lum = luminance(r, g, b);
            let tinted = |channel: u8| (lum * (f32::from(channel) / 255.0) * 1.5).min(255.0);
            [tinted(tint.r), tinted(tint.g), tinted(tint.b)]
        }
        FilterKind::Hdr => {
            let lum = luminance(r, g, b);
            [r, g, b].map(|c| {
                let saturated = (c - lum).mul_add(1.2, lum);
                (saturated - 128.0).mul_add(1.3, 128.0)
            })
        }
        FilterKind::Dramatic => {
            let lum = luminance(r, g, b);
            [r, g, b].map(|c| (f32::midpoint(c, lum) - 128.0).mul_add(1.5, 128.0))
        }
        FilterKind::Soft => [r, g, b].map(|c| 0.85f32.mul_add(c, 30.0)),
        FilterKind::Vivid => {
            let lum = luminance(r, g, b);
            [r, g, b].map(|c| (c - lum).mul_add(1.5, lum))
        }
    }
}
