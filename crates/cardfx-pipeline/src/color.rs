//! Colour helpers shared by the filter and enhancement stages.
//!
//! Everything here works on `f32` channel values in the nominal
//! `[0, 255]` range; callers round and clamp back to `u8` with
//! [`to_channel`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::PipelineError;

/// ITU-R BT.601 luma of an RGB triple.
#[must_use]
pub fn luminance(r: f32, g: f32, b: f32) -> f32 {
    0.299f32.mul_add(r, 0.587f32.mul_add(g, 0.114 * b))
}

/// Unweighted mean of R, G and B, as used by the detector and the
/// auto-enhance histogram.
#[must_use]
pub fn brightness(r: u8, g: u8, b: u8) -> f32 {
    (f32::from(r) + f32::from(g) + f32::from(b)) / 3.0
}

/// Round and clamp a channel value back into `u8`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn to_channel(value: f32) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 255.0) as u8
}

/// An sRGB colour parsed from hex notation (`#RRGGBB`, `RRGGBB`, `#RGB`).
///
/// Serialized as a `#rrggbb` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HexColor {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl HexColor {
    /// Pure white, the tint used when no team colour is given.
    pub const WHITE: Self = Self::new(255, 255, 255);

    /// Create a colour from its channels.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl FromStr for HexColor {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().trim_start_matches('#');
        let invalid = || PipelineError::InvalidConfig(format!("invalid hex colour {s:?}"));
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let channel = |hex: &str| u8::from_str_radix(hex, 16).map_err(|_| invalid());
        match digits.len() {
            6 => Ok(Self::new(
                channel(&digits[0..2])?,
                channel(&digits[2..4])?,
                channel(&digits[4..6])?,
            )),
            3 => {
                // #abc expands to #aabbcc.
                let expand = |i: usize| channel(&digits[i..=i]).map(|v| v * 17);
                Ok(Self::new(expand(0)?, expand(1)?, expand(2)?))
            }
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for HexColor {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HexColor> for String {
    fn from(value: HexColor) -> Self {
        value.to_string()
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}
