//! Subject detection for smart cropping.
//!
//! Two cheap block-based heuristics run over the pixel grid:
//!
//! - **Face candidates**: 32 px blocks scored by the fraction of pixels
//!   that pass a skin-tone test. The best block scoring above
//!   [`FACE_THRESHOLD`] becomes a [`RegionKind::Face`] region.
//! - **Contrast candidates**: 48 px blocks scored by the spread between
//!   their brightest and darkest pixel. The best block becomes a
//!   [`RegionKind::Object`] region when its confidence exceeds
//!   [`OBJECT_THRESHOLD`].
//!
//! Only full blocks are scored; a ragged strip along the right or bottom
//! edge is ignored. Blocks are scanned row-major and the first block wins
//! ties, so the result is fully deterministic.
//!
//! Finding nothing is not an error: an empty list is a valid answer.

use crate::color::brightness;
use crate::types::{DetectedRegion, RegionKind, RgbaImage};

/// Block size for skin-tone scoring.
pub const FACE_BLOCK: u32 = 32;

/// Block size for contrast scoring.
pub const OBJECT_BLOCK: u32 = 48;

/// Minimum skin fraction for a face region.
pub const FACE_THRESHOLD: f64 = 0.4;

/// Minimum confidence for an object region.
pub const OBJECT_THRESHOLD: f64 = 0.3;

/// Brightness spread that maps to full object confidence.
const CONTRAST_SCALE: f64 = 80.0;

/// Find regions of interest in an image.
///
/// Returns at most one face region followed by at most one object region.
#[must_use]
pub fn detect_subjects(image: &RgbaImage) -> Vec<DetectedRegion> {
    let mut regions = Vec::with_capacity(2);
    if let Some(face) = best_face_block(image) {
        regions.push(face);
    }
    if let Some(object) = best_contrast_block(image) {
        regions.push(object);
    }
    log::debug!(
        "detected {} region(s) in {}x{}",
        regions.len(),
        image.width(),
        image.height(),
    );
    regions
}

/// Skin-tone heuristic on a single RGB pixel.
#[must_use]
pub const fn is_skin_tone(r: u8, g: u8, b: u8) -> bool {
    r > 95 && g > 40 && b > 20 && r > g && r > b && r.abs_diff(g) > 15 && r - b > 15
}

/// Top-left corners of every full `block`×`block` tile, row-major.
fn blocks(image: &RgbaImage, block: u32) -> impl Iterator<Item = (u32, u32)> {
    let (w, h) = image.dimensions();
    let rows = h / block;
    let cols = w / block;
    (0..rows).flat_map(move |by| (0..cols).map(move |bx| (bx * block, by * block)))
}

/// Iterate the RGB channels of one tile.
fn tile_pixels(
    image: &RgbaImage,
    x0: u32,
    y0: u32,
    block: u32,
) -> impl Iterator<Item = [u8; 3]> + '_ {
    (y0..y0 + block).flat_map(move |y| {
        (x0..x0 + block).map(move |x| {
            let [r, g, b, _] = image.get_pixel(x, y).0;
            [r, g, b]
        })
    })
}

fn best_face_block(image: &RgbaImage) -> Option<DetectedRegion> {
    let pixels_per_block = f64::from(FACE_BLOCK * FACE_BLOCK);
    let mut best: Option<(f64, u32, u32)> = None;

    for (x, y) in blocks(image, FACE_BLOCK) {
        let skin = tile_pixels(image, x, y, FACE_BLOCK)
            .filter(|&[r, g, b]| is_skin_tone(r, g, b))
            .count();
        #[allow(clippy::cast_precision_loss)]
        let score = skin as f64 / pixels_per_block;
        if best.is_none_or(|(s, _, _)| score > s) {
            best = Some((score, x, y));
        }
    }

    best.filter(|&(score, _, _)| score > FACE_THRESHOLD)
        .map(|(score, x, y)| DetectedRegion {
            x,
            y,
            width: FACE_BLOCK,
            height: FACE_BLOCK,
            confidence: score,
            kind: RegionKind::Face,
        })
}

fn best_contrast_block(image: &RgbaImage) -> Option<DetectedRegion> {
    let mut best: Option<(f32, u32, u32)> = None;

    for (x, y) in blocks(image, OBJECT_BLOCK) {
        let (lo, hi) = tile_pixels(image, x, y, OBJECT_BLOCK)
            .map(|[r, g, b]| brightness(r, g, b))
            .fold((f32::MAX, f32::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)));
        let contrast = hi - lo;
        if best.is_none_or(|(c, _, _)| contrast > c) {
            best = Some((contrast, x, y));
        }
    }

    let (contrast, x, y) = best?;
    let confidence = (f64::from(contrast) / CONTRAST_SCALE).min(1.0);
    (confidence > OBJECT_THRESHOLD).then_some(DetectedRegion {
        x,
        y,
        width: OBJECT_BLOCK,
        height: OBJECT_BLOCK,
        confidence,
        kind: RegionKind::Object,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SKIN: [u8; 4] = [220, 160, 120, 255];
    const GRAY: [u8; 4] = [128, 128, 128, 255];

    #[test]
    fn skin_tone_heuristic() {
        assert!(is_skin_tone(220, 160, 120));
        // Too dark.
        assert!(!is_skin_tone(90, 60, 40));
        // Red and green too close.
        assert!(!is_skin_tone(200, 190, 100));
        // Blue dominant.
        assert!(!is_skin_tone(100, 50, 200));
    }

    #[test]
    fn uniform_gray_has_no_subjects() {
        let img = RgbaImage::from_pixel(128, 128, image::Rgba(GRAY));
        assert!(detect_subjects(&img).is_empty());
    }

    #[test]
    fn image_smaller_than_a_block_has_no_subjects() {
        let img = RgbaImage::from_pixel(20, 20, image::Rgba(SKIN));
        assert!(detect_subjects(&img).is_empty());
    }

    #[test]
    fn skin_patch_is_found_as_face() {
        // Skin block at (64, 32) in an otherwise gray 128x128 image.
        let img = RgbaImage::from_fn(128, 128, |x, y| {
            if (64..96).contains(&x) && (32..64).contains(&y) {
                image::Rgba(SKIN)
            } else {
                image::Rgba(GRAY)
            }
        });
        let regions = detect_subjects(&img);
        let face = regions
            .iter()
            .find(|r| r.kind == RegionKind::Face)
            .copied();
        assert_eq!(
            face,
            Some(DetectedRegion {
                x: 64,
                y: 32,
                width: 32,
                height: 32,
                confidence: 1.0,
                kind: RegionKind::Face,
            })
        );
    }

    #[test]
    fn sparse_skin_is_below_threshold() {
        // Only every third pixel is skin: ~33% < 40%.
        let img = RgbaImage::from_fn(64, 64, |x, _| {
            if x % 3 == 0 {
                image::Rgba(SKIN)
            } else {
                image::Rgba(GRAY)
            }
        });
        assert!(
            detect_subjects(&img)
                .iter()
                .all(|r| r.kind != RegionKind::Face)
        );
    }

    #[test]
    fn high_contrast_block_becomes_object() {
        // A black/white checker confined to the second 48px block.
        let img = RgbaImage::from_fn(96, 48, |x, y| {
            if x >= 48 && (x + y) % 2 == 0 {
                image::Rgba([255, 255, 255, 255])
            } else if x >= 48 {
                image::Rgba([0, 0, 0, 255])
            } else {
                image::Rgba(GRAY)
            }
        });
        let regions = detect_subjects(&img);
        assert_eq!(regions.len(), 1);
        let object = regions[0];
        assert_eq!(object.kind, RegionKind::Object);
        assert_eq!((object.x, object.y), (48, 0));
        assert!((object.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn weak_contrast_is_ignored() {
        // Spread of 20 -> confidence 0.25 < 0.3.
        let img = RgbaImage::from_fn(48, 48, |x, _| {
            if x % 2 == 0 {
                image::Rgba([100, 100, 100, 255])
            } else {
                image::Rgba([120, 120, 120, 255])
            }
        });
        assert!(detect_subjects(&img).is_empty());
    }

    #[test]
    fn moderate_contrast_scales_confidence() {
        // Spread of 40 -> confidence 0.5.
        let img = RgbaImage::from_fn(48, 48, |x, _| {
            if x % 2 == 0 {
                image::Rgba([100, 100, 100, 255])
            } else {
                image::Rgba([140, 140, 140, 255])
            }
        });
        let regions = detect_subjects(&img);
        assert_eq!(regions.len(), 1);
        assert!((regions[0].confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn detection_is_deterministic() {
        let img = RgbaImage::from_fn(150, 110, |x, y| {
            #[allow(clippy::cast_possible_truncation)]
            image::Rgba([(x * 7 % 256) as u8, (y * 3 % 256) as u8, 90, 255])
        });
        assert_eq!(detect_subjects(&img), detect_subjects(&img));
    }
}
