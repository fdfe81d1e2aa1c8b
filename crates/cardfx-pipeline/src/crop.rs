//! Crop suggestions at a fixed aspect ratio.
//!
//! Every call proposes a rule-of-thirds crop and a centered crop, plus one
//! subject-focused crop per confident [`DetectedRegion`]. Suggestions are
//! returned best-first.
//!
//! Requests that do not fit the image never fail: rectangles shrink
//! (keeping their aspect ratio) until they fit, then slide inside the
//! image bounds. A zero-sized image has no valid crop at all and yields
//! an empty list.

use crate::detect::detect_subjects;
use crate::types::{AspectRatio, CropRule, CropSuggestion, DetectedRegion, Dimensions, RgbaImage};

/// Fixed confidence of the rule-of-thirds suggestion.
pub const THIRDS_CONFIDENCE: f64 = 0.7;

/// Fixed confidence of the centered suggestion.
pub const CENTER_CONFIDENCE: f64 = 0.5;

/// Size of the thirds crop relative to the largest fitting rectangle.
///
/// Smaller than 1.0 so the thirds anchor actually moves the crop off
/// center along both axes.
pub const THIRDS_SCALE: f64 = 0.8;

/// Regions at or below this confidence do not get their own suggestion.
pub const SUBJECT_MIN_CONFIDENCE: f64 = 0.5;

/// Subject crops are this many times wider than the region.
pub const SUBJECT_PADDING: f64 = 1.5;

/// Detect subjects in `image` and propose crops for `aspect_ratio`.
#[must_use]
pub fn suggest_crops(image: &RgbaImage, aspect_ratio: AspectRatio) -> Vec<CropSuggestion> {
    let regions = detect_subjects(image);
    suggest_crops_for(Dimensions::of(image), &regions, aspect_ratio)
}

/// Propose crops for an image of the given size and its detected regions.
///
/// The returned list is sorted by descending confidence; ties keep
/// generation order (thirds, center, then subjects in region order).
#[must_use]
pub fn suggest_crops_for(
    dimensions: Dimensions,
    regions: &[DetectedRegion],
    aspect_ratio: AspectRatio,
) -> Vec<CropSuggestion> {
    if dimensions.is_empty() {
        return Vec::new();
    }

    let (w, h) = (f64::from(dimensions.width), f64::from(dimensions.height));
    let ratio = aspect_ratio.get();
    let (fit_w, fit_h) = largest_fit(w, h, ratio);

    let mut suggestions = Vec::with_capacity(2 + regions.len());

    // Place the crop so its own upper-left thirds point lands on the
    // image's: x + cw/3 = W/3.
    let (thirds_w, thirds_h) = (fit_w * THIRDS_SCALE, fit_h * THIRDS_SCALE);
    suggestions.push(CropSuggestion {
        x: place((w - thirds_w) / 3.0, thirds_w, w),
        y: place((h - thirds_h) / 3.0, thirds_h, h),
        width: thirds_w,
        height: thirds_h,
        aspect_ratio: ratio,
        rule: CropRule::Thirds,
        confidence: THIRDS_CONFIDENCE,
    });

    suggestions.push(CropSuggestion {
        x: place((w - fit_w) / 2.0, fit_w, w),
        y: place((h - fit_h) / 2.0, fit_h, h),
        width: fit_w,
        height: fit_h,
        aspect_ratio: ratio,
        rule: CropRule::Center,
        confidence: CENTER_CONFIDENCE,
    });

    for region in regions
        .iter()
        .filter(|r| r.confidence > SUBJECT_MIN_CONFIDENCE && r.width > 0)
    {
        suggestions.push(subject_crop(region, w, h, ratio));
    }

    suggestions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    suggestions
}

/// Largest `ratio`-shaped rectangle that fits in `w`×`h`.
///
/// The limiting side is exactly the image side.
fn largest_fit(w: f64, h: f64, ratio: f64) -> (f64, f64) {
    if w / h > ratio {
        ((h * ratio).min(w), h)
    } else {
        (w, (w / ratio).min(h))
    }
}

/// Slide a span of `len` starting near `start` into `0..=limit`.
///
/// `len` must not exceed `limit`. The result satisfies
/// `start + len <= limit` after rounding.
fn place(start: f64, len: f64, limit: f64) -> f64 {
    let mut start = start.min(limit - len).max(0.0);
    while start > 0.0 && start + len > limit {
        start = start.next_down();
    }
    start
}

fn subject_crop(region: &DetectedRegion, w: f64, h: f64, ratio: f64) -> CropSuggestion {
    let (cx, cy) = region.center();
    let mut crop_w = f64::from(region.width) * SUBJECT_PADDING;
    let mut crop_h = crop_w / ratio;

    if crop_w > w || crop_h > h {
        (crop_w, crop_h) = largest_fit(w, h, ratio);
    }

    CropSuggestion {
        x: place(cx - crop_w / 2.0, crop_w, w),
        y: place(cy - crop_h / 2.0, crop_h, h),
        width: crop_w,
        height: crop_h,
        aspect_ratio: ratio,
        rule: CropRule::SubjectFocused,
        confidence: region.confidence,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::RegionKind;
    use proptest::prelude::*;

    const EPS: f64 = 1e-9;

    fn dims(width: u32, height: u32) -> Dimensions {
        Dimensions { width, height }
    }

    fn assert_valid(suggestions: &[CropSuggestion], d: Dimensions, ratio: f64) {
        let (w, h) = (f64::from(d.width), f64::from(d.height));
        for s in suggestions {
            assert!(
                (s.width / s.height - ratio).abs() < 1e-3,
                "aspect mismatch: {s:?}"
            );
            assert!(s.x >= 0.0 && s.y >= 0.0, "negative origin: {s:?}");
            assert!(s.x + s.width <= w, "exceeds width: {s:?}");
            assert!(s.y + s.height <= h, "exceeds height: {s:?}");
        }
        assert!(
            suggestions
                .windows(2)
                .all(|p| p[0].confidence >= p[1].confidence),
            "not sorted: {suggestions:?}"
        );
    }

    #[test]
    fn card_ratio_on_square_image_shrinks_center_to_fit() {
        // A 100x100 image cannot hold a 100x140 card crop; the center
        // crop shrinks to the full height instead.
        let ratio = AspectRatio::new(2.5, 3.5).unwrap();
        let suggestions = suggest_crops_for(dims(100, 100), &[], ratio);
        let center = suggestions
            .iter()
            .find(|s| s.rule == CropRule::Center)
            .unwrap();
        assert!((center.height - 100.0).abs() < EPS);
        assert!((center.width - 500.0 / 7.0).abs() < EPS);
        assert!((center.x - 100.0 / 7.0).abs() < EPS);
        assert!(center.y.abs() < EPS);
        assert_valid(&suggestions, dims(100, 100), ratio.get());
    }

    #[test]
    fn thirds_is_anchored_on_thirds_point() {
        let ratio = AspectRatio::new(2.5, 3.5).unwrap();
        let suggestions = suggest_crops_for(dims(100, 100), &[], ratio);
        let thirds = suggestions
            .iter()
            .find(|s| s.rule == CropRule::Thirds)
            .unwrap();
        assert!((thirds.x + thirds.width / 3.0 - 100.0 / 3.0).abs() < EPS);
        assert!((thirds.y + thirds.height / 3.0 - 100.0 / 3.0).abs() < EPS);
        assert!((thirds.height - 80.0).abs() < EPS);
    }

    #[test]
    fn without_regions_thirds_ranks_above_center() {
        let suggestions = suggest_crops_for(dims(300, 400), &[], AspectRatio::CARD);
        assert_eq!(suggestions.len(), 2);
        assert_eq!(suggestions[0].rule, CropRule::Thirds);
        assert_eq!(suggestions[1].rule, CropRule::Center);
    }

    #[test]
    fn confident_region_adds_subject_crop() {
        let region = DetectedRegion {
            x: 200,
            y: 100,
            width: 32,
            height: 32,
            confidence: 0.9,
            kind: RegionKind::Face,
        };
        let ratio = AspectRatio::new(1.0, 1.0).unwrap();
        let suggestions = suggest_crops_for(dims(400, 300), &[region], ratio);
        assert_eq!(suggestions.len(), 3);
        let subject = suggestions[0];
        assert_eq!(subject.rule, CropRule::SubjectFocused);
        assert!((subject.confidence - 0.9).abs() < EPS);
        assert!((subject.width - 48.0).abs() < EPS);
        assert!((subject.height - 48.0).abs() < EPS);
        // Centered on the region center (216, 116).
        assert!((subject.x - 192.0).abs() < EPS);
        assert!((subject.y - 92.0).abs() < EPS);
    }

    #[test]
    fn weak_region_is_skipped() {
        let region = DetectedRegion {
            x: 0,
            y: 0,
            width: 48,
            height: 48,
            confidence: 0.5,
            kind: RegionKind::Object,
        };
        let suggestions = suggest_crops_for(dims(200, 200), &[region], AspectRatio::CARD);
        assert!(
            suggestions
                .iter()
                .all(|s| s.rule != CropRule::SubjectFocused)
        );
    }

    #[test]
    fn subject_crop_near_corner_is_clamped() {
        let region = DetectedRegion {
            x: 0,
            y: 0,
            width: 32,
            height: 32,
            confidence: 0.8,
            kind: RegionKind::Face,
        };
        let ratio = AspectRatio::CARD;
        let suggestions = suggest_crops_for(dims(64, 64), &[region], ratio);
        let subject = suggestions
            .iter()
            .find(|s| s.rule == CropRule::SubjectFocused)
            .unwrap();
        assert!(subject.x.abs() < EPS);
        assert!(subject.y.abs() < EPS);
        assert_valid(&suggestions, dims(64, 64), ratio.get());
    }

    #[test]
    fn oversized_subject_crop_shrinks() {
        let region = DetectedRegion {
            x: 0,
            y: 0,
            width: 48,
            height: 48,
            confidence: 1.0,
            kind: RegionKind::Object,
        };
        // 1.5 * 48 = 72 wide, 72 / 0.25 = 288 tall: far taller than 50.
        let ratio = AspectRatio::from_ratio(0.25).unwrap();
        let suggestions = suggest_crops_for(dims(50, 50), &[region], ratio);
        assert_valid(&suggestions, dims(50, 50), 0.25);
    }

    #[test]
    fn shrunk_subject_crop_stays_inside_exactly() {
        let ratio = AspectRatio::from_ratio(0.1234).unwrap();
        for w in 1..120 {
            for h in 1..120 {
                for (x, y) in [(0, 0), (w / 2, h / 2), (w - 1, h - 1)] {
                    let region = DetectedRegion {
                        x,
                        y,
                        width: 48,
                        height: 48,
                        confidence: 0.9,
                        kind: RegionKind::Face,
                    };
                    let suggestions = suggest_crops_for(dims(w, h), &[region], ratio);
                    assert_eq!(suggestions.len(), 3);
                    assert_valid(&suggestions, dims(w, h), ratio.get());
                }
            }
        }
    }

    #[test]
    fn tall_subject_crop_takes_full_height() {
        // 72 wide at 0.1234 wants ~583 rows; a 3x21 image limits it to 21.
        let region = DetectedRegion {
            x: 0,
            y: 0,
            width: 48,
            height: 48,
            confidence: 0.9,
            kind: RegionKind::Face,
        };
        let ratio = AspectRatio::from_ratio(0.1234).unwrap();
        let suggestions = suggest_crops_for(dims(3, 21), &[region], ratio);
        let subject = suggestions[0];
        assert_eq!(subject.rule, CropRule::SubjectFocused);
        assert!(subject.height <= 21.0);
        assert!((subject.height - 21.0).abs() < EPS);
        assert!(subject.y + subject.height <= 21.0);
    }

    #[test]
    fn degenerate_images_stay_valid() {
        for (w, h) in [(1, 1), (1, 500), (500, 1), (3, 7), (2, 2)] {
            for ratio in [0.1, 0.714, 1.0, 2.5, 10.0] {
                let ar = AspectRatio::from_ratio(ratio).unwrap();
                let suggestions = suggest_crops_for(dims(w, h), &[], ar);
                assert_eq!(suggestions.len(), 2);
                assert_valid(&suggestions, dims(w, h), ratio);
            }
        }
    }

    #[test]
    fn zero_sized_image_has_no_suggestions() {
        assert!(suggest_crops_for(dims(0, 10), &[], AspectRatio::CARD).is_empty());
    }

    #[test]
    fn suggest_crops_runs_detector() {
        let img = RgbaImage::from_fn(128, 128, |x, y| {
            if (32..64).contains(&x) && (32..64).contains(&y) {
                image::Rgba([220, 160, 120, 255])
            } else {
                image::Rgba([128, 128, 128, 255])
            }
        });
        let suggestions = suggest_crops(&img, AspectRatio::CARD);
        assert!(
            suggestions
                .iter()
                .any(|s| s.rule == CropRule::SubjectFocused)
        );
        assert_valid(&suggestions, dims(128, 128), AspectRatio::CARD.get());
    }

    proptest! {
        #[test]
        fn suggestions_fit_and_keep_ratio(
            w in 1u32..2000,
            h in 1u32..2000,
            ratio in 0.05f64..20.0,
            rx in 0u32..2000,
            ry in 0u32..2000,
            rw in 1u32..400,
            confidence in 0.0f64..=1.0,
        ) {
            let region = DetectedRegion {
                x: rx.min(w - 1),
                y: ry.min(h - 1),
                width: rw,
                height: rw,
                confidence,
                kind: RegionKind::Object,
            };
            let ar = AspectRatio::from_ratio(ratio).unwrap();
            let suggestions = suggest_crops_for(dims(w, h), &[region], ar);
            prop_assert!(suggestions.len() >= 2);
            assert_valid(&suggestions, dims(w, h), ratio);
        }
    }
}
