//! Debug overlay: detected regions and crop suggestions drawn as
//! hollow rectangles on a copy of the image.

use image::Rgba;
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::types::{CropSuggestion, DetectedRegion, Dimensions, RegionKind, RgbaImage};

/// Outline colour for face regions.
pub const FACE_COLOR: Rgba<u8> = Rgba([0, 220, 0, 255]);
/// Outline colour for object regions.
pub const OBJECT_COLOR: Rgba<u8> = Rgba([255, 200, 0, 255]);
/// Outline colour for the best crop suggestion.
pub const BEST_CROP_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
/// Outline colour for the remaining crop suggestions.
pub const CROP_COLOR: Rgba<u8> = Rgba([0, 120, 255, 255]);

/// Draw `regions` and `suggestions` over a copy of `image`.
///
/// `suggestions` is expected best-first; the first one gets
/// [`BEST_CROP_COLOR`].
#[must_use]
pub fn annotate(
    image: &RgbaImage,
    regions: &[DetectedRegion],
    suggestions: &[CropSuggestion],
) -> RgbaImage {
    let mut canvas = image.clone();
    let bounds = Dimensions::of(image);
    if bounds.is_empty() {
        return canvas;
    }

    // Draw the worst suggestions first so the best ends up on top.
    for (i, suggestion) in suggestions.iter().enumerate().rev() {
        let rect = suggestion.to_pixel_rect(bounds);
        let color = if i == 0 { BEST_CROP_COLOR } else { CROP_COLOR };
        draw_hollow_rect_mut(&mut canvas, to_rect(rect.x, rect.y, rect.width, rect.height), color);
    }

    for region in regions {
        let color = match region.kind {
            RegionKind::Face => FACE_COLOR,
            RegionKind::Object => OBJECT_COLOR,
        };
        draw_hollow_rect_mut(
            &mut canvas,
            to_rect(region.x, region.y, region.width, region.height),
            color,
        );
    }
    canvas
}

#[allow(clippy::cast_possible_wrap)]
fn to_rect(x: u32, y: u32, width: u32, height: u32) -> Rect {
    Rect::at(x as i32, y as i32).of_size(width.max(1), height.max(1))
}
