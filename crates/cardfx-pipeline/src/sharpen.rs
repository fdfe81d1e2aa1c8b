//! 3×3 sharpening convolution.
//!
//! Applies the kernel
//!
//! ```text
//!  0 -1  0
//! -1  5 -1
//!  0 -1  0
//! ```
//!
//! to the R, G and B channels of interior pixels. The outermost one-pixel
//! ring is copied from the source unchanged, and alpha is copied
//! everywhere. `imageproc::filter::filter3x3` is not used because it
//! clamps at the borders instead of leaving them alone.

use crate::types::RgbaImage;

/// The sharpening kernel, row-major.
pub const SHARPEN_KERNEL: [i32; 9] = [0, -1, 0, -1, 5, -1, 0, -1, 0];

/// Sharpen `source`, returning a new buffer of identical dimensions.
#[must_use = "returns the sharpened image"]
pub fn apply_sharpen(source: &RgbaImage) -> RgbaImage {
    let (w, h) = source.dimensions();
    let mut out = source.clone();
    if w < 3 || h < 3 {
        return out;
    }

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let mut acc = [0i32; 3];
            for (k, weight) in SHARPEN_KERNEL.iter().enumerate() {
                if *weight == 0 {
                    continue;
                }
                #[allow(clippy::cast_possible_truncation)]
                let (dx, dy) = ((k % 3) as u32, (k / 3) as u32);
                let neighbour = source.get_pixel(x + dx - 1, y + dy - 1).0;
                for c in 0..3 {
                    acc[c] += weight * i32::from(neighbour[c]);
                }
            }
            let pixel = out.get_pixel_mut(x, y);
            for c in 0..3 {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                {
                    pixel.0[c] = acc[c].clamp(0, 255) as u8;
                }
            }
        }
    }
    out
}
