//! Target dimension planning.

use crate::core::{Dimensions, ResizeSettings};

/// Computes the output dimensions for an image of `original_width` x `original_height`.
///
/// Precedence: resize disabled -> original; scale other than 100 -> scaled
/// (wins over explicit sizes); both sizes -> used verbatim; a single size ->
/// the other side follows the aspect ratio if requested, else stays original.
/// Every returned side is at least 1.
pub fn plan(original_width: u32, original_height: u32, resize: &ResizeSettings) -> Dimensions {
    let original = Dimensions::new(original_width.max(1), original_height.max(1));

    if !resize.enabled {
        return original;
    }

    if resize.scale_percent != 100 {
        let factor = resize.scale_percent as f64 / 100.0;
        return Dimensions::new(
            scale_side(original.width as f64 * factor),
            scale_side(original.height as f64 * factor),
        );
    }

    match (resize.width, resize.height) {
        (Some(width), Some(height)) => Dimensions::new(width.max(1), height.max(1)),
        (Some(width), None) => {
            let height = if resize.maintain_aspect_ratio {
                scale_side(original.height as f64 * (width as f64 / original.width as f64))
            } else {
                original.height
            };
            Dimensions::new(width.max(1), height)
        }
        (None, Some(height)) => {
            let width = if resize.maintain_aspect_ratio {
                scale_side(original.width as f64 * (height as f64 / original.height as f64))
            } else {
                original.width
            };
            Dimensions::new(width, height.max(1))
        }
        (None, None) => original,
    }
}

/// Rounds half away from zero and clamps into `1..=u32::MAX`.
fn scale_side(value: f64) -> u32 {
    value.round().clamp(1.0, u32::MAX as f64) as u32
}
