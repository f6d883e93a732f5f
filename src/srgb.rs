//! sRGB display transfer

use crate::field::{DisplayImage, LinearImage};

/// Linear values at or below this use the linear segment
pub const SRGB_LINEAR_THRESHOLD: f32 = 0.003_130_8;

const SRGB_LINEAR_SLOPE: f32 = 12.92;

#[inline]
pub fn linear_to_srgb(x: f32) -> f32 {
    let x = x.clamp(0.0, 1.0);
    let encoded = if x <= SRGB_LINEAR_THRESHOLD {
        SRGB_LINEAR_SLOPE * x
    } else {
        1.055 * x.powf(1.0 / 2.4) - 0.055
    };
    encoded.clamp(0.0, 1.0)
}

/// Encode a linear [0, 1] raster for display
pub fn encode_display(rgb: &LinearImage) -> DisplayImage {
    rgb.mapv(linear_to_srgb)
}
