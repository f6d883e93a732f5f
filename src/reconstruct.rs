//! Reconstruction of linear RGB from the compressed log-luminance layers
//!
//! Only luminance is remapped. The original linear RGB is rescaled per pixel
//! by `Y_out / Y_in`, which keeps every channel ratio (hue and saturation)
//! intact wherever no channel clips.

use ndarray::Array3;

use crate::field::{max_value, LinearImage, ScalarField};
use crate::luminance::EPS;

/// `L_out = B * comp + D * detail_amp`
pub fn recombine(
    base: &ScalarField,
    detail: &ScalarField,
    compression: &ScalarField,
    detail_amp: f32,
) -> ScalarField {
    let mut out = base * compression;
    out.scaled_add(detail_amp, detail);
    out
}

/// `exp(L_out)` normalized so its peak is 1.0
///
/// The peak is divided out in the log domain (`exp(L_out - max)`), so large
/// detail gains cannot overflow `exp` before normalization.
pub fn peak_normalized_luminance(log_out: &ScalarField) -> ScalarField {
    let peak = max_value(log_out);
    log_out.mapv(|v| (v - peak).exp() / (1.0 + EPS))
}

/// `clip(Y, 0, 1)^(1 / shadow_gamma)`; values above 1 lift shadows and
/// midtones. Non-positive gammas leave the field untouched.
pub fn apply_shadow_gamma(y: &ScalarField, shadow_gamma: f32) -> ScalarField {
    if shadow_gamma <= 0.0 {
        return y.clone();
    }
    let inv = 1.0 / shadow_gamma;
    y.mapv(|v| v.clamp(0.0, 1.0).powf(inv))
}

/// Rescale every channel by `(Y_out + EPS) / (Y_in + EPS)` and clip to [0, 1]
pub fn apply_luminance_ratio(
    rgb: &LinearImage,
    y_in: &ScalarField,
    y_out: &ScalarField,
) -> LinearImage {
    let ratio = y_out.mapv(|v| v + EPS) / y_in.mapv(|v| v + EPS);
    let (h, w, c) = rgb.dim();
    Array3::from_shape_fn((h, w, c), |(y, x, ch)| {
        (rgb[[y, x, ch]] * ratio[[y, x]]).clamp(0.0, 1.0)
    })
}
