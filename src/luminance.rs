//! Exposure scaling and luminance extraction

use ndarray::{Array3, Axis};

use crate::error::{Result, TonemapError};
use crate::field::{LinearImage, ScalarField};

/// Floor added before logs and ratios so nothing divides by or logs zero
pub const EPS: f32 = 1e-8;

/// ITU-R BT.709 luma weights
pub const LUMA_WEIGHTS: [f32; 3] = [0.2126, 0.7152, 0.0722];

/// Build a [0, 1] linear raster from interleaved 16-bit RGB samples
pub fn normalize_u16(data: &[u16], width: u32, height: u32) -> Result<LinearImage> {
    let (w, h) = (width as usize, height as usize);
    if w == 0 || h == 0 {
        return Err(TonemapError::Shape(format!("empty raster {}x{}", width, height)));
    }
    if data.len() != w * h * 3 {
        return Err(TonemapError::Shape(format!(
            "expected {} samples for {}x{} RGB, got {}",
            w * h * 3,
            width,
            height,
            data.len()
        )));
    }

    let values: Vec<f32> = data.iter().map(|&v| v as f32 / 65535.0).collect();
    Array3::from_shape_vec((h, w, 3), values).map_err(|e| TonemapError::Shape(e.to_string()))
}

/// Scale by 2^stops and clamp below at zero. No upper clamp: a boosted
/// exposure may exceed 1.0 before tone mapping.
pub fn apply_exposure(rgb: &LinearImage, stops: f32) -> LinearImage {
    if stops == 0.0 {
        return rgb.clone();
    }
    let gain = 2f32.powf(stops);
    rgb.mapv(|v| (v * gain).max(0.0))
}

/// Luminance `Y + EPS`, always strictly positive
pub fn luminance(rgb: &LinearImage) -> ScalarField {
    let [wr, wg, wb] = LUMA_WEIGHTS;
    rgb.map_axis(Axis(2), |px| wr * px[0] + wg * px[1] + wb * px[2] + EPS)
}

/// Natural log of a positive luminance field
pub fn log_luminance(y: &ScalarField) -> ScalarField {
    y.mapv(f32::ln)
}
