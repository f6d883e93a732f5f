//! Raster types shared by every pipeline stage
//!
//! Rasters are plain `ndarray` arrays in row-major (H, W[, C]) layout. Each
//! stage produces a fresh array from its inputs; nothing is modified in place.

use ndarray::{Array2, Array3};
use rayon::prelude::*;

/// Linear-light RGB raster, shape (H, W, 3), channel order R, G, B
pub type LinearImage = Array3<f32>;

/// Gamma-encoded RGB raster in [0, 1], shape (H, W, 3)
pub type DisplayImage = Array3<f32>;

/// Single-channel raster, shape (H, W)
pub type ScalarField = Array2<f32>;

/// Percentiles (0..=100) of a field using linear interpolation between ranks
///
/// Returns one value per requested percentile. An empty field yields zeros.
pub fn percentiles(field: &ScalarField, qs: &[f32]) -> Vec<f32> {
    let mut values: Vec<f32> = field.iter().copied().collect();
    if values.is_empty() {
        return vec![0.0; qs.len()];
    }
    values.par_sort_unstable_by(|a, b| a.total_cmp(b));

    let last = (values.len() - 1) as f64;
    qs.iter()
        .map(|&q| {
            let rank = q.clamp(0.0, 100.0) as f64 * last / 100.0;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = (rank - lo as f64) as f32;
            values[lo] + (values[hi] - values[lo]) * frac
        })
        .collect()
}

/// Robust (1st, 99th) percentile range of a field
pub fn robust_range(field: &ScalarField) -> (f32, f32) {
    let p = percentiles(field, &[1.0, 99.0]);
    (p[0], p[1])
}

/// Largest finite value in a field
pub fn max_value(field: &ScalarField) -> f32 {
    field.iter().copied().fold(f32::NEG_INFINITY, f32::max)
}
