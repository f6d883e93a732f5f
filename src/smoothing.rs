//! Edge-aware smoothing and base-layer resampling
//!
//! The decomposer only needs "smooth this field, but keep strong edges". That
//! capability sits behind [`EdgeAwareSmoother`]; [`BilateralFilter`] is the
//! default implementation.
//!
//! ## Bilateral filter
//!
//! - Spatial kernel: Gaussian over a disc of radius `round(1.5 * sigma_space)`
//! - Range kernel: Gaussian on the value difference to the centre pixel,
//!   read from a lookup table spanning the field's value range and linearly
//!   interpolated between bins
//! - Borders: reflect-101 (`dcb|abcd|cba`)
//!
//! Rows are filtered in parallel with rayon. Results do not depend on the
//! thread count.

use fast_image_resize as fr;
use fr::images::Image as FrImage;
use ndarray::Array2;
use rayon::prelude::*;

use crate::error::{Result, TonemapError};
use crate::field::ScalarField;

/// Edge-preserving smoothing of a 2-D scalar field
pub trait EdgeAwareSmoother: Send + Sync {
    /// Return a smoothed field of the same shape. `sigma_space` is in pixels,
    /// `sigma_color` in the field's own units.
    fn smooth(&self, field: &ScalarField, sigma_space: f32, sigma_color: f32) -> Result<ScalarField>;
}

/// Classic bilateral filter
#[derive(Debug, Clone, Copy, Default)]
pub struct BilateralFilter;

/// One tap of the spatial kernel
struct Tap {
    dy: isize,
    dx: isize,
    weight: f32,
}

impl BilateralFilter {
    pub fn radius(sigma_space: f32) -> usize {
        (sigma_space * 1.5).round().max(1.0) as usize
    }

    fn spatial_taps(sigma_space: f32) -> Vec<Tap> {
        let radius = Self::radius(sigma_space) as isize;
        let coeff = -0.5 / (sigma_space * sigma_space);
        let mut taps = Vec::new();
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let dist2 = (dy * dy + dx * dx) as f32;
                if dist2 > (radius * radius) as f32 {
                    continue;
                }
                taps.push(Tap { dy, dx, weight: (dist2 * coeff).exp() });
            }
        }
        taps
    }
}

/// Bins in the range-kernel lookup table
const RANGE_LUT_BINS: usize = 4096;

/// Gaussian range weight `exp(-d^2 / (2 sigma_color^2))` tabulated over
/// `|d|` in `[0, span]`
struct RangeKernel {
    lut: Vec<f32>,
    scale: f32,
}

impl RangeKernel {
    fn new(span: f32, sigma_color: f32) -> Self {
        let coeff = -0.5 / (sigma_color * sigma_color).max(f32::MIN_POSITIVE);
        let scale = if span > 0.0 { RANGE_LUT_BINS as f32 / span } else { 1.0 };
        // One spare entry so interpolation at the last bin stays in bounds
        let lut = (0..=RANGE_LUT_BINS + 1)
            .map(|i| {
                let d = i as f32 / scale;
                (d * d * coeff).exp()
            })
            .collect();
        Self { lut, scale }
    }

    #[inline]
    fn weight(&self, diff: f32) -> f32 {
        let t = (diff.abs() * self.scale).min(RANGE_LUT_BINS as f32);
        let idx = t as usize;
        let frac = t - idx as f32;
        self.lut[idx] + (self.lut[idx + 1] - self.lut[idx]) * frac
    }
}

impl EdgeAwareSmoother for BilateralFilter {
    fn smooth(&self, field: &ScalarField, sigma_space: f32, sigma_color: f32) -> Result<ScalarField> {
        let (h, w) = field.dim();
        if h == 0 || w == 0 {
            return Ok(field.clone());
        }

        let (lo, hi) = field
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let span = hi - lo;
        if !span.is_finite() {
            return Err(TonemapError::InvalidParameter(
                "cannot smooth a field with non-finite values".to_string(),
            ));
        }
        if span == 0.0 {
            return Ok(field.clone());
        }

        let src: Vec<f32> = field.iter().copied().collect();
        let taps = Self::spatial_taps(sigma_space);
        let range = RangeKernel::new(span, sigma_color);

        let mut out = vec![0.0f32; h * w];
        out.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
            for (x, dst) in row.iter_mut().enumerate() {
                let centre = src[y * w + x];
                let mut sum = 0.0f32;
                let mut norm = 0.0f32;
                for tap in &taps {
                    let ny = reflect101(y as isize + tap.dy, h);
                    let nx = reflect101(x as isize + tap.dx, w);
                    let value = src[ny * w + nx];
                    let weight = tap.weight * range.weight(value - centre);
                    sum += value * weight;
                    norm += weight;
                }
                // The centre tap always contributes weight 1, so norm >= 1
                *dst = sum / norm;
            }
        });

        Array2::from_shape_vec((h, w), out).map_err(|e| TonemapError::Shape(e.to_string()))
    }
}

/// Mirror an out-of-range index back into `0..n` without repeating the edge
fn reflect101(mut i: isize, n: usize) -> usize {
    let n = n as isize;
    if n == 1 {
        return 0;
    }
    while i < 0 || i >= n {
        if i < 0 {
            i = -i;
        } else {
            i = 2 * (n - 1) - i;
        }
    }
    i as usize
}

/// Area-average downscale by an integer factor to `(max(1, W/f), max(1, H/f))`
pub fn downscale_area(field: &ScalarField, factor: u32) -> Result<ScalarField> {
    let (h, w) = field.dim();
    let factor = factor.max(1) as usize;
    let dst_w = (w / factor).max(1) as u32;
    let dst_h = (h / factor).max(1) as u32;
    resize_field(field, dst_w, dst_h, fr::FilterType::Box)
}

/// Cubic upscale back to an explicit (height, width)
pub fn upscale_cubic(field: &ScalarField, height: usize, width: usize) -> Result<ScalarField> {
    resize_field(field, width as u32, height as u32, fr::FilterType::CatmullRom)
}

/// Resample a field through fast_image_resize's F32 convolution path.
/// Kernels are truncated at the image border and renormalized.
fn resize_field(
    field: &ScalarField,
    dst_w: u32,
    dst_h: u32,
    filter: fr::FilterType,
) -> Result<ScalarField> {
    let (h, w) = field.dim();
    if h == 0 || w == 0 || dst_w == 0 || dst_h == 0 {
        return Err(TonemapError::Shape(format!(
            "cannot resample {}x{} to {}x{}",
            w, h, dst_w, dst_h
        )));
    }
    if (w as u32, h as u32) == (dst_w, dst_h) {
        return Ok(field.clone());
    }

    let bytes: Vec<u8> = field.iter().flat_map(|v| v.to_ne_bytes()).collect();
    let src_image = FrImage::from_vec_u8(w as u32, h as u32, bytes, fr::PixelType::F32)
        .map_err(|e| TonemapError::Resample(format!("Failed to create source image: {:?}", e)))?;

    let mut dst_image = FrImage::new(dst_w, dst_h, src_image.pixel_type());

    let options = fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(filter));
    let mut resizer = fr::Resizer::new();
    resizer
        .resize(&src_image, &mut dst_image, &options)
        .map_err(|e| TonemapError::Resample(format!("Resize failed: {:?}", e)))?;

    let values: Vec<f32> = dst_image
        .buffer()
        .chunks_exact(4)
        .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    Array2::from_shape_vec((dst_h as usize, dst_w as usize), values)
        .map_err(|e| TonemapError::Shape(e.to_string()))
}
