//! Local tone-mapping pipeline
//!
//! Exposure → luminance → base/detail → highlight-aware compression →
//! reconstruction → sRGB encoding, as one straight-line pass. Every
//! intermediate field is allocated per run, so independent images can be
//! processed concurrently with no coordination.
//!
//! ## Usage
//!
//! ```rust
//! use dng_tonemap::pipeline::ToneMapper;
//! use dng_tonemap::params::ToneMapParameters;
//! use ndarray::Array3;
//!
//! let linear = Array3::from_shape_fn((16, 16, 3), |(_, x, _)| x as f32 / 15.0);
//! let mapper = ToneMapper::new(ToneMapParameters { downsample: 1, sigma_space: 2.0, ..Default::default() })?;
//! let display = mapper.run(&linear)?;
//! assert_eq!(display.dim(), (16, 16, 3));
//! # Ok::<(), dng_tonemap::TonemapError>(())
//! ```

use tracing::debug;

use crate::decompose::decompose;
use crate::error::{Result, TonemapError};
use crate::field::{DisplayImage, LinearImage, ScalarField};
use crate::highlight::HighlightCompressor;
use crate::luminance::{apply_exposure, log_luminance, luminance};
use crate::metrics::Timer;
use crate::params::ToneMapParameters;
use crate::reconstruct::{apply_luminance_ratio, apply_shadow_gamma, peak_normalized_luminance, recombine};
use crate::smoothing::{BilateralFilter, EdgeAwareSmoother};
use crate::srgb::encode_display;

/// Every intermediate product of one run, for inspection and testing
#[derive(Debug, Clone)]
pub struct ToneMapStages {
    /// Input after exposure scaling
    pub exposed: LinearImage,
    /// Luminance of `exposed`, floored at EPS
    pub luminance: ScalarField,
    pub log_luminance: ScalarField,
    pub base: ScalarField,
    pub detail: ScalarField,
    pub compression: ScalarField,
    /// Peak-normalized output luminance before shadow gamma
    pub normalized_luminance: ScalarField,
    /// Output luminance after shadow gamma
    pub output_luminance: ScalarField,
    /// Tone-mapped linear RGB in [0, 1]
    pub linear: LinearImage,
    /// Range sigma used by the smoother
    pub sigma_color: f32,
}

/// Tone mapper bound to one validated parameter set
pub struct ToneMapper<S: EdgeAwareSmoother = BilateralFilter> {
    params: ToneMapParameters,
    smoother: S,
}

impl ToneMapper<BilateralFilter> {
    pub fn new(params: ToneMapParameters) -> Result<Self> {
        Self::with_smoother(params, BilateralFilter)
    }
}

impl<S: EdgeAwareSmoother> ToneMapper<S> {
    /// Build with a custom smoothing primitive. Fails fast on invalid parameters.
    pub fn with_smoother(params: ToneMapParameters, smoother: S) -> Result<Self> {
        params.validate()?;
        Ok(Self { params, smoother })
    }

    pub fn params(&self) -> &ToneMapParameters {
        &self.params
    }

    /// Tone map linear RGB to display-encoded RGB
    pub fn run(&self, rgb: &LinearImage) -> Result<DisplayImage> {
        let stages = self.run_stages(rgb)?;
        let timer = Timer::new();
        let display = encode_display(&stages.linear);
        debug!("sRGB encode: {}ms", timer.elapsed_ms());
        Ok(display)
    }

    /// Run up to the tone-mapped linear RGB, keeping every intermediate field
    pub fn run_stages(&self, rgb: &LinearImage) -> Result<ToneMapStages> {
        let (h, w, c) = rgb.dim();
        if h == 0 || w == 0 || c != 3 {
            return Err(TonemapError::Shape(format!(
                "expected non-empty (H, W, 3) raster, got ({}, {}, {})",
                h, w, c
            )));
        }
        let p = &self.params;

        let timer = Timer::new();
        let exposed = apply_exposure(rgb, p.stops);
        let y = luminance(&exposed);
        let log_y = log_luminance(&y);
        debug!("Luminance: {}ms", timer.elapsed_ms());

        let timer = Timer::new();
        let parts = decompose(&log_y, p, &self.smoother)?;
        debug!(
            "Base/detail (sigma_space={}, sigma_color={:.4}, downsample={}): {}ms",
            p.sigma_space,
            parts.sigma_color,
            p.downsample,
            timer.elapsed_ms()
        );

        let timer = Timer::new();
        let compression = HighlightCompressor::from_params(p).compression_field(&parts.base);
        let log_out = recombine(&parts.base, &parts.detail, &compression, p.detail_amp);
        let normalized = peak_normalized_luminance(&log_out);
        let y_out = apply_shadow_gamma(&normalized, p.shadow_gamma);
        let linear = apply_luminance_ratio(&exposed, &y, &y_out);
        debug!("Compress/reconstruct: {}ms", timer.elapsed_ms());

        Ok(ToneMapStages {
            exposed,
            luminance: y,
            log_luminance: log_y,
            base: parts.base,
            detail: parts.detail,
            compression,
            normalized_luminance: normalized,
            output_luminance: y_out,
            linear,
            sigma_color: parts.sigma_color,
        })
    }
}

/// One-shot convenience wrapper around [`ToneMapper`]
pub fn tone_map(rgb: &LinearImage, params: &ToneMapParameters) -> Result<DisplayImage> {
    ToneMapper::new(*params)?.run(rgb)
}
