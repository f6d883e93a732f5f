//! Highlight-aware base compression
//!
//! A single global compression factor crushes contrast in skies and windows.
//! Instead the factor is relaxed towards 1.0 (no compression) as the base
//! layer approaches its bright end:
//!
//! ```text
//! Bn   = clip((B - P1) / (P99 - P1), 0, 1)
//! w    = smoothstep(hl_start, hl_end, Bn)
//! comp = compression + (1 - compression) * hl_protect * w
//! ```

use crate::field::{robust_range, ScalarField};
use crate::params::ToneMapParameters;

/// Minimum denominator for ramps and normalizations
const MIN_SPAN: f32 = 1e-8;

/// Cubic Hermite ramp: 0 at or below `edge0`, 1 at or above `edge1`
#[inline]
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0).max(MIN_SPAN)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Per-pixel compression strength for the base layer
#[derive(Debug, Clone, Copy)]
pub struct HighlightCompressor {
    pub compression: f32,
    pub hl_protect: f32,
    pub hl_start: f32,
    pub hl_end: f32,
}

impl HighlightCompressor {
    pub fn from_params(params: &ToneMapParameters) -> Self {
        Self {
            compression: params.compression,
            hl_protect: params.hl_protect,
            hl_start: params.hl_start,
            hl_end: params.hl_end,
        }
    }

    /// Base normalized to [0, 1] by its own 1st/99th percentiles
    pub fn normalize_base(base: &ScalarField) -> ScalarField {
        let (p1, p99) = robust_range(base);
        let span = (p99 - p1).max(MIN_SPAN);
        base.mapv(|b| ((b - p1) / span).clamp(0.0, 1.0))
    }

    /// Highlight weight in [0, 1] for a normalized base
    pub fn highlight_weight(&self, normalized: &ScalarField) -> ScalarField {
        normalized.mapv(|bn| smoothstep(self.hl_start, self.hl_end, bn))
    }

    /// Effective compression for a single highlight weight
    #[inline]
    pub fn compression_at(&self, weight: f32) -> f32 {
        self.compression + (1.0 - self.compression) * self.hl_protect * weight
    }

    /// Spatially varying compression field, same shape as `base`
    pub fn compression_field(&self, base: &ScalarField) -> ScalarField {
        let normalized = Self::normalize_base(base);
        normalized.mapv(|bn| self.compression_at(smoothstep(self.hl_start, self.hl_end, bn)))
    }
}
