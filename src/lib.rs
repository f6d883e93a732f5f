//! dng_tonemap - local tone mapping for 16-bit linear RAW captures
//!
//! Decodes a capture to linear light, splits log-luminance into an edge-aware
//! base layer and a detail layer, compresses the base while protecting
//! highlight contrast, rebuilds RGB through a per-pixel luminance ratio and
//! encodes for display with the sRGB transfer function.

pub mod batch;
pub mod decompose;
pub mod error;
pub mod field;
pub mod highlight;
pub mod luminance;
pub mod metrics;
pub mod output;
pub mod params;
pub mod pipeline;
pub mod raw;
pub mod reconstruct;
pub mod smoothing;
pub mod srgb;

pub use batch::{BatchConfig, BatchFailure, BatchReport, BatchRunner};
pub use error::{Result, TonemapError};
pub use field::{DisplayImage, LinearImage, ScalarField};
pub use output::{ImageOutputFormat, OutputConfig};
pub use params::{Preset, ToneMapParameters, PRESETS};
pub use pipeline::{tone_map, ToneMapStages, ToneMapper};
pub use raw::{LinearLoader, RawLoader, RawOptions};
pub use smoothing::{BilateralFilter, EdgeAwareSmoother};
