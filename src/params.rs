//! Tone-mapping parameters and the batch preset table
//!
//! [`ToneMapParameters`] is the full configuration record for one pipeline run.
//! A [`Preset`] is a partial override: only the fields it sets replace the
//! caller's base configuration.
//!
//! ## Usage
//!
//! ```rust
//! use dng_tonemap::params::{ToneMapParameters, PRESETS};
//!
//! let base = ToneMapParameters::default();
//! let effective = PRESETS[3].apply(&base);
//! assert_eq!(effective.shadow_gamma, 1.5);
//! assert_eq!(effective.compression, base.compression);
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, TonemapError};

/// Full configuration for one tone-mapping run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneMapParameters {
    /// Global exposure in stops (linear scale 2^stops)
    pub stops: f32,

    /// Base-layer compression in [0, 1], 1.0 = no compression
    pub compression: f32,

    /// Detail-layer gain
    pub detail_amp: f32,

    /// Inverse power on the normalized output luminance (>1 lifts shadows, <=0 disables)
    pub shadow_gamma: f32,

    /// Bilateral spatial sigma in pixels (at the downsampled resolution)
    pub sigma_space: f32,

    /// Bilateral range sigma in log-luminance units, <=0 = auto
    pub sigma_color: f32,

    /// Integer downscale factor applied before smoothing
    pub downsample: u32,

    /// Highlight contrast protection strength in [0, 1]
    pub hl_protect: f32,

    /// Normalized base brightness where protection starts to ramp in
    pub hl_start: f32,

    /// Normalized base brightness where protection is fully applied
    pub hl_end: f32,
}

impl Default for ToneMapParameters {
    fn default() -> Self {
        Self {
            stops: 0.0,
            compression: 0.6,
            detail_amp: 1.0,
            shadow_gamma: 1.15,
            sigma_space: 16.0,
            sigma_color: 0.1,
            downsample: 2,
            hl_protect: 0.75,
            hl_start: 0.6,
            hl_end: 0.9,
        }
    }
}

impl ToneMapParameters {
    /// Parameters that leave the image unchanged apart from peak normalization
    pub fn identity() -> Self {
        Self {
            stops: 0.0,
            compression: 1.0,
            detail_amp: 1.0,
            shadow_gamma: 1.0,
            hl_protect: 0.0,
            ..Self::default()
        }
    }

    /// Load a base configuration from a JSON file; missing fields take defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let params: Self = serde_json::from_str(&text)?;
        params.validate()?;
        Ok(params)
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let finite = [
            ("stops", self.stops),
            ("compression", self.compression),
            ("detail_amp", self.detail_amp),
            ("shadow_gamma", self.shadow_gamma),
            ("sigma_space", self.sigma_space),
            ("sigma_color", self.sigma_color),
            ("hl_protect", self.hl_protect),
            ("hl_start", self.hl_start),
            ("hl_end", self.hl_end),
        ];
        for (name, value) in finite {
            if !value.is_finite() {
                return Err(TonemapError::InvalidParameter(format!(
                    "{} must be finite, got {}",
                    name, value
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.compression) {
            return Err(TonemapError::InvalidParameter(format!(
                "compression must be in [0, 1], got {}",
                self.compression
            )));
        }
        if !(0.0..=1.0).contains(&self.hl_protect) {
            return Err(TonemapError::InvalidParameter(format!(
                "hl_protect must be in [0, 1], got {}",
                self.hl_protect
            )));
        }
        if self.hl_start >= self.hl_end {
            return Err(TonemapError::InvalidParameter(format!(
                "hl_start ({}) must be below hl_end ({})",
                self.hl_start, self.hl_end
            )));
        }
        if self.downsample < 1 {
            return Err(TonemapError::InvalidParameter(
                "downsample must be at least 1".to_string(),
            ));
        }
        if self.sigma_space <= 0.0 {
            return Err(TonemapError::InvalidParameter(format!(
                "sigma_space must be positive, got {}",
                self.sigma_space
            )));
        }

        Ok(())
    }
}

/// Named partial override of [`ToneMapParameters`]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Preset {
    pub id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stops: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadow_gamma: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail_amp: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hl_protect: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hl_start: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hl_end: Option<f32>,
}

impl Preset {
    const fn exposure(id: u32, shadow_gamma: f32, stops: f32) -> Self {
        Self {
            id,
            stops: Some(stops),
            shadow_gamma: Some(shadow_gamma),
            compression: None,
            detail_amp: None,
            hl_protect: None,
            hl_start: None,
            hl_end: None,
        }
    }

    /// Effective parameters: `base` with every field this preset sets replaced
    pub fn apply(&self, base: &ToneMapParameters) -> ToneMapParameters {
        ToneMapParameters {
            stops: self.stops.unwrap_or(base.stops),
            shadow_gamma: self.shadow_gamma.unwrap_or(base.shadow_gamma),
            compression: self.compression.unwrap_or(base.compression),
            detail_amp: self.detail_amp.unwrap_or(base.detail_amp),
            hl_protect: self.hl_protect.unwrap_or(base.hl_protect),
            hl_start: self.hl_start.unwrap_or(base.hl_start),
            hl_end: self.hl_end.unwrap_or(base.hl_end),
            ..*base
        }
    }

    pub fn name(&self) -> String {
        format!("preset{}", self.id)
    }
}

/// Built-in batch presets: a minimally processed rendering followed by an
/// increasing shadow-lift/exposure ladder
pub const PRESETS: &[Preset] = &[
    Preset {
        id: 1,
        stops: Some(0.0),
        shadow_gamma: Some(1.0),
        compression: Some(1.0),
        detail_amp: Some(1.0),
        hl_protect: Some(0.0),
        hl_start: None,
        hl_end: None,
    },
    Preset::exposure(2, 1.15, 0.5),
    Preset::exposure(3, 1.25, 1.0),
    Preset::exposure(4, 1.5, 1.5),
    Preset::exposure(5, 1.75, 1.75),
    Preset::exposure(6, 2.0, 2.0),
];

/// Load a custom preset table (a JSON array of presets)
pub fn load_presets(path: &Path) -> Result<Vec<Preset>> {
    let text = std::fs::read_to_string(path)?;
    let presets: Vec<Preset> = serde_json::from_str(&text)?;
    if presets.is_empty() {
        return Err(TonemapError::InvalidParameter(format!(
            "preset file {} contains no presets",
            path.display()
        )));
    }
    Ok(presets)
}
