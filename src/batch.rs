//! Batch orchestration: every input file × every preset
//!
//! Each file is decoded once and tone mapped under each preset in turn.
//! Failures are contained: a file that will not decode, a preset whose
//! effective parameters are invalid, or an output that cannot be written is
//! logged and recorded, and the batch moves on. Only "nothing to do" (no
//! matching inputs) and an output directory that cannot be created abort.
//!
//! Files are processed in parallel with rayon. Cancellation is checked before
//! each file starts; a file already in progress runs to completion.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{error, info, warn};

use crate::error::{Result, TonemapError};
use crate::field::LinearImage;
use crate::metrics::{BatchMetrics, MetricsSnapshot, Timer};
use crate::output::{batch_output_name, write_display_image, ImageOutputFormat, OutputConfig};
use crate::params::{Preset, ToneMapParameters, PRESETS};
use crate::pipeline::ToneMapper;
use crate::raw::LinearLoader;

#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Glob pattern selecting input captures
    pub in_glob: String,
    pub out_dir: PathBuf,
    /// Base parameters the presets override
    pub base: ToneMapParameters,
    pub presets: Vec<Preset>,
    pub output: OutputConfig,
    pub format: ImageOutputFormat,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            in_glob: "images/HDR/DNG/*.dng".to_string(),
            out_dir: PathBuf::from("processed_images"),
            base: ToneMapParameters::default(),
            presets: PRESETS.to_vec(),
            output: OutputConfig::default(),
            format: ImageOutputFormat::Jpeg,
        }
    }
}

/// Why one (file, preset) pair, or a whole file, did not produce output
#[derive(Debug, Clone)]
pub struct BatchFailure {
    pub input: PathBuf,
    /// `None` when the file itself failed to load
    pub preset_id: Option<u32>,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub inputs: Vec<PathBuf>,
    pub written: Vec<PathBuf>,
    pub failures: Vec<BatchFailure>,
    /// Inputs never started because the batch was cancelled
    pub skipped: Vec<PathBuf>,
    pub metrics: MetricsSnapshot,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.skipped.is_empty()
    }
}

/// Sorted list of files matching a glob pattern
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = glob::glob(pattern).map_err(|e| {
        TonemapError::InvalidParameter(format!("Invalid input pattern '{}': {}", pattern, e))
    })?;

    let mut files: Vec<PathBuf> = paths
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Skipping unreadable path: {}", e);
                None
            }
        })
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    Ok(files)
}

/// Outcome of one input file
enum FileOutcome {
    Done {
        written: Vec<PathBuf>,
        failures: Vec<BatchFailure>,
    },
    Skipped(PathBuf),
}

pub struct BatchRunner<L: LinearLoader> {
    loader: L,
    config: BatchConfig,
    cancel: Arc<AtomicBool>,
    metrics: Arc<BatchMetrics>,
}

impl<L: LinearLoader> BatchRunner<L> {
    pub fn new(loader: L, config: BatchConfig) -> Self {
        Self {
            loader,
            config,
            cancel: Arc::new(AtomicBool::new(false)),
            metrics: BatchMetrics::new(),
        }
    }

    /// Flag that stops the batch before the next file when set.
    ///
    /// For callers embedding the runner (a GUI or service thread); the CLI
    /// does not install a signal handler, so Ctrl-C there terminates the
    /// process outright.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn run(&self) -> Result<BatchReport> {
        let inputs = expand_glob(&self.config.in_glob)?;
        if inputs.is_empty() {
            return Err(TonemapError::NoInputs(self.config.in_glob.clone()));
        }
        if self.config.presets.is_empty() {
            return Err(TonemapError::InvalidParameter("preset table is empty".to_string()));
        }

        std::fs::create_dir_all(&self.config.out_dir)?;

        info!(
            "Batch: {} files x {} presets -> {}",
            inputs.len(),
            self.config.presets.len(),
            self.config.out_dir.display()
        );

        let outcomes: Vec<FileOutcome> = inputs.par_iter().map(|path| self.process_file(path)).collect();

        let mut written = Vec::new();
        let mut failures = Vec::new();
        let mut skipped = Vec::new();
        for outcome in outcomes {
            match outcome {
                FileOutcome::Done { written: w, failures: f } => {
                    written.extend(w);
                    failures.extend(f);
                }
                FileOutcome::Skipped(path) => skipped.push(path),
            }
        }

        let metrics = self.metrics.snapshot();
        info!(
            "Batch finished: {} written, {} failed, {} skipped (avg {}ms per output)",
            metrics.outputs_written,
            failures.len(),
            skipped.len(),
            metrics.avg_latency_ms
        );

        Ok(BatchReport {
            inputs,
            written,
            failures,
            skipped,
            metrics,
        })
    }

    fn process_file(&self, path: &Path) -> FileOutcome {
        if self.cancel.load(Ordering::Relaxed) {
            self.metrics.record_skipped();
            return FileOutcome::Skipped(path.to_path_buf());
        }

        let rgb = match self.loader.load(path) {
            Ok(rgb) => {
                self.metrics.record_file(true);
                rgb
            }
            Err(e) => {
                self.metrics.record_file(false);
                error!("[SKIP] Failed to read {}: {}", path.display(), e);
                return FileOutcome::Done {
                    written: Vec::new(),
                    failures: vec![BatchFailure {
                        input: path.to_path_buf(),
                        preset_id: None,
                        reason: e.to_string(),
                    }],
                };
            }
        };

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());

        let mut written = Vec::new();
        let mut failures = Vec::new();
        for preset in &self.config.presets {
            let timer = Timer::new();
            let result = self.render_preset(&rgb, &stem, preset);
            self.metrics.record_output(result.is_ok(), timer.elapsed_ms());

            match result {
                Ok(out_path) => {
                    info!("Wrote: {}", out_path.display());
                    written.push(out_path);
                }
                Err(e) => {
                    error!("[SKIP] {} ({}): {}", path.display(), preset.name(), e);
                    failures.push(BatchFailure {
                        input: path.to_path_buf(),
                        preset_id: Some(preset.id),
                        reason: e.to_string(),
                    });
                }
            }
        }

        FileOutcome::Done { written, failures }
    }

    fn render_preset(&self, rgb: &LinearImage, stem: &str, preset: &Preset) -> Result<PathBuf> {
        let params = preset.apply(&self.config.base);
        let mapper = ToneMapper::new(params)?;
        let display = mapper.run(rgb)?;

        let name = batch_output_name(
            stem,
            preset.id,
            params.shadow_gamma,
            params.stops,
            self.config.format,
        );
        let out_path = self.config.out_dir.join(name);
        write_display_image(&display, &out_path, &self.config.output)?;
        Ok(out_path)
    }
}
