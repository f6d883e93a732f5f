// dng_tonemap - local tone mapping CLI
// Single-file conversion and preset batch sweeps over RAW captures

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use dng_tonemap::output::{default_output_path, write_display_image};
use dng_tonemap::params::load_presets;
use dng_tonemap::{
    BatchConfig, BatchRunner, ImageOutputFormat, LinearLoader, OutputConfig, RawLoader,
    RawOptions, ToneMapParameters, ToneMapper, TonemapError, PRESETS,
};

#[derive(Parser)]
#[command(name = "dng_tonemap", version, about = "Local tone mapping of 16-bit linear RAW captures into LDR sRGB images")]
struct Cli {
    /// Also append log output to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Tone map a single capture
    Convert(ConvertArgs),
    /// Tone map every matching capture under each preset
    Batch(BatchArgs),
    /// Print the built-in preset table as JSON
    Presets,
}

#[derive(Args)]
struct ConvertArgs {
    /// Input capture (RAW, or a linear 16-bit TIFF/PNG)
    input: PathBuf,

    /// Output image path (.jpg, .png, .tif); defaults to <input>_tonemapped.jpg
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Global exposure boost in stops (2^stops)
    #[arg(long, allow_hyphen_values = true)]
    stops: Option<f32>,

    /// >1 lifts shadows and midtones
    #[arg(long)]
    shadow_gamma: Option<f32>,

    /// Print the effective parameters as JSON and exit
    #[arg(long)]
    dump_params: bool,

    #[command(flatten)]
    tuning: TuningArgs,

    #[command(flatten)]
    io: IoArgs,
}

#[derive(Args)]
struct BatchArgs {
    /// Glob for batch input
    #[arg(long, default_value = "images/HDR/DNG/*.dng")]
    in_glob: String,

    /// Output directory for batch mode
    #[arg(long, default_value = "processed_images")]
    out_dir: PathBuf,

    /// JSON preset table replacing the built-in presets
    #[arg(long)]
    presets: Option<PathBuf>,

    /// Output container for batch results
    #[arg(long, default_value = "jpg")]
    format: String,

    /// Worker threads (default: all cores)
    #[arg(long)]
    threads: Option<usize>,

    /// Ignored in batch mode; presets set exposure
    #[arg(long, allow_hyphen_values = true)]
    stops: Option<f32>,

    /// Ignored in batch mode; presets set shadow gamma
    #[arg(long)]
    shadow_gamma: Option<f32>,

    #[command(flatten)]
    tuning: TuningArgs,

    #[command(flatten)]
    io: IoArgs,
}

/// Parameters shared by both modes; each overrides the --params file
#[derive(Args)]
struct TuningArgs {
    /// JSON file with base ToneMapParameters
    #[arg(long)]
    params: Option<PathBuf>,

    /// Base compression (<1 compresses dynamic range)
    #[arg(long)]
    compression: Option<f32>,

    /// Detail amplification
    #[arg(long)]
    detail: Option<f32>,

    /// Bilateral spatial sigma (pixels)
    #[arg(long)]
    sigma_space: Option<f32>,

    /// Bilateral range sigma (log-luminance units), <=0 = auto
    #[arg(long, allow_hyphen_values = true)]
    sigma_color: Option<f32>,

    /// Speedup for base extraction (1 = no downsample)
    #[arg(long)]
    downsample: Option<u32>,

    /// 0..1 highlight contrast protection strength
    #[arg(long)]
    hl_protect: Option<f32>,

    /// Start of highlight protection (normalized log-luminance)
    #[arg(long)]
    hl_start: Option<f32>,

    /// End of highlight protection (normalized log-luminance)
    #[arg(long)]
    hl_end: Option<f32>,
}

#[derive(Args)]
struct IoArgs {
    /// Ignore camera white balance
    #[arg(long)]
    no_camera_wb: bool,

    /// JPEG quality for outputs
    #[arg(long, default_value_t = 95, value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// Bits per channel for PNG/TIFF outputs
    #[arg(long, default_value_t = 8, value_parser = parse_bit_depth)]
    bit_depth: u8,
}

fn parse_bit_depth(s: &str) -> std::result::Result<u8, String> {
    match s {
        "8" => Ok(8),
        "16" => Ok(16),
        other => Err(format!("bit depth must be 8 or 16, got '{}'", other)),
    }
}

impl TuningArgs {
    fn resolve(&self) -> Result<ToneMapParameters> {
        let mut params = match &self.params {
            Some(path) => ToneMapParameters::from_json_file(path)
                .with_context(|| format!("Failed to load parameters from {}", path.display()))?,
            None => ToneMapParameters::default(),
        };

        if let Some(v) = self.compression {
            params.compression = v;
        }
        if let Some(v) = self.detail {
            params.detail_amp = v;
        }
        if let Some(v) = self.sigma_space {
            params.sigma_space = v;
        }
        if let Some(v) = self.sigma_color {
            params.sigma_color = v;
        }
        if let Some(v) = self.downsample {
            params.downsample = v;
        }
        if let Some(v) = self.hl_protect {
            params.hl_protect = v;
        }
        if let Some(v) = self.hl_start {
            params.hl_start = v;
        }
        if let Some(v) = self.hl_end {
            params.hl_end = v;
        }
        Ok(params)
    }
}

impl IoArgs {
    fn raw_options(&self) -> RawOptions {
        RawOptions {
            use_camera_wb: !self.no_camera_wb,
            ..RawOptions::default()
        }
    }

    fn output_config(&self) -> OutputConfig {
        OutputConfig {
            jpeg_quality: self.jpeg_quality,
            bit_depth: self.bit_depth,
        }
    }
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let file_layer = match log_file {
        Some(path) => {
            let file = File::options()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;

    match cli.command {
        Command::Convert(args) => convert(args),
        Command::Batch(args) => batch(args),
        Command::Presets => {
            println!("{}", serde_json::to_string_pretty(PRESETS)?);
            Ok(())
        }
    }
}

fn convert(args: ConvertArgs) -> Result<()> {
    let mut params = args.tuning.resolve()?;
    if let Some(v) = args.stops {
        params.stops = v;
    }
    if let Some(v) = args.shadow_gamma {
        params.shadow_gamma = v;
    }

    // Fail fast on bad parameters before touching the input
    let mapper = ToneMapper::new(params).context("Invalid tone-mapping parameters")?;

    if args.dump_params {
        println!("{}", serde_json::to_string_pretty(mapper.params())?);
        return Ok(());
    }

    if !args.input.is_file() {
        bail!("Input not found: {}", args.input.display());
    }

    let out_path = args.output.unwrap_or_else(|| default_output_path(&args.input));
    ImageOutputFormat::from_path(&out_path)?;

    info!("Tone mapping {}", args.input.display());
    let loader = RawLoader::new(args.io.raw_options());
    let linear = loader
        .load(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;

    let display = mapper.run(&linear)?;
    write_display_image(&display, &out_path, &args.io.output_config())
        .with_context(|| format!("Failed to write {}", out_path.display()))?;

    info!("Wrote: {}", out_path.display());
    Ok(())
}

fn batch(args: BatchArgs) -> Result<()> {
    let base = args.tuning.resolve()?;
    if args.stops.is_some() || args.shadow_gamma.is_some() {
        warn!("--stops/--shadow-gamma are ignored in batch mode; preset values apply");
    }

    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to configure thread pool")?;
        info!("Using {} threads", threads);
    }

    let presets = match &args.presets {
        Some(path) => load_presets(path)
            .with_context(|| format!("Failed to load presets from {}", path.display()))?,
        None => PRESETS.to_vec(),
    };

    let format = ImageOutputFormat::from_path(Path::new(&format!("out.{}", args.format)))?;

    let config = BatchConfig {
        in_glob: args.in_glob,
        out_dir: args.out_dir,
        base,
        presets,
        output: args.io.output_config(),
        format,
    };

    let runner = BatchRunner::new(RawLoader::new(args.io.raw_options()), config);
    match runner.run() {
        Ok(report) => {
            if !report.failures.is_empty() {
                warn!("{} file/preset combinations failed", report.failures.len());
            }
            info!("Metrics: {}", serde_json::to_string(&report.metrics)?);
            Ok(())
        }
        Err(e @ TonemapError::NoInputs(_)) => bail!("{}", e),
        Err(e) => Err(e).context("Batch aborted"),
    }
}
