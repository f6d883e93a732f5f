//! End-to-end tests for the tone-mapping pipeline and batch runner

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dng_tonemap::field::ScalarField;
use dng_tonemap::luminance::luminance;
use dng_tonemap::{
    tone_map, BatchConfig, BatchRunner, EdgeAwareSmoother, ImageOutputFormat, LinearImage,
    LinearLoader, OutputConfig, Preset, RawLoader, ToneMapParameters, ToneMapper, TonemapError,
    PRESETS,
};
use image::{ImageBuffer, Rgb};
use ndarray::{Array3, Axis};
use tempfile::TempDir;

/// Horizontal gray ramp from `lo` to `hi`
fn gray_ramp(h: usize, w: usize, lo: f32, hi: f32) -> LinearImage {
    Array3::from_shape_fn((h, w, 3), |(_, x, _)| lo + (hi - lo) * x as f32 / (w - 1) as f32)
}

fn small_params() -> ToneMapParameters {
    ToneMapParameters {
        downsample: 1,
        sigma_space: 2.0,
        ..Default::default()
    }
}

/// Loader serving a synthetic ramp; files whose name contains "bad" fail to decode
struct SyntheticLoader;

impl LinearLoader for SyntheticLoader {
    fn load(&self, path: &Path) -> dng_tonemap::Result<LinearImage> {
        let name = path.file_name().unwrap().to_string_lossy();
        if name.contains("bad") {
            return Err(TonemapError::Decode(format!("corrupt capture {}", name)));
        }
        Ok(gray_ramp(16, 24, 0.01, 0.8))
    }
}

fn touch_inputs(dir: &TempDir, names: &[&str]) {
    for name in names {
        std::fs::write(dir.path().join(name), b"raw").unwrap();
    }
}

#[test]
fn test_gradient_stays_monotonic_and_neutral() {
    // Starts at true black, where luminance is only the EPS floor
    let rgb = gray_ramp(64, 64, 0.0, 1.0);
    assert_eq!(rgb[[0, 0, 0]], 0.0);
    let params = ToneMapParameters {
        downsample: 1,
        ..Default::default()
    };

    let display = tone_map(&rgb, &params).unwrap();
    assert_eq!(display.dim(), (64, 64, 3));

    let column_means = display.index_axis(Axis(2), 1).mean_axis(Axis(0)).unwrap();
    for x in 1..64 {
        assert!(
            column_means[x] + 1e-3 >= column_means[x - 1],
            "luminance drops at column {}: {} < {}",
            x,
            column_means[x],
            column_means[x - 1]
        );
    }

    for px in display.lanes(Axis(2)) {
        assert!((px[0] - px[1]).abs() < 1e-5 && (px[1] - px[2]).abs() < 1e-5);
        assert!(px.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }
}

#[test]
fn test_identity_parameters_only_rescale_to_peak() {
    let rgb = gray_ramp(8, 16, 0.02, 0.5);
    let mapper = ToneMapper::new(ToneMapParameters {
        sigma_space: 2.0,
        ..ToneMapParameters::identity()
    })
    .unwrap();

    let stages = mapper.run_stages(&rgb).unwrap();
    for ((y, x, c), &v) in stages.linear.indexed_iter() {
        let expected = (rgb[[y, x, c]] * 2.0).min(1.0);
        assert!((v - expected).abs() < 1e-3, "({}, {}, {}): {} vs {}", y, x, c, v, expected);
    }
}

#[test]
fn test_colour_ratios_survive_tone_mapping() {
    let rgb = Array3::from_shape_fn((12, 12, 3), |(y, x, c)| {
        let level = 0.02 + 0.3 * (x + y) as f32 / 22.0;
        level * [1.0, 0.6, 0.3][c]
    });

    let stages = ToneMapper::new(small_params()).unwrap().run_stages(&rgb).unwrap();
    for (inp, out) in rgb.lanes(Axis(2)).into_iter().zip(stages.linear.lanes(Axis(2))) {
        if out.iter().any(|&v| v >= 1.0) {
            continue;
        }
        let in_ratio = inp[1] / inp[0];
        let out_ratio = out[1] / out[0];
        assert!((in_ratio - out_ratio).abs() < 1e-3);
    }
}

#[test]
fn test_exposure_is_absorbed_by_peak_normalization() {
    // Scaling a constant field changes nothing after normalization
    let rgb = Array3::from_elem((6, 6, 3), 0.1f32);
    let base = tone_map(&rgb, &small_params()).unwrap();
    let boosted = tone_map(
        &rgb,
        &ToneMapParameters {
            stops: 2.0,
            ..small_params()
        },
    )
    .unwrap();
    for (a, b) in base.iter().zip(boosted.iter()) {
        assert!((a - b).abs() < 1e-4);
    }
}

#[test]
fn test_large_detail_gain_stays_finite() {
    let rgb = Array3::from_shape_fn((16, 16, 3), |(y, x, _)| if (x + y) % 2 == 0 { 1.0 } else { 1e-4 });
    let params = ToneMapParameters {
        sigma_color: 100.0,
        detail_amp: 30.0,
        downsample: 1,
        ..Default::default()
    };

    let stages = ToneMapper::new(params).unwrap().run_stages(&rgb).unwrap();
    assert!(stages.normalized_luminance.iter().all(|v| v.is_finite()));
    let peak = stages.normalized_luminance.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    assert!((peak - 1.0).abs() < 1e-6);
    assert!(stages.linear.iter().all(|v| v.is_finite()));

    let display = tone_map(&rgb, &params).unwrap();
    assert!(display.iter().all(|v| v.is_finite() && (0.0..=1.0).contains(v)));
    // Bright squares stay bright instead of collapsing to black
    assert!(display[[0, 0, 0]] > 0.9);
}

#[test]
fn test_custom_smoother_is_used() {
    struct Passthrough(Arc<AtomicUsize>);

    impl EdgeAwareSmoother for Passthrough {
        fn smooth(
            &self,
            field: &ScalarField,
            _sigma_space: f32,
            _sigma_color: f32,
        ) -> dng_tonemap::Result<ScalarField> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(field.clone())
        }
    }

    let calls = Arc::new(AtomicUsize::new(0));
    let mapper = ToneMapper::with_smoother(small_params(), Passthrough(Arc::clone(&calls))).unwrap();
    let stages = mapper.run_stages(&gray_ramp(10, 10, 0.05, 0.9)).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(stages.detail.iter().all(|&d| d.abs() < 1e-6));
    assert_eq!(stages.base, stages.log_luminance);
}

#[test]
fn test_invalid_parameters_fail_before_running() {
    let params = ToneMapParameters {
        hl_start: 0.95,
        hl_end: 0.5,
        ..Default::default()
    };
    assert!(matches!(
        ToneMapper::new(params),
        Err(TonemapError::InvalidParameter(_))
    ));
}

#[test]
fn test_linear_png_end_to_end() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("linear.png");
    let buffer = ImageBuffer::from_fn(20, 10, |x, _| {
        let v = (x * 3000 + 500) as u16;
        Rgb([v, v / 2, v / 4])
    });
    buffer.save(&input).unwrap();

    let linear = RawLoader::default().load(&input).unwrap();
    assert_eq!(linear.dim(), (10, 20, 3));

    let display = tone_map(&linear, &small_params()).unwrap();
    let out = dir.path().join("out/linear_tonemapped.jpg");
    dng_tonemap::output::write_display_image(&display, &out, &OutputConfig::default()).unwrap();

    let decoded = image::open(&out).unwrap().to_rgb8();
    assert_eq!(decoded.dimensions(), (20, 10));
    // Red channel dominates like the input
    let px = decoded.get_pixel(15, 5);
    assert!(px[0] > px[2]);
    let y = luminance(&display);
    assert!(y.iter().all(|v| v.is_finite()));
}

#[test]
fn test_batch_contains_failures_and_names_outputs() {
    let in_dir = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    touch_inputs(&in_dir, &["a.dng", "bad.dng", "b.dng", "notes.txt"]);

    let broken = Preset {
        id: 9,
        compression: Some(2.0),
        ..Default::default()
    };
    let config = BatchConfig {
        in_glob: format!("{}/*.dng", in_dir.path().display()),
        out_dir: out_dir.path().join("processed"),
        base: small_params(),
        presets: vec![PRESETS[0], PRESETS[1], broken],
        ..Default::default()
    };

    let runner = BatchRunner::new(SyntheticLoader, config);
    let report = runner.run().unwrap();

    assert_eq!(report.inputs.len(), 3);
    assert_eq!(report.written.len(), 4);
    assert!(!report.is_clean());

    // One decode failure plus the broken preset on each good file
    assert_eq!(report.failures.len(), 3);
    assert_eq!(report.failures.iter().filter(|f| f.preset_id.is_none()).count(), 1);
    assert_eq!(report.failures.iter().filter(|f| f.preset_id == Some(9)).count(), 2);

    let processed = out_dir.path().join("processed");
    assert!(processed.join("a__preset1__sg-1_st-0.jpg").is_file());
    assert!(processed.join("a__preset2__sg-1.15_st-0.5.jpg").is_file());
    assert!(processed.join("b__preset2__sg-1.15_st-0.5.jpg").is_file());
    assert!(!processed.join("bad__preset1__sg-1_st-0.jpg").exists());

    assert_eq!(report.metrics.files_seen, 3);
    assert_eq!(report.metrics.files_failed, 1);
    assert_eq!(report.metrics.outputs_written, 4);
    assert_eq!(report.metrics.outputs_failed, 2);
}

#[test]
fn test_batch_png_format() {
    let in_dir = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    touch_inputs(&in_dir, &["shot.dng"]);

    let config = BatchConfig {
        in_glob: format!("{}/*.dng", in_dir.path().display()),
        out_dir: out_dir.path().to_path_buf(),
        base: small_params(),
        presets: vec![PRESETS[5]],
        format: ImageOutputFormat::Png,
        ..Default::default()
    };
    let report = BatchRunner::new(SyntheticLoader, config).run().unwrap();

    assert!(report.is_clean());
    assert_eq!(report.written, vec![out_dir.path().join("shot__preset6__sg-2_st-2.png")]);
}

#[test]
fn test_batch_without_matches_reports_no_inputs() {
    let in_dir = TempDir::new().unwrap();
    let config = BatchConfig {
        in_glob: format!("{}/*.dng", in_dir.path().display()),
        out_dir: in_dir.path().join("out"),
        ..Default::default()
    };

    let result = BatchRunner::new(SyntheticLoader, config).run();
    assert!(matches!(result, Err(TonemapError::NoInputs(_))));
    assert!(!in_dir.path().join("out").exists());
}

#[test]
fn test_cancelled_batch_skips_remaining_files() {
    let in_dir = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    touch_inputs(&in_dir, &["a.dng", "b.dng"]);

    let config = BatchConfig {
        in_glob: format!("{}/*.dng", in_dir.path().display()),
        out_dir: out_dir.path().to_path_buf(),
        base: small_params(),
        ..Default::default()
    };
    let runner = BatchRunner::new(SyntheticLoader, config);
    runner.cancel_flag().store(true, Ordering::SeqCst);

    let report = runner.run().unwrap();
    assert!(report.written.is_empty());
    assert_eq!(report.skipped.len(), 2);
    assert_eq!(report.metrics.files_skipped, 2);
    assert!(!report.is_clean());
}
