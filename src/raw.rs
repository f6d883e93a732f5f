//! Linear-light loading of RAW captures via libraw FFI
//!
//! libraw is configured so that nothing display-referred leaks into the data:
//! gamma (1, 1), no auto-brightness, 16-bit output, sRGB primaries, AHD
//! demosaic, full size, no rotation. Inputs libraw cannot open (16-bit TIFF or
//! PNG exports) are decoded with the `image` crate and taken as already linear.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use rsraw::RawImage;
use rsraw_sys as sys;
use tracing::debug;

use crate::error::{Result, TonemapError};
use crate::field::LinearImage;
use crate::luminance::normalize_u16;

/// Source of linear-light RGB rasters
pub trait LinearLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<LinearImage>;
}

/// libraw demosaic quality: AHD
pub const DEMOSAIC_AHD: u8 = 3;

/// libraw output colour space: sRGB (D65)
const OUTPUT_COLOR_SRGB: i32 = 1;

/// RAW decoding options
#[derive(Debug, Clone)]
pub struct RawOptions {
    /// Use the camera's as-shot white balance
    pub use_camera_wb: bool,

    /// libraw `user_qual` demosaic algorithm (0 = linear, 3 = AHD, 11 = DHT, 12 = AAHD)
    pub demosaic_algorithm: u8,

    /// Half-size output (2x2 binning, no demosaic)
    pub half_size: bool,
}

impl Default for RawOptions {
    fn default() -> Self {
        Self {
            use_camera_wb: true,
            demosaic_algorithm: DEMOSAIC_AHD,
            half_size: false,
        }
    }
}

/// Loader backed by libraw, with an `image` crate fallback for rasters
#[derive(Debug, Clone, Default)]
pub struct RawLoader {
    options: RawOptions,
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Temporary PPM written by libraw, removed on drop
struct TempPpm(PathBuf);

impl TempPpm {
    fn new() -> Self {
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(std::env::temp_dir().join(format!("dng_tonemap_{}_{}.ppm", std::process::id(), n)))
    }
}

impl Drop for TempPpm {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

impl RawLoader {
    pub fn new(options: RawOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RawOptions {
        &self.options
    }

    /// Check if data is a RAW format by trying to open with libraw
    pub fn is_raw_data(data: &[u8]) -> bool {
        RawImage::open(data).is_ok()
    }

    /// Decode RAW bytes to interleaved 16-bit linear RGB: (samples, width, height)
    pub fn decode_raw(&self, file_data: &[u8]) -> Result<(Vec<u16>, u32, u32)> {
        let mut raw = RawImage::open(file_data)
            .map_err(|e| TonemapError::Decode(format!("Failed to open RAW file: {:?}", e)))?;

        // rsraw does not expose the output parameters; its handle is the
        // libraw_data_t pointer, so reach through it
        let raw_ptr: *mut sys::libraw_data_t = unsafe { std::mem::transmute_copy(&raw) };

        unsafe {
            let params = &mut (*raw_ptr).params;

            params.use_camera_wb = if self.options.use_camera_wb { 1 } else { 0 };
            params.use_auto_wb = 0;

            // Keep linear: no tone curve, no brightness scaling
            params.gamm[0] = 1.0;
            params.gamm[1] = 1.0;
            params.no_auto_bright = 1;
            params.bright = 1.0;

            params.output_bps = 16;
            params.output_color = OUTPUT_COLOR_SRGB;
            params.user_qual = self.options.demosaic_algorithm as i32;
            params.half_size = if self.options.half_size { 1 } else { 0 };
            params.user_flip = 0;
        }

        raw.unpack()
            .map_err(|e| TonemapError::Decode(format!("Failed to unpack RAW: {:?}", e)))?;

        unsafe {
            let ret = sys::libraw_dcraw_process(raw_ptr);
            if ret != 0 {
                return Err(TonemapError::Decode(format!(
                    "libraw_dcraw_process failed with code {}",
                    ret
                )));
            }
        }

        // dcraw_make_mem_image has the wrong layout; go through libraw's PPM writer
        let temp = TempPpm::new();
        let path_str = temp.0.to_str().ok_or_else(|| {
            TonemapError::Decode(format!("Temp path is not UTF-8: {}", temp.0.display()))
        })?;
        let c_path = std::ffi::CString::new(path_str)
            .map_err(|e| TonemapError::Decode(format!("Invalid temp path: {}", e)))?;

        unsafe {
            let ret = sys::libraw_dcraw_ppm_tiff_writer(raw_ptr, c_path.as_ptr());
            if ret != 0 {
                return Err(TonemapError::Decode(format!(
                    "libraw_dcraw_ppm_tiff_writer failed with code {}",
                    ret
                )));
            }
        }

        let ppm_data = std::fs::read(&temp.0)?;
        parse_ppm(&ppm_data)
    }

    /// Decode a non-RAW raster (TIFF, PNG, ...) to 16-bit RGB
    pub fn decode_raster(file_data: &[u8]) -> Result<(Vec<u16>, u32, u32)> {
        let img = image::load_from_memory(file_data)
            .map_err(|e| TonemapError::Decode(format!("Failed to decode image: {}", e)))?;
        let rgb = img.to_rgb16();
        let (width, height) = rgb.dimensions();
        Ok((rgb.into_raw(), width, height))
    }
}

impl LinearLoader for RawLoader {
    fn load(&self, path: &Path) -> Result<LinearImage> {
        let file_data = std::fs::read(path)?;

        let (samples, width, height) = if Self::is_raw_data(&file_data) {
            debug!("Decoding {} with libraw", path.display());
            self.decode_raw(&file_data)?
        } else {
            debug!("Decoding {} as linear raster", path.display());
            Self::decode_raster(&file_data)?
        };

        debug!("Loaded {}x{} from {}", width, height, path.display());
        normalize_u16(&samples, width, height)
    }
}

/// Parse a binary P6 PPM into 16-bit samples.
///
/// 8-bit files are widened to 16 bits; 16-bit files are big-endian per the
/// netpbm format.
pub fn parse_ppm(data: &[u8]) -> Result<(Vec<u16>, u32, u32)> {
    let mut tokens: Vec<&[u8]> = Vec::with_capacity(4);
    let mut pos = 0;
    while tokens.len() < 4 {
        while pos < data.len() && data[pos].is_ascii_whitespace() {
            pos += 1;
        }
        let start = pos;
        while pos < data.len() && !data[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if start == pos {
            return Err(TonemapError::Decode("Truncated PPM header".to_string()));
        }
        tokens.push(&data[start..pos]);
    }
    // Exactly one whitespace byte separates the header from the samples
    let header_end = pos + 1;

    if tokens[0] != b"P6" {
        return Err(TonemapError::Decode("Invalid PPM format".to_string()));
    }
    let number = |t: &[u8], what: &str| -> Result<u32> {
        std::str::from_utf8(t)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| TonemapError::Decode(format!("Invalid PPM {}", what)))
    };
    let width = number(tokens[1], "width")?;
    let height = number(tokens[2], "height")?;
    let maxval = number(tokens[3], "maxval")?;
    if maxval == 0 || maxval > 65535 {
        return Err(TonemapError::Decode(format!("Invalid PPM maxval {}", maxval)));
    }

    let count = width as usize * height as usize * 3;
    let body = data.get(header_end..).unwrap_or(&[]);
    let samples: Vec<u16> = if maxval > 255 {
        if body.len() < count * 2 {
            return Err(TonemapError::Decode("Truncated PPM data".to_string()));
        }
        body.chunks_exact(2)
            .take(count)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .collect()
    } else {
        if body.len() < count {
            return Err(TonemapError::Decode("Truncated PPM data".to_string()));
        }
        body.iter().take(count).map(|&b| b as u16 * 257).collect()
    };

    // Rescale when maxval is not the full 16-bit range
    let samples = if maxval == 65535 || maxval == 255 {
        samples
    } else {
        let full = if maxval > 255 { maxval } else { maxval * 257 };
        samples
            .into_iter()
            .map(|v| ((v as u64 * 65535 + full as u64 / 2) / full as u64).min(65535) as u16)
            .collect()
    };

    Ok((samples, width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ppm_16bit_big_endian() {
        let mut data = b"P6\n2 1\n65535\n".to_vec();
        for v in [0u16, 1, 256, 65535, 4660, 0] {
            data.extend_from_slice(&v.to_be_bytes());
        }
        let (samples, w, h) = parse_ppm(&data).unwrap();
        assert_eq!((w, h), (2, 1));
        assert_eq!(samples, vec![0, 1, 256, 65535, 4660, 0]);
    }

    #[test]
    fn test_parse_ppm_8bit_widens() {
        let mut data = b"P6 1 1 255\n".to_vec();
        data.extend_from_slice(&[0, 128, 255]);
        let (samples, _, _) = parse_ppm(&data).unwrap();
        assert_eq!(samples, vec![0, 128 * 257, 65535]);
    }

    #[test]
    fn test_parse_ppm_rejects_garbage() {
        assert!(parse_ppm(b"P5\n1 1\n255\n\0").is_err());
        assert!(parse_ppm(b"P6\n1 1\n").is_err());
        assert!(parse_ppm(b"P6\n2 2\n65535\n\0\0").is_err());
    }

    #[test]
    fn test_load_png_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("linear.png");
        let img = image::ImageBuffer::<image::Rgb<u16>, Vec<u16>>::from_fn(3, 2, |x, _| {
            image::Rgb([x as u16 * 30000, 65535, 0])
        });
        img.save(&path).unwrap();

        let linear = RawLoader::default().load(&path).unwrap();
        assert_eq!(linear.dim(), (2, 3, 3));
        assert_eq!(linear[[1, 0, 0]], 0.0);
        assert_eq!(linear[[0, 2, 1]], 1.0);
        assert!((linear[[0, 1, 0]] - 30000.0 / 65535.0).abs() < 1e-6);
    }

    #[test]
    fn test_load_missing_file() {
        let err = RawLoader::default().load(Path::new("/nonexistent/file.dng"));
        assert!(matches!(err, Err(TonemapError::Io(_))));
    }

    #[test]
    fn test_load_garbage_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.dng");
        std::fs::write(&path, b"definitely not a raw file").unwrap();
        assert!(matches!(RawLoader::default().load(&path), Err(TonemapError::Decode(_))));
    }
}
