//! Display-image encoding and output naming

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageBuffer, ImageFormat, Rgb};

use crate::error::{Result, TonemapError};
use crate::field::DisplayImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOutputFormat {
    Jpeg,
    Png,
    Tiff,
}

impl ImageOutputFormat {
    /// Pick the container from a path's extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "jpg" | "jpeg" => Ok(ImageOutputFormat::Jpeg),
            "png" => Ok(ImageOutputFormat::Png),
            "tif" | "tiff" => Ok(ImageOutputFormat::Tiff),
            other => Err(TonemapError::Encode(format!(
                "Unsupported output extension '{}' for {}",
                other,
                path.display()
            ))),
        }
    }

    pub fn extension(&self) -> &str {
        match self {
            ImageOutputFormat::Jpeg => "jpg",
            ImageOutputFormat::Png => "png",
            ImageOutputFormat::Tiff => "tif",
        }
    }

    pub fn supports_16bit(&self) -> bool {
        !matches!(self, ImageOutputFormat::Jpeg)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OutputConfig {
    /// JPEG quality, 1-100
    pub jpeg_quality: u8,
    /// 8 or 16 bits per channel (16 only for PNG/TIFF)
    pub bit_depth: u8,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 95,
            bit_depth: 8,
        }
    }
}

/// Round [0, 1] samples to 8 bits
pub fn quantize_u8(img: &DisplayImage) -> Vec<u8> {
    img.iter()
        .map(|&v| (v * 255.0 + 0.5).clamp(0.0, 255.0) as u8)
        .collect()
}

/// Round [0, 1] samples to 16 bits
pub fn quantize_u16(img: &DisplayImage) -> Vec<u16> {
    img.iter()
        .map(|&v| (v * 65535.0 + 0.5).clamp(0.0, 65535.0) as u16)
        .collect()
}

/// Encode a display image to `path`, creating parent directories.
/// The container follows the extension.
pub fn write_display_image(img: &DisplayImage, path: &Path, config: &OutputConfig) -> Result<()> {
    let (h, w, c) = img.dim();
    if c != 3 {
        return Err(TonemapError::Shape(format!("expected 3 channels, got {}", c)));
    }
    let (width, height) = (w as u32, h as u32);
    let format = ImageOutputFormat::from_path(path)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    if config.bit_depth == 16 && format.supports_16bit() {
        let buffer = ImageBuffer::<Rgb<u16>, Vec<u16>>::from_raw(width, height, quantize_u16(img))
            .ok_or_else(|| TonemapError::Encode("Failed to create 16-bit image".to_string()))?;
        let image_format = match format {
            ImageOutputFormat::Tiff => ImageFormat::Tiff,
            _ => ImageFormat::Png,
        };
        return buffer
            .save_with_format(path, image_format)
            .map_err(|e| TonemapError::Encode(format!("Failed to save {}: {}", path.display(), e)));
    }

    let rgb8 = quantize_u8(img);
    match format {
        ImageOutputFormat::Jpeg => {
            let file = File::create(path)?;
            let mut writer = BufWriter::new(file);
            let mut encoder = JpegEncoder::new_with_quality(&mut writer, config.jpeg_quality.clamp(1, 100));
            encoder
                .encode(&rgb8, width, height, ExtendedColorType::Rgb8)
                .map_err(|e| TonemapError::Encode(format!("Failed to write {}: {}", path.display(), e)))
        }
        ImageOutputFormat::Png | ImageOutputFormat::Tiff => {
            let buffer = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_raw(width, height, rgb8)
                .ok_or_else(|| TonemapError::Encode("Failed to create 8-bit image".to_string()))?;
            let image_format = if format == ImageOutputFormat::Png {
                ImageFormat::Png
            } else {
                ImageFormat::Tiff
            };
            buffer
                .save_with_format(path, image_format)
                .map_err(|e| TonemapError::Encode(format!("Failed to save {}: {}", path.display(), e)))
        }
    }
}

/// Float formatted with two decimals, trailing zeros and dot removed
/// (1.50 -> "1.5", 2.00 -> "2")
pub fn slug_float(x: f32) -> String {
    let s = format!("{:.2}", x);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// `<input stem>_tonemapped.jpg` next to the input
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{}_tonemapped.jpg", stem))
}

/// `<stem>__preset<id>__sg-<shadow_gamma>_st-<stops>.<ext>`
pub fn batch_output_name(
    stem: &str,
    preset_id: u32,
    shadow_gamma: f32,
    stops: f32,
    format: ImageOutputFormat,
) -> String {
    format!(
        "{}__preset{}__sg-{}_st-{}.{}",
        stem,
        preset_id,
        slug_float(shadow_gamma),
        slug_float(stops),
        format.extension()
    )
}
