//! FITS → JPEG preview rendering
//!
//! Pipeline per frame:
//!
//! 1. read the primary image plane ([`crate::fits::read_primary`])
//! 2. stretch between the 1st and 99th percentile, clipped to `[0, 1]`
//! 3. halve both dimensions with a 2x2 box average
//! 4. flip rows so FITS row 0 ends up at the bottom of the raster
//! 5. encode 8-bit grayscale JPEG into the scratch directory

use crate::error::{RelayError, Result};
use crate::fits;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const LOW_PERCENTILE: f64 = 1.0;
const HIGH_PERCENTILE: f64 = 99.0;

/// Renders previews into a scratch directory.
#[derive(Debug, Clone)]
pub struct PreviewRenderer {
    scratch_dir: PathBuf,
    quality: u8,
}

/// A stretched and downscaled frame, row 0 at the bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct Stretched {
    pub width: usize,
    pub height: usize,
    pub values: Vec<f32>,
}

impl PreviewRenderer {
    pub fn new(scratch_dir: impl Into<PathBuf>, quality: u8) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            quality: quality.clamp(1, 100),
        }
    }

    /// Where the preview for `source` is written.
    pub fn preview_path(&self, source: &Path) -> PathBuf {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "preview".to_string());
        self.scratch_dir.join(format!("{}.jpg", stem))
    }

    /// Convert one FITS file into a JPEG preview and return its path.
    pub fn render(&self, source: &Path) -> Result<PathBuf> {
        let image = fits::read_primary(source)?;
        let frame = stretch_and_downscale(&image.pixels, image.width, image.height);
        let out = self.preview_path(source);
        self.write_jpeg(&frame, &out)?;

        debug!(
            source = %source.display(),
            preview = %out.display(),
            object = image.header.value("OBJECT").unwrap_or("-"),
            width = frame.width,
            height = frame.height,
            "Rendered preview"
        );
        Ok(out)
    }

    /// Convert into an explicit output path instead of the scratch directory.
    pub fn render_to(&self, source: &Path, out: &Path) -> Result<PathBuf> {
        let image = fits::read_primary(source)?;
        let frame = stretch_and_downscale(&image.pixels, image.width, image.height);
        self.write_jpeg(&frame, out)?;
        Ok(out.to_path_buf())
    }

    fn write_jpeg(&self, frame: &Stretched, out: &Path) -> Result<()> {
        if let Some(parent) = out.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let width = u32::try_from(frame.width)
            .map_err(|_| RelayError::fits(out, "preview width exceeds u32"))?;
        let height = u32::try_from(frame.height)
            .map_err(|_| RelayError::fits(out, "preview height exceeds u32"))?;
        let gray = to_gray_top_down(frame);

        let mut writer = BufWriter::new(File::create(out)?);
        JpegEncoder::new_with_quality(&mut writer, self.quality).encode(
            &gray,
            width,
            height,
            ExtendedColorType::L8,
        )?;
        writer.flush()?;
        Ok(())
    }
}

/// Linear-interpolated percentile of an ascending slice. `p` is in `[0, 100]`.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = p.clamp(0.0, 100.0) * (sorted.len() - 1) as f64 / 100.0;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// The 1st/99th percentile window over all finite pixels.
pub fn stretch_bounds(pixels: &[f64]) -> Option<(f64, f64)> {
    let mut finite: Vec<f64> = pixels.iter().copied().filter(|v| v.is_finite()).collect();
    finite.sort_unstable_by(f64::total_cmp);
    Some((
        percentile(&finite, LOW_PERCENTILE)?,
        percentile(&finite, HIGH_PERCENTILE)?,
    ))
}

/// Map every pixel into `[0, 1]` using the percentile window.
///
/// A degenerate window (`vmax <= vmin`) or a frame without finite pixels
/// yields an all-black frame.
pub fn normalize(pixels: &[f64]) -> Vec<f32> {
    let Some((vmin, vmax)) = stretch_bounds(pixels) else {
        return vec![0.0; pixels.len()];
    };
    let span = vmax - vmin;
    if !(span > 0.0) {
        return vec![0.0; pixels.len()];
    }
    pixels
        .iter()
        .map(|&v| {
            if v.is_finite() {
                ((v - vmin) / span).clamp(0.0, 1.0) as f32
            } else {
                0.0
            }
        })
        .collect()
}

/// Halve both axes by averaging 2x2 blocks; an odd trailing row or column is dropped.
pub fn downscale_half(values: &[f32], width: usize, height: usize) -> Stretched {
    let out_w = (width / 2).max(1);
    let out_h = (height / 2).max(1);
    let mut out = Vec::with_capacity(out_w * out_h);

    for oy in 0..out_h {
        let y0 = oy * 2;
        let y1 = (y0 + 2).min(height);
        for ox in 0..out_w {
            let x0 = ox * 2;
            let x1 = (x0 + 2).min(width);
            let mut sum = 0.0f32;
            let mut n = 0u32;
            for y in y0..y1 {
                for x in x0..x1 {
                    sum += values[y * width + x];
                    n += 1;
                }
            }
            out.push(if n == 0 { 0.0 } else { sum / n as f32 });
        }
    }

    Stretched {
        width: out_w,
        height: out_h,
        values: out,
    }
}

pub fn stretch_and_downscale(pixels: &[f64], width: usize, height: usize) -> Stretched {
    let normalized = normalize(pixels);
    downscale_half(&normalized, width, height)
}

/// 8-bit raster, first row = top of the picture = last FITS row.
pub fn to_gray_top_down(frame: &Stretched) -> Vec<u8> {
    let mut gray = Vec::with_capacity(frame.values.len());
    for row in frame.values.chunks_exact(frame.width).rev() {
        gray.extend(row.iter().map(|&v| (v * 255.0).round().clamp(0.0, 255.0) as u8));
    }
    gray
}
