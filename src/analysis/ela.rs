use std::io::Cursor;

use image::{GrayImage, Luma, RgbImage, codecs::jpeg::JpegEncoder};

use crate::error::{AnalysisError, Result};

/// Error-level analysis: regions recompressed from an already-lossy source
/// show lower residual error than freshly introduced content, so the
/// recompression difference acts as a splice detector.
pub struct ElaAnalyzer {
    quality: u8,
}

#[derive(Debug, Clone)]
pub struct ElaResult {
    /// Luma-weighted grayscale map of the recompression difference.
    pub map: GrayImage,
    /// Mean difference intensity, normalized to [0,1].
    pub mean: f64,
    /// Standard deviation of the difference intensity, normalized to [0,1].
    pub std_dev: f64,
}

impl ElaAnalyzer {
    pub const DEFAULT_QUALITY: u8 = 90;

    pub fn new(quality: u8) -> Self {
        Self { quality }
    }

    pub fn analyze(&self, image: &RgbImage) -> Result<ElaResult> {
        if self.quality == 0 || self.quality > 100 {
            return Err(AnalysisError::InvalidParameter(format!(
                "ELA quality must be in 1..=100, got {}",
                self.quality
            )));
        }

        let (width, height) = image.dimensions();
        let recompressed = self.recompress_jpeg(image)?;

        let mut map = GrayImage::new(width, height);
        let mut sum = 0.0f64;
        let mut sum_sq = 0.0f64;

        for y in 0..height {
            for x in 0..width {
                let orig = image.get_pixel(x, y);
                let recomp = recompressed.get_pixel(x, y);

                // Signed 16-bit domain avoids u8 underflow before the abs.
                let diff_r = (orig[0] as i16 - recomp[0] as i16).unsigned_abs() as f64;
                let diff_g = (orig[1] as i16 - recomp[1] as i16).unsigned_abs() as f64;
                let diff_b = (orig[2] as i16 - recomp[2] as i16).unsigned_abs() as f64;

                let lum = (0.299 * diff_r + 0.587 * diff_g + 0.114 * diff_b)
                    .round()
                    .clamp(0.0, 255.0);
                map.put_pixel(x, y, Luma([lum as u8]));

                sum += lum;
                sum_sq += lum * lum;
            }
        }

        let count = (width as f64) * (height as f64);
        let mean = sum / count;
        let variance = (sum_sq / count - mean * mean).max(0.0);

        Ok(ElaResult {
            map,
            mean: mean / 255.0,
            std_dev: variance.sqrt() / 255.0,
        })
    }

    fn recompress_jpeg(&self, image: &RgbImage) -> Result<RgbImage> {
        let (width, height) = image.dimensions();
        let mut buffer = Cursor::new(Vec::new());

        let mut encoder = JpegEncoder::new_with_quality(&mut buffer, self.quality);
        encoder
            .encode(image.as_raw(), width, height, image::ExtendedColorType::Rgb8)
            .map_err(AnalysisError::Encode)?;

        let recompressed = image::load_from_memory(&buffer.into_inner())?;
        Ok(recompressed.to_rgb8())
    }
}

impl Default for ElaAnalyzer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_QUALITY)
    }
}
