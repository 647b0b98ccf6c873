use image::RgbImage;
use imageproc::edges::canny;

use crate::{error::Result, image_utils::rgb_to_gray};

/// Fraction of Canny edge pixels over the whole frame. Sharp, unmanipulated
/// detail keeps this high; blurring and splicing tend to suppress it.
pub struct EdgeDensityAnalyzer {
    low_threshold: f32,
    high_threshold: f32,
}

impl EdgeDensityAnalyzer {
    pub const DEFAULT_LOW: f32 = 100.0;
    pub const DEFAULT_HIGH: f32 = 200.0;

    pub fn new(low_threshold: f32, high_threshold: f32) -> Self {
        Self {
            low_threshold,
            high_threshold,
        }
    }

    pub fn analyze(&self, image: &RgbImage) -> Result<f64> {
        let gray = rgb_to_gray(image);
        let edges = canny(&gray, self.low_threshold, self.high_threshold);

        let edge_count = edges.pixels().filter(|p| p[0] != 0).count();
        let total = edges.width() as f64 * edges.height() as f64;
        Ok(edge_count as f64 / total)
    }
}

impl Default for EdgeDensityAnalyzer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LOW, Self::DEFAULT_HIGH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn flat_image_has_zero_density() {
        let image = RgbImage::from_pixel(64, 64, Rgb([128, 128, 128]));
        let density = EdgeDensityAnalyzer::default().analyze(&image).unwrap();
        assert_eq!(density, 0.0);
    }

    #[test]
    fn hard_boundary_produces_edges() {
        let image = RgbImage::from_fn(64, 64, |x, _| {
            if x < 32 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) }
        });
        let density = EdgeDensityAnalyzer::default().analyze(&image).unwrap();
        assert!(density > 0.0);
        assert!(density <= 1.0);
    }
}
