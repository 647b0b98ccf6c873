use image::{GrayImage, Rgb, RgbImage};
use imageproc::{edges::canny, filter::gaussian_blur_f32};
use ndarray::Array2;
use serde::Serialize;

use crate::{
    error::Result,
    image_utils::{array_to_gray, gray_to_array, normalize_to_u8, rgb_to_gray},
    saliency::SaliencyBackend,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HeatmapMode {
    Basic,
    Advanced,
}

impl Default for HeatmapMode {
    fn default() -> Self {
        Self::Basic
    }
}

/// Renders the false-color tamper overlay.
///
/// The basic strategy blends the normalized ELA map with blurred Canny edges
/// and composites the palette over the original; the advanced strategy
/// colorizes a saliency-model confidence map directly.
pub struct HeatmapSynthesizer {
    canny_low: f32,
    canny_high: f32,
    edge_blur_sigma: f32,
    smooth_sigma: f32,
}

impl HeatmapSynthesizer {
    const ELA_WEIGHT: f32 = 0.7;
    const EDGE_WEIGHT: f32 = 0.3;
    // Compositing weights intentionally sum past 1.0 so hot regions saturate.
    const BASE_OPACITY: f32 = 0.6;
    const OVERLAY_OPACITY: f32 = 0.8;

    pub fn new(canny_low: f32, canny_high: f32) -> Self {
        Self {
            canny_low,
            canny_high,
            edge_blur_sigma: 1.5,
            smooth_sigma: 1.0,
        }
    }

    /// ELA/edge blend composited over the original image; output has the
    /// original's dimensions.
    pub fn basic(&self, original: &RgbImage, ela_map: &GrayImage) -> RgbImage {
        let gray = rgb_to_gray(original);
        let edges = canny(&gray, self.canny_low, self.canny_high);
        let blurred_edges = gaussian_blur_f32(&edges, self.edge_blur_sigma);

        let ela_norm = normalize_to_u8(&gray_to_array(ela_map));
        let edge_arr = gray_to_array(&blurred_edges);

        let blend = &ela_norm * Self::ELA_WEIGHT + &edge_arr * Self::EDGE_WEIGHT;
        let smoothed = gaussian_blur_f32(&array_to_gray(&blend), self.smooth_sigma);

        let colored = colorize(&gray_to_array(&smoothed));
        self.composite(original, &colored)
    }

    /// Saliency-model confidence map through the palette, no compositing.
    /// Returns the rendered overlay plus the raw confidence map for the
    /// region-metrics stage.
    pub fn advanced(
        &self,
        original: &RgbImage,
        backend: &dyn SaliencyBackend,
    ) -> Result<(RgbImage, Array2<f32>)> {
        let confidence = backend.confidence_map(original)?;
        let rendered = colorize(&normalize_to_u8(&confidence));
        Ok((rendered, confidence))
    }

    fn composite(&self, original: &RgbImage, overlay: &RgbImage) -> RgbImage {
        let (width, height) = original.dimensions();
        let mut result = RgbImage::new(width, height);

        for y in 0..height {
            for x in 0..width {
                let base = original.get_pixel(x, y);
                let heat = overlay.get_pixel(x, y);
                let mut pixel = [0u8; 3];
                for c in 0..3 {
                    let v = Self::BASE_OPACITY * base[c] as f32
                        + Self::OVERLAY_OPACITY * heat[c] as f32;
                    pixel[c] = v.min(255.0) as u8;
                }
                result.put_pixel(x, y, Rgb(pixel));
            }
        }

        result
    }
}

impl Default for HeatmapSynthesizer {
    fn default() -> Self {
        Self::new(100.0, 200.0)
    }
}

/// Maps an intensity map through the jet-style palette: blue for low,
/// through cyan/green/yellow, red for high.
fn colorize(intensity: &Array2<f32>) -> RgbImage {
    let (height, width) = intensity.dim();
    let mut image = RgbImage::new(width as u32, height as u32);

    for y in 0..height {
        for x in 0..width {
            let t = (intensity[[y, x]] / 255.0).clamp(0.0, 1.0);
            image.put_pixel(x as u32, y as u32, jet_color(t));
        }
    }

    image
}

fn jet_color(intensity: f32) -> Rgb<u8> {
    let (r, g, b) = if intensity < 0.25 {
        let t = intensity / 0.25;
        (0.0, t, 1.0)
    } else if intensity < 0.5 {
        let t = (intensity - 0.25) / 0.25;
        (0.0, 1.0, 1.0 - t)
    } else if intensity < 0.75 {
        let t = (intensity - 0.5) / 0.25;
        (t, 1.0, 0.0)
    } else {
        let t = (intensity - 0.75) / 0.25;
        (1.0, 1.0 - t, 0.0)
    };

    Rgb([(r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_runs_blue_to_red() {
        assert_eq!(jet_color(0.0), Rgb([0, 0, 255]));
        assert_eq!(jet_color(1.0), Rgb([255, 0, 0]));
        let mid = jet_color(0.5);
        assert_eq!(mid[1], 255);
    }

    #[test]
    fn basic_heatmap_matches_input_dimensions() {
        let original = RgbImage::from_fn(40, 30, |x, y| Rgb([x as u8 * 6, y as u8 * 8, 100]));
        let ela_map = GrayImage::from_fn(40, 30, |x, _| image::Luma([(x * 6) as u8]));

        let heatmap = HeatmapSynthesizer::default().basic(&original, &ela_map);
        assert_eq!(heatmap.dimensions(), (40, 30));
    }

    #[test]
    fn basic_heatmap_is_idempotent() {
        let original = RgbImage::from_fn(24, 24, |x, y| Rgb([x as u8 * 10, y as u8 * 10, 50]));
        let ela_map = GrayImage::from_fn(24, 24, |x, y| image::Luma([((x + y) * 5) as u8]));

        let synthesizer = HeatmapSynthesizer::default();
        let a = synthesizer.basic(&original, &ela_map);
        let b = synthesizer.basic(&original, &ela_map);
        assert_eq!(a.as_raw(), b.as_raw());
    }
}
