use std::collections::BTreeMap;

use image::RgbImage;
use ndarray::Array2;
use statrs::statistics::Statistics;

use crate::{
    error::Result,
    image_utils::{convolve3x3, gray_to_array, percentile, resize_bilinear, rgb_to_gray,
        value_channel},
};

const EPSILON: f64 = 1e-5;

// 3x3 Sobel cross-derivative (d2/dxdy) and 4-neighbor Laplacian kernels.
const SOBEL_CROSS: [[f64; 3]; 3] = [[1.0, 0.0, -1.0], [0.0, 0.0, 0.0], [-1.0, 0.0, 1.0]];
const LAPLACIAN: [[f64; 3]; 3] = [[0.0, 1.0, 0.0], [1.0, -4.0, 1.0], [0.0, 1.0, 0.0]];

/// Six comparative statistics between the suspected region and the rest of
/// the image, each on a [0,100] confidence scale. Diagnostic outputs only;
/// they do not feed the primary score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionMetrics {
    pub noise_analysis: f64,
    pub jpeg_artifacts: f64,
    pub color_inconsistency: f64,
    pub edge_discontinuity: f64,
    pub lighting_mismatch: f64,
    pub shadow_irregularity: f64,
}

impl RegionMetrics {
    pub fn zeroed() -> Self {
        Self {
            noise_analysis: 0.0,
            jpeg_artifacts: 0.0,
            color_inconsistency: 0.0,
            edge_discontinuity: 0.0,
            lighting_mismatch: 0.0,
            shadow_irregularity: 0.0,
        }
    }

    pub fn to_map(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("Noise Analysis".into(), self.noise_analysis),
            ("JPEG Artifacts".into(), self.jpeg_artifacts),
            ("Color Inconsistency".into(), self.color_inconsistency),
            ("Edge Discontinuity".into(), self.edge_discontinuity),
            ("Lighting Mismatch".into(), self.lighting_mismatch),
            ("Shadow Irregularity".into(), self.shadow_irregularity),
        ])
    }
}

/// Partitions pixels by heatmap confidence and contrasts the two
/// populations. Suspected pixels are those at or above the configured
/// percentile of the heatmap intensities (90th by default).
pub struct RegionMetricsExtractor {
    percentile: f64,
}

impl RegionMetricsExtractor {
    pub const DEFAULT_PERCENTILE: f64 = 90.0;

    pub fn new(percentile: f64) -> Self {
        Self { percentile }
    }

    pub fn extract(&self, image: &RgbImage, heatmap: &Array2<f32>) -> Result<RegionMetrics> {
        let (width, height) = image.dimensions();
        let (width, height) = (width as usize, height as usize);

        let confidence = resize_bilinear(heatmap, width, height);
        let values: Vec<f32> = confidence.iter().copied().collect();
        let threshold = percentile(&values, self.percentile) as f32;
        let mask = confidence.mapv(|v| v >= threshold);

        let suspected_count = mask.iter().filter(|&&m| m).count();
        if suspected_count == 0 || suspected_count == mask.len() {
            return Ok(RegionMetrics::zeroed());
        }

        let gray = gray_to_array(&rgb_to_gray(image)).mapv(f64::from);
        let value = value_channel(image);
        let sobel = convolve3x3(&gray, &SOBEL_CROSS);
        let laplacian = convolve3x3(&value, &LAPLACIAN);

        let noise = {
            let var_suspected = masked_values(&gray, &mask, true).population_variance();
            let var_background = masked_values(&gray, &mask, false).population_variance();
            (var_suspected - var_background).abs() / (var_background + EPSILON)
        };

        let jpeg = block_dct_variance(&gray);

        let color = {
            let mut diff = 0.0;
            for channel in 0..3 {
                let mean_of = |suspected: bool| {
                    let mut sum = 0.0;
                    let mut count = 0usize;
                    for (x, y, pixel) in image.enumerate_pixels() {
                        if mask[[y as usize, x as usize]] == suspected {
                            sum += pixel[channel] as f64;
                            count += 1;
                        }
                    }
                    sum / count as f64
                };
                diff += (mean_of(true) - mean_of(false)).abs();
            }
            (diff / 3.0) / 128.0
        };

        let edge = mean_contrast(&sobel, &mask) / 255.0;
        let lighting = mean_contrast(&laplacian, &mask) / 10.0;
        let shadow = mean_contrast(&value, &mask) / 50.0;

        Ok(RegionMetrics {
            noise_analysis: to_confidence(noise),
            jpeg_artifacts: to_confidence(jpeg),
            color_inconsistency: to_confidence(color),
            edge_discontinuity: to_confidence(edge),
            lighting_mismatch: to_confidence(lighting),
            shadow_irregularity: to_confidence(shadow),
        })
    }
}

impl Default for RegionMetricsExtractor {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PERCENTILE)
    }
}

fn to_confidence(value: f64) -> f64 {
    (value * 100.0).clamp(0.0, 100.0)
}

fn masked_values(map: &Array2<f64>, mask: &Array2<bool>, suspected: bool) -> Vec<f64> {
    map.iter()
        .zip(mask.iter())
        .filter(|&(_, &m)| m == suspected)
        .map(|(&v, _)| v)
        .collect()
}

fn mean_contrast(map: &Array2<f64>, mask: &Array2<bool>) -> f64 {
    let suspected = masked_values(map, mask, true).mean();
    let background = masked_values(map, mask, false).mean();
    (suspected - background).abs()
}

/// Average per-block DCT coefficient variance over the non-overlapping 8x8
/// grid, a proxy for compression-grid discontinuity.
fn block_dct_variance(gray: &Array2<f64>) -> f64 {
    let (height, width) = gray.dim();
    let dct = dct_matrix();
    let dct_t = transpose(&dct);

    let mut total = 0.0;
    for by in (0..height).step_by(8) {
        for bx in (0..width).step_by(8) {
            if by + 8 > height || bx + 8 > width {
                continue;
            }

            let mut block = [[0.0f64; 8]; 8];
            for y in 0..8 {
                for x in 0..8 {
                    block[y][x] = gray[[by + y, bx + x]];
                }
            }

            let coeffs = matmul(&matmul(&dct, &block), &dct_t);
            total += coeffs.iter().flatten().copied().population_variance();
        }
    }

    total / (height as f64 * width as f64 / 64.0)
}

/// Orthonormal 8x8 DCT-II basis.
fn dct_matrix() -> [[f64; 8]; 8] {
    let n = 8usize;
    let mut matrix = [[0.0f64; 8]; 8];

    for i in 0..n {
        for j in 0..n {
            if i == 0 {
                matrix[i][j] = 1.0 / (n as f64).sqrt();
            } else {
                matrix[i][j] = (2.0 / n as f64).sqrt()
                    * (std::f64::consts::PI * (2.0 * j as f64 + 1.0) * i as f64
                        / (2.0 * n as f64))
                        .cos();
            }
        }
    }

    matrix
}

fn transpose(matrix: &[[f64; 8]; 8]) -> [[f64; 8]; 8] {
    let mut result = [[0.0f64; 8]; 8];
    for i in 0..8 {
        for j in 0..8 {
            result[i][j] = matrix[j][i];
        }
    }
    result
}

fn matmul(a: &[[f64; 8]; 8], b: &[[f64; 8]; 8]) -> [[f64; 8]; 8] {
    let mut result = [[0.0f64; 8]; 8];
    for i in 0..8 {
        for j in 0..8 {
            let mut sum = 0.0;
            for k in 0..8 {
                sum += a[i][k] * b[k][j];
            }
            result[i][j] = sum;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn uniform_heatmap_yields_zero_metrics() {
        let image = RgbImage::from_fn(32, 32, |x, y| Rgb([x as u8 * 8, y as u8 * 8, 32]));
        let heatmap = Array2::from_elem((32, 32), 0.5f32);

        let metrics = RegionMetricsExtractor::default()
            .extract(&image, &heatmap)
            .unwrap();
        assert_eq!(metrics, RegionMetrics::zeroed());
    }

    #[test]
    fn contrasting_regions_produce_bounded_nonzero_metrics() {
        // Bright noisy corner under a hot heatmap region, dark flat
        // elsewhere. The corner covers over 10% of pixels so the 90th
        // percentile lands inside the hot plateau.
        let image = RgbImage::from_fn(64, 64, |x, y| {
            if x < 22 && y < 22 {
                Rgb([200, ((x * y * 7) % 256) as u8, 180])
            } else {
                Rgb([20, 25, 30])
            }
        });
        let heatmap = Array2::from_shape_fn((64, 64), |(y, x)| {
            if x < 22 && y < 22 { 0.95f32 } else { 0.1 }
        });

        let metrics = RegionMetricsExtractor::default()
            .extract(&image, &heatmap)
            .unwrap();

        for v in [
            metrics.noise_analysis,
            metrics.jpeg_artifacts,
            metrics.color_inconsistency,
            metrics.edge_discontinuity,
            metrics.lighting_mismatch,
            metrics.shadow_irregularity,
        ] {
            assert!((0.0..=100.0).contains(&v), "metric out of range: {v}");
        }
        assert!(metrics.shadow_irregularity > 0.0);
        assert!(metrics.color_inconsistency > 0.0);
    }

    #[test]
    fn heatmap_is_resized_to_image_dimensions() {
        let image = RgbImage::from_fn(48, 36, |x, y| Rgb([x as u8, y as u8, 128]));
        let heatmap = Array2::from_shape_fn((16, 16), |(y, x)| {
            if x >= 14 && y >= 14 { 1.0f32 } else { 0.0 }
        });

        // Succeeds without panicking despite the size mismatch.
        let metrics = RegionMetricsExtractor::default()
            .extract(&image, &heatmap)
            .unwrap();
        assert!(metrics.shadow_irregularity >= 0.0);
    }

    #[test]
    fn dct_of_flat_block_concentrates_in_dc() {
        let gray = Array2::from_elem((8, 8), 100.0f64);
        // Flat block: every AC coefficient is zero, so per-block variance is
        // the DC term's spread across the 64 coefficients.
        let variance = block_dct_variance(&gray);
        assert!(variance > 0.0);
    }

    #[test]
    fn metric_map_uses_display_names() {
        let map = RegionMetrics::zeroed().to_map();
        assert_eq!(map.len(), 6);
        assert!(map.contains_key("Noise Analysis"));
        assert!(map.contains_key("Shadow Irregularity"));
    }
}
