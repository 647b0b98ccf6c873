use image::{GrayImage, Luma, RgbImage};
use ndarray::Array2;

/// Luma-weighted grayscale conversion (ITU-R BT.601 weights).
pub fn rgb_to_gray(image: &RgbImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut gray = GrayImage::new(width, height);

    for (x, y, pixel) in image.enumerate_pixels() {
        let lum =
            (0.299 * pixel[0] as f64 + 0.587 * pixel[1] as f64 + 0.114 * pixel[2] as f64) as u8;
        gray.put_pixel(x, y, Luma([lum]));
    }

    gray
}

pub fn gray_to_array(image: &GrayImage) -> Array2<f32> {
    let (width, height) = image.dimensions();
    let mut arr = Array2::zeros((height as usize, width as usize));

    for (x, y, pixel) in image.enumerate_pixels() {
        arr[[y as usize, x as usize]] = pixel[0] as f32;
    }

    arr
}

pub fn array_to_gray(arr: &Array2<f32>) -> GrayImage {
    let (height, width) = arr.dim();
    let mut image = GrayImage::new(width as u32, height as u32);

    for y in 0..height {
        for x in 0..width {
            let value = arr[[y, x]].clamp(0.0, 255.0) as u8;
            image.put_pixel(x as u32, y as u32, Luma([value]));
        }
    }

    image
}

/// Min-max normalizes an intensity map to the full 8-bit range. A flat map
/// normalizes to all zeros.
pub fn normalize_to_u8(arr: &Array2<f32>) -> Array2<f32> {
    let min = arr.iter().copied().fold(f32::INFINITY, f32::min);
    let max = arr.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    if range < 1e-8 {
        Array2::zeros(arr.dim())
    } else {
        arr.mapv(|v| ((v - min) / range) * 255.0)
    }
}

/// Bilinear resampling of a single-channel float map.
pub fn resize_bilinear(src: &Array2<f32>, width: usize, height: usize) -> Array2<f32> {
    let (src_h, src_w) = src.dim();
    if src_h == height && src_w == width {
        return src.clone();
    }

    let scale_y = src_h as f32 / height as f32;
    let scale_x = src_w as f32 / width as f32;
    let mut dst = Array2::zeros((height, width));

    for y in 0..height {
        let sy = ((y as f32 + 0.5) * scale_y - 0.5).clamp(0.0, (src_h - 1) as f32);
        let y0 = sy.floor() as usize;
        let y1 = (y0 + 1).min(src_h - 1);
        let fy = sy - y0 as f32;

        for x in 0..width {
            let sx = ((x as f32 + 0.5) * scale_x - 0.5).clamp(0.0, (src_w - 1) as f32);
            let x0 = sx.floor() as usize;
            let x1 = (x0 + 1).min(src_w - 1);
            let fx = sx - x0 as f32;

            let top = src[[y0, x0]] * (1.0 - fx) + src[[y0, x1]] * fx;
            let bottom = src[[y1, x0]] * (1.0 - fx) + src[[y1, x1]] * fx;
            dst[[y, x]] = top * (1.0 - fy) + bottom * fy;
        }
    }

    dst
}

/// Linear-interpolated percentile over a full sort of the intensities.
pub fn percentile(values: &[f32], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (p / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;

    if lo == hi {
        sorted[lo] as f64
    } else {
        let frac = rank - lo as f64;
        sorted[lo] as f64 * (1.0 - frac) + sorted[hi] as f64 * frac
    }
}

/// HSV value channel, i.e. the per-pixel channel maximum.
pub fn value_channel(image: &RgbImage) -> Array2<f64> {
    let (width, height) = image.dimensions();
    let mut arr = Array2::zeros((height as usize, width as usize));

    for (x, y, pixel) in image.enumerate_pixels() {
        arr[[y as usize, x as usize]] = pixel[0].max(pixel[1]).max(pixel[2]) as f64;
    }

    arr
}

/// 3x3 convolution with replicated borders.
pub fn convolve3x3(src: &Array2<f64>, kernel: &[[f64; 3]; 3]) -> Array2<f64> {
    let (height, width) = src.dim();
    let mut dst = Array2::zeros((height, width));

    for y in 0..height {
        for x in 0..width {
            let mut sum = 0.0;
            for ky in 0..3 {
                for kx in 0..3 {
                    let py = (y + ky).saturating_sub(1).min(height - 1);
                    let px = (x + kx).saturating_sub(1).min(width - 1);
                    sum += src[[py, px]] * kernel[ky][kx];
                }
            }
            dst[[y, x]] = sum;
        }
    }

    dst
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn percentile_interpolates_between_ranks() {
        let values = [0.0f32, 10.0, 20.0, 30.0, 40.0];
        assert_eq!(percentile(&values, 50.0), 20.0);
        assert!((percentile(&values, 90.0) - 36.0).abs() < 1e-9);
    }

    #[test]
    fn percentile_of_uniform_values_equals_the_value() {
        let values = [7.0f32; 64];
        assert_eq!(percentile(&values, 90.0), 7.0);
    }

    #[test]
    fn normalize_spans_full_range() {
        let arr = array![[0.0f32, 5.0], [10.0, 2.5]];
        let norm = normalize_to_u8(&arr);
        assert_eq!(norm[[0, 0]], 0.0);
        assert_eq!(norm[[1, 0]], 255.0);
    }

    #[test]
    fn normalize_flat_map_is_zero() {
        let arr = Array2::from_elem((4, 4), 42.0f32);
        let norm = normalize_to_u8(&arr);
        assert!(norm.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn resize_preserves_flat_maps() {
        let arr = Array2::from_elem((8, 8), 3.0f32);
        let resized = resize_bilinear(&arr, 16, 16);
        assert_eq!(resized.dim(), (16, 16));
        assert!(resized.iter().all(|&v| (v - 3.0).abs() < 1e-6));
    }
}
