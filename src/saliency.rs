use std::sync::LazyLock;

use image::{RgbImage, imageops::FilterType};
use ndarray::{Array1, Array2, Array3, Array4};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{error::Result, image_utils::resize_bilinear};

/// Side length of the square model input.
pub const MODEL_INPUT_SIZE: u32 = 256;

const WEIGHT_SEED: u64 = 0x7a6d_70a5_a117_e9c3;

/// Produces a single-channel [0,1] confidence map from an RGB image.
///
/// The trait exists so the advanced heatmap path can be exercised with an
/// injected failing backend; `SaliencyNet` is the production implementation.
pub trait SaliencyBackend: Send + Sync {
    fn confidence_map(&self, image: &RgbImage) -> Result<Array2<f32>>;
}

/// A small fixed convolutional stack: conv/ReLU into a 2x downsample
/// bottleneck, then a bilinear 2x upsample back to input resolution and a
/// sigmoid-activated single-channel head.
///
/// The weights are seeded, never trained, and allocated once per process;
/// the output is an architecture-determined spatial response pattern, not a
/// calibrated tamper detector.
pub struct SaliencyNet {
    conv1: ConvLayer,
    conv2: ConvLayer,
    conv3: ConvLayer,
    conv4: ConvLayer,
}

static SHARED: LazyLock<SaliencyNet> = LazyLock::new(SaliencyNet::fixed);

impl SaliencyNet {
    /// Builds the net with its fixed seeded weights.
    pub fn fixed() -> Self {
        let mut rng = StdRng::seed_from_u64(WEIGHT_SEED);
        Self {
            conv1: ConvLayer::new(3, 16, &mut rng),
            conv2: ConvLayer::new(16, 32, &mut rng),
            conv3: ConvLayer::new(32, 64, &mut rng),
            conv4: ConvLayer::new(64, 1, &mut rng),
        }
    }

    /// The process-wide instance; initialized once, read-only thereafter.
    pub fn shared() -> &'static SaliencyNet {
        &SHARED
    }

    fn forward(&self, input: &Array3<f32>) -> Array2<f32> {
        let x = relu(self.conv1.forward(input));
        let x = max_pool_2x2(&x);
        let x = relu(self.conv2.forward(&x));
        let x = relu(self.conv3.forward(&x));
        let x = upsample_bilinear_2x(&x);
        let x = self.conv4.forward(&x);

        let (_, height, width) = x.dim();
        let mut map = Array2::zeros((height, width));
        for y in 0..height {
            for x_ in 0..width {
                map[[y, x_]] = sigmoid(x[[0, y, x_]]);
            }
        }
        map
    }
}

impl SaliencyBackend for SaliencyNet {
    fn confidence_map(&self, image: &RgbImage) -> Result<Array2<f32>> {
        let resized = image::imageops::resize(
            image,
            MODEL_INPUT_SIZE,
            MODEL_INPUT_SIZE,
            FilterType::Triangle,
        );

        let size = MODEL_INPUT_SIZE as usize;
        let mut input = Array3::zeros((3, size, size));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                input[[c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
            }
        }

        Ok(self.forward(&input))
    }
}

struct ConvLayer {
    /// (out_channels, in_channels, 3, 3)
    weights: Array4<f32>,
    bias: Array1<f32>,
}

impl ConvLayer {
    fn new(in_channels: usize, out_channels: usize, rng: &mut StdRng) -> Self {
        let bound = (6.0 / (in_channels as f32 * 9.0)).sqrt();
        let weights = Array4::from_shape_simple_fn((out_channels, in_channels, 3, 3), || {
            rng.random_range(-bound..bound)
        });
        let bias = Array1::from_shape_simple_fn(out_channels, || rng.random_range(-bound..bound));

        Self { weights, bias }
    }

    /// 3x3 convolution with zero padding, stride 1.
    fn forward(&self, input: &Array3<f32>) -> Array3<f32> {
        let (in_channels, height, width) = input.dim();
        let out_channels = self.weights.dim().0;
        let mut output = Array3::zeros((out_channels, height, width));

        for oc in 0..out_channels {
            for y in 0..height {
                for x in 0..width {
                    let mut sum = self.bias[oc];
                    for ic in 0..in_channels {
                        for ky in 0..3 {
                            let sy = y as isize + ky as isize - 1;
                            if sy < 0 || sy >= height as isize {
                                continue;
                            }
                            for kx in 0..3 {
                                let sx = x as isize + kx as isize - 1;
                                if sx < 0 || sx >= width as isize {
                                    continue;
                                }
                                sum += self.weights[[oc, ic, ky, kx]]
                                    * input[[ic, sy as usize, sx as usize]];
                            }
                        }
                    }
                    output[[oc, y, x]] = sum;
                }
            }
        }

        output
    }
}

fn relu(mut x: Array3<f32>) -> Array3<f32> {
    x.mapv_inplace(|v| v.max(0.0));
    x
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn max_pool_2x2(input: &Array3<f32>) -> Array3<f32> {
    let (channels, height, width) = input.dim();
    let (out_h, out_w) = (height / 2, width / 2);
    let mut output = Array3::zeros((channels, out_h, out_w));

    for c in 0..channels {
        for y in 0..out_h {
            for x in 0..out_w {
                let (sy, sx) = (y * 2, x * 2);
                output[[c, y, x]] = input[[c, sy, sx]]
                    .max(input[[c, sy, sx + 1]])
                    .max(input[[c, sy + 1, sx]])
                    .max(input[[c, sy + 1, sx + 1]]);
            }
        }
    }

    output
}

fn upsample_bilinear_2x(input: &Array3<f32>) -> Array3<f32> {
    let (channels, height, width) = input.dim();
    let mut output = Array3::zeros((channels, height * 2, width * 2));

    for c in 0..channels {
        let plane = input.index_axis(ndarray::Axis(0), c).to_owned();
        let upsampled = resize_bilinear(&plane, width * 2, height * 2);
        output
            .index_axis_mut(ndarray::Axis(0), c)
            .assign(&upsampled);
    }

    output
}
