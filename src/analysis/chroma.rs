use image::RgbImage;
use statrs::statistics::Statistics;

use crate::error::Result;

/// Channel-correlated capture noise leaves the three color channels with
/// similar variance; synthetic edits tend to break that symmetry.
pub struct ChromaAnomalyAnalyzer {
    gain: f64,
}

impl ChromaAnomalyAnalyzer {
    pub const DEFAULT_GAIN: f64 = 10.0;

    pub fn new() -> Self {
        Self {
            gain: Self::DEFAULT_GAIN,
        }
    }

    /// Returns a bounded anomaly score in [0,1).
    pub fn analyze(&self, image: &RgbImage) -> Result<f64> {
        let channel_variance = |channel: usize| -> f64 {
            image
                .pixels()
                .map(|p| p[channel] as f64 / 255.0)
                .population_variance()
        };

        let r_var = channel_variance(0);
        let g_var = channel_variance(1);
        let b_var = channel_variance(2);
        let mean_var = (r_var + g_var + b_var) / 3.0;

        let dispersion = ((r_var - mean_var).abs()
            + (g_var - mean_var).abs()
            + (b_var - mean_var).abs())
            / 3.0;

        Ok((dispersion * self.gain).tanh())
    }
}

impl Default for ChromaAnomalyAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
