use serde::Serialize;

/// Scalar features feeding the authenticity score. Each is in [0,1] for any
/// valid RGB input of nonzero size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureSet {
    pub ela_mean: f64,
    pub ela_std: f64,
    pub edge_density: f64,
    pub chroma_anomaly: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Label {
    Real,
    Fake,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreResult {
    /// Authenticity score in [0,1]; higher means more likely genuine.
    pub score: f64,
    pub label: Label,
}

/// Hand-tuned linear discriminant through a logistic squash. No learning;
/// reproducible bit-for-bit for identical inputs.
#[derive(Debug, Clone, Copy)]
pub struct ScoreCombiner {
    threshold: f64,
}

impl ScoreCombiner {
    pub const W_ELA_MEAN: f64 = 5.0;
    pub const W_ELA_STD: f64 = 3.0;
    pub const W_EDGE_DENSITY: f64 = -4.0;
    pub const W_CHROMA: f64 = 3.0;
    pub const DEFAULT_THRESHOLD: f64 = 0.5;

    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn combine(&self, features: &FeatureSet) -> ScoreResult {
        let suspicion = Self::W_ELA_MEAN * features.ela_mean
            + Self::W_ELA_STD * features.ela_std
            + Self::W_EDGE_DENSITY * features.edge_density
            + Self::W_CHROMA * features.chroma_anomaly;

        let score = (1.0 - sigmoid(suspicion)).clamp(0.0, 1.0);
        let label = if score >= self.threshold {
            Label::Real
        } else {
            Label::Fake
        };

        ScoreResult { score, label }
    }
}

impl Default for ScoreCombiner {
    fn default() -> Self {
        Self::new(Self::DEFAULT_THRESHOLD)
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
