use std::{collections::BTreeMap, io::Cursor};

use base64::{Engine as _, engine::general_purpose};
use image::{ImageFormat, RgbImage};
use serde::Serialize;

use crate::{
    error::{AnalysisError, Result},
    heatmap::HeatmapMode,
    scoring::{FeatureSet, Label},
};

/// The single response record for one analyzed image.
///
/// `metrics` is present only in advanced mode: the six region-comparison
/// metrics keyed by display name plus `Tamper Confidence`, or an empty map
/// when the saliency stage fell back to the basic heatmap.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    /// Authenticity score in [0,1], rounded to 4 decimals.
    pub score: f64,
    pub label: Label,
    pub mode: HeatmapMode,
    pub features: FeatureSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<BTreeMap<String, f64>>,
    /// Inline `data:image/png;base64,` payload.
    pub heatmap: String,
}

/// Error shape returned to callers instead of a partial report.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl From<&AnalysisError> for ErrorResponse {
    fn from(err: &AnalysisError) -> Self {
        Self {
            error: err.to_string(),
        }
    }
}

pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// PNG-encodes the heatmap and wraps it as an inline data URI.
pub fn encode_heatmap_png(image: &RgbImage) -> Result<String> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(AnalysisError::Encode)?;

    Ok(format!(
        "data:image/png;base64,{}",
        general_purpose::STANDARD.encode(buffer.into_inner())
    ))
}
