use std::collections::BTreeMap;

use image::{DynamicImage, GrayImage, RgbImage};

use crate::{
    analysis::{
        chroma::ChromaAnomalyAnalyzer, edges::EdgeDensityAnalyzer,
        ela::{ElaAnalyzer, ElaResult},
        region_metrics::RegionMetricsExtractor,
    },
    error::{AnalysisError, Result},
    heatmap::{HeatmapMode, HeatmapSynthesizer},
    report::{AnalysisReport, encode_heatmap_png, round4},
    saliency::{SaliencyBackend, SaliencyNet},
    scoring::{FeatureSet, ScoreCombiner},
};

pub mod analysis;
pub mod error;
pub mod heatmap;
pub mod image_utils;
pub mod report;
pub mod saliency;
pub mod scoring;

pub use crate::{
    analysis::region_metrics::RegionMetrics,
    report::ErrorResponse,
    scoring::{Label, ScoreResult},
};

#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub ela_quality: u8,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Score at or above this labels the image "Real".
    pub threshold: f64,
    /// Heatmap percentile separating suspected pixels from background.
    pub region_percentile: f64,
    pub parallel: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            ela_quality: ElaAnalyzer::DEFAULT_QUALITY,
            canny_low: EdgeDensityAnalyzer::DEFAULT_LOW,
            canny_high: EdgeDensityAnalyzer::DEFAULT_HIGH,
            threshold: ScoreCombiner::DEFAULT_THRESHOLD,
            region_percentile: RegionMetricsExtractor::DEFAULT_PERCENTILE,
            parallel: true,
        }
    }
}

impl AnalysisConfig {
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_ela_quality(mut self, quality: u8) -> Self {
        self.ela_quality = quality;
        self
    }
}

/// Request-scoped analysis of one decoded image. The image is never mutated
/// after decode; every stage produces fresh maps.
pub struct TamperAnalyzer {
    original: RgbImage,
    config: AnalysisConfig,
}

impl TamperAnalyzer {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let decoded = image::load_from_memory(bytes)?;
        Self::from_image(decoded)
    }

    pub fn from_image(image: DynamicImage) -> Result<Self> {
        let original = image.to_rgb8();
        if original.width() == 0 || original.height() == 0 {
            return Err(AnalysisError::EmptyImage);
        }

        Ok(Self {
            original,
            config: AnalysisConfig::default(),
        })
    }

    pub fn with_config(mut self, config: AnalysisConfig) -> Self {
        self.config = config;
        self
    }

    pub fn image(&self) -> &RgbImage {
        &self.original
    }

    /// Runs the full pipeline with the process-wide saliency model.
    pub fn analyze(&self, mode: HeatmapMode) -> Result<AnalysisReport> {
        self.analyze_with_backend(mode, SaliencyNet::shared())
    }

    /// Same as [`analyze`](Self::analyze) with an explicit saliency backend;
    /// the backend is only consulted in advanced mode.
    pub fn analyze_with_backend(
        &self,
        mode: HeatmapMode,
        backend: &dyn SaliencyBackend,
    ) -> Result<AnalysisReport> {
        let (features, ela_map) = self.extract_features()?;
        log::debug!(
            "features extracted: ela_mean={:.4} ela_std={:.4} edge_density={:.4} chroma_anomaly={:.4}",
            features.ela_mean,
            features.ela_std,
            features.edge_density,
            features.chroma_anomaly
        );

        let result = ScoreCombiner::new(self.config.threshold).combine(&features);
        let synthesizer = HeatmapSynthesizer::new(self.config.canny_low, self.config.canny_high);

        let (heatmap_image, metrics) = match mode {
            HeatmapMode::Basic => (synthesizer.basic(&self.original, &ela_map), None),
            HeatmapMode::Advanced => match synthesizer.advanced(&self.original, backend) {
                Ok((rendered, confidence)) => {
                    let region_metrics = RegionMetricsExtractor::new(self.config.region_percentile)
                        .extract(&self.original, &confidence)?;

                    let mut map: BTreeMap<String, f64> = region_metrics
                        .to_map()
                        .into_iter()
                        .map(|(name, value)| (name, round4(value)))
                        .collect();
                    map.insert("Tamper Confidence".into(), round4(result.score));

                    (rendered, Some(map))
                }
                Err(err) => {
                    log::warn!("saliency heatmap failed, falling back to basic: {err}");
                    (
                        synthesizer.basic(&self.original, &ela_map),
                        Some(BTreeMap::new()),
                    )
                }
            },
        };

        Ok(AnalysisReport {
            score: round4(result.score),
            label: result.label,
            mode,
            features: FeatureSet {
                ela_mean: round4(features.ela_mean),
                ela_std: round4(features.ela_std),
                edge_density: round4(features.edge_density),
                chroma_anomaly: round4(features.chroma_anomaly),
            },
            metrics,
            heatmap: encode_heatmap_png(&heatmap_image)?,
        })
    }

    /// The three feature extractors are independent; with `parallel` set
    /// they run on the rayon pool and join before scoring.
    fn extract_features(&self) -> Result<(FeatureSet, GrayImage)> {
        let ela_analyzer = ElaAnalyzer::new(self.config.ela_quality);
        let edge_analyzer = EdgeDensityAnalyzer::new(self.config.canny_low, self.config.canny_high);
        let chroma_analyzer = ChromaAnomalyAnalyzer::new();

        let (ela, edge_density, chroma_anomaly) = if self.config.parallel {
            let (ela, (edge, chroma)) = rayon::join(
                || ela_analyzer.analyze(&self.original),
                || {
                    rayon::join(
                        || edge_analyzer.analyze(&self.original),
                        || chroma_analyzer.analyze(&self.original),
                    )
                },
            );
            (ela?, edge?, chroma?)
        } else {
            (
                ela_analyzer.analyze(&self.original)?,
                edge_analyzer.analyze(&self.original)?,
                chroma_analyzer.analyze(&self.original)?,
            )
        };

        let ElaResult { map, mean, std_dev } = ela;
        let features = FeatureSet {
            ela_mean: mean,
            ela_std: std_dev,
            edge_density,
            chroma_anomaly,
        };

        Ok((features, map))
    }
}

/// One-shot entry point: decode, analyze, report.
pub fn analyze_bytes(bytes: &[u8], mode: HeatmapMode) -> Result<AnalysisReport> {
    TamperAnalyzer::from_bytes(bytes)?.analyze(mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{Engine as _, engine::general_purpose};
    use image::Rgb;
    use ndarray::Array2;

    struct FailingBackend;

    impl SaliencyBackend for FailingBackend {
        fn confidence_map(&self, _image: &RgbImage) -> Result<Array2<f32>> {
            Err(AnalysisError::SaliencyInference("injected failure".into()))
        }
    }

    /// Deterministic stand-in producing a corner hotspot covering just over
    /// a tenth of the frame, so the top-decile mask isolates it.
    struct StubBackend;

    impl SaliencyBackend for StubBackend {
        fn confidence_map(&self, _image: &RgbImage) -> Result<Array2<f32>> {
            Ok(Array2::from_shape_fn((256, 256), |(y, x)| {
                if x < 85 && y < 85 { 0.9f32 } else { 0.05 }
            }))
        }
    }

    fn black_analyzer() -> TamperAnalyzer {
        TamperAnalyzer::from_image(DynamicImage::ImageRgb8(RgbImage::new(100, 100))).unwrap()
    }

    fn textured_analyzer() -> TamperAnalyzer {
        let image = RgbImage::from_fn(96, 64, |x, y| {
            Rgb([
                ((x * 5 + y * 11) % 256) as u8,
                ((x * 3) % 256) as u8,
                ((y * 7) % 256) as u8,
            ])
        });
        TamperAnalyzer::from_image(DynamicImage::ImageRgb8(image)).unwrap()
    }

    fn decode_heatmap(uri: &str) -> RgbImage {
        let payload = uri.strip_prefix("data:image/png;base64,").unwrap();
        let bytes = general_purpose::STANDARD.decode(payload).unwrap();
        image::load_from_memory(&bytes).unwrap().to_rgb8()
    }

    #[test]
    fn garbage_bytes_fail_with_decode_error() {
        let result = TamperAnalyzer::from_bytes(&[0x13, 0x37, 0xca, 0xfe, 0x00, 0x01]);
        assert!(matches!(result, Err(AnalysisError::Decode(_))));

        let result = TamperAnalyzer::from_bytes(&[]);
        assert!(result.is_err());
    }

    #[test]
    fn black_image_is_labeled_real() {
        let report = black_analyzer().analyze(HeatmapMode::Basic).unwrap();

        assert!(report.features.ela_mean < 0.02);
        assert!(report.features.ela_std < 0.02);
        assert_eq!(report.features.edge_density, 0.0);
        assert!(report.features.chroma_anomaly < 1e-6);
        assert!(report.score >= 0.5);
        assert_eq!(report.label, Label::Real);
        assert!(report.metrics.is_none());
    }

    #[test]
    fn features_and_score_are_bounded() {
        let report = textured_analyzer().analyze(HeatmapMode::Basic).unwrap();

        for value in [
            report.score,
            report.features.ela_mean,
            report.features.ela_std,
            report.features.edge_density,
            report.features.chroma_anomaly,
        ] {
            assert!((0.0..=1.0).contains(&value), "out of range: {value}");
            assert!(value.is_finite());
        }
        assert!(matches!(report.label, Label::Real | Label::Fake));
    }

    #[test]
    fn basic_heatmap_matches_source_dimensions() {
        let report = textured_analyzer().analyze(HeatmapMode::Basic).unwrap();
        let heatmap = decode_heatmap(&report.heatmap);
        assert_eq!(heatmap.dimensions(), (96, 64));
    }

    #[test]
    fn repeated_basic_analysis_is_identical() {
        let analyzer = textured_analyzer();
        let a = analyzer.analyze(HeatmapMode::Basic).unwrap();
        let b = analyzer.analyze(HeatmapMode::Basic).unwrap();

        assert_eq!(a.score, b.score);
        assert_eq!(a.features, b.features);
        assert_eq!(a.heatmap, b.heatmap);
    }

    #[test]
    fn advanced_mode_reports_region_metrics() {
        let report = textured_analyzer()
            .analyze_with_backend(HeatmapMode::Advanced, &StubBackend)
            .unwrap();

        assert_eq!(report.mode, HeatmapMode::Advanced);
        let metrics = report.metrics.expect("advanced mode carries metrics");
        assert_eq!(metrics.len(), 7);
        assert_eq!(metrics["Tamper Confidence"], report.score);
        for (name, value) in &metrics {
            if name != "Tamper Confidence" {
                assert!((0.0..=100.0).contains(value), "{name} out of range: {value}");
            }
        }
    }

    #[test]
    fn saliency_failure_falls_back_to_basic_heatmap() {
        let analyzer = textured_analyzer();
        let report = analyzer
            .analyze_with_backend(HeatmapMode::Advanced, &FailingBackend)
            .unwrap();

        assert_eq!(report.mode, HeatmapMode::Advanced);
        assert_eq!(report.metrics, Some(BTreeMap::new()));

        // The fallback heatmap is the basic rendering.
        let basic = analyzer.analyze(HeatmapMode::Basic).unwrap();
        assert_eq!(report.heatmap, basic.heatmap);
    }

    #[test]
    fn threshold_override_changes_the_label() {
        let analyzer =
            black_analyzer().with_config(AnalysisConfig::default().with_threshold(0.6));
        let report = analyzer.analyze(HeatmapMode::Basic).unwrap();
        // A black image sits near 0.5, below the stricter threshold.
        assert_eq!(report.label, Label::Fake);
    }

    #[test]
    fn parallel_and_sequential_extraction_agree() {
        let image = RgbImage::from_fn(64, 64, |x, y| Rgb([x as u8 * 4, y as u8 * 4, 77]));

        let sequential = TamperAnalyzer::from_image(DynamicImage::ImageRgb8(image.clone()))
            .unwrap()
            .with_config(AnalysisConfig {
                parallel: false,
                ..AnalysisConfig::default()
            })
            .analyze(HeatmapMode::Basic)
            .unwrap();
        let parallel = TamperAnalyzer::from_image(DynamicImage::ImageRgb8(image))
            .unwrap()
            .analyze(HeatmapMode::Basic)
            .unwrap();

        assert_eq!(sequential.score, parallel.score);
        assert_eq!(sequential.features, parallel.features);
        assert_eq!(sequential.heatmap, parallel.heatmap);
    }

    #[test]
    fn analyze_bytes_round_trips_encoded_input() {
        let image = RgbImage::from_fn(32, 32, |x, y| Rgb([x as u8 * 8, 0, y as u8 * 8]));
        let mut bytes = std::io::Cursor::new(Vec::new());
        image.write_to(&mut bytes, image::ImageFormat::Png).unwrap();

        let report = analyze_bytes(&bytes.into_inner(), HeatmapMode::Basic).unwrap();
        assert!((0.0..=1.0).contains(&report.score));
        assert!(report.heatmap.starts_with("data:image/png;base64,"));
    }
}
