use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use shared::domain::{Confidence, DetectionResult, Finding, ScanCategory, Severity};
use tracing::debug;

use crate::{AnalysisError, AnalysisRequest, InferenceEngine};

const DEFAULT_DETECTION_RATE: f64 = 0.7;
const KIDNEY_REGIONS: &[&str] = &["Upper Pole", "Mid-Kidney", "Lower Pole"];
const GENERIC_REGIONS: &[&str] = &["Upper region", "Central region", "Lower region"];
const EDUCATIONAL_NOTE: &str =
    "This automated analysis is for educational purposes and does not replace a professional diagnosis.";

/// Simulated engine: waits out the category's expected duration, then
/// fabricates one of two canned outcomes.
pub struct MockInferenceEngine {
    rng: Mutex<StdRng>,
    latency: Option<Duration>,
    detection_rate: f64,
    fail_with: Option<String>,
    call_count: AtomicUsize,
}

impl Default for MockInferenceEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockInferenceEngine {
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        let mut engine = Self::new();
        engine.fail_with = Some(reason.into());
        engine
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            latency: None,
            detection_rate: DEFAULT_DETECTION_RATE,
            fail_with: None,
            call_count: AtomicUsize::new(0),
        }
    }

    /// Overrides the per-category delay.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_detection_rate(mut self, rate: f64) -> Self {
        self.detection_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    fn latency_for(&self, category: &ScanCategory) -> Duration {
        self.latency
            .unwrap_or_else(|| Duration::from_secs_f64(category.processing_secs.max(0.0)))
    }

    // Placeholder decision procedure. The coin flip stands in for a real
    // model and carries no diagnostic meaning.
    fn fabricate(&self, category: &ScanCategory) -> Result<DetectionResult, AnalysisError> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| AnalysisError::Engine("mock rng poisoned".to_string()))?;
        let regions = if category.id.as_str() == "kidney-stone" {
            KIDNEY_REGIONS
        } else {
            GENERIC_REGIONS
        };

        let result = if rng.gen_bool(self.detection_rate) {
            let radius: f64 = rng.gen_range(8.0..=25.0);
            let area_px = (std::f64::consts::PI * radius * radius * 0.8).round() as u64;
            let location = regions.choose(&mut *rng).copied().unwrap_or("Unspecified");
            let confidence = rng.gen_range(0.85..=0.98);
            DetectionResult::new(
                Finding::Detected {
                    severity: Severity::Medium,
                    size: Some(format!("{area_px} px")),
                    location: Some(location.to_string()),
                },
                Confidence::new(confidence).map_err(engine_fault)?,
                vec![
                    "Consult a qualified urologist or radiologist for interpretation and treatment planning."
                        .to_string(),
                    EDUCATIONAL_NOTE.to_string(),
                ],
                Utc::now(),
            )
            .map_err(engine_fault)?
            .with_report(format!(
                "{} analysis found a likely positive finding ({:.1}% confidence), {area_px} px in area, at the {location}.",
                category.name,
                confidence * 100.0
            ))
        } else {
            let confidence = rng.gen_range(0.80..=0.97);
            DetectionResult::new(
                Finding::NotDetected,
                Confidence::new(confidence).map_err(engine_fault)?,
                vec![
                    "If symptoms persist, consult a healthcare professional.".to_string(),
                    EDUCATIONAL_NOTE.to_string(),
                ],
                Utc::now(),
            )
            .map_err(engine_fault)?
            .with_report(format!(
                "{} analysis found no abnormality in the submitted image.",
                category.name
            ))
        };
        Ok(result)
    }
}

fn engine_fault(err: impl std::fmt::Display) -> AnalysisError {
    AnalysisError::Engine(err.to_string())
}

#[async_trait]
impl InferenceEngine for MockInferenceEngine {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<DetectionResult, AnalysisError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let latency = self.latency_for(&request.category);
        debug!(
            category = %request.category.id,
            file = %request.file.file_name,
            latency_ms = latency.as_millis() as u64,
            "mock analysis started"
        );
        tokio::time::sleep(latency).await;

        if let Some(reason) = &self.fail_with {
            return Err(AnalysisError::Engine(reason.clone()));
        }
        self.fabricate(&request.category)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
