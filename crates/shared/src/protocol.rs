use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{CategoryId, Confidence, DetectionResult, Finding, ScanCategory, Severity},
    error::DomainError,
};

/// Body of `POST /predict`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    pub category_id: CategoryId,
    pub file_name: String,
    pub media_type: String,
    pub image_b64: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    pub detected: bool,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    pub generated_at: DateTime<Utc>,
}

impl PredictResponse {
    /// Detail fields sent alongside a negative finding are dropped.
    pub fn into_detection_result(self) -> Result<DetectionResult, DomainError> {
        let finding = if self.detected {
            Finding::Detected {
                severity: self.severity.ok_or(DomainError::MissingSeverity)?,
                size: self.size,
                location: self.location,
            }
        } else {
            Finding::NotDetected
        };
        let result = DetectionResult::new(
            finding,
            Confidence::new(self.confidence)?,
            self.recommendations,
            self.generated_at,
        )?;
        Ok(match self.report {
            Some(report) => result.with_report(report),
            None => result,
        })
    }
}

impl From<&DetectionResult> for PredictResponse {
    fn from(result: &DetectionResult) -> Self {
        Self {
            detected: result.detected(),
            confidence: result.confidence().value(),
            severity: result.severity(),
            size: result.size().map(str::to_string),
            location: result.location().map(str::to_string),
            recommendations: result.recommendations().to_vec(),
            report: result.report().map(str::to_string),
            generated_at: result.generated_at(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryListResponse {
    pub categories: Vec<ScanCategory>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(detected: bool) -> PredictResponse {
        PredictResponse {
            detected,
            confidence: 0.91,
            severity: Some(Severity::Medium),
            size: Some("412 px".to_string()),
            location: Some("Lower Pole".to_string()),
            recommendations: vec!["Consult a urologist".to_string()],
            report: None,
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn negative_response_drops_detail_fields() {
        let result = response(false).into_detection_result().expect("result");
        assert_eq!(result.finding(), &Finding::NotDetected);
        assert_eq!(result.location(), None);
    }

    #[test]
    fn positive_response_without_severity_is_rejected() {
        let mut raw = response(true);
        raw.severity = None;
        assert!(matches!(
            raw.into_detection_result(),
            Err(DomainError::MissingSeverity)
        ));
    }

    #[test]
    fn response_round_trips_through_detection_result() {
        let raw = response(true);
        let result = raw.clone().into_detection_result().expect("result");
        assert_eq!(PredictResponse::from(&result), raw);
    }
}
