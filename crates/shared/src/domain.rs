use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(UserId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryEntryId(pub Uuid);

impl HistoryEntryId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for HistoryEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Catalog slug such as `kidney-stone`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub String);

impl CategoryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CategoryId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanCategory {
    pub id: CategoryId,
    pub name: String,
    pub accepted_formats: Vec<String>,
    pub processing_secs: f64,
    pub description: String,
}

/// A validated image held for the duration of one scan. The raw bytes never
/// outlive the scan; history keeps only the file name.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub file_name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
    pub preview_data_uri: String,
    pub uploaded_at: DateTime<Utc>,
}

impl UploadedFile {
    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }
}

impl fmt::Debug for UploadedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedFile")
            .field("file_name", &self.file_name)
            .field("media_type", &self.media_type)
            .field("size_bytes", &self.bytes.len())
            .field("uploaded_at", &self.uploaded_at)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Outcome of one analysis. A negative finding has nowhere to put a
/// severity, size or location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    Detected {
        severity: Severity,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        size: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location: Option<String>,
    },
    NotDetected,
}

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Confidence(f64);

impl Confidence {
    pub fn new(value: f64) -> Result<Self, DomainError> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(DomainError::ConfidenceOutOfRange(value))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Confidence {
    type Error = DomainError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Confidence> for f64 {
    fn from(value: Confidence) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDetectionResult")]
pub struct DetectionResult {
    finding: Finding,
    confidence: Confidence,
    recommendations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<String>,
    generated_at: DateTime<Utc>,
}

impl DetectionResult {
    pub fn new(
        finding: Finding,
        confidence: Confidence,
        recommendations: Vec<String>,
        generated_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if recommendations.iter().all(|r| r.trim().is_empty()) {
            return Err(DomainError::MissingRecommendations);
        }
        Ok(Self {
            finding,
            confidence,
            recommendations,
            report: None,
            generated_at,
        })
    }

    pub fn with_report(mut self, report: impl Into<String>) -> Self {
        self.report = Some(report.into());
        self
    }

    pub fn finding(&self) -> &Finding {
        &self.finding
    }

    pub fn detected(&self) -> bool {
        matches!(self.finding, Finding::Detected { .. })
    }

    pub fn severity(&self) -> Option<Severity> {
        match &self.finding {
            Finding::Detected { severity, .. } => Some(*severity),
            Finding::NotDetected => None,
        }
    }

    pub fn size(&self) -> Option<&str> {
        match &self.finding {
            Finding::Detected { size, .. } => size.as_deref(),
            Finding::NotDetected => None,
        }
    }

    pub fn location(&self) -> Option<&str> {
        match &self.finding {
            Finding::Detected { location, .. } => location.as_deref(),
            Finding::NotDetected => None,
        }
    }

    pub fn confidence(&self) -> Confidence {
        self.confidence
    }

    pub fn recommendations(&self) -> &[String] {
        &self.recommendations
    }

    pub fn report(&self) -> Option<&str> {
        self.report.as_deref()
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }
}

#[derive(Deserialize)]
struct RawDetectionResult {
    finding: Finding,
    confidence: Confidence,
    recommendations: Vec<String>,
    #[serde(default)]
    report: Option<String>,
    generated_at: DateTime<Utc>,
}

impl TryFrom<RawDetectionResult> for DetectionResult {
    type Error = DomainError;

    fn try_from(raw: RawDetectionResult) -> Result<Self, Self::Error> {
        let mut result = Self::new(
            raw.finding,
            raw.confidence,
            raw.recommendations,
            raw.generated_at,
        )?;
        result.report = raw.report;
        Ok(result)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanHistoryEntry {
    pub entry_id: HistoryEntryId,
    pub user_id: UserId,
    pub category_id: CategoryId,
    pub file_name: String,
    pub uploaded_at: DateTime<Utc>,
    pub status: ScanStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<DetectionResult>,
}

impl ScanHistoryEntry {
    pub fn completed(
        user_id: UserId,
        category_id: CategoryId,
        file_name: impl Into<String>,
        uploaded_at: DateTime<Utc>,
        result: DetectionResult,
    ) -> Self {
        Self {
            entry_id: HistoryEntryId::new_v4(),
            user_id,
            category_id,
            file_name: file_name.into(),
            uploaded_at,
            status: ScanStatus::Completed,
            result: Some(result),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub username: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_rejects_values_outside_unit_interval() {
        assert!(Confidence::new(0.0).is_ok());
        assert!(Confidence::new(1.0).is_ok());
        assert!(Confidence::new(1.01).is_err());
        assert!(Confidence::new(-0.1).is_err());
        assert!(Confidence::new(f64::NAN).is_err());
    }

    #[test]
    fn negative_finding_reports_no_detail() {
        let result = DetectionResult::new(
            Finding::NotDetected,
            Confidence::new(0.9).expect("confidence"),
            vec!["No follow-up required".to_string()],
            Utc::now(),
        )
        .expect("result");

        assert!(!result.detected());
        assert_eq!(result.severity(), None);
        assert_eq!(result.size(), None);
        assert_eq!(result.location(), None);
    }

    #[test]
    fn result_requires_a_recommendation() {
        let err = DetectionResult::new(
            Finding::NotDetected,
            Confidence::new(0.5).expect("confidence"),
            vec!["  ".to_string()],
            Utc::now(),
        )
        .expect_err("empty recommendations");
        assert!(matches!(err, DomainError::MissingRecommendations));
    }

    #[test]
    fn severity_orders_low_to_critical() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn finding_serializes_with_kind_tag() {
        let finding = Finding::Detected {
            severity: Severity::Medium,
            size: Some("412 px".to_string()),
            location: None,
        };
        let json = serde_json::to_value(&finding).expect("json");
        assert_eq!(json["kind"], "detected");
        assert_eq!(json["severity"], "medium");
        assert!(json.get("location").is_none());

        let negative = serde_json::to_value(Finding::NotDetected).expect("json");
        assert_eq!(negative, serde_json::json!({ "kind": "not_detected" }));
    }

    #[test]
    fn deserialized_result_still_requires_a_recommendation() {
        let valid = DetectionResult::new(
            Finding::NotDetected,
            Confidence::new(0.88).expect("confidence"),
            vec!["Routine check-up in 12 months".to_string()],
            Utc::now(),
        )
        .expect("result")
        .with_report("Clear scan");
        let mut json = serde_json::to_value(&valid).expect("json");
        let parsed: DetectionResult = serde_json::from_value(json.clone()).expect("round trip");
        assert_eq!(parsed, valid);

        json["recommendations"] = serde_json::json!([]);
        let empty: Result<DetectionResult, _> = serde_json::from_value(json.clone());
        assert!(empty.is_err());

        json["recommendations"] = serde_json::json!(["   "]);
        let blank: Result<DetectionResult, _> = serde_json::from_value(json);
        assert!(blank.is_err());
    }

    #[test]
    fn out_of_range_confidence_fails_to_deserialize() {
        let parsed: Result<Confidence, _> = serde_json::from_str("1.5");
        assert!(parsed.is_err());
    }
}
