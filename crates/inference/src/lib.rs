//! Analysis backends behind a single async contract.
//!
//! The scan controller only ever holds an `Arc<dyn InferenceEngine>`; swapping
//! the mock for a networked backend is a construction-time choice.

use std::time::Duration;

use async_trait::async_trait;
use shared::domain::{DetectionResult, ScanCategory, UploadedFile};
use thiserror::Error;

mod http;
mod mock;

pub use http::{HttpInferenceEngine, DEFAULT_HTTP_TIMEOUT};
pub use mock::MockInferenceEngine;

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub file: UploadedFile,
    pub category: ScanCategory,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("inference engine failed: {0}")]
    Engine(String),
    #[error("inference timed out after {0:?}")]
    Timeout(Duration),
    #[error("inference backend is unavailable: {0}")]
    Unavailable(String),
    #[error("inference backend returned {status}: {message}")]
    Backend { status: u16, message: String },
    #[error("invalid inference response: {0}")]
    InvalidResponse(String),
}

/// Every implementation must eventually settle: either a result or an
/// explicit error, never a hang. Networked engines own their timeout.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<DetectionResult, AnalysisError>;

    fn name(&self) -> &'static str;
}

pub struct MissingInferenceEngine;

#[async_trait]
impl InferenceEngine for MissingInferenceEngine {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<DetectionResult, AnalysisError> {
        Err(AnalysisError::Unavailable(format!(
            "no inference backend configured for category {}",
            request.category.id
        )))
    }

    fn name(&self) -> &'static str {
        "missing"
    }
}

#[cfg(test)]
#[path = "tests/mock_tests.rs"]
mod mock_tests;

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod http_tests;
