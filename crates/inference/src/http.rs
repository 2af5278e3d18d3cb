use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use shared::{
    domain::DetectionResult,
    error::ApiError,
    protocol::{PredictRequest, PredictResponse},
};
use tracing::{info, warn};
use url::Url;

use crate::{AnalysisError, AnalysisRequest, InferenceEngine};

pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Talks to a remote `/predict` endpoint with the same contract as the mock.
pub struct HttpInferenceEngine {
    http: Client,
    predict_url: Url,
    timeout: Duration,
}

impl HttpInferenceEngine {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(base_url.trim())
            .with_context(|| format!("invalid inference base url '{base_url}'"))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let predict_url = base
            .join("predict")
            .with_context(|| format!("failed to derive predict url from '{base_url}'"))?;
        Ok(Self {
            http: Client::new(),
            predict_url,
            timeout,
        })
    }

    pub fn predict_url(&self) -> &Url {
        &self.predict_url
    }

    async fn post_predict(&self, body: &PredictRequest) -> Result<DetectionResult, AnalysisError> {
        let response = self
            .http
            .post(self.predict_url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| AnalysisError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ApiError>().await {
                Ok(api_error) => api_error.message,
                Err(_) => status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string(),
            };
            return Err(AnalysisError::Backend {
                status: status.as_u16(),
                message,
            });
        }

        let payload: PredictResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::InvalidResponse(e.to_string()))?;
        payload
            .into_detection_result()
            .map_err(|e| AnalysisError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl InferenceEngine for HttpInferenceEngine {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<DetectionResult, AnalysisError> {
        let body = PredictRequest {
            category_id: request.category.id.clone(),
            file_name: request.file.file_name.clone(),
            media_type: request.file.media_type.clone(),
            image_b64: STANDARD.encode(&request.file.bytes),
        };

        match tokio::time::timeout(self.timeout, self.post_predict(&body)).await {
            Ok(Ok(result)) => {
                info!(
                    url = %self.predict_url,
                    category = %request.category.id,
                    detected = result.detected(),
                    "remote analysis completed"
                );
                Ok(result)
            }
            Ok(Err(error)) => {
                warn!(url = %self.predict_url, %error, "remote analysis failed");
                Err(error)
            }
            Err(_) => {
                warn!(url = %self.predict_url, timeout_ms = self.timeout.as_millis() as u64, "remote analysis timed out");
                Err(AnalysisError::Timeout(self.timeout))
            }
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
