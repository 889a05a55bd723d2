use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use rxgate_core::domain::{FeedbackRecord, PatientInput, Prescription};
use rxgate_core::errors::ModelError;
use rxgate_core::provider::PredictionProvider;

/// Environment variable carrying the inference-service credential.
pub const TOKEN_ENV: &str = "RXGATE_MODEL_TOKEN";

const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    symptoms: &'a str,
    age: u32,
    gender: &'a str,
    diagnosis: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    medications: Vec<String>,
    confidence: f64,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Serialize)]
struct UpdateRequest<'a> {
    feedback: &'a [FeedbackRecord],
}

#[derive(Debug, Deserialize)]
struct UpdateResponse {
    version: String,
}

/// Provider backed by a remote inference service.
///
/// `generate` never surfaces transport failures: any HTTP or decode error
/// degrades to the sentinel prescription so the router always has a
/// well-formed object to serialize.
pub struct RemoteModelProvider {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
    version: RwLock<String>,
}

impl RemoteModelProvider {
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token,
            version: RwLock::new("1.0.0".to_string()),
        }
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn call_generate(&self, input: &PatientInput) -> Result<GenerateResponse, ModelError> {
        let url = format!("{}/generate", self.endpoint);
        let body = GenerateRequest {
            symptoms: &input.symptoms,
            age: input.age,
            gender: &input.gender,
            diagnosis: &input.diagnosis,
        };

        let response = self
            .authorized(self.client.post(&url).json(&body))
            .send()
            .await
            .map_err(|e| ModelError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Endpoint {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<GenerateResponse>()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl PredictionProvider for RemoteModelProvider {
    fn name(&self) -> &str {
        "remote"
    }

    fn current_version(&self) -> String {
        self.version.read().clone()
    }

    async fn generate(&self, input: &PatientInput) -> Prescription {
        match self.call_generate(input).await {
            Ok(resp) => {
                if let Some(version) = &resp.model_version {
                    *self.version.write() = version.clone();
                }
                let medications = if resp.medications.is_empty() {
                    return Prescription::generation_failed(self.current_version());
                } else {
                    resp.medications
                };
                Prescription::new(
                    medications,
                    resp.confidence.clamp(0.0, 1.0),
                    self.current_version(),
                )
            }
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "remote inference failed, degrading");
                Prescription::generation_failed(self.current_version())
            }
        }
    }

    async fn update_with_feedback(&self, records: &[FeedbackRecord]) -> Result<String, ModelError> {
        let url = format!("{}/update", self.endpoint);
        let response = self
            .authorized(self.client.post(&url).json(&UpdateRequest { feedback: records }))
            .send()
            .await
            .map_err(|e| ModelError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Endpoint {
                status: status.as_u16(),
                body,
            });
        }

        let update = response
            .json::<UpdateResponse>()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        *self.version.write() = update.version.clone();
        info!(version = %update.version, samples = records.len(), "remote model re-versioned");
        Ok(update.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_endpoint_degrades_to_sentinel() {
        // Nothing listens on port 9; connect fails immediately
        let provider = RemoteModelProvider::new("http://127.0.0.1:9", None);
        let input = PatientInput::new("headache", 45, "female", "migraine");
        let rx = provider.generate(&input).await;
        assert_eq!(rx.confidence, 0.0);
        assert_eq!(rx.medications, vec!["Unable to generate prescription".to_string()]);
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails_update() {
        let provider = RemoteModelProvider::new("http://127.0.0.1:9", None);
        let result = provider.update_with_feedback(&[]).await;
        assert!(matches!(result, Err(ModelError::Unavailable(_))));
    }

    #[test]
    fn endpoint_trailing_slash_is_normalized() {
        let provider = RemoteModelProvider::new("http://model.internal/", None);
        assert_eq!(provider.endpoint, "http://model.internal");
    }

    #[test]
    fn generate_request_serializes_patient_fields() {
        let body = GenerateRequest {
            symptoms: "headache, nausea",
            age: 45,
            gender: "female",
            diagnosis: "migraine",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["symptoms"], "headache, nausea");
        assert_eq!(json["age"], 45);
    }

    #[test]
    fn generate_response_tolerates_missing_version() {
        let resp: GenerateResponse =
            serde_json::from_str(r#"{"medications":["Ibuprofen"],"confidence":0.9}"#).unwrap();
        assert!(resp.model_version.is_none());
        assert_eq!(resp.medications, vec!["Ibuprofen"]);
    }
}
