use crate::{ClassifyResponse, ProviderError, TextClassifier};
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct InferenceConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

/// Hosted text-classification endpoint (bearer auth).
#[derive(Clone)]
pub struct InferenceProvider {
    client: Client,
    cfg: Arc<InferenceConfig>,
}

impl InferenceProvider {
    pub fn new(cfg: InferenceConfig) -> Self {
        let client = Client::builder()
            .timeout(cfg.timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            cfg: Arc::new(cfg),
        }
    }
}

#[derive(Deserialize)]
struct ClassificationApiResponse {
    results: Vec<ClassificationData>,
}

#[derive(Deserialize)]
struct ClassificationData {
    label: String,
    score: f32,
    #[serde(default)]
    scores: Option<BTreeMap<String, f32>>,
}

#[async_trait::async_trait]
impl TextClassifier for InferenceProvider {
    async fn warmup(&self) -> Result<(), ProviderError> {
        let resp = self
            .client
            .get(format!("{}/v1/models/{}", self.cfg.base_url, self.cfg.model))
            .bearer_auth(&self.cfg.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ProviderError::RequestFailed(format!(
                "model probe returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn classify(&self, text: &str) -> Result<ClassifyResponse, ProviderError> {
        #[derive(serde::Serialize)]
        struct ClassifyRequest<'a> {
            model: &'a str,
            input: &'a str,
        }

        let body = ClassifyRequest {
            model: &self.cfg.model,
            input: text,
        };

        let resp = self
            .client
            .post(format!("{}/v1/classifications", self.cfg.base_url))
            .bearer_auth(&self.cfg.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

        let parsed: ClassificationApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

        let top = parsed
            .results
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::RequestFailed("empty classification result".into()))?;

        Ok(ClassifyResponse {
            label: top.label,
            confidence: top.score.clamp(0.0, 1.0),
            scores: top.scores,
        })
    }
}
