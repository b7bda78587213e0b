use crate::{ClassifyResponse, ProviderError, TextClassifier};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct LocalConfig {
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

/// Local inference server (no auth, flat response schema).
#[derive(Clone)]
pub struct LocalProvider {
    client: Client,
    cfg: Arc<LocalConfig>,
}

impl LocalProvider {
    pub fn new(cfg: LocalConfig) -> Self {
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
struct LocalApiResponse {
    label: String,
    confidence: f32,
}

#[async_trait::async_trait]
impl TextClassifier for LocalProvider {
    async fn warmup(&self) -> Result<(), ProviderError> {
        let resp = self
            .client
            .get(format!("{}/health", self.cfg.base_url))
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ProviderError::RequestFailed(format!(
                "health probe returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn classify(&self, text: &str) -> Result<ClassifyResponse, ProviderError> {
        #[derive(serde::Serialize)]
        struct LocalRequest<'a> {
            model: &'a str,
            text: &'a str,
        }

        let body = LocalRequest {
            model: &self.cfg.model,
            text,
        };

        let resp = self
            .client
            .post(format!("{}/classify", self.cfg.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

        let parsed: LocalApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

        Ok(ClassifyResponse {
            label: parsed.label,
            confidence: parsed.confidence.clamp(0.0, 1.0),
            scores: None,
        })
    }
}
