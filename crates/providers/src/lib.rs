//! Provider abstractions for remote text classifiers.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

pub mod inference;
pub mod local;
pub mod noop;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("not implemented")]
    NotImplemented,
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyResponse {
    pub label: String,
    pub confidence: f32,
    pub scores: Option<BTreeMap<String, f32>>,
}

#[async_trait::async_trait]
pub trait TextClassifier: Send + Sync {
    /// Cheap readiness probe. Called once per service before the first
    /// classify call; a failure parks the service in `Failed`.
    async fn warmup(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn classify(&self, text: &str) -> Result<ClassifyResponse, ProviderError>;
}

/// Lifecycle of a wrapped classifier backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    Uninitialized,
    Loading,
    Ready,
    Failed,
}

/// Shared, lazily-initialized handle around one classifier backend.
///
/// Initialization happens at most once: the first caller runs the warmup
/// probe under the guard while later callers wait, then read the settled
/// state. A `Failed` service stays failed for the lifetime of the handle.
/// Concurrent `classify` calls against a `Ready` service are safe.
pub struct ModelService {
    name: String,
    provider: Arc<dyn TextClassifier>,
    state: RwLock<ModelState>,
    init_guard: Mutex<()>,
}

impl ModelService {
    pub fn new(name: impl Into<String>, provider: Arc<dyn TextClassifier>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            provider,
            state: RwLock::new(ModelState::Uninitialized),
            init_guard: Mutex::new(()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn state(&self) -> ModelState {
        *self.state.read().await
    }

    async fn ensure_ready(&self) -> Result<(), ProviderError> {
        match *self.state.read().await {
            ModelState::Ready => return Ok(()),
            ModelState::Failed => {
                return Err(ProviderError::Unavailable(self.name.clone()));
            }
            ModelState::Uninitialized | ModelState::Loading => {}
        }

        let _guard = self.init_guard.lock().await;
        // Another caller may have settled the state while we waited.
        match *self.state.read().await {
            ModelState::Ready => return Ok(()),
            ModelState::Failed => {
                return Err(ProviderError::Unavailable(self.name.clone()));
            }
            _ => {}
        }

        *self.state.write().await = ModelState::Loading;
        match self.provider.warmup().await {
            Ok(()) => {
                tracing::debug!(service = %self.name, "classifier service ready");
                *self.state.write().await = ModelState::Ready;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(service = %self.name, error = %e, "classifier warmup failed");
                *self.state.write().await = ModelState::Failed;
                Err(ProviderError::Unavailable(self.name.clone()))
            }
        }
    }

    pub async fn classify(&self, text: &str) -> Result<ClassifyResponse, ProviderError> {
        self.ensure_ready().await?;
        self.provider.classify(text).await
    }
}

#[derive(Default, Clone)]
pub struct ClassifierRegistry {
    classifiers: HashMap<String, Arc<ModelService>>,
    pub preferred: Option<String>,
}

impl ClassifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_classifier(mut self, name: &str, provider: Arc<dyn TextClassifier>) -> Self {
        self.classifiers
            .insert(name.to_string(), ModelService::new(name, provider));
        self
    }

    pub fn set_preferred(mut self, name: &str) -> Self {
        self.preferred = Some(name.to_string());
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classifiers.contains_key(name)
    }

    pub fn classifier(&self, name: Option<&str>) -> Result<Arc<ModelService>, ProviderError> {
        let key = name
            .map(str::to_string)
            .or_else(|| self.preferred.clone())
            .ok_or_else(|| ProviderError::UnknownProvider("no classifier configured".into()))?;
        self.classifiers
            .get(&key)
            .cloned()
            .ok_or(ProviderError::UnknownProvider(key))
    }
}
