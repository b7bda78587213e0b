use crate::{ClassifyResponse, ProviderError, TextClassifier};

/// Placeholder classifier that is never available. Useful as a registry
/// default and in tests that exercise the unavailable path.
pub struct NoopProvider;

#[async_trait::async_trait]
impl TextClassifier for NoopProvider {
    async fn warmup(&self) -> Result<(), ProviderError> {
        Err(ProviderError::NotImplemented)
    }

    async fn classify(&self, _text: &str) -> Result<ClassifyResponse, ProviderError> {
        Err(ProviderError::NotImplemented)
    }
}
