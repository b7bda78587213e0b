use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("memory limit exceeded: {0} MB resident")]
    Memory(u64),
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("parse failure: {0}")]
    ParseFailure(String),
    #[error("{0}")]
    Unknown(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Timeout,
    Network,
    Memory,
    ModelUnavailable,
    ParseFailure,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Network => "network",
            ErrorCategory::Memory => "memory",
            ErrorCategory::ModelUnavailable => "model_unavailable",
            ErrorCategory::ParseFailure => "parse_failure",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl HarvestError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            HarvestError::Timeout(_) => ErrorCategory::Timeout,
            HarvestError::Network(_) => ErrorCategory::Network,
            HarvestError::Memory(_) => ErrorCategory::Memory,
            HarvestError::ModelUnavailable(_) => ErrorCategory::ModelUnavailable,
            HarvestError::ParseFailure(_) => ErrorCategory::ParseFailure,
            HarvestError::Unknown(_) => ErrorCategory::Unknown,
        }
    }

    /// Only transient transport failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HarvestError::Timeout(_) | HarvestError::Network(_))
    }
}

impl From<reqwest::Error> for HarvestError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            HarvestError::Timeout(Duration::from_secs(0))
        } else {
            HarvestError::Network(e.to_string())
        }
    }
}
