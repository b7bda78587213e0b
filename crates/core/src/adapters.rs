//! Uniform wrappers around each classification method. An adapter that
//! cannot answer returns `None`; that is never fatal to the item.

use crate::config::WeightConfig;
use crate::entity::{self, EntityKind};
use crate::keywords::KeywordTable;
use crate::models::{methods, ClassificationVote};
use providers::{ModelService, ModelState};
use std::sync::Arc;
use std::time::Duration;

#[async_trait::async_trait]
pub trait MethodAdapter: Send + Sync {
    fn method(&self) -> &str;

    /// Wall-clock budget for one classify call.
    fn budget(&self) -> Duration;

    async fn classify(&self, text: &str, config: &WeightConfig) -> Option<ClassificationVote>;
}

/// Runs the adapter under its wall-clock budget. Timeouts degrade to
/// unavailable, never block the caller.
pub async fn classify_guarded(
    adapter: &dyn MethodAdapter,
    text: &str,
    config: &WeightConfig,
) -> Option<ClassificationVote> {
    match tokio::time::timeout(adapter.budget(), adapter.classify(text, config)).await {
        Ok(vote) => vote,
        Err(_) => {
            tracing::debug!(method = adapter.method(), "adapter timed out");
            None
        }
    }
}

/// Keeps at most `limit` whitespace tokens.
pub fn truncate_tokens(text: &str, limit: usize) -> String {
    text.split_whitespace()
        .take(limit)
        .collect::<Vec<_>>()
        .join(" ")
}

/// First `n` characters, cut on a character boundary.
fn char_window(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Model-backed adapter over a registry service. Used for both the
/// primary and the lightweight secondary slot; only the service and the
/// method name differ.
pub struct ModelAdapter {
    method: &'static str,
    service: Arc<ModelService>,
    budget: Duration,
}

impl ModelAdapter {
    pub fn primary(service: Arc<ModelService>, budget: Duration) -> Self {
        Self {
            method: methods::MODEL,
            service,
            budget,
        }
    }

    pub fn secondary(service: Arc<ModelService>, budget: Duration) -> Self {
        Self {
            method: methods::MODEL_LITE,
            service,
            budget,
        }
    }
}

#[async_trait::async_trait]
impl MethodAdapter for ModelAdapter {
    fn method(&self) -> &str {
        self.method
    }

    fn budget(&self) -> Duration {
        self.budget
    }

    async fn classify(&self, text: &str, config: &WeightConfig) -> Option<ClassificationVote> {
        if self.service.state().await == ModelState::Failed {
            return None;
        }
        let input = truncate_tokens(text, config.token_limit);
        match self.service.classify(&input).await {
            Ok(resp) => Some(ClassificationVote {
                method: self.method.to_string(),
                label: resp.label,
                confidence: resp.confidence.clamp(0.0, 1.0),
                raw_scores: resp.scores,
            }),
            Err(e) => {
                tracing::debug!(method = self.method, error = %e, "model vote unavailable");
                None
            }
        }
    }
}

/// Statistical adapter: named entities plus keyword density, no external
/// calls.
pub struct EntityAdapter {
    table: Arc<KeywordTable>,
    budget: Duration,
}

impl EntityAdapter {
    pub fn new(table: Arc<KeywordTable>, budget: Duration) -> Self {
        Self { table, budget }
    }
}

#[async_trait::async_trait]
impl MethodAdapter for EntityAdapter {
    fn method(&self) -> &str {
        methods::ENTITY
    }

    fn budget(&self) -> Duration {
        self.budget
    }

    async fn classify(&self, text: &str, config: &WeightConfig) -> Option<ClassificationVote> {
        let window = char_window(text, config.token_limit * 6);
        let entities = entity::extract_entities(window);
        let lower = window.to_lowercase();
        let (label, _) = self.table.best_match(&lower)?;

        let diversity = entity::kind_diversity(&entities);
        let confidence =
            entity::entity_confidence(entities.len(), diversity, window.chars().count());

        let mut raw = std::collections::BTreeMap::new();
        raw.insert("entity_count".to_string(), entities.len() as f32);
        raw.insert(
            "acronyms".to_string(),
            entities
                .iter()
                .filter(|e| e.kind == EntityKind::Acronym)
                .count() as f32,
        );
        raw.insert("keyword_density".to_string(), self.table.keyword_density(&lower));

        Some(ClassificationVote {
            method: methods::ENTITY.to_string(),
            label,
            confidence,
            raw_scores: Some(raw),
        })
    }
}

/// Fixed-table keyword matcher. Most-matched category wins at a fixed
/// confidence.
pub struct KeywordAdapter {
    table: Arc<KeywordTable>,
    confidence: f32,
    budget: Duration,
}

impl KeywordAdapter {
    pub const DEFAULT_CONFIDENCE: f32 = 0.8;

    pub fn new(table: Arc<KeywordTable>, budget: Duration) -> Self {
        Self {
            table,
            confidence: Self::DEFAULT_CONFIDENCE,
            budget,
        }
    }
}

#[async_trait::async_trait]
impl MethodAdapter for KeywordAdapter {
    fn method(&self) -> &str {
        methods::KEYWORD
    }

    fn budget(&self) -> Duration {
        self.budget
    }

    async fn classify(&self, text: &str, _config: &WeightConfig) -> Option<ClassificationVote> {
        let lower = text.to_lowercase();
        let (label, _hits) = self.table.best_match(&lower)?;
        Some(ClassificationVote::new(
            methods::KEYWORD,
            label,
            self.confidence,
        ))
    }
}
