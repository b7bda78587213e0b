use harvester_core::adapters::{
    classify_guarded, truncate_tokens, EntityAdapter, KeywordAdapter, MethodAdapter, ModelAdapter,
};
use harvester_core::config::WeightConfig;
use harvester_core::entity::{self, EntityKind};
use harvester_core::keywords::KeywordTable;
use harvester_core::models::{methods, ClassificationVote};
use providers::noop::NoopProvider;
use providers::ClassifierRegistry;
use std::sync::Arc;
use std::time::Duration;

fn table() -> Arc<KeywordTable> {
    Arc::new(KeywordTable::builtin())
}

fn budget() -> Duration {
    Duration::from_secs(3)
}

#[tokio::test]
async fn keyword_adapter_matches_at_fixed_confidence() {
    let adapter = KeywordAdapter::new(table(), budget());
    let vote = adapter
        .classify(
            "This catalog hosts Sentinel satellite imagery with full swath coverage",
            &WeightConfig::default(),
        )
        .await
        .expect("keyword match");

    assert_eq!(vote.method, methods::KEYWORD);
    assert_eq!(vote.label, "satellite_data");
    assert_eq!(vote.confidence, KeywordAdapter::DEFAULT_CONFIDENCE);
}

#[tokio::test]
async fn keyword_adapter_without_match_is_unavailable() {
    let adapter = KeywordAdapter::new(table(), budget());
    let vote = adapter
        .classify("a short note about sourdough baking", &WeightConfig::default())
        .await;
    assert!(vote.is_none());
}

#[tokio::test]
async fn entity_adapter_labels_dense_technical_text() {
    let adapter = EntityAdapter::new(table(), budget());
    let vote = adapter
        .classify(
            "MODIS satellite imagery from the Terra Platform at 250m resolution, \
             processed with NDVI composites across each orbital swath.",
            &WeightConfig::default(),
        )
        .await
        .expect("entity vote");

    assert_eq!(vote.method, methods::ENTITY);
    assert_eq!(vote.label, "satellite_data");
    assert!(vote.confidence > 0.2);
    assert!(vote.confidence <= 0.9);
}

#[test]
fn entity_extraction_finds_all_three_kinds() {
    let entities = entity::extract_entities(
        "The MODIS sensor aboard Terra Platform captures scenes at 250m resolution",
    );
    assert!(entities.iter().any(|e| e.kind == EntityKind::Acronym));
    assert!(entities.iter().any(|e| e.kind == EntityKind::ProperNoun));
    assert!(entities.iter().any(|e| e.kind == EntityKind::Measurement));
}

#[test]
fn entity_confidence_is_monotone_and_capped() {
    let low = entity::entity_confidence(1, 1, 100);
    let mid = entity::entity_confidence(5, 2, 2000);
    let high = entity::entity_confidence(100, 3, 100_000);

    assert!(low <= mid);
    assert!(mid <= high);
    assert!(high <= 0.9);
}

#[tokio::test]
async fn model_adapter_degrades_to_unavailable() {
    let registry = ClassifierRegistry::new().with_classifier("noop", Arc::new(NoopProvider));
    let service = registry.classifier(Some("noop")).unwrap();
    let adapter = ModelAdapter::primary(service, budget());

    let vote = adapter
        .classify("satellite imagery", &WeightConfig::default())
        .await;
    assert!(vote.is_none());
}

struct StalledAdapter;

#[async_trait::async_trait]
impl MethodAdapter for StalledAdapter {
    fn method(&self) -> &str {
        "stalled"
    }

    fn budget(&self) -> Duration {
        Duration::from_millis(50)
    }

    async fn classify(&self, _text: &str, _config: &WeightConfig) -> Option<ClassificationVote> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Some(ClassificationVote::new("stalled", "never", 1.0))
    }
}

#[tokio::test]
async fn guarded_call_times_out_to_unavailable() {
    let vote = classify_guarded(&StalledAdapter, "text", &WeightConfig::default()).await;
    assert!(vote.is_none());
}

#[test]
fn truncation_keeps_leading_tokens() {
    let text = "alpha beta gamma delta";
    assert_eq!(truncate_tokens(text, 2), "alpha beta");
    assert_eq!(truncate_tokens(text, 10), text);
}
