use crate::adapters::{
    classify_guarded, EntityAdapter, KeywordAdapter, MethodAdapter, ModelAdapter,
};
use crate::config::{self, AppConfig, WeightConfig};
use crate::ensemble;
use crate::fetch::HttpFetcher;
use crate::keywords::KeywordTable;
use crate::models::{
    ClassificationResult, ClassificationVote, CrawlOutcome, ProgressEvent, WorkItem,
};
use crate::optimizer::{self, OptimizationPolicy, OptimizationReport};
use crate::resources::ResourceMonitor;
use crate::scheduler::{Harvester, PipelineDeps, RetryPolicy, SizingPolicy};
use anyhow::Context;
use providers::inference::{InferenceConfig, InferenceProvider};
use providers::local::{LocalConfig, LocalProvider};
use providers::noop::NoopProvider;
use providers::ClassifierRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use storage::models::{NewFailure, NewOptimizationRun, NewRecord};
use storage::RecordStore;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub fn build_registry(cfg: &AppConfig) -> ClassifierRegistry {
    let mut reg = ClassifierRegistry::new().with_classifier("noop", Arc::new(NoopProvider));
    let timeout = Duration::from_secs(cfg.crawl.model_timeout_secs);

    if let (Some(key), Some(base)) = (
        std::env::var_os("HARVESTER_API_KEY"),
        std::env::var_os("HARVESTER_API_URL"),
    ) {
        let provider = InferenceProvider::new(InferenceConfig {
            api_key: key.to_string_lossy().into_owned(),
            base_url: base.to_string_lossy().into_owned(),
            model: cfg.inference.primary_model.clone(),
            timeout,
        });
        reg = reg.with_classifier("model", Arc::new(provider));
    }

    if let Some(base) = std::env::var_os("LOCAL_INFERENCE_URL") {
        let provider = LocalProvider::new(LocalConfig {
            base_url: base.to_string_lossy().into_owned(),
            model: cfg.inference.secondary_model.clone(),
            timeout,
        });
        reg = reg.with_classifier("model_lite", Arc::new(provider));
    }

    reg.set_preferred("model")
}

pub fn build_keyword_table(cfg: &AppConfig) -> anyhow::Result<KeywordTable> {
    let mut table = KeywordTable::builtin();
    if let Some(dir) = &cfg.classification.keywords_dir {
        let loaded = table
            .extend_from_dir(&PathBuf::from(dir))
            .context("loading keyword profiles")?;
        if loaded > 0 {
            info!(loaded, dir, "extended keyword table");
        }
    }
    Ok(table)
}

/// Adapter stack in vote order: model methods first, local heuristics
/// last. Methods without a configured backend are simply absent; their
/// absence is the unavailable path, never an error.
pub fn build_adapters(
    cfg: &AppConfig,
    registry: &ClassifierRegistry,
    table: Arc<KeywordTable>,
) -> Vec<Arc<dyn MethodAdapter>> {
    let model_budget = Duration::from_secs(cfg.crawl.model_timeout_secs);
    let local_budget = Duration::from_secs(cfg.crawl.adapter_timeout_secs);

    let mut adapters: Vec<Arc<dyn MethodAdapter>> = Vec::new();
    if let Ok(service) = registry.classifier(Some("model")) {
        adapters.push(Arc::new(ModelAdapter::primary(service, model_budget)));
    }
    if let Ok(service) = registry.classifier(Some("model_lite")) {
        adapters.push(Arc::new(ModelAdapter::secondary(service, model_budget)));
    }
    adapters.push(Arc::new(EntityAdapter::new(table.clone(), local_budget)));
    adapters.push(Arc::new(KeywordAdapter::new(table, local_budget)));
    adapters
}

pub fn build_deps(cfg: &AppConfig) -> anyhow::Result<PipelineDeps> {
    let registry = build_registry(cfg);
    let table = Arc::new(build_keyword_table(cfg)?);
    let adapters = build_adapters(cfg, &registry, table.clone());

    let fetcher = Arc::new(HttpFetcher::new(Duration::from_secs(
        cfg.crawl.fetch_timeout_secs,
    )));
    let monitor = Arc::new(ResourceMonitor::new());
    monitor.register(fetcher.cache());

    Ok(PipelineDeps {
        fetcher,
        adapters,
        validator: None,
        monitor,
        vocabulary: table,
        policy: SizingPolicy {
            cleanup_interval: cfg.crawl.cleanup_interval,
            ..SizingPolicy::default()
        },
        retry: RetryPolicy {
            max_retries: cfg.crawl.max_retries,
            base_delay: Duration::from_millis(cfg.crawl.retry_base_ms),
        },
    })
}

/// Resolves the active weight profile: profile directory if configured,
/// built-in default otherwise. Always fully populated.
pub fn resolve_profile(cfg: &AppConfig) -> anyhow::Result<WeightConfig> {
    let profiles = match &cfg.classification.profiles_dir {
        Some(dir) => config::load_profiles(&PathBuf::from(dir)).context("loading profiles")?,
        None => Vec::new(),
    };
    Ok(config::select_profile(
        &profiles,
        cfg.classification.active_profile.as_deref(),
    ))
}

/// Full crawl: harvest, classify, score, persist. The returned outcome
/// still carries every record for callers that want them in memory.
pub async fn run_crawl(
    cfg: &AppConfig,
    items: Vec<WorkItem>,
    progress: Option<mpsc::Sender<ProgressEvent>>,
    cancel: CancellationToken,
) -> anyhow::Result<CrawlOutcome> {
    let pool = storage::connect(&cfg.database.path)
        .await
        .context("db connect")?;
    storage::migrate(&pool).await.context("db migrate")?;
    let store = RecordStore::new(pool);

    let deps = build_deps(cfg)?;
    let profile = resolve_profile(cfg)?;

    let mut harvester = Harvester::new(deps, profile).with_cancellation(cancel);
    if let Some(tx) = progress {
        harvester = harvester.with_progress(tx);
    }

    let outcome = harvester.run(items).await;

    for record in &outcome.records {
        let row = NewRecord {
            item_id: record.item_id.clone(),
            url: record.url.clone(),
            title: record.title.clone(),
            description: record.description.clone(),
            provider: record.provider.clone(),
            label: record.classification.final_label.clone(),
            confidence: record.classification.aggregate_confidence,
            quality_score: record.quality.score,
            grade: record.quality.grade.as_str().to_string(),
            payload_json: serde_json::to_string(record)?,
        };
        store.insert_record(&row).await?;
    }
    for failure in &outcome.report.failed_items {
        store
            .insert_failure(&NewFailure {
                item_id: failure.id.clone(),
                url: failure.url.clone(),
                category: failure.category.as_str().to_string(),
                retries: i64::from(failure.retries),
            })
            .await?;
    }

    info!(
        persisted = outcome.records.len(),
        failures = outcome.report.failed_items.len(),
        "crawl results stored"
    );
    Ok(outcome)
}

/// Optimizer entry point: tries every candidate against the sample set,
/// persists the runs, and returns the winner plus the ranked report.
pub async fn run_optimize(
    cfg: &AppConfig,
    samples: Vec<WorkItem>,
    candidates: Option<Vec<WeightConfig>>,
) -> anyhow::Result<(WeightConfig, OptimizationReport)> {
    let pool = storage::connect(&cfg.database.path)
        .await
        .context("db connect")?;
    storage::migrate(&pool).await.context("db migrate")?;
    let store = RecordStore::new(pool);

    let deps = build_deps(cfg)?;
    let candidates = match candidates {
        Some(c) if !c.is_empty() => c,
        _ => match &cfg.classification.profiles_dir {
            Some(dir) => {
                let loaded = config::load_profiles(&PathBuf::from(dir))?;
                if loaded.is_empty() {
                    WeightConfig::builtin_candidates()
                } else {
                    loaded
                }
            }
            None => WeightConfig::builtin_candidates(),
        },
    };

    let policy = OptimizationPolicy::default();
    let (best, report) = optimizer::optimize(&candidates, &samples, &deps, &policy).await;

    for run in &report.runs {
        store
            .insert_optimization_run(&NewOptimizationRun {
                config_name: run.config_name.clone(),
                composite_score: run.composite_score,
                samples_tested: run.samples_tested as i64,
                metrics_json: serde_json::to_string(run)?,
            })
            .await?;
    }

    Ok((best, report))
}

/// One-off classification of raw text, bypassing fetch and persistence.
pub async fn classify_text(
    cfg: &AppConfig,
    text: &str,
) -> anyhow::Result<(Vec<ClassificationVote>, ClassificationResult)> {
    let registry = build_registry(cfg);
    let table = Arc::new(build_keyword_table(cfg)?);
    let adapters = build_adapters(cfg, &registry, table);
    let profile = resolve_profile(cfg)?;

    let mut votes = Vec::new();
    for adapter in &adapters {
        if let Some(vote) = classify_guarded(adapter.as_ref(), text, &profile).await {
            votes.push(vote);
        }
    }
    let result = ensemble::vote(&votes, &profile);
    Ok((votes, result))
}
