use harvester_core::adapters::KeywordAdapter;
use harvester_core::config::WeightConfig;
use harvester_core::error::HarvestError;
use harvester_core::fetch::PageFetcher;
use harvester_core::keywords::KeywordTable;
use harvester_core::models::{methods, DocumentFields, OptimizationRun, WorkItem};
use harvester_core::optimizer::{self, metric, OptimizationPolicy};
use harvester_core::resources::MemoryMonitor;
use harvester_core::scheduler::{PipelineDeps, RetryPolicy, SizingPolicy};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

struct StaticFetcher;

#[async_trait::async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch(&self, item: &WorkItem) -> Result<DocumentFields, HarvestError> {
        Ok(DocumentFields {
            url: item.url().to_string(),
            title: "Sentinel satellite imagery archive".to_string(),
            text: "Sentinel satellite imagery with orbital swath coverage".to_string(),
            ..Default::default()
        })
    }
}

struct QuietMonitor;

#[async_trait::async_trait]
impl MemoryMonitor for QuietMonitor {
    fn rss_mb(&self) -> u64 {
        10
    }

    async fn cleanup(&self) -> Result<usize, HarvestError> {
        Ok(0)
    }
}

fn deps() -> PipelineDeps {
    let table = Arc::new(KeywordTable::builtin());
    PipelineDeps {
        fetcher: Arc::new(StaticFetcher),
        adapters: vec![Arc::new(KeywordAdapter::new(
            table.clone(),
            Duration::from_secs(3),
        ))],
        validator: None,
        monitor: Arc::new(QuietMonitor),
        vocabulary: table,
        policy: SizingPolicy::default(),
        retry: RetryPolicy::default(),
    }
}

fn samples(n: usize) -> Vec<WorkItem> {
    (0..n)
        .map(|i| WorkItem::from_url(format!("https://catalog.example/sample/{i}")))
        .collect()
}

fn candidates() -> Vec<WeightConfig> {
    let weighted = WeightConfig {
        name: "weighted".to_string(),
        method_weights: BTreeMap::from([(methods::KEYWORD.to_string(), 1.0)]),
        ..WeightConfig::default()
    };
    let unweighted = WeightConfig {
        name: "unweighted".to_string(),
        method_weights: BTreeMap::new(),
        ..WeightConfig::default()
    };
    vec![unweighted, weighted]
}

#[tokio::test]
async fn best_configuration_has_the_highest_composite() {
    let deps = deps();
    let policy = OptimizationPolicy::default();
    let (best, report) = optimizer::optimize(&candidates(), &samples(5), &deps, &policy).await;

    assert_eq!(best.name, "weighted");
    assert_eq!(report.runs.len(), 2);
    assert_eq!(report.runs[0].config_name, "weighted");
    assert!(report.runs[0].composite_score >= report.runs[1].composite_score);
    assert_eq!(report.best().unwrap().config_name, "weighted");
}

#[tokio::test]
async fn ranking_is_reproducible_for_the_same_inputs() {
    let deps = deps();
    let policy = OptimizationPolicy::default();

    let (_, first) = optimizer::optimize(&candidates(), &samples(4), &deps, &policy).await;
    let (_, second) = optimizer::optimize(&candidates(), &samples(4), &deps, &policy).await;

    let order = |r: &optimizer::OptimizationReport| {
        r.runs
            .iter()
            .map(|run| run.config_name.clone())
            .collect::<Vec<_>>()
    };
    assert_eq!(order(&first), order(&second));
}

fn run_with(name: &str, composite: f64, time_ms: u64) -> OptimizationRun {
    OptimizationRun {
        config_name: name.to_string(),
        samples_tested: 10,
        average_quality: 50.0,
        average_confidence: 0.5,
        completeness: 1.0,
        error_rate: 0.0,
        label_diversity: 2,
        processing_time_ms: time_ms,
        memory_delta_mb: 0,
        composite_score: composite,
    }
}

#[test]
fn composite_ties_break_on_lowest_processing_time() {
    let ranked = optimizer::rank(vec![
        run_with("slow", 0.7, 900),
        run_with("fast", 0.7, 100),
        run_with("better", 0.9, 5000),
    ]);

    let names: Vec<&str> = ranked.iter().map(|r| r.config_name.as_str()).collect();
    assert_eq!(names, vec!["better", "fast", "slow"]);
}

#[test]
fn metric_values_resolve_through_the_accessor_table() {
    let run = run_with("probe", 0.42, 120);

    assert_eq!(metric(&run, "composite_score"), Some(0.42));
    assert_eq!(metric(&run, "processing_time_ms"), Some(120.0));
    assert_eq!(metric(&run, "average_quality"), Some(50.0));
    assert_eq!(metric(&run, "not_a_metric"), None);
}

#[test]
fn composite_rewards_quality_and_penalizes_cost() {
    let policy = OptimizationPolicy::default();

    let cheap = run_with("cheap", 0.0, 100);
    let expensive = OptimizationRun {
        processing_time_ms: 20_000,
        memory_delta_mb: 200,
        ..run_with("expensive", 0.0, 0)
    };

    assert!(policy.composite(&cheap) > policy.composite(&expensive));

    let high_quality = OptimizationRun {
        average_quality: 90.0,
        average_confidence: 0.9,
        ..run_with("hq", 0.0, 100)
    };
    assert!(policy.composite(&high_quality) > policy.composite(&cheap));
}
