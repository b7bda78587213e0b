//! Weight-configuration optimizer: runs the pipeline over a sample set
//! under each candidate configuration and ranks the runs by a fixed
//! composite objective.

use crate::config::WeightConfig;
use crate::models::{OptimizationRun, WorkItem, UNCLASSIFIED};
use crate::scheduler::{Harvester, PipelineDeps};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Fixed objective weights and caps. Deliberately not user-configurable
/// so rankings stay comparable across optimizer invocations.
#[derive(Debug, Clone)]
pub struct OptimizationPolicy {
    pub quality_weight: f64,
    pub confidence_weight: f64,
    pub completeness_weight: f64,
    pub error_weight: f64,
    pub diversity_weight: f64,
    pub time_penalty: f64,
    pub memory_penalty: f64,
    pub diversity_cap: usize,
    pub time_cap: Duration,
    pub memory_cap_mb: u64,
}

impl Default for OptimizationPolicy {
    fn default() -> Self {
        Self {
            quality_weight: 0.3,
            confidence_weight: 0.2,
            completeness_weight: 0.2,
            error_weight: 0.1,
            diversity_weight: 0.1,
            time_penalty: 0.1,
            memory_penalty: 0.1,
            diversity_cap: 6,
            time_cap: Duration::from_secs(30),
            memory_cap_mb: 256,
        }
    }
}

impl OptimizationPolicy {
    pub fn composite(&self, run: &OptimizationRun) -> f64 {
        let diversity = run.label_diversity.min(self.diversity_cap) as f64
            / self.diversity_cap.max(1) as f64;
        let time = run.processing_time_ms as f64 / self.time_cap.as_millis() as f64;
        let memory = run.memory_delta_mb.max(0) as f64 / self.memory_cap_mb.max(1) as f64;
        self.quality_weight * (run.average_quality / 100.0)
            + self.confidence_weight * run.average_confidence
            + self.completeness_weight * run.completeness
            + self.error_weight * (1.0 - run.error_rate)
            + self.diversity_weight * diversity
            - self.time_penalty * time
            - self.memory_penalty * memory
    }
}

/// Named metric accessors for reporting. Values are resolved through this
/// table, never by evaluating metric names dynamically.
pub const METRIC_ACCESSORS: &[(&str, fn(&OptimizationRun) -> f64)] = &[
    ("average_quality", |r| r.average_quality),
    ("average_confidence", |r| r.average_confidence),
    ("completeness", |r| r.completeness),
    ("error_rate", |r| r.error_rate),
    ("label_diversity", |r| r.label_diversity as f64),
    ("processing_time_ms", |r| r.processing_time_ms as f64),
    ("memory_delta_mb", |r| r.memory_delta_mb as f64),
    ("composite_score", |r| r.composite_score),
];

pub fn metric(run: &OptimizationRun, name: &str) -> Option<f64> {
    METRIC_ACCESSORS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, f)| f(run))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationReport {
    /// Runs ranked best first.
    pub runs: Vec<OptimizationRun>,
}

impl OptimizationReport {
    pub fn best(&self) -> Option<&OptimizationRun> {
        self.runs.first()
    }
}

/// Ranks runs by composite score, highest first; ties break on lowest
/// processing time, then configuration name for full determinism.
pub fn rank(mut runs: Vec<OptimizationRun>) -> Vec<OptimizationRun> {
    runs.sort_by(|a, b| {
        b.composite_score
            .partial_cmp(&a.composite_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.processing_time_ms.cmp(&b.processing_time_ms))
            .then(a.config_name.cmp(&b.config_name))
    });
    runs
}

/// Runs every candidate over the same samples and returns the ranked
/// report plus the winning configuration. Candidates execute
/// sequentially so per-run time and memory measurements do not interfere.
pub async fn optimize(
    configs: &[WeightConfig],
    samples: &[WorkItem],
    deps: &PipelineDeps,
    policy: &OptimizationPolicy,
) -> (WeightConfig, OptimizationReport) {
    let mut runs = Vec::with_capacity(configs.len());
    for config in configs {
        let run = measure(config, samples, deps, policy).await;
        debug!(
            config = %run.config_name,
            composite = run.composite_score,
            "optimizer run complete"
        );
        runs.push(run);
    }

    let runs = rank(runs);
    let best_name = runs
        .first()
        .map(|r| r.config_name.clone())
        .unwrap_or_else(|| "default".to_string());
    let best = configs
        .iter()
        .find(|c| c.name == best_name)
        .cloned()
        .unwrap_or_default();
    info!(best = %best.name, candidates = configs.len(), "optimizer selected configuration");

    (best, OptimizationReport { runs })
}

async fn measure(
    config: &WeightConfig,
    samples: &[WorkItem],
    deps: &PipelineDeps,
    policy: &OptimizationPolicy,
) -> OptimizationRun {
    let memory_before = deps.monitor.rss_mb() as i64;
    let started = Instant::now();

    let harvester = Harvester::new(deps.clone(), config.clone());
    let outcome = harvester.run(samples.to_vec()).await;

    let processing_time_ms = started.elapsed().as_millis() as u64;
    let memory_delta_mb = deps.monitor.rss_mb() as i64 - memory_before;

    let produced = outcome.records.len();
    let classified = outcome
        .records
        .iter()
        .filter(|r| r.classification.final_label != UNCLASSIFIED)
        .count();
    let labels: BTreeSet<&str> = outcome
        .records
        .iter()
        .map(|r| r.classification.final_label.as_str())
        .filter(|l| *l != UNCLASSIFIED)
        .collect();

    let average_quality = mean(outcome.records.iter().map(|r| f64::from(r.quality.score)));
    let average_confidence = mean(
        outcome
            .records
            .iter()
            .map(|r| f64::from(r.classification.aggregate_confidence)),
    );
    let completeness = if samples.is_empty() {
        0.0
    } else {
        produced as f64 / samples.len() as f64
    };
    let error_rate = if produced == 0 {
        1.0
    } else {
        (produced - classified) as f64 / produced as f64
    };

    let mut run = OptimizationRun {
        config_name: config.name.clone(),
        samples_tested: samples.len(),
        average_quality,
        average_confidence,
        completeness,
        error_rate,
        label_diversity: labels.len(),
        processing_time_ms,
        memory_delta_mb,
        composite_score: 0.0,
    };
    run.composite_score = policy.composite(&run);
    run
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values {
        sum += v;
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
