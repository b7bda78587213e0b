//! Batch scheduler: partitions the work queue, sizes concurrency from the
//! job, retries transient failures with backoff, and pauses for memory
//! reclamation at a fixed cadence.

use crate::adapters::{classify_guarded, MethodAdapter};
use crate::config::WeightConfig;
use crate::ensemble;
use crate::error::HarvestError;
use crate::fetch::PageFetcher;
use crate::keywords::KeywordTable;
use crate::models::{
    CrawlOutcome, CrawlReport, DocumentFields, FailedItem, FieldCheck, ItemStatus, ProgressEvent,
    Record, WorkItem,
};
use crate::quality;
use crate::resources::MemoryMonitor;
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// External field-format validation; the scorer only consumes the
/// outcomes.
pub trait FieldValidator: Send + Sync {
    fn check(&self, fields: &DocumentFields) -> Vec<FieldCheck>;
}

/// Job-size tiers and the knobs derived from them. All sizing constants
/// live here rather than inline in the algorithm.
#[derive(Debug, Clone)]
pub struct SizingPolicy {
    pub high_item_threshold: usize,
    pub medium_item_threshold: usize,
    pub high_concurrency: usize,
    pub medium_concurrency: usize,
    pub low_concurrency: usize,
    pub high_batch_size: usize,
    pub medium_batch_size: usize,
    pub low_batch_size: usize,
    pub base_item_timeout: Duration,
    pub medium_item_timeout: Duration,
    pub large_item_timeout: Duration,
    pub high_progress_stride: usize,
    pub medium_progress_stride: usize,
    pub low_progress_stride: usize,
    /// Completed batches between reclamation pauses.
    pub cleanup_interval: usize,
}

impl Default for SizingPolicy {
    fn default() -> Self {
        Self {
            high_item_threshold: 1000,
            medium_item_threshold: 500,
            high_concurrency: 16,
            medium_concurrency: 8,
            low_concurrency: 4,
            high_batch_size: 100,
            medium_batch_size: 50,
            low_batch_size: 25,
            base_item_timeout: Duration::from_secs(10),
            medium_item_timeout: Duration::from_secs(20),
            large_item_timeout: Duration::from_secs(30),
            high_progress_stride: 50,
            medium_progress_stride: 25,
            low_progress_stride: 10,
            cleanup_interval: 5,
        }
    }
}

impl SizingPolicy {
    pub fn concurrency(&self, total_items: usize) -> usize {
        if total_items > self.high_item_threshold {
            self.high_concurrency
        } else if total_items >= self.medium_item_threshold {
            self.medium_concurrency
        } else {
            self.low_concurrency
        }
    }

    pub fn batch_size(&self, total_items: usize) -> usize {
        if total_items > self.high_item_threshold {
            self.high_batch_size
        } else if total_items >= self.medium_item_threshold {
            self.medium_batch_size
        } else {
            self.low_batch_size
        }
    }

    /// Larger jobs run hotter against the upstream server, so individual
    /// items get more headroom before they count as timed out.
    pub fn item_timeout(&self, total_items: usize) -> Duration {
        if total_items > self.high_item_threshold {
            self.large_item_timeout
        } else if total_items >= self.medium_item_threshold {
            self.medium_item_timeout
        } else {
            self.base_item_timeout
        }
    }

    pub fn progress_stride(&self, total_items: usize) -> usize {
        if total_items > self.high_item_threshold {
            self.high_progress_stride
        } else if total_items >= self.medium_item_threshold {
            self.medium_progress_stride
        } else {
            self.low_progress_stride
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Exponential: base, 2x base, 4x base, ...
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Everything the pipeline shares across items and configurations.
#[derive(Clone)]
pub struct PipelineDeps {
    pub fetcher: Arc<dyn PageFetcher>,
    pub adapters: Vec<Arc<dyn MethodAdapter>>,
    pub validator: Option<Arc<dyn FieldValidator>>,
    pub monitor: Arc<dyn MemoryMonitor>,
    pub vocabulary: Arc<KeywordTable>,
    pub policy: SizingPolicy,
    pub retry: RetryPolicy,
}

/// Batch lifecycle: queued until dispatch, running while any item is in
/// flight, then settled one way or the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Queued,
    Running,
    Completed,
    PartiallyFailed,
}

enum ItemOutcome {
    Done(Record),
    Failed(FailedItem),
    Skipped,
}

pub struct Harvester {
    deps: PipelineDeps,
    config: WeightConfig,
    progress: Option<mpsc::Sender<ProgressEvent>>,
    cancel: CancellationToken,
}

impl Harvester {
    pub fn new(deps: PipelineDeps, config: WeightConfig) -> Self {
        Self {
            deps,
            config,
            progress: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_progress(mut self, tx: mpsc::Sender<ProgressEvent>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &WeightConfig {
        &self.config
    }

    pub async fn run(&self, items: Vec<WorkItem>) -> CrawlOutcome {
        let started = Instant::now();
        let items_total = items.len();
        if items_total == 0 {
            return CrawlOutcome::default();
        }

        let batch_size = self.deps.policy.batch_size(items_total);
        let mut concurrency = self.deps.policy.concurrency(items_total);
        let item_timeout = self.deps.policy.item_timeout(items_total);
        let stride = self.deps.policy.progress_stride(items_total).max(1);

        let batches: Vec<&[WorkItem]> = items.chunks(batch_size).collect();
        let total_batches = batches.len();
        info!(
            items = items_total,
            batches = total_batches,
            concurrency,
            batch_size,
            profile = %self.config.name,
            "starting crawl"
        );

        let mut records: Vec<Record> = Vec::new();
        let mut failed: Vec<FailedItem> = Vec::new();
        let mut report = CrawlReport::default();
        let mut consecutive_cleanup_failures = 0u32;

        'batches: for (batch_index, batch) in batches.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!(batch_index, "crawl cancelled, abandoning queued batches");
                break;
            }

            let sem = Arc::new(Semaphore::new(concurrency));
            let mut in_flight = FuturesUnordered::new();
            for item in batch.iter() {
                in_flight.push(self.process_item(item.clone(), sem.clone(), item_timeout));
            }

            let mut batch_failures = 0usize;
            while let Some(outcome) = in_flight.next().await {
                match outcome {
                    ItemOutcome::Done(record) => records.push(record),
                    ItemOutcome::Failed(failure) => {
                        batch_failures += 1;
                        *report
                            .error_counts
                            .entry(failure.category.as_str().to_string())
                            .or_insert(0) += 1;
                        failed.push(failure);
                    }
                    ItemOutcome::Skipped => {}
                }
                let settled = records.len() + failed.len();
                if settled % stride == 0 {
                    self.emit(batch_index, total_batches, records.len(), items_total, failed.len());
                }
            }

            let status = if batch_failures == 0 {
                BatchStatus::Completed
            } else {
                BatchStatus::PartiallyFailed
            };
            debug!(batch_index, ?status, failures = batch_failures, "batch settled");
            self.emit(batch_index, total_batches, records.len(), items_total, failed.len());

            // Reclamation is a blocking step: nothing new starts until the
            // pass finishes.
            let rss = self.deps.monitor.rss_mb();
            let over_limit = rss > self.config.memory_limit_mb;
            let on_cadence = (batch_index + 1) % self.deps.policy.cleanup_interval == 0;
            if over_limit || on_cadence {
                if over_limit {
                    warn!(
                        rss_mb = rss,
                        limit_mb = self.config.memory_limit_mb,
                        "memory pressure, reclaiming and reducing concurrency"
                    );
                    concurrency = (concurrency / 2).max(1);
                }
                match self.deps.monitor.cleanup().await {
                    Ok(evicted) => {
                        consecutive_cleanup_failures = 0;
                        debug!(batch_index, evicted, "reclamation pass done");
                    }
                    Err(e) => {
                        consecutive_cleanup_failures += 1;
                        warn!(error = %e, attempt = consecutive_cleanup_failures, "cleanup failed");
                        if consecutive_cleanup_failures >= 2 {
                            report.fatal =
                                Some(format!("aborted: cleanup failed twice consecutively: {e}"));
                            *report
                                .error_counts
                                .entry(HarvestError::Memory(rss).category().as_str().to_string())
                                .or_insert(0) += 1;
                            break 'batches;
                        }
                    }
                }
            }
        }

        // Everything not settled was abandoned by cancellation or abort.
        let settled: HashSet<&str> = records
            .iter()
            .map(|r| r.item_id.as_str())
            .chain(failed.iter().map(|f| f.id.as_str()))
            .collect();
        let unprocessed: Vec<String> = items
            .iter()
            .filter(|i| !settled.contains(i.id.as_str()))
            .map(|i| i.id.clone())
            .collect();

        report.items_done = records.len();
        report.failed_items = failed;
        report.final_memory_mb = self.deps.monitor.rss_mb();
        report.elapsed_ms = started.elapsed().as_millis() as u64;

        info!(
            done = report.items_done,
            failed = report.failed_items.len(),
            unprocessed = unprocessed.len(),
            elapsed_ms = report.elapsed_ms,
            "crawl finished"
        );

        CrawlOutcome {
            records,
            report,
            unprocessed,
        }
    }

    async fn process_item(
        &self,
        mut item: WorkItem,
        sem: Arc<Semaphore>,
        item_timeout: Duration,
    ) -> ItemOutcome {
        let _permit = match sem.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return ItemOutcome::Skipped,
        };
        if self.cancel.is_cancelled() {
            return ItemOutcome::Skipped;
        }

        item.status = ItemStatus::InFlight;
        loop {
            let fetched = match tokio::time::timeout(item_timeout, self.deps.fetcher.fetch(&item))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(HarvestError::Timeout(item_timeout)),
            };

            match fetched {
                Ok(fields) => {
                    let record = self.classify_and_score(&item, fields).await;
                    item.status = ItemStatus::Done;
                    return ItemOutcome::Done(record);
                }
                Err(e) => {
                    if e.is_retryable() && item.retry_count < self.deps.retry.max_retries {
                        item.retry_count += 1;
                        let delay = self.deps.retry.delay(item.retry_count);
                        debug!(
                            item = %item.id,
                            attempt = item.retry_count,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "retrying item"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    item.status = ItemStatus::Failed;
                    warn!(item = %item.id, category = ?e.category(), error = %e, "item failed");
                    return ItemOutcome::Failed(FailedItem {
                        id: item.id,
                        url: item.source.url().to_string(),
                        category: e.category(),
                        retries: item.retry_count,
                    });
                }
            }
        }
    }

    async fn classify_and_score(&self, item: &WorkItem, fields: DocumentFields) -> Record {
        let mut votes = Vec::new();
        for adapter in &self.deps.adapters {
            if let Some(vote) = classify_guarded(adapter.as_ref(), &fields.text, &self.config).await
            {
                if vote.confidence >= self.config.confidence_threshold {
                    votes.push(vote);
                } else {
                    debug!(
                        method = %vote.method,
                        confidence = vote.confidence,
                        "vote below confidence threshold, dropped"
                    );
                }
            }
        }

        let classification = ensemble::vote(&votes, &self.config);
        let checks = self
            .deps
            .validator
            .as_ref()
            .map(|v| v.check(&fields))
            .unwrap_or_default();
        let quality = quality::score(&fields, &classification, &checks, &self.deps.vocabulary);
        if quality.score < self.config.quality_threshold {
            debug!(item = %item.id, score = quality.score, "record below quality threshold");
        }

        Record {
            item_id: item.id.clone(),
            url: fields.url.clone(),
            title: fields.title,
            description: fields.description,
            tags: fields.tags,
            provider: fields.provider,
            technical_specs: fields.technical_specs,
            classification,
            quality,
            harvested_at: Utc::now(),
        }
    }

    fn emit(
        &self,
        batch_index: usize,
        total_batches: usize,
        items_done: usize,
        items_total: usize,
        errors_so_far: usize,
    ) {
        if let Some(tx) = &self.progress {
            // Never block the pipeline on a slow consumer.
            let _ = tx.try_send(ProgressEvent {
                batch_index,
                total_batches,
                items_done,
                items_total,
                errors_so_far,
            });
        }
    }
}
