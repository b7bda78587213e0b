use harvester_core::adapters::KeywordAdapter;
use harvester_core::config::WeightConfig;
use harvester_core::error::{ErrorCategory, HarvestError};
use harvester_core::fetch::PageFetcher;
use harvester_core::keywords::KeywordTable;
use harvester_core::models::{DocumentFields, WorkItem};
use harvester_core::resources::MemoryMonitor;
use harvester_core::scheduler::{Harvester, PipelineDeps, RetryPolicy, SizingPolicy};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Fetcher scripted by URL substring: `netfail` always errors with a
/// retryable network error, `badparse` with a parse failure; everything
/// else parses. Counts attempts per item.
struct ScriptedFetcher {
    attempts: Mutex<HashMap<String, u32>>,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl ScriptedFetcher {
    fn new() -> Self {
        Self {
            attempts: Mutex::new(HashMap::new()),
            cancel_after: None,
        }
    }

    fn cancelling_after(n: usize, token: CancellationToken) -> Self {
        Self {
            attempts: Mutex::new(HashMap::new()),
            cancel_after: Some((n, token)),
        }
    }

    fn attempts_for(&self, id: &str) -> u32 {
        self.attempts.lock().unwrap().get(id).copied().unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, item: &WorkItem) -> Result<DocumentFields, HarvestError> {
        let total: u32 = {
            let mut attempts = self.attempts.lock().unwrap();
            *attempts.entry(item.id.clone()).or_insert(0) += 1;
            attempts.values().sum()
        };
        if let Some((after, token)) = &self.cancel_after {
            if total as usize >= *after {
                token.cancel();
            }
        }

        let url = item.url();
        if url.contains("netfail") {
            return Err(HarvestError::Network("connection refused".into()));
        }
        if url.contains("badparse") {
            return Err(HarvestError::ParseFailure("no title or text".into()));
        }
        Ok(DocumentFields {
            url: url.to_string(),
            title: "MODIS satellite imagery".to_string(),
            text: "MODIS satellite imagery swath archive".to_string(),
            ..Default::default()
        })
    }
}

struct StubMonitor {
    rss: u64,
    fail_cleanup: bool,
    cleanups: AtomicUsize,
}

impl StubMonitor {
    fn new(rss: u64, fail_cleanup: bool) -> Self {
        Self {
            rss,
            fail_cleanup,
            cleanups: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl MemoryMonitor for StubMonitor {
    fn rss_mb(&self) -> u64 {
        self.rss
    }

    async fn cleanup(&self) -> Result<usize, HarvestError> {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        if self.fail_cleanup {
            Err(HarvestError::Memory(self.rss))
        } else {
            Ok(0)
        }
    }
}

fn deps(
    fetcher: Arc<ScriptedFetcher>,
    monitor: Arc<StubMonitor>,
    policy: SizingPolicy,
    retry: RetryPolicy,
) -> PipelineDeps {
    let table = Arc::new(KeywordTable::builtin());
    PipelineDeps {
        fetcher,
        adapters: vec![Arc::new(KeywordAdapter::new(
            table.clone(),
            Duration::from_secs(3),
        ))],
        validator: None,
        monitor,
        vocabulary: table,
        policy,
        retry,
    }
}

fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        base_delay: Duration::from_millis(1),
    }
}

#[tokio::test]
async fn failing_item_is_retried_exactly_max_retries_times() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let monitor = Arc::new(StubMonitor::new(10, false));
    let harvester = Harvester::new(
        deps(
            fetcher.clone(),
            monitor,
            SizingPolicy::default(),
            fast_retry(3),
        ),
        WeightConfig::default(),
    );

    let item = WorkItem::from_url("https://catalog.example/netfail/1");
    let id = item.id.clone();
    let outcome = harvester.run(vec![item]).await;

    // One initial attempt plus exactly three retries.
    assert_eq!(fetcher.attempts_for(&id), 4);
    assert_eq!(outcome.records.len(), 0);
    assert_eq!(outcome.report.failed_items.len(), 1);
    let failure = &outcome.report.failed_items[0];
    assert_eq!(failure.id, id);
    assert_eq!(failure.retries, 3);
    assert_eq!(failure.category, ErrorCategory::Network);
    assert_eq!(outcome.report.error_counts["network"], 1);
}

#[tokio::test]
async fn parse_failure_is_never_retried() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let monitor = Arc::new(StubMonitor::new(10, false));
    let harvester = Harvester::new(
        deps(
            fetcher.clone(),
            monitor,
            SizingPolicy::default(),
            fast_retry(3),
        ),
        WeightConfig::default(),
    );

    let item = WorkItem::from_url("https://catalog.example/badparse/1");
    let id = item.id.clone();
    let outcome = harvester.run(vec![item]).await;

    assert_eq!(fetcher.attempts_for(&id), 1);
    assert_eq!(
        outcome.report.failed_items[0].category,
        ErrorCategory::ParseFailure
    );
}

#[tokio::test]
async fn full_run_settles_every_item_exactly_once() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let monitor = Arc::new(StubMonitor::new(10, false));
    let harvester = Harvester::new(
        deps(
            fetcher.clone(),
            monitor,
            SizingPolicy::default(),
            fast_retry(1),
        ),
        WeightConfig::default(),
    );

    let mut items = Vec::new();
    for i in 0..17 {
        items.push(WorkItem::from_url(format!("https://catalog.example/ok/{i}")));
    }
    for i in 0..5 {
        items.push(WorkItem::from_url(format!(
            "https://catalog.example/netfail/{i}"
        )));
    }
    let expected: HashSet<String> = items.iter().map(|i| i.id.clone()).collect();

    let outcome = harvester.run(items).await;

    assert_eq!(outcome.records.len(), 17);
    assert_eq!(outcome.report.failed_items.len(), 5);
    assert!(outcome.unprocessed.is_empty());

    let settled: Vec<&str> = outcome
        .records
        .iter()
        .map(|r| r.item_id.as_str())
        .chain(outcome.report.failed_items.iter().map(|f| f.id.as_str()))
        .collect();
    let unique: HashSet<&str> = settled.iter().copied().collect();
    assert_eq!(settled.len(), unique.len());
    assert_eq!(
        unique,
        expected.iter().map(String::as_str).collect::<HashSet<_>>()
    );
}

#[tokio::test]
async fn cleanup_runs_on_the_configured_cadence() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let monitor = Arc::new(StubMonitor::new(10, false));
    let policy = SizingPolicy {
        low_batch_size: 2,
        cleanup_interval: 5,
        ..SizingPolicy::default()
    };
    let harvester = Harvester::new(
        deps(fetcher, monitor.clone(), policy, fast_retry(1)),
        WeightConfig::default(),
    );

    let items: Vec<WorkItem> = (0..20)
        .map(|i| WorkItem::from_url(format!("https://catalog.example/ok/{i}")))
        .collect();
    let outcome = harvester.run(items).await;

    // 20 items in batches of 2: cleanups after batches 5 and 10.
    assert_eq!(outcome.records.len(), 20);
    assert_eq!(monitor.cleanups.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn cancellation_returns_partial_results_and_unprocessed_ids() {
    let token = CancellationToken::new();
    let fetcher = Arc::new(ScriptedFetcher::cancelling_after(4, token.clone()));
    let monitor = Arc::new(StubMonitor::new(10, false));
    let policy = SizingPolicy {
        low_batch_size: 2,
        low_concurrency: 1,
        ..SizingPolicy::default()
    };
    let harvester = Harvester::new(
        deps(fetcher, monitor, policy, fast_retry(1)),
        WeightConfig::default(),
    )
    .with_cancellation(token);

    let items: Vec<WorkItem> = (0..30)
        .map(|i| WorkItem::from_url(format!("https://catalog.example/ok/{i}")))
        .collect();
    let total = items.len();
    let outcome = harvester.run(items).await;

    assert!(!outcome.unprocessed.is_empty());
    assert!(outcome.records.len() >= 4);
    assert_eq!(
        outcome.records.len() + outcome.report.failed_items.len() + outcome.unprocessed.len(),
        total
    );
}

#[tokio::test]
async fn two_consecutive_cleanup_failures_abort_the_run() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    // RSS far above the default limit forces a cleanup after every batch.
    let monitor = Arc::new(StubMonitor::new(4096, true));
    let policy = SizingPolicy {
        low_batch_size: 2,
        ..SizingPolicy::default()
    };
    let harvester = Harvester::new(
        deps(fetcher, monitor.clone(), policy, fast_retry(1)),
        WeightConfig::default(),
    );

    let items: Vec<WorkItem> = (0..12)
        .map(|i| WorkItem::from_url(format!("https://catalog.example/ok/{i}")))
        .collect();
    let outcome = harvester.run(items).await;

    assert!(outcome.report.fatal.is_some());
    assert_eq!(monitor.cleanups.load(Ordering::SeqCst), 2);
    // Batches 1 and 2 ran; the remaining four batches were abandoned.
    assert_eq!(outcome.records.len(), 4);
    assert_eq!(outcome.unprocessed.len(), 8);
}
