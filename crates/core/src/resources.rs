//! Process resource sampling and cache reclamation. Read by the
//! scheduler; workers never mutate it.

use crate::error::HarvestError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Anything holding evictable state registers itself with the monitor.
pub trait Reclaim: Send + Sync {
    /// Evicts held entries, returning how many were dropped.
    fn reclaim(&self) -> usize;
}

#[async_trait::async_trait]
pub trait MemoryMonitor: Send + Sync {
    /// Current resident set size in MB. Zero when sampling is unsupported.
    fn rss_mb(&self) -> u64;

    /// Blocking cleanup pass: evict registered caches and yield so the
    /// allocator can return freed pages.
    async fn cleanup(&self) -> Result<usize, HarvestError>;
}

#[derive(Default)]
pub struct ResourceMonitor {
    caches: Mutex<Vec<Arc<dyn Reclaim>>>,
    peak_mb: AtomicU64,
}

impl ResourceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, cache: Arc<dyn Reclaim>) {
        if let Ok(mut caches) = self.caches.lock() {
            caches.push(cache);
        }
    }

    pub fn peak_mb(&self) -> u64 {
        self.peak_mb.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl MemoryMonitor for ResourceMonitor {
    fn rss_mb(&self) -> u64 {
        let rss = sample_rss_mb();
        self.peak_mb.fetch_max(rss, Ordering::Relaxed);
        rss
    }

    async fn cleanup(&self) -> Result<usize, HarvestError> {
        let caches: Vec<Arc<dyn Reclaim>> = match self.caches.lock() {
            Ok(caches) => caches.clone(),
            Err(_) => {
                return Err(HarvestError::Unknown(
                    "resource monitor cache registry poisoned".into(),
                ))
            }
        };
        let mut evicted = 0;
        for cache in caches {
            evicted += cache.reclaim();
        }
        tracing::debug!(evicted, "cleanup pass complete");
        // Let queued tasks run before the next batch starts.
        tokio::task::yield_now().await;
        Ok(evicted)
    }
}

#[cfg(target_os = "linux")]
fn sample_rss_mb() -> u64 {
    // statm reports pages; the kernel page size is 4 KiB on every target
    // this runs on.
    const PAGE_BYTES: u64 = 4096;
    let statm = match std::fs::read_to_string("/proc/self/statm") {
        Ok(s) => s,
        Err(_) => return 0,
    };
    statm
        .split_whitespace()
        .nth(1)
        .and_then(|pages| pages.parse::<u64>().ok())
        .map(|pages| pages * PAGE_BYTES / (1024 * 1024))
        .unwrap_or(0)
}

#[cfg(not(target_os = "linux"))]
fn sample_rss_mb() -> u64 {
    0
}
