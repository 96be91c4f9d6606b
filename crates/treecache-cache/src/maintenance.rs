//! Expiry sweeps and the background task that runs them.

use std::path::PathBuf;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use crate::key::CacheKey;
use crate::store::TreeCache;

/// What one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub memory_removed: usize,
    pub disk_removed: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.memory_removed + self.disk_removed
    }
}

impl TreeCache {
    /// Drop memory entries older than the memory TTL or whose root is gone,
    /// and disk records older than the disk TTL.
    ///
    /// Root checks happen outside the memory lock. An entry replaced by a
    /// newer scan in the meantime is left alone.
    pub fn sweep(&self) -> SweepReport {
        let now = Utc::now();
        let memory_ttl = self.config().memory_ttl;

        let candidates: Vec<(CacheKey, DateTime<Utc>, PathBuf)> = self
            .memory()
            .entries
            .values()
            .map(|entry| {
                let meta = entry.metadata();
                (meta.key.clone(), meta.created_at, meta.root.clone())
            })
            .collect();

        let mut report = SweepReport::default();
        for (key, created_at, root) in candidates {
            let age = (now - created_at).to_std().unwrap_or_default();
            if age <= memory_ttl && root.exists() {
                continue;
            }
            let mut memory = self.memory();
            let unchanged = memory
                .entries
                .get(&key)
                .is_some_and(|current| current.metadata().created_at == created_at);
            if unchanged {
                memory.entries.remove(&key);
                report.memory_removed += 1;
            }
        }

        match self.disk.sweep_expired(self.config().disk_ttl) {
            Ok(removed) => report.disk_removed = removed,
            Err(err) => {
                tracing::warn!(target: "treecache::maintenance", error = %err, "disk sweep incomplete");
            }
        }

        if report.total() > 0 {
            tracing::info!(
                target: "treecache::maintenance",
                memory_removed = report.memory_removed,
                disk_removed = report.disk_removed,
                "sweep removed expired entries"
            );
        } else {
            tracing::debug!(target: "treecache::maintenance", "sweep found nothing to remove");
        }
        report
    }
}

/// Handle to the periodic sweep task.
///
/// The task holds only a weak reference to the cache and ends on its own
/// once the cache is dropped. Dropping the handle cancels the task without
/// waiting for it; use [`MaintenanceHandle::stop`] to wait.
#[derive(Debug)]
pub struct MaintenanceHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl MaintenanceHandle {
    /// Spawn the sweep loop on the current tokio runtime.
    ///
    /// The first sweep runs one `sweep_interval` after start.
    pub fn start(cache: &Arc<TreeCache>) -> Self {
        let cancel = CancellationToken::new();
        let period = cache.config().sweep_interval;
        let task = tokio::spawn(run(Arc::downgrade(cache), period, cancel.clone()));
        tracing::debug!(target: "treecache::maintenance", ?period, "maintenance started");
        Self {
            cancel,
            task: Some(task),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Cancel the loop and wait for it, including any sweep in progress.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                tracing::warn!(target: "treecache::maintenance", error = %err, "maintenance task failed");
            }
        }
        tracing::debug!(target: "treecache::maintenance", "maintenance stopped");
    }
}

impl Drop for MaintenanceHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(cache: Weak<TreeCache>, period: std::time::Duration, cancel: CancellationToken) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(cache) = cache.upgrade() else {
            break;
        };
        match tokio::task::spawn_blocking(move || cache.sweep()).await {
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(target: "treecache::maintenance", error = %err, "sweep panicked");
            }
        }
    }
}
