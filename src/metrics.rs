use anyhow::Result;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::interval;

use crate::store::RefreshOutcome;

/// Counters describing how the feed refresh loop is behaving.
pub struct Metrics {
    reloads: AtomicU64,
    unchanged: AtomicU64,
    missing: AtomicU64,
    dropped_rows: AtomicU64,
    refresh_errors: AtomicU64,
    records: AtomicU64,
    last_reload: Mutex<Option<Instant>>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            reloads: AtomicU64::new(0),
            unchanged: AtomicU64::new(0),
            missing: AtomicU64::new(0),
            dropped_rows: AtomicU64::new(0),
            refresh_errors: AtomicU64::new(0),
            records: AtomicU64::new(0),
            last_reload: Mutex::new(None),
        }
    }

    pub fn record_refresh(&self, outcome: &RefreshOutcome) {
        match outcome {
            RefreshOutcome::Missing => {
                self.missing.fetch_add(1, Ordering::Relaxed);
                self.records.store(0, Ordering::Relaxed);
            }
            RefreshOutcome::Unchanged => {
                self.unchanged.fetch_add(1, Ordering::Relaxed);
            }
            RefreshOutcome::Reloaded {
                kept,
                dropped_plate,
                dropped_timestamp,
            } => {
                self.reloads.fetch_add(1, Ordering::Relaxed);
                self.records.store(*kept as u64, Ordering::Relaxed);
                self.dropped_rows
                    .fetch_add((dropped_plate + dropped_timestamp) as u64, Ordering::Relaxed);
                if let Ok(mut guard) = self.last_reload.lock() {
                    *guard = Some(Instant::now());
                }
            }
        }
    }

    pub fn record_refresh_error(&self) {
        self.refresh_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let last_reload_age = self.last_reload.lock().ok().and_then(|guard| {
            guard.map(|instant| Instant::now().saturating_duration_since(instant))
        });
        HealthSnapshot {
            reloads: self.reloads.load(Ordering::Relaxed),
            unchanged: self.unchanged.load(Ordering::Relaxed),
            missing: self.missing.load(Ordering::Relaxed),
            dropped_rows: self.dropped_rows.load(Ordering::Relaxed),
            refresh_errors: self.refresh_errors.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
            last_reload_age,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HealthSnapshot {
    pub reloads: u64,
    pub unchanged: u64,
    pub missing: u64,
    pub dropped_rows: u64,
    pub refresh_errors: u64,
    pub records: u64,
    pub last_reload_age: Option<Duration>,
}

pub async fn monitor_health(
    service_name: Arc<String>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<()>,
    every: Duration,
) -> Result<()> {
    let mut ticker = interval(every);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                let snapshot = metrics.snapshot();
                tracing::info!(
                    service = %service_name,
                    records = snapshot.records,
                    reloads = snapshot.reloads,
                    unchanged = snapshot.unchanged,
                    missing = snapshot.missing,
                    dropped_rows = snapshot.dropped_rows,
                    refresh_errors = snapshot.refresh_errors,
                    last_reload_secs = ?snapshot.last_reload_age.map(|age| age.as_secs()),
                    "health heartbeat"
                );
            }
        }
    }
    Ok(())
}
