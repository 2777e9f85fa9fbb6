use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use std::sync::Arc;
use tokio::{signal, sync::watch, time::interval};

use crate::alarms::{self, AlarmStore, Alarms, MemoryStore};
use crate::config::AppConfig;
use crate::filter::{self, Query};
use crate::metrics::{self, Metrics};
use crate::record::Record;
use crate::stats::{self, Statistics, Summary};
use crate::store::{RecordStore, RefreshOutcome};

/// Everything the dashboard page renders for one query.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    #[serde(rename = "resumo")]
    pub summary: Summary,
    #[serde(rename = "stats")]
    pub statistics: Statistics,
    #[serde(rename = "regioes")]
    pub regions: Vec<String>,
    #[serde(rename = "registros")]
    pub records: Vec<Record>,
    pub matched: usize,
}

pub struct Service {
    config: AppConfig,
    store: Arc<RecordStore>,
    alarms: Arc<Alarms>,
    metrics: Arc<Metrics>,
}

impl Service {
    /// Builds the service with an in-process alarm store seeded from the config.
    pub fn new(config: AppConfig) -> Result<Self> {
        let store = Arc::new(MemoryStore::new());
        for seed in &config.alarms {
            store
                .add_alarm(seed.car_name.trim(), &seed.plate.trim().to_uppercase())
                .with_context(|| format!("seed alarm for {}", seed.plate))?;
        }
        Ok(Self::with_alarm_store(config, store))
    }

    pub fn with_alarm_store(config: AppConfig, alarm_store: Arc<dyn AlarmStore>) -> Self {
        let store = Arc::new(RecordStore::new(&config.source_path));
        let alarms = Arc::new(Alarms::new(alarm_store, config.alarm_ttl()));
        Self {
            config,
            store,
            alarms,
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn alarms(&self) -> &Alarms {
        &self.alarms
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn refresh(&self) -> Result<RefreshOutcome> {
        refresh_with_metrics(&self.store, &self.metrics)
    }

    pub fn dashboard(&self, query: &Query) -> Result<DashboardView> {
        self.dashboard_at(query, Local::now().naive_local())
    }

    /// Refreshes the feed, then filters and aggregates it relative to `now`.
    pub fn dashboard_at(&self, query: &Query, now: NaiveDateTime) -> Result<DashboardView> {
        self.refresh()?;
        let snapshot = self.store.current_snapshot();
        let matched = filter::apply(&snapshot, query);
        Ok(DashboardView {
            summary: stats::summarize(&matched),
            statistics: stats::statistics_at(&matched, now),
            regions: self.store.regions(),
            records: matched
                .iter()
                .take(self.config.page_size)
                .map(|r| (*r).clone())
                .collect(),
            matched: matched.len(),
        })
    }

    /// Newest records of the whole feed, bounded by `api_page_size`.
    pub fn recent_records(&self) -> Result<Vec<Record>> {
        self.refresh()?;
        let snapshot = self.store.current_snapshot();
        Ok(snapshot
            .iter()
            .take(self.config.api_page_size)
            .cloned()
            .collect())
    }

    /// Keeps the feed fresh and reports alarm sightings until ctrl-c.
    pub async fn run(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let service_name = Arc::new(self.config.service_name.clone());

        let health_handle = tokio::spawn(metrics::monitor_health(
            service_name.clone(),
            self.metrics.clone(),
            shutdown_rx.clone(),
            self.config.heartbeat_interval(),
        ));

        let worker_future = {
            let service_name = service_name.clone();
            let store = self.store.clone();
            let alarms = self.alarms.clone();
            let metrics = self.metrics.clone();
            let every = self.config.refresh_interval();
            let mut shutdown_rx = shutdown_rx.clone();
            async move {
                tracing::info!(
                    service = %service_name,
                    source = %store.source().display(),
                    interval_secs = every.as_secs(),
                    "feed watcher starting"
                );
                let mut ticker = interval(every);
                let mut newest_seen: Option<i64> = None;
                loop {
                    tokio::select! {
                        _ = shutdown_rx.changed() => {
                            tracing::info!(service = %service_name, "shutdown requested");
                            break;
                        }
                        _ = ticker.tick() => {
                            let refresh_store = store.clone();
                            let refresh_metrics = metrics.clone();
                            let outcome = tokio::task::spawn_blocking(move || {
                                refresh_with_metrics(&refresh_store, &refresh_metrics)
                            })
                            .await
                            .context("refresh task panicked")?;
                            match outcome {
                                Ok(RefreshOutcome::Reloaded { .. }) => {
                                    newest_seen = report_alarm_hits(&store, &alarms, newest_seen);
                                }
                                Ok(_) => {}
                                Err(err) => {
                                    tracing::error!(
                                        service = %service_name,
                                        error = %format!("{err:#}"),
                                        "feed refresh failed"
                                    );
                                }
                            }
                        }
                    }
                }
                Ok::<(), anyhow::Error>(())
            }
        };

        let shutdown_signal = {
            let service_name = service_name.clone();
            let shutdown_tx = shutdown_tx.clone();
            async move {
                signal::ctrl_c().await.ok();
                tracing::info!(service = %service_name, "ctrl-c received, requesting shutdown");
                shutdown_tx.send(()).ok();
            }
        };

        let worker_result = tokio::select! {
            res = worker_future => res,
            _ = shutdown_signal => Ok(()),
        };

        shutdown_tx.send(()).ok();
        health_handle.await??;

        worker_result
    }
}

fn refresh_with_metrics(store: &RecordStore, metrics: &Metrics) -> Result<RefreshOutcome> {
    match store.refresh() {
        Ok(outcome) => {
            metrics.record_refresh(&outcome);
            Ok(outcome)
        }
        Err(err) => {
            metrics.record_refresh_error();
            Err(err)
        }
    }
}

/// Warns about alarmed plates among records newer than `newest_seen` and
/// returns the new high-water mark. The first load only sets the mark.
fn report_alarm_hits(store: &RecordStore, alarms: &Alarms, newest_seen: Option<i64>) -> Option<i64> {
    let snapshot = store.current_snapshot();
    let newest = snapshot.first().map(|r| r.timestamp);
    let Some(seen) = newest_seen else {
        return newest;
    };
    let fresh_len = snapshot.iter().take_while(|r| r.timestamp > seen).count();
    if fresh_len == 0 {
        return newest_seen.max(newest);
    }
    match alarms.list() {
        Ok(list) => {
            for hit in alarms::find_hits(&list, &snapshot[..fresh_len]) {
                tracing::warn!(
                    plate = %hit.record.plate,
                    car_name = %hit.alarm.car_name,
                    datetime = %hit.record.datetime,
                    region = %hit.record.region,
                    "alarmed plate detected"
                );
            }
        }
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "alarm list unavailable");
        }
    }
    newest_seen.max(newest)
}
