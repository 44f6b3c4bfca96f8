//! Background job schedule: per-show release polling staggered on startup,
//! plus fixed-cadence reconcile/maintenance/metadata-sync/recovery passes.
//!
//! Grounded on the original resolver's `scheduler` module for the job set
//! and cadence, and on the teacher's interval-based scheduler for the Rust
//! idiom: an `Arc<RwLock<bool>>` running flag checked at each tick, and
//! structured `job_started`/`job_failed`/`job_finished` tracing events.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::sync::RwLock;
use tokio::time::{Duration, interval};
use tracing::{error, info};

use crate::config::SchedulerConfig;
use crate::state::SharedState;

pub struct Scheduler {
    state: SharedState,
    config: SchedulerConfig,
    running: Arc<RwLock<bool>>,
}

impl Scheduler {
    #[must_use]
    pub fn new(state: SharedState, config: SchedulerConfig) -> Self {
        Self {
            state,
            config,
            running: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            info!("scheduler is disabled in config");
            return Ok(());
        }

        *self.running.write().await = true;
        self.spawn_staggered_show_polls();

        let mut poll_interval = interval(Duration::from_secs(
            u64::from(self.config.per_show_poll_minutes) * 60,
        ));
        let mut reconcile_interval = interval(Duration::from_secs(
            u64::from(self.config.reconcile_minutes) * 60,
        ));
        let mut maintenance_interval = interval(Duration::from_secs(
            u64::from(self.config.torrent_maintenance_minutes) * 60,
        ));
        let mut catalog_sync_interval = interval(Duration::from_secs(
            u64::from(self.config.catalog_sync_hours) * 3600,
        ));
        let mut recovery_interval = interval(Duration::from_secs(
            u64::from(self.config.recovery_minutes) * 60,
        ));

        info!(
            per_show_poll_minutes = self.config.per_show_poll_minutes,
            reconcile_minutes = self.config.reconcile_minutes,
            torrent_maintenance_minutes = self.config.torrent_maintenance_minutes,
            catalog_sync_hours = self.config.catalog_sync_hours,
            recovery_minutes = self.config.recovery_minutes,
            "scheduler running"
        );

        loop {
            tokio::select! {
                _ = poll_interval.tick() => {
                    if !*self.running.read().await { break; }
                    self.run_job("poll_all_shows", || self.state.pipeline.poll_and_enqueue(None)).await;
                }
                _ = reconcile_interval.tick() => {
                    if !*self.running.read().await { break; }
                    self.run_job("reconcile", || self.state.reconciler.run()).await;
                }
                _ = maintenance_interval.tick() => {
                    if !*self.running.read().await { break; }
                    self.run_torrent_maintenance().await;
                }
                _ = catalog_sync_interval.tick() => {
                    if !*self.running.read().await { break; }
                    self.run_catalog_sync().await;
                }
                _ = recovery_interval.tick() => {
                    if !*self.running.read().await { break; }
                    self.run_recovery().await;
                }
            }
        }

        Ok(())
    }

    /// Kicks off one staggered poll per tracked show shortly after startup,
    /// so a large library doesn't hammer feed sources all at once.
    fn spawn_staggered_show_polls(&self) {
        let state = self.state.clone();
        let stagger = u64::from(self.config.per_show_stagger_seconds);
        tokio::spawn(async move {
            let Ok(shows) = state.store.list_shows().await else {
                return;
            };
            for (i, show) in shows.into_iter().enumerate() {
                tokio::time::sleep(Duration::from_secs(stagger * i as u64)).await;
                let start = Instant::now();
                info!(job = "poll_show", show_id = show.id, "job_started");
                if let Err(e) = state.pipeline.poll_and_enqueue(Some(&[show.id])).await {
                    error!(job = "poll_show", show_id = show.id, error = %e, "job_failed");
                }
                info!(
                    job = "poll_show",
                    show_id = show.id,
                    duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "job_finished"
                );
            }
        });
    }

    async fn run_job<F, Fut, T, E>(&self, name: &str, f: F)
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let start = Instant::now();
        info!(job = name, "job_started");
        if let Err(e) = f().await {
            error!(job = name, error = %e, "job_failed");
        }
        info!(
            job = name,
            duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "job_finished"
        );
    }

    async fn run_torrent_maintenance(&self) {
        let start = Instant::now();
        info!(job = "torrent_maintenance", "job_started");
        match crate::services::torrent_maintenance::cleanup_stalled(
            &self.state.qbit,
            &self.state.store,
            &self.state.qbit_category,
            &self.state.qbit_save_root,
            20,
        )
        .await
        {
            Ok(report) if report.removed_torrents > 0 => {
                self.state
                    .notifier
                    .notify(&format!(
                        "Torrent maintenance removed {} stalled torrents",
                        report.removed_torrents
                    ))
                    .await;
            }
            Ok(_) => {}
            Err(e) => error!(job = "torrent_maintenance", error = %e, "job_failed"),
        }
        info!(
            job = "torrent_maintenance",
            duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "job_finished"
        );
    }

    async fn run_catalog_sync(&self) {
        let start = Instant::now();
        info!(job = "catalog_sync", "job_started");
        match self.state.resolver.sync_all().await {
            Ok(outcome) => {
                crate::services::resolver::log_sync_summary(&outcome);
                if outcome.updated > 0 {
                    self.state
                        .notifier
                        .notify(&format!("Catalog sync updated {} shows", outcome.updated))
                        .await;
                }
            }
            Err(e) => error!(job = "catalog_sync", error = %e, "job_failed"),
        }
        info!(
            job = "catalog_sync",
            duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "job_finished"
        );
    }

    /// Runs sync + reconcile + a full poll in sequence: the same combination
    /// the original scheduler used to recover from a missed cycle.
    async fn run_recovery(&self) {
        let start = Instant::now();
        info!(job = "recovery", "job_started");

        let sync_result = self.state.resolver.sync_all().await;
        let reconcile_result = self.state.reconciler.run().await;
        let poll_result = self.state.pipeline.poll_and_enqueue(None).await;

        if let Err(e) = &sync_result {
            error!(job = "recovery", stage = "sync", error = %e, "job_failed");
        }
        if let Err(e) = &reconcile_result {
            error!(job = "recovery", stage = "reconcile", error = %e, "job_failed");
        }
        if let Err(e) = &poll_result {
            error!(job = "recovery", stage = "poll", error = %e, "job_failed");
        }

        let invalid = reconcile_result.as_ref().map(|r| r.invalid).unwrap_or(0);
        let added = poll_result.as_ref().map(|r| r.added).unwrap_or(0);
        if invalid > 0 || added > 0 {
            self.state
                .notifier
                .notify(&format!(
                    "Recovery pass: {invalid} invalid files, {added} releases added"
                ))
                .await;
        }

        info!(
            job = "recovery",
            duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "job_finished"
        );
    }

    pub async fn stop(&self) {
        info!("stopping scheduler");
        *self.running.write().await = false;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}
