//! Shared application state used across the API and the scheduler.
//!
//! This mirrors the teacher's single-`SharedState` pattern: one struct built
//! once at startup, cloned cheaply (every field is an `Arc` or already
//! internally shared), and handed to both the Axum router and the
//! background scheduler so neither has to re-wire its own services.

use std::sync::Arc;

use anyhow::Result;

use crate::clients::anilist::CatalogClient;
use crate::clients::qbittorrent::{QBitClient, QBitConfig};
use crate::config::Config;
use crate::db::Store;
use crate::services::{JobRunner, Notifier, Pipeline, Reconciler, Resolver, Scheduler};

#[derive(Clone)]
pub struct SharedState {
    pub config: Config,
    pub store: Store,
    pub qbit: QBitClient,
    pub catalog: CatalogClient,
    pub pipeline: Arc<Pipeline>,
    pub reconciler: Arc<Reconciler>,
    pub resolver: Arc<Resolver>,
    pub notifier: Arc<Notifier>,
    pub job_runner: Arc<JobRunner>,
    pub qbit_category: String,
    pub qbit_save_root: String,
}

impl SharedState {
    pub async fn new(config: Config) -> Result<Self> {
        let store = Store::new(&config.general.database_url).await?;

        let qbit = QBitClient::new(QBitConfig {
            base_url: config.qbittorrent.base_url(),
            username: config.qbittorrent.username.clone(),
            password: config.qbittorrent.password.clone(),
        });
        let catalog = CatalogClient::new();
        let notifier = Arc::new(Notifier::new(config.notifier.clone()));
        let job_runner = Arc::new(JobRunner::new());

        let pipeline = Arc::new(Pipeline::new(
            store.clone(),
            qbit.clone(),
            config.pipeline.clone(),
            config.library.clone(),
            config.qbittorrent.clone(),
        ));
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            qbit.clone(),
            (*notifier).clone(),
            config.library.incoming_root.clone(),
            config.library.library_root.clone(),
        ));
        let resolver = Arc::new(Resolver::new(store.clone(), catalog.clone()));

        Ok(Self {
            qbit_category: config.qbittorrent.category.clone(),
            qbit_save_root: config.qbittorrent.save_root.clone(),
            config,
            store,
            qbit,
            catalog,
            pipeline,
            reconciler,
            resolver,
            notifier,
            job_runner,
        })
    }

    #[must_use]
    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(self.clone(), self.config.scheduler.clone())
    }
}
