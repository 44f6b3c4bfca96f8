//! Thin CLI wrapping the same service layer the API and scheduler use, for
//! manual intake, one-shot job runs, and printing status to a terminal.

use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::info;

use crate::config::Config;
use crate::services::resolver::log_sync_summary;
use crate::state::SharedState;

#[derive(Parser)]
#[command(name = "curatr")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run as a background daemon with the scheduler and web API
    #[command(alias = "-d")]
    Daemon,

    /// Run one sync + poll + reconcile pass and exit
    #[command(alias = "-c")]
    Check,

    /// Bulk-upsert shows, aliases and profiles from a JSON file
    Intake {
        /// Path to a JSON file shaped like the `/intake` request body
        path: String,
    },

    /// Print tracked shows and their download status
    Status {
        /// Optional show id to filter to
        show_id: Option<i32>,
    },

    /// Run the reconciler once
    Reconcile,

    /// Run the catalog metadata sync once
    SyncMetadata,

    /// Run torrent maintenance once
    QbitMaintenance,

    /// Start only the web API, without the scheduler
    Web,
}

#[derive(Debug, Deserialize)]
struct IntakeFile {
    shows: Vec<IntakeShow>,
}

#[derive(Debug, Deserialize)]
struct IntakeShow {
    title_input: String,
    title_canonical: String,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    preferred_subgroups: Vec<String>,
    min_score: Option<i32>,
}

pub async fn cmd_intake(config: &Config, path: &str) -> anyhow::Result<()> {
    let shared = SharedState::new(config.clone()).await?;
    let raw = tokio::fs::read_to_string(path).await?;
    let file: IntakeFile = serde_json::from_str(&raw)?;

    for entry in file.shows {
        let show = shared
            .store
            .upsert_show(&entry.title_input, &entry.title_canonical)
            .await?;
        for alias in &entry.aliases {
            if !alias.trim().is_empty() {
                shared.store.add_show_alias(show.id, alias).await?;
            }
        }
        if !entry.preferred_subgroups.is_empty() || entry.min_score.is_some() {
            let profile = shared.store.show_profile(show.id).await?;
            let min_score = entry.min_score.unwrap_or(profile.min_score);
            let subgroups = if entry.preferred_subgroups.is_empty() {
                profile.subgroups()
            } else {
                entry.preferred_subgroups
            };
            shared
                .store
                .set_show_profile(show.id, &subgroups, min_score)
                .await?;
        }
        println!("upserted show #{} ({})", show.id, show.title_canonical);
    }
    Ok(())
}

pub async fn cmd_status(config: &Config, show_id: Option<i32>) -> anyhow::Result<()> {
    let shared = SharedState::new(config.clone()).await?;
    let shows = match show_id {
        Some(id) => shared.store.get_show(id).await?.into_iter().collect(),
        None => shared.store.list_shows().await?,
    };

    for show in shows {
        let downloaded = shared.store.downloaded_episode_count(show.id).await?;
        let latest = shared.store.latest_downloaded_episode(show.id).await?;
        let complete = show
            .total_eps
            .is_some_and(|total| downloaded >= i64::from(total));
        println!(
            "#{:<4} {:<40} {:>4}/{:<4} latest={:<4} {}",
            show.id,
            show.title_canonical,
            downloaded,
            show.total_eps.map_or_else(|| "?".to_string(), |t| t.to_string()),
            latest.map_or_else(|| "-".to_string(), |e| e.to_string()),
            if complete { "complete" } else { show.status.as_str() },
        );
    }
    Ok(())
}

pub async fn cmd_reconcile(config: &Config) -> anyhow::Result<()> {
    let shared = SharedState::new(config.clone()).await?;
    let report = shared.reconciler.run().await?;
    info!(
        scanned = report.scanned,
        moved = report.moved,
        extras = report.extras,
        needs_review = report.needs_review,
        invalid = report.invalid,
        "reconcile finished"
    );
    Ok(())
}

pub async fn cmd_sync_metadata(config: &Config) -> anyhow::Result<()> {
    let shared = SharedState::new(config.clone()).await?;
    let outcome = shared.resolver.sync_all().await?;
    log_sync_summary(&outcome);
    Ok(())
}

pub async fn cmd_qbit_maintenance(config: &Config) -> anyhow::Result<()> {
    let shared = SharedState::new(config.clone()).await?;
    let report = crate::services::torrent_maintenance::cleanup_stalled(
        &shared.qbit,
        &shared.store,
        &shared.qbit_category,
        &shared.qbit_save_root,
        20,
    )
    .await?;
    info!(
        removed_torrents = report.removed_torrents,
        removed_release_rows = report.removed_release_rows,
        "torrent maintenance finished"
    );
    Ok(())
}
