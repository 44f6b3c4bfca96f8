//! Periodic qBittorrent + release-table cleanup: removes torrents that are
//! stuck, orphaned by a completed show, or superseded, then prunes the
//! `releases` rows that no longer correspond to anything active.
//!
//! Grounded on the original resolver's `qbit_maintenance` module.

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use crate::clients::qbittorrent::{QBitClient, TorrentInfo, TorrentState, extract_info_hash};
use crate::db::Store;

#[derive(Debug, Default)]
pub struct MaintenanceReport {
    pub total: usize,
    pub removed_torrents: usize,
    pub removed_release_rows: usize,
    pub stale_release_rows: usize,
    pub downloaded_release_rows: usize,
    pub max_age_minutes: u32,
}

fn normalize_path(p: &str) -> String {
    p.to_lowercase().trim_end_matches(['/', '\\']).to_string()
}

fn age_minutes(torrent: &TorrentInfo) -> f64 {
    if torrent.added_on <= 0 {
        return 0.0;
    }
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(torrent.added_on);
    ((now - torrent.added_on).max(0) as f64) / 60.0
}

fn should_remove(
    torrent: &TorrentInfo,
    complete_show_save_paths: &HashSet<String>,
    max_age_minutes: u32,
) -> bool {
    let save_path_norm = normalize_path(&torrent.save_path);

    let under_complete_show = matches!(
        torrent.state,
        TorrentState::QueuedDL
            | TorrentState::Downloading
            | TorrentState::StalledDL
            | TorrentState::MetaDL
            | TorrentState::ForcedDL
    ) && complete_show_save_paths
        .iter()
        .any(|p| save_path_norm.starts_with(p.as_str()));
    if under_complete_show {
        return true;
    }

    if torrent.state == TorrentState::MissingFiles {
        return true;
    }

    if torrent.progress >= 0.999
        && matches!(
            torrent.state,
            TorrentState::StalledUP | TorrentState::Uploading | TorrentState::QueuedUP
        )
        && torrent.content_path.is_empty()
    {
        return true;
    }

    let age = age_minutes(torrent);
    if matches!(
        torrent.state,
        TorrentState::Error | TorrentState::StalledDL | TorrentState::MetaDL
    ) && age >= f64::from(max_age_minutes)
    {
        return true;
    }

    if matches!(torrent.state, TorrentState::QueuedDL | TorrentState::Downloading)
        && torrent.progress < 0.02
        && age >= 90.0
    {
        return true;
    }

    false
}

/// Removes stalled/orphaned torrents under `category`, then prunes release
/// rows whose torrent is gone, whose show has already downloaded the
/// episode, or which have gone stale relative to `2 * max_age_minutes`.
pub async fn cleanup_stalled(
    qbit: &QBitClient,
    store: &Store,
    category: &str,
    save_root: &str,
    max_age_minutes: u32,
) -> Result<MaintenanceReport> {
    let mut report = MaintenanceReport {
        max_age_minutes,
        ..Default::default()
    };

    let shows = store.list_shows().await?;
    let mut complete_show_save_paths = HashSet::new();
    for show in &shows {
        if let Some(total) = show.total_eps {
            let downloaded = store.downloaded_episode_count(show.id).await?;
            if downloaded >= i64::from(total) {
                complete_show_save_paths.insert(normalize_path(&format!(
                    "{}/{}",
                    save_root, show.title_canonical
                )));
            }
        }
    }

    let torrents = qbit.get_torrents(Some(category)).await?;
    report.total = torrents.len();

    let mut to_remove = Vec::new();
    let mut active_hashes = HashSet::new();
    let mut active_names = Vec::new();
    for torrent in &torrents {
        if should_remove(torrent, &complete_show_save_paths, max_age_minutes) {
            let delete_files = torrent.state == TorrentState::MissingFiles;
            to_remove.push((torrent.hash.clone(), delete_files));
        } else {
            active_hashes.insert(torrent.hash.to_lowercase());
            active_names.push(torrent.name.to_lowercase());
        }
    }

    for (hash, delete_files) in &to_remove {
        if let Err(e) = qbit.delete_torrent(hash, *delete_files).await {
            warn!(hash, error = %e, "failed to delete stalled torrent");
            continue;
        }
        report.removed_torrents += 1;
    }

    let releases = store.list_all_releases().await?;
    let stale_cutoff = Utc::now() - chrono::Duration::minutes(2 * i64::from(max_age_minutes));

    for release in releases {
        let release_hash = extract_info_hash(&release.magnet_or_torrent);
        let removed_hash_hit = release_hash
            .as_deref()
            .is_some_and(|h| to_remove.iter().any(|(r, _)| r.eq_ignore_ascii_case(h)));

        let downloaded = store
            .get_episode(release.show_id, release.ep_no)
            .await?
            .is_some_and(|e| e.state == "downloaded");

        let stale = release.created_at < stale_cutoff
            && match &release_hash {
                Some(h) => !active_hashes.contains(&h.to_lowercase()),
                None => !active_names
                    .iter()
                    .any(|n| n.contains(&release.title.to_lowercase()) || release.title.to_lowercase().contains(n.as_str())),
            };

        if downloaded {
            report.downloaded_release_rows += 1;
        }
        if stale && !downloaded {
            report.stale_release_rows += 1;
        }

        if removed_hash_hit || downloaded || (stale && !downloaded) {
            store.delete_release(release.id).await?;
            report.removed_release_rows += 1;
        }
    }

    info!(
        total = report.total,
        removed_torrents = report.removed_torrents,
        removed_release_rows = report.removed_release_rows,
        "torrent maintenance cycle finished"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn torrent(state: TorrentState, progress: f64, save_path: &str) -> TorrentInfo {
        TorrentInfo {
            hash: "abc".to_string(),
            name: "Show - 01".to_string(),
            state,
            progress,
            size: 0,
            downloaded: 0,
            dlspeed: 0,
            upspeed: 0,
            num_seeds: 0,
            num_leechs: 0,
            eta: 0,
            save_path: save_path.to_string(),
            category: String::new(),
            tags: String::new(),
            content_path: String::new(),
            added_on: 0,
        }
    }

    #[test]
    fn removes_torrent_under_complete_show_path() {
        let mut complete = HashSet::new();
        complete.insert(normalize_path("anime/Show"));
        let t = torrent(TorrentState::Downloading, 0.5, "/data/anime/Show/ep1");
        assert!(should_remove(&t, &complete, 20));
    }

    #[test]
    fn removes_missing_files_torrent() {
        let complete = HashSet::new();
        let t = torrent(TorrentState::MissingFiles, 0.0, "/data/anime/Other");
        assert!(should_remove(&t, &complete, 20));
    }

    #[test]
    fn keeps_healthy_downloading_torrent() {
        let complete = HashSet::new();
        let t = torrent(TorrentState::Downloading, 0.5, "/data/anime/Other");
        assert!(!should_remove(&t, &complete, 20));
    }
}
