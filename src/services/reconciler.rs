//! Scans the incoming directory for finished episode downloads, matches
//! them to a tracked show/episode, and either organizes them into the
//! library or routes them to an extras bucket for manual review.
//!
//! The original resolver's `reconciler` module only handles the
//! already-confident case (parse filename, move, mark downloaded). This
//! version adds the richer classification the spec calls for: releases with
//! extras-style keywords go straight to `Extras/Known`, and anything the
//! parser can't confidently pin to a single wanted episode — an ambiguous
//! numeric marker, or a runtime far from the show's median episode length —
//! goes to `Extras/Needs-Review` with an entry appended to the review-queue
//! ledger instead of being silently dropped.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::clients::qbittorrent::{QBitClient, TorrentInfo};
use crate::constants::{MIN_EPISODE_SIZE_BYTES, MIN_FILE_AGE_SEC, VIDEO_EXTENSIONS};
use crate::db::{ShowRow, Store};
use crate::entities::episode::EpisodeState;
use crate::parser::{
    alias_match_score, extract_episode_no, extract_season_no, has_explicit_episode_signal,
    is_bad_release,
};
use crate::services::manifest;
use crate::services::notifier::Notifier;
use crate::services::organizer;

const EXTRAS_WORD_KEYWORDS: &[&str] = &[
    "ova",
    "special",
    "extra",
    "bonus",
    "nced",
    "ncop",
    "pv",
    "trailer",
    "teaser",
    "creditless",
    "menu",
    "interview",
    "cast",
    "talk",
    "free talk",
];
const EXTRAS_CJK_KEYWORDS: &[&str] = &["花絮", "预告", "預告", "访谈", "訪談", "对谈", "對談"];

const RUNTIME_OUTLIER_LOW: f64 = 0.55;
const RUNTIME_OUTLIER_HIGH: f64 = 1.8;
const RUNTIME_OUTLIER_MIN_PRIOR_EPISODES: usize = 3;

fn extras_word_regexes() -> &'static [Regex] {
    static CACHE: OnceLock<Vec<Regex>> = OnceLock::new();
    CACHE.get_or_init(|| {
        EXTRAS_WORD_KEYWORDS
            .iter()
            .map(|k| {
                Regex::new(&format!(r"(?i)\b{}\b", regex::escape(k)))
                    .expect("static extras keyword pattern is valid")
            })
            .collect()
    })
}

/// Word-style keywords require a word boundary (so "extraordinary" doesn't
/// trip on "extra"); CJK keywords match as a plain substring since CJK text
/// has no word-boundary concept in the regex engine.
fn extras_keywords_hit(filename: &str) -> bool {
    if extras_word_regexes().iter().any(|re| re.is_match(filename)) {
        return true;
    }
    EXTRAS_CJK_KEYWORDS.iter().any(|k| filename.contains(k))
}

#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub scanned: usize,
    pub moved: usize,
    pub extras: usize,
    pub needs_review: usize,
    pub invalid: usize,
    pub skipped_not_ready: usize,
}

#[derive(Debug, Serialize)]
struct ReviewQueueEntry {
    timestamp: chrono::DateTime<Utc>,
    file: String,
    reason: String,
    show_id: Option<i32>,
    detail: String,
}

pub struct Reconciler {
    store: Store,
    qbit: QBitClient,
    notifier: Notifier,
    incoming_root: PathBuf,
    library_root: PathBuf,
    review_queue_path: PathBuf,
}

impl Reconciler {
    #[must_use]
    pub fn new(
        store: Store,
        qbit: QBitClient,
        notifier: Notifier,
        incoming_root: impl Into<PathBuf>,
        library_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            qbit,
            notifier,
            incoming_root: incoming_root.into(),
            library_root: library_root.into(),
            review_queue_path: PathBuf::from("memory/bangumi-review-queue.jsonl"),
        }
    }

    pub async fn run(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let shows = self.store.list_shows().await?;
        let torrents = self.qbit.get_torrents(None).await.unwrap_or_default();
        let mut hashes_to_remove: Vec<String> = Vec::new();

        let candidates: Vec<PathBuf> = WalkDir::new(&self.incoming_root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            })
            .collect();

        for path in candidates {
            report.scanned += 1;

            let Ok(meta) = tokio::fs::metadata(&path).await else {
                continue;
            };
            if meta.len() < MIN_EPISODE_SIZE_BYTES {
                continue;
            }

            let matched_torrent = self.matching_torrent(&path, &torrents);
            if !self.is_ready(&meta, matched_torrent) {
                report.skipped_not_ready += 1;
                continue;
            }

            if let Err(e) = self.probe_valid(&path) {
                warn!(path = %path.display(), error = %e, "skipping unreadable media file");
                report.invalid += 1;
                if let Err(de) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %de, "failed to delete invalid media file");
                }
                let nfo = path.with_extension("nfo");
                if tokio::fs::try_exists(&nfo).await.unwrap_or(false)
                    && let Err(de) = tokio::fs::remove_file(&nfo).await
                {
                    warn!(path = %nfo.display(), error = %de, "failed to delete sibling nfo for invalid media");
                }
                continue;
            }

            match self.classify_and_route(&path, &shows).await {
                Ok(outcome) => {
                    if let Some(t) = matched_torrent {
                        hashes_to_remove.push(t.hash.clone());
                    }
                    match outcome {
                        Outcome::Organized => report.moved += 1,
                        Outcome::Extras => report.extras += 1,
                        Outcome::NeedsReview => report.needs_review += 1,
                    }
                }
                Err(e) => warn!(path = %path.display(), error = %e, "reconcile failed for file"),
            }
        }

        for hash in &hashes_to_remove {
            if let Err(e) = self.qbit.delete_torrent(hash, false).await {
                warn!(hash, error = %e, "failed to remove torrent after reconcile routing");
            }
        }

        info!(
            scanned = report.scanned,
            moved = report.moved,
            extras = report.extras,
            needs_review = report.needs_review,
            torrents_removed = hashes_to_remove.len(),
            "reconcile pass finished"
        );
        Ok(report)
    }

    fn matching_torrent<'a>(&self, path: &Path, torrents: &'a [TorrentInfo]) -> Option<&'a TorrentInfo> {
        let path_str = path.to_string_lossy().to_lowercase();
        torrents
            .iter()
            .find(|t| !t.content_path.is_empty() && path_str.starts_with(&t.content_path.to_lowercase()))
    }

    fn is_ready(&self, meta: &std::fs::Metadata, matched: Option<&TorrentInfo>) -> bool {
        if let Some(t) = matched
            && t.progress < 0.999
        {
            return false;
        }

        let age_sec = meta
            .modified()
            .ok()
            .and_then(|m| SystemTime::now().duration_since(m).ok())
            .map_or(u64::MAX, |d| d.as_secs());
        age_sec >= MIN_FILE_AGE_SEC
    }

    /// Probes the file with an external media tool; a failure here means the
    /// file isn't a playable container and should be skipped rather than
    /// organized, without failing the whole reconcile pass.
    fn probe_valid(&self, path: &Path) -> Result<()> {
        ffprobe::ffprobe(path)
            .map(|_| ())
            .map_err(|e| anyhow::anyhow!("media probe failed: {e}"))
    }

    /// Splits a file's path relative to `incoming_root` into the show's
    /// incoming directory name and the remaining subdirectory chain, so
    /// extras routing can mirror the incoming layout under the show's
    /// `Extras/` tree.
    fn incoming_relative_parts(&self, path: &Path) -> (String, String) {
        let rel = path.strip_prefix(&self.incoming_root).unwrap_or(path);
        let mut comps: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if comps.is_empty() {
            return (String::new(), String::new());
        }
        comps.pop();
        if comps.is_empty() {
            return (String::new(), String::new());
        }
        let show_dir = comps.remove(0);
        (show_dir, comps.join("/"))
    }

    async fn classify_and_route(&self, path: &Path, shows: &[ShowRow]) -> Result<Outcome> {
        let filename = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or_default();
        let (incoming_show_dir, mirrored_subdir) = self.incoming_relative_parts(path);

        if is_bad_release(filename) {
            return self
                .route_to_extras(path, &incoming_show_dir, &mirrored_subdir, None, "bad_release_keywords")
                .await;
        }

        let extra_hit = extras_keywords_hit(filename);
        let explicit_signal = has_explicit_episode_signal(filename);
        if extra_hit && explicit_signal {
            return self
                .route_needs_review(
                    path,
                    &incoming_show_dir,
                    &mirrored_subdir,
                    None,
                    "extras_keyword_with_explicit_episode",
                )
                .await;
        }
        if extra_hit {
            return self
                .route_to_extras(path, &incoming_show_dir, &mirrored_subdir, None, "extras_keyword")
                .await;
        }

        let Some((show, season)) = self.match_show(filename, shows).await else {
            return self
                .route_needs_review(path, &incoming_show_dir, &mirrored_subdir, None, "no_show_match")
                .await;
        };

        // Confident means an unambiguous episode marker, not just any parsed
        // integer — a bare number next to a resolution tag isn't enough.
        let confident_ep = explicit_signal.then(|| extract_episode_no(filename)).flatten();
        let Some(ep_no) = confident_ep else {
            return self
                .route_needs_review(
                    path,
                    &show.title_canonical,
                    &mirrored_subdir,
                    Some(show.id),
                    "ambiguous_episode_number",
                )
                .await;
        };

        if let Some(total) = show.total_eps
            && ep_no > total
        {
            return self
                .route_needs_review(
                    path,
                    &show.title_canonical,
                    &mirrored_subdir,
                    Some(show.id),
                    "episode_number_out_of_range",
                )
                .await;
        }

        if self.is_runtime_outlier(path, &show.title_canonical).await {
            return self
                .route_needs_review(
                    path,
                    &show.title_canonical,
                    &mirrored_subdir,
                    Some(show.id),
                    "runtime_outlier",
                )
                .await;
        }

        self.organize_confident(path, &show, season, ep_no, &mirrored_subdir)
            .await
    }

    async fn match_show(&self, filename: &str, shows: &[ShowRow]) -> Option<(ShowRow, i32)> {
        let mut best: Option<(i32, ShowRow)> = None;
        for show in shows {
            let mut aliases = self.store.show_aliases(show.id).await.unwrap_or_default();
            aliases.push(show.title_input.clone());
            aliases.push(show.title_canonical.clone());
            let score = alias_match_score(filename, &aliases);
            if score > 0 && best.as_ref().is_none_or(|(s, _)| score > *s) {
                best = Some((score, show.clone()));
            }
        }
        best.map(|(_, show)| {
            let season = extract_season_no(filename).unwrap_or(1);
            (show, season)
        })
    }

    /// A file is a runtime outlier once the show has at least three
    /// previously-organized episodes on disk and this file's duration falls
    /// outside `[0.55, 1.8]` of their median — caught from the hash
    /// manifest's recorded paths, probed the same way as the candidate file.
    async fn is_runtime_outlier(&self, path: &Path, show_title_canonical: &str) -> bool {
        let Ok(probe) = ffprobe::ffprobe(path) else {
            return false;
        };
        let Some(duration) = probe.format.duration.as_ref().and_then(|d| d.parse::<f64>().ok())
        else {
            return false;
        };

        let safe = organizer::safe_name(&organizer::display_title(show_title_canonical));
        let Ok(manifest) = manifest::load_manifest(&safe).await else {
            return false;
        };
        if manifest.episodes.len() < RUNTIME_OUTLIER_MIN_PRIOR_EPISODES {
            return false;
        }

        let mut durations: Vec<f64> = manifest
            .episodes
            .values()
            .filter_map(|entry| {
                ffprobe::ffprobe(Path::new(&entry.path))
                    .ok()
                    .and_then(|p| p.format.duration.as_ref().and_then(|d| d.parse::<f64>().ok()))
            })
            .collect();
        if durations.len() < RUNTIME_OUTLIER_MIN_PRIOR_EPISODES {
            return false;
        }
        durations.sort_by(|a, b| a.partial_cmp(b).expect("probed durations are finite"));
        let mid = durations.len() / 2;
        let median = if durations.len() % 2 == 0 {
            (durations[mid - 1] + durations[mid]) / 2.0
        } else {
            durations[mid]
        };
        if median <= 0.0 {
            return false;
        }

        duration < RUNTIME_OUTLIER_LOW * median || duration > RUNTIME_OUTLIER_HIGH * median
    }

    async fn organize_confident(
        &self,
        path: &Path,
        show: &ShowRow,
        season: i32,
        ep_no: i32,
        mirrored_subdir: &str,
    ) -> Result<Outcome> {
        let md5 = manifest::compute_md5(path)?;
        let safe = organizer::safe_name(&organizer::display_title(&show.title_canonical));
        let key = manifest::episode_key(season, ep_no);
        let mut show_manifest = manifest::load_manifest(&safe).await?;

        if let Some(failure) = manifest::check_mapping_consistency(&show_manifest, &key, &md5) {
            warn!(
                show = %show.title_canonical,
                key,
                ?failure,
                "hash manifest consistency check failed"
            );
            let reason = match failure {
                manifest::ConsistencyFailure::HashConflictsWith(existing_key) => {
                    format!("hash_conflicts_with_{existing_key}")
                }
                manifest::ConsistencyFailure::EpisodeMd5Mismatch => {
                    "episode_md5_mismatch".to_string()
                }
            };
            return self
                .route_needs_review(
                    path,
                    &show.title_canonical,
                    mirrored_subdir,
                    Some(show.id),
                    reason,
                )
                .await;
        }

        let organized =
            organizer::organize_file(&self.library_root, &show.title_canonical, season, ep_no, path)
                .await?;

        let size = tokio::fs::metadata(&organized.destination)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        manifest::record_episode_hash(
            &mut show_manifest,
            &key,
            &md5,
            &organized.destination.to_string_lossy(),
            size,
        );
        manifest::save_manifest(&safe, &mut show_manifest).await?;

        self.store.mark_episode_downloaded(show.id, ep_no).await?;

        self.notifier
            .notify(&format!(
                "Organized {} - S{season:02}E{ep_no:02}",
                show.title_canonical
            ))
            .await;

        Ok(Outcome::Organized)
    }

    async fn route_to_extras(
        &self,
        path: &Path,
        show_title_for_dir: &str,
        mirrored_subdir: &str,
        show_id: Option<i32>,
        reason: impl Into<String>,
    ) -> Result<Outcome> {
        self.move_to_bucket(
            path,
            "Known",
            show_title_for_dir,
            mirrored_subdir,
            show_id,
            reason.into(),
        )
        .await?;
        Ok(Outcome::Extras)
    }

    async fn route_needs_review(
        &self,
        path: &Path,
        show_title_for_dir: &str,
        mirrored_subdir: &str,
        show_id: Option<i32>,
        reason: impl Into<String>,
    ) -> Result<Outcome> {
        self.move_to_bucket(
            path,
            "Needs-Review",
            show_title_for_dir,
            mirrored_subdir,
            show_id,
            reason.into(),
        )
        .await?;
        Ok(Outcome::NeedsReview)
    }

    async fn move_to_bucket(
        &self,
        path: &Path,
        bucket: &str,
        show_title_for_dir: &str,
        mirrored_subdir: &str,
        show_id: Option<i32>,
        reason: String,
    ) -> Result<()> {
        let safe_show = organizer::safe_name(&organizer::display_title(show_title_for_dir));
        let mut dest_dir = self.library_root.join(&safe_show).join("Extras").join(bucket);
        if !mirrored_subdir.is_empty() {
            dest_dir = dest_dir.join(mirrored_subdir);
        }
        tokio::fs::create_dir_all(&dest_dir).await?;
        let filename = path.file_name().unwrap_or_default();
        let dest = dest_dir.join(filename);
        tokio::fs::rename(path, &dest).await?;

        self.append_review_queue(&dest, show_id, &reason).await?;
        debug!(dest = %dest.display(), reason, "routed file to extras bucket");
        Ok(())
    }

    async fn append_review_queue(
        &self,
        path: &Path,
        show_id: Option<i32>,
        reason: &str,
    ) -> Result<()> {
        if let Some(parent) = self.review_queue_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let entry = ReviewQueueEntry {
            timestamp: Utc::now(),
            file: path.to_string_lossy().to_string(),
            reason: reason.to_string(),
            show_id,
            detail: String::new(),
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        use tokio::io::AsyncWriteExt;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.review_queue_path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }
}

enum Outcome {
    Organized,
    Extras,
    NeedsReview,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extras_keywords_catch_specials() {
        assert!(extras_keywords_hit("Show OVA 1 [1080p].mkv"));
        assert!(extras_keywords_hit("Demo Show - cast interview.mkv"));
        assert!(!extras_keywords_hit("Show - 12 [1080p].mkv"));
    }

    #[test]
    fn extras_keyword_does_not_trip_on_substring() {
        assert!(!extras_keywords_hit("Extraordinary Show - 12 [1080p].mkv"));
    }
}
