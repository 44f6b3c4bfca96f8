//! Release discovery and enqueue pipeline: per show, builds a wanted-episode
//! set, searches feeds for candidate releases, scores them, and enqueues the
//! best match per episode in qBittorrent.
//!
//! Grounded on the original resolver's `pipeline` module — the single
//! largest piece of the system. Kept the same shape: search-term
//! construction with episode-number variant templates, a time-budgeted
//! fetch across configured + generated feed URLs with a JSON-API fallback,
//! and a two-pass candidate selection (best-per-episode first, then
//! fill-any-still-missing) bounded by per-cycle and per-attempt caps.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::clients::qbittorrent::QBitClient;
use crate::clients::sources::{self, FeedCandidate};
use crate::config::{LibraryConfig, PipelineConfig, QBittorrentConfig};
use crate::db::{ShowRow, Store};
use crate::entities::episode::EpisodeState;
use crate::entities::show_profile::DEFAULT_MIN_SCORE;
use crate::parser::{
    extract_episode_no, extract_episode_range, extract_season_no, is_bad_release, score_release,
};
use crate::services::resolver::infer_expected_season;

const BOOTSTRAP_MIN_SCORE_FLOOR: i32 = 55;
const LARGE_BACKLOG_MIN_SCORE_FLOOR: i32 = 45;
const LARGE_BACKLOG_THRESHOLD: usize = 5;

#[derive(Debug, Default)]
pub struct PipelineReport {
    pub shows: usize,
    pub candidates: usize,
    pub scanned: usize,
    pub added: usize,
}

pub struct Pipeline {
    store: Store,
    qbit: QBitClient,
    http: reqwest::Client,
    pipeline_config: PipelineConfig,
    library_config: LibraryConfig,
    qbit_config: QBittorrentConfig,
}

impl Pipeline {
    #[must_use]
    pub fn new(
        store: Store,
        qbit: QBitClient,
        pipeline_config: PipelineConfig,
        library_config: LibraryConfig,
        qbit_config: QBittorrentConfig,
    ) -> Self {
        Self {
            store,
            qbit,
            http: reqwest::Client::new(),
            pipeline_config,
            library_config,
            qbit_config,
        }
    }

    pub async fn poll_and_enqueue(&self, only_show_ids: Option<&[i32]>) -> Result<PipelineReport> {
        let mut report = PipelineReport::default();
        if self.library_config.rss_urls.is_empty() {
            info!("no RSS URLs configured, skipping pipeline cycle");
            return Ok(report);
        }

        let shows = self.store.list_shows().await?;
        for show in shows {
            if let Some(ids) = only_show_ids
                && !ids.contains(&show.id)
            {
                continue;
            }
            report.shows += 1;
            match self.poll_show(&show).await {
                Ok(outcome) => {
                    report.candidates += outcome.candidates;
                    report.scanned += outcome.scanned;
                    report.added += outcome.added;
                }
                Err(e) => warn!(show_id = show.id, error = %e, "pipeline cycle failed for show"),
            }
        }
        Ok(report)
    }

    async fn poll_show(&self, show: &ShowRow) -> Result<ShowOutcome> {
        let started = Instant::now();
        let budget = Duration::from_secs(self.pipeline_config.per_show_time_budget_sec);

        let episodes = self.store.list_episodes(show.id).await?;
        let downloaded: HashSet<i32> = episodes
            .iter()
            .filter(|e| e.state == EpisodeState::Downloaded.as_str())
            .map(|e| e.ep_no)
            .collect();
        let first_sync = downloaded.is_empty();

        let mut wanted: Vec<i32> = episodes
            .iter()
            .filter(|e| {
                (e.state == EpisodeState::Aired.as_str() || e.state == EpisodeState::Missing.as_str())
                    && !downloaded.contains(&e.ep_no)
            })
            .map(|e| e.ep_no)
            .collect();

        if wanted.is_empty()
            && first_sync
            && let Some(total) = show.total_eps
        {
            wanted = (1..=total).collect();
        }
        wanted.sort_unstable();

        if let Some(total) = show.total_eps
            && i64::from(total) <= downloaded.len() as i64
            && wanted.is_empty()
        {
            return Ok(ShowOutcome::default());
        }

        if wanted.is_empty() {
            return Ok(ShowOutcome::default());
        }

        let mut aliases = vec![show.title_input.clone(), show.title_canonical.clone()];
        aliases.extend(self.store.show_aliases(show.id).await?);
        aliases.retain(|a| !a.trim().is_empty());
        aliases.dedup();

        let expected_season = infer_expected_season(&aliases);

        let profile = self.store.show_profile(show.id).await.ok();
        let base_min_score = profile
            .as_ref()
            .map_or(DEFAULT_MIN_SCORE, |p| p.min_score);
        let preferred_subgroups = profile.as_ref().map(crate::entities::show_profile::Model::subgroups).unwrap_or_default();

        let mut min_score = if first_sync {
            (base_min_score - 10).max(BOOTSTRAP_MIN_SCORE_FLOOR)
        } else {
            base_min_score
        };
        if wanted.len() >= LARGE_BACKLOG_THRESHOLD {
            min_score = (min_score - 10).max(LARGE_BACKLOG_MIN_SCORE_FLOOR);
        }

        let search_terms = build_search_terms(
            &aliases,
            &wanted,
            self.pipeline_config.max_episode_queries_per_show as usize,
            self.pipeline_config.max_search_terms_per_show as usize,
        );

        let feed_urls = self.build_feed_urls(&search_terms);

        let elapsed = started.elapsed();
        let remaining = budget.saturating_sub(elapsed);

        let (mut feed_candidates, timed_out) = sources::fetch_candidates(
            &self.http,
            &feed_urls,
            feed_urls.len(),
            self.pipeline_config.rss_max_entries_per_feed as usize,
            self.pipeline_config.rss_timeout_sec,
            remaining,
        )
        .await;

        if !timed_out {
            let elapsed = started.elapsed();
            let remaining = budget.saturating_sub(elapsed);
            if !remaining.is_zero() {
                let (fallback, _) = sources::fetch_bangumi_api_candidates(
                    &self.http,
                    &search_terms,
                    self.pipeline_config.fallback_bangumi_api_pages,
                    self.pipeline_config.fallback_api_results_per_show as usize,
                    self.pipeline_config.rss_timeout_sec,
                    remaining,
                )
                .await;
                feed_candidates.extend(fallback);
            }
        }

        let mut seen_links = HashSet::new();
        feed_candidates.retain(|c| seen_links.insert(c.link.clone()));
        feed_candidates.truncate(self.pipeline_config.max_candidates_per_show as usize);

        let scanned = feed_candidates.len();
        let ranked = self.score_candidates(
            &feed_candidates,
            &aliases,
            &wanted,
            expected_season,
            show.ep_offset,
            show.total_eps,
            &downloaded,
            &preferred_subgroups,
        );

        let added = self
            .select_and_enqueue(show, &wanted, ranked, min_score)
            .await?;

        Ok(ShowOutcome {
            candidates: feed_candidates.len(),
            scanned,
            added,
        })
    }

    fn build_feed_urls(&self, search_terms: &[String]) -> Vec<String> {
        let mut urls: Vec<String> = self.library_config.rss_urls.clone();
        for term in search_terms {
            let q = urlencoding::encode(term);
            urls.push(format!("https://bangumi.moe/rss/search/{q}"));
            for category in ["1_2", "1_3", "1_4"] {
                urls.push(format!(
                    "https://nyaa.si/?page=rss&q={q}&c={category}&f=0"
                ));
            }
            if urls.len() >= self.pipeline_config.max_feed_urls_per_show as usize {
                break;
            }
        }
        urls.truncate(self.pipeline_config.max_feed_urls_per_show as usize);
        urls
    }

    #[allow(clippy::too_many_arguments)]
    fn score_candidates(
        &self,
        candidates: &[FeedCandidate],
        aliases: &[String],
        wanted: &[i32],
        expected_season: Option<i32>,
        ep_offset: i32,
        total_eps: Option<i32>,
        downloaded: &HashSet<i32>,
        preferred_subgroups: &[String],
    ) -> HashMap<i32, Vec<ScoredCandidate>> {
        let wanted_set: HashSet<i32> = wanted.iter().copied().collect();
        let mut by_ep: HashMap<i32, Vec<ScoredCandidate>> = HashMap::new();

        for candidate in candidates {
            if is_bad_release(&candidate.title) {
                continue;
            }

            if let Some(season) = extract_season_no(&candidate.title)
                && let Some(expected) = expected_season
                && season != expected
            {
                continue;
            }

            let mut ep_no = extract_episode_no(&candidate.title);

            if let Some((lo, hi)) = extract_episode_range(&candidate.title) {
                if let Some(overlap) = (lo..=hi).find(|e| wanted_set.contains(e)) {
                    ep_no = Some(overlap);
                } else {
                    continue;
                }
            }

            let Some(mut parsed_ep) = ep_no else {
                continue;
            };

            if let Some(total) = total_eps
                && parsed_ep > total
            {
                let adjusted = parsed_ep - ep_offset;
                if ep_offset != 0 && (1..=total).contains(&adjusted) {
                    parsed_ep = adjusted;
                } else {
                    continue;
                }
            }

            if !wanted_set.contains(&parsed_ep) {
                continue;
            }

            let mut score = score_release(&candidate.title, aliases, parsed_ep, preferred_subgroups);
            if downloaded.contains(&parsed_ep) {
                score -= 30;
            }

            by_ep.entry(parsed_ep).or_default().push(ScoredCandidate {
                candidate: candidate.clone(),
                score,
            });
        }

        for list in by_ep.values_mut() {
            list.sort_by(|a, b| b.score.cmp(&a.score));
        }
        by_ep
    }

    async fn select_and_enqueue(
        &self,
        show: &ShowRow,
        wanted: &[i32],
        mut by_ep: HashMap<i32, Vec<ScoredCandidate>>,
        min_score: i32,
    ) -> Result<usize> {
        let cap = self.pipeline_config.max_add_per_show_per_cycle as usize;
        let max_attempts = (cap * 4).max(6);

        // Seed with episodes that already have a pending Release row so a
        // re-poll within the same wanted window never double-enqueues.
        let mut seen_eps = HashSet::new();
        for ep_no in wanted {
            if self.store.episode_has_pending_release(show.id, *ep_no).await? {
                seen_eps.insert(*ep_no);
            }
        }

        let mut added = 0;
        let mut attempts = 0;

        // Pass 1: first candidate meeting the score floor, per wanted
        // episode in ascending order.
        let mut wanted_sorted = wanted.to_vec();
        wanted_sorted.sort_unstable();
        for ep_no in &wanted_sorted {
            if added >= cap || attempts >= max_attempts {
                break;
            }
            let Some(candidates) = by_ep.get(ep_no) else {
                continue;
            };
            for candidate in candidates.iter().take(2) {
                attempts += 1;
                if candidate.score < min_score {
                    continue;
                }
                if self
                    .try_enqueue(show, *ep_no, &candidate.candidate)
                    .await?
                {
                    seen_eps.insert(*ep_no);
                    added += 1;
                }
                break;
            }
        }

        // Pass 2: globally ranked fill for anything still missing.
        let mut all: Vec<(i32, ScoredCandidate)> = by_ep
            .drain()
            .flat_map(|(ep, list)| list.into_iter().map(move |c| (ep, c)))
            .collect();
        all.sort_by(|a, b| b.1.score.cmp(&a.1.score));

        for (ep_no, candidate) in all {
            if added >= cap || attempts >= max_attempts {
                break;
            }
            if seen_eps.contains(&ep_no) {
                continue;
            }
            attempts += 1;
            if self.try_enqueue(show, ep_no, &candidate.candidate).await? {
                seen_eps.insert(ep_no);
                added += 1;
            }
        }

        Ok(added)
    }

    async fn try_enqueue(&self, show: &ShowRow, ep_no: i32, candidate: &FeedCandidate) -> Result<bool> {
        if self.store.episode_has_pending_release(show.id, ep_no).await? {
            debug!(show_id = show.id, ep_no, "episode already has a pending release, skipping");
            return Ok(false);
        }

        let link = sources::resolve_download_link(&self.http, &candidate.link).await;

        if self.store.release_exists(show.id, ep_no, &link).await? {
            debug!(show_id = show.id, ep_no, "release already recorded for this magnet, skipping");
            return Ok(false);
        }

        let save_path = format!("{}/{}", self.qbit_config.save_root, show.title_canonical);

        if let Err(e) = self
            .qbit
            .add_magnet(&link, Some(&save_path), Some(&self.qbit_config.category))
            .await
        {
            warn!(show_id = show.id, ep_no, error = %e, "failed to enqueue candidate");
            return Ok(false);
        }

        self.store
            .create_release(
                show.id,
                ep_no,
                candidate.source,
                &candidate.title,
                &link,
                None,
                None,
                0,
            )
            .await?;

        let is_missing = self
            .store
            .get_episode(show.id, ep_no)
            .await?
            .is_none_or(|e| e.state == EpisodeState::Missing.as_str());
        if is_missing {
            self.store
                .sync_episode_state(show.id, ep_no, EpisodeState::Aired, None)
                .await?;
        }

        debug!(show_id = show.id, ep_no, title = %candidate.title, "enqueued candidate");
        Ok(true)
    }
}

#[derive(Default)]
struct ShowOutcome {
    candidates: usize,
    scanned: usize,
    added: usize,
}

#[derive(Debug, Clone)]
struct ScoredCandidate {
    candidate: FeedCandidate,
    score: i32,
}

fn has_cjk(s: &str) -> bool {
    s.chars().any(|c| ('\u{4e00}'..='\u{9fff}').contains(&c))
}

fn has_latin(s: &str) -> bool {
    s.chars().any(|c| c.is_ascii_alphabetic())
}

/// Builds a round-robin set of search terms: a handful of base aliases (Latin
/// names first, then CJK, shortest first) expanded against a small set of
/// episode-number phrasing templates, one wanted episode at a time, until
/// the cap is hit.
fn build_search_terms(
    aliases: &[String],
    wanted: &[i32],
    max_episode_queries: usize,
    max_terms: usize,
) -> Vec<String> {
    let mut base_terms: Vec<String> = aliases.to_vec();
    base_terms.sort_by_key(|a| (i32::from(!has_latin(a)), i32::from(!has_cjk(a)), a.len(), a.to_lowercase()));
    base_terms.dedup();
    base_terms.truncate(6);

    let variants: Vec<Box<dyn Fn(&str, i32) -> String>> = vec![
        Box::new(|t: &str, e: i32| format!("{t} E{e:02}")),
        Box::new(|t: &str, e: i32| format!("{t} EP{e:02}")),
        Box::new(|t: &str, e: i32| format!("{t} - {e:02}")),
        Box::new(|t: &str, e: i32| format!("{t} [{e:02}]")),
        Box::new(|t: &str, e: i32| format!("{t} Episode {e}")),
        Box::new(|t: &str, e: i32| format!("{t} 第{e}话")),
        Box::new(|t: &str, e: i32| format!("{t} 第{e}集")),
    ];

    let mut terms = Vec::new();
    let mut seen = HashSet::new();
    'outer: for &ep in wanted.iter().take(max_episode_queries) {
        for variant in &variants {
            for base in &base_terms {
                let term = variant(base, ep);
                if seen.insert(term.clone()) {
                    terms.push(term);
                }
                if terms.len() >= max_terms {
                    break 'outer;
                }
            }
        }
    }
    terms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_terms_respect_cap() {
        let aliases = vec!["Frieren".to_string(), "葬送のフリーレン".to_string()];
        let wanted = vec![1, 2, 3];
        let terms = build_search_terms(&aliases, &wanted, 6, 10);
        assert!(terms.len() <= 10);
        assert!(terms.iter().any(|t| t.contains("E01")));
    }

    #[test]
    fn detects_latin_and_cjk() {
        assert!(has_latin("Frieren"));
        assert!(!has_latin("葬送のフリーレン"));
        assert!(has_cjk("葬送のフリーレン"));
        assert!(!has_cjk("Frieren"));
    }
}
