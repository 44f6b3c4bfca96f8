//! Catalog resolver: maps a tracked show onto a catalog entry and keeps its
//! status, total episode count and episode-state rows up to date.
//!
//! Grounded on the original resolver's `anime_db` module: once a show has a
//! sticky catalog mapping it is never re-resolved by search, only refreshed
//! by id; new shows are matched through a small term pool (aliases plus
//! season-stripped variants) searched against the catalog and scored by
//! season and format fit.

use std::collections::HashMap;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::clients::anilist::{CatalogClient, CatalogMedia, MediaStatus, RelatedMedia};
use crate::db::Store;
use crate::entities::episode::EpisodeState;
use crate::parser::extract_season_no;

const TERM_POOL_CAP: usize = 12;
const SEARCH_PAGE_SIZE: usize = 8;
const AIRING_SCHEDULE_MAX_PAGES: u32 = 10;

/// Outcome of resolving a single show against the catalog.
#[derive(Debug, Default)]
pub struct ResolveOutcome {
    pub updated: u32,
    pub no_match: u32,
    pub transient_failures: u32,
}

pub struct Resolver {
    store: Store,
    catalog: CatalogClient,
}

impl Resolver {
    #[must_use]
    pub fn new(store: Store, catalog: CatalogClient) -> Self {
        Self { store, catalog }
    }

    /// Runs metadata sync for every tracked show: resolves a catalog mapping
    /// if one isn't sticky yet, refreshes status/episode-count, and syncs
    /// episode rows from the airing schedule.
    pub async fn sync_all(&self) -> Result<ResolveOutcome> {
        let shows = self.store.list_shows().await?;
        let mut outcome = ResolveOutcome::default();

        for show in shows {
            let aliases = self.all_names(&show).await?;
            let media = if let Some(catalog_id) = show.catalog_id {
                match self.catalog.media_by_id(catalog_id).await {
                    Ok(media) => media,
                    Err(e) => {
                        warn!(show_id = show.id, error = %e, "catalog refresh failed");
                        outcome.transient_failures += 1;
                        // Sticky mapping survives a transient failure; only
                        // the overflow cleanup still runs.
                        if let Some(total) = show.total_eps {
                            self.store.delete_episode_overflow(show.id, total).await?;
                        }
                        continue;
                    }
                }
            } else {
                self.pick_best_media(&aliases).await
            };

            let Some(media) = media else {
                if show.catalog_id.is_some() {
                    outcome.transient_failures += 1;
                } else {
                    outcome.no_match += 1;
                }
                continue;
            };

            self.store
                .set_show_catalog_mapping(
                    show.id,
                    media.id,
                    MediaStatus::as_str(media.status),
                    media.episodes,
                )
                .await?;

            let aired_upto = self
                .fetch_aired_upto(media.id, media.episodes, media.status, media.next_airing_episode)
                .await;
            self.sync_episode_rows(show.id, media.episodes, aired_upto)
                .await?;

            outcome.updated += 1;
        }

        Ok(outcome)
    }

    /// Builds the search term pool (aliases plus season-stripped variants,
    /// deduped, capped) and picks the highest-scoring catalog match.
    async fn pick_best_media(&self, aliases: &[String]) -> Option<CatalogMedia> {
        let expected_season = infer_expected_season(aliases);
        let terms = build_term_pool(aliases);

        let mut pooled: HashMap<i32, CatalogMedia> = HashMap::new();
        for term in &terms {
            match self.catalog.search(term).await {
                Ok(results) => {
                    for media in results.into_iter().take(SEARCH_PAGE_SIZE) {
                        pooled.entry(media.id).or_insert(media);
                    }
                }
                Err(e) => debug!(term, error = %e, "catalog search failed"),
            }
        }

        let mut best: Option<(i32, CatalogMedia)> = None;
        for (_, media) in pooled {
            let relations = self.catalog.relations(media.id).await.unwrap_or_default();
            let score = candidate_score(&media, &relations, expected_season, aliases);
            if best.as_ref().is_none_or(|(s, _)| score > *s) {
                best = Some((score, media));
            }
        }
        best.map(|(_, media)| media)
    }

    /// Preferred: max episode whose scheduled airing time has passed.
    /// Fallback 1: `nextAiringEpisode - 1`, for when the schedule query comes
    /// back empty but the show is still actively airing. Fallback 2: the
    /// full episode count once the show is finished. Else 0.
    async fn fetch_aired_upto(
        &self,
        media_id: i32,
        total_eps: Option<i32>,
        status: MediaStatus,
        next_airing_episode: Option<i32>,
    ) -> i32 {
        let now = Utc::now();
        match self
            .catalog
            .airing_schedule(media_id, AIRING_SCHEDULE_MAX_PAGES)
            .await
        {
            Ok(schedule) if !schedule.is_empty() => schedule
                .into_iter()
                .filter(|ep| ep.airing_at <= now)
                .map(|ep| ep.episode)
                .max()
                .unwrap_or(0),
            _ => {
                if let Some(next) = next_airing_episode
                    && next > 0
                {
                    next - 1
                } else {
                    match status {
                        MediaStatus::Finished => total_eps.unwrap_or(0),
                        _ => 0,
                    }
                }
            }
        }
    }

    /// Creates/updates episode rows `1..=max(total_eps, aired_upto)`, never
    /// downgrading an already-downloaded row, then deletes any row whose
    /// number exceeds `total_eps` (unless it's downloaded).
    async fn sync_episode_rows(
        &self,
        show_id: i32,
        total_eps: Option<i32>,
        aired_upto: i32,
    ) -> Result<()> {
        let upper = total_eps.unwrap_or(0).max(aired_upto);
        for ep_no in 1..=upper.max(0) {
            let desired = if ep_no <= aired_upto {
                EpisodeState::Aired
            } else {
                EpisodeState::Planned
            };
            self.store
                .sync_episode_state(show_id, ep_no, desired, None)
                .await?;
        }
        if let Some(total) = total_eps {
            self.store.delete_episode_overflow(show_id, total).await?;
        }
        Ok(())
    }

    async fn all_names(&self, show: &crate::db::ShowRow) -> Result<Vec<String>> {
        let mut names = vec![show.title_input.clone(), show.title_canonical.clone()];
        names.extend(self.store.show_aliases(show.id).await?);
        names.retain(|n| !n.trim().is_empty());
        names.dedup();
        Ok(names)
    }
}

fn strip_season_tokens(title: &str) -> String {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = RE.get_or_init(|| {
        regex::Regex::new(r"(?i)\s*(?:season\s?\d+|s\d+|\d+(?:st|nd|rd|th)\s+season|第\s?\d+\s?[季期])\s*$")
            .expect("static regex pattern is valid")
    });
    re.replace(title, "").trim().to_string()
}

fn build_term_pool(aliases: &[String]) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for alias in aliases.iter().take(10) {
        if !terms.contains(alias) {
            terms.push(alias.clone());
        }
        let stripped = strip_season_tokens(alias);
        if !stripped.is_empty() && stripped != *alias && !terms.contains(&stripped) {
            terms.push(stripped);
        }
        if terms.len() >= TERM_POOL_CAP {
            break;
        }
    }
    terms.truncate(TERM_POOL_CAP);
    terms
}

/// Most-frequent-then-highest season number seen across a show's aliases.
pub(crate) fn infer_expected_season(aliases: &[String]) -> Option<i32> {
    let mut counts: HashMap<i32, u32> = HashMap::new();
    for alias in aliases {
        if let Some(season) = extract_season_no(alias) {
            *counts.entry(season).or_insert(0) += 1;
        }
    }
    counts
        .into_iter()
        .max_by_key(|(season, count)| (*count, *season))
        .map(|(season, _)| season)
}

fn candidate_score(
    media: &CatalogMedia,
    relations: &[RelatedMedia],
    expected_season: Option<i32>,
    aliases: &[String],
) -> i32 {
    let prequels = relations
        .iter()
        .filter(|r| r.relation_type.eq_ignore_ascii_case("prequel"))
        .count();
    let sequels = relations
        .iter()
        .filter(|r| r.relation_type.eq_ignore_ascii_case("sequel"))
        .count();

    let inferred_season = i32::try_from(prequels).unwrap_or(i32::MAX).saturating_add(1);

    let mut score = 0;
    score += match expected_season {
        Some(expected) if expected == inferred_season => 80,
        Some(expected) => -25 * (expected - inferred_season).abs(),
        None => 0,
    };

    match media.format.as_deref() {
        Some("TV" | "TV_SHORT" | "ONA") => score += 20,
        _ => score -= 20,
    }

    if prequels > 0 {
        score += 5;
    }
    if sequels > 0 {
        score += 2;
    }

    let name_blob = format!(
        "{} {} {}",
        media.title_romaji,
        media.title_english.clone().unwrap_or_default(),
        media.synonyms.join(" ")
    )
    .to_lowercase();
    if aliases
        .iter()
        .any(|a| !a.is_empty() && name_blob.contains(&a.to_lowercase()))
    {
        score += 10;
    }

    if media.status == MediaStatus::Airing {
        score += 6;
    }

    score
}

pub fn log_sync_summary(outcome: &ResolveOutcome) {
    info!(
        updated = outcome.updated,
        no_match = outcome.no_match,
        transient_failures = outcome.transient_failures,
        "catalog metadata sync finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_expected_season_by_frequency_then_max() {
        let aliases = vec![
            "Show".to_string(),
            "Show Season 2".to_string(),
            "Show S2".to_string(),
            "Show 3rd Season".to_string(),
        ];
        assert_eq!(infer_expected_season(&aliases), Some(2));
    }

    #[test]
    fn strips_trailing_season_tokens() {
        assert_eq!(strip_season_tokens("Frieren Season 2"), "Frieren");
        assert_eq!(strip_season_tokens("Frieren S2"), "Frieren");
        assert_eq!(strip_season_tokens("Frieren"), "Frieren");
    }

    #[test]
    fn term_pool_dedupes_and_caps() {
        let aliases: Vec<String> = (0..20).map(|i| format!("Alias {i}")).collect();
        let pool = build_term_pool(&aliases);
        assert!(pool.len() <= TERM_POOL_CAP);
    }
}
