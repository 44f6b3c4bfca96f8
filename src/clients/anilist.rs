//! AniList GraphQL client: catalog lookups, relation graphs and airing schedules.
//!
//! Grounded on the original resolver's AniList usage (`anime_db.py`): a show
//! is matched against AniList search results, its `relations` edges are
//! walked to find prequels/sequels/alternate-cours, and a paginated
//! `airingSchedules(mediaId, sort: EPISODE)` query backs the per-episode air
//! date lookup used by the resolver.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

const ANILIST_API: &str = "https://graphql.anilist.co";

#[derive(Debug, Clone)]
pub struct CatalogMedia {
    pub id: i32,
    pub title_romaji: String,
    pub title_english: Option<String>,
    pub synonyms: Vec<String>,
    pub format: Option<String>,
    pub status: MediaStatus,
    pub episodes: Option<i32>,
    pub season_year: Option<i32>,
    pub next_airing_episode: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaStatus {
    Planned,
    Airing,
    Finished,
}

impl MediaStatus {
    fn from_anilist(s: &str) -> Self {
        match s {
            "RELEASING" => Self::Airing,
            "NOT_YET_RELEASED" => Self::Planned,
            _ => Self::Finished,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Airing => "airing",
            Self::Finished => "finished",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelatedMedia {
    pub id: i32,
    pub relation_type: String,
    pub format: Option<String>,
    pub title_romaji: String,
}

#[derive(Debug, Clone)]
pub struct EpisodeAiring {
    pub episode: i32,
    pub airing_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct GraphQLRequest<'a, V: Serialize> {
    query: &'a str,
    variables: V,
}

#[derive(Clone)]
pub struct CatalogClient {
    client: Client,
}

impl Default for CatalogClient {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogClient {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .user_agent("curatr/0.1")
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    async fn post<V: Serialize, D: for<'de> Deserialize<'de>>(
        &self,
        query: &str,
        variables: V,
    ) -> Result<D> {
        let body = GraphQLRequest { query, variables };
        self.client
            .post(ANILIST_API)
            .json(&body)
            .send()
            .await
            .context("catalog request failed")?
            .json::<D>()
            .await
            .context("catalog response was not valid JSON")
    }

    pub async fn search(&self, title: &str) -> Result<Vec<CatalogMedia>> {
        #[derive(Serialize)]
        struct Vars<'a> {
            search: &'a str,
        }
        #[derive(Deserialize)]
        struct Resp {
            data: Option<Data>,
        }
        #[derive(Deserialize)]
        struct Data {
            #[serde(rename = "Page")]
            page: Page,
        }
        #[derive(Deserialize)]
        struct Page {
            media: Vec<RawMedia>,
        }

        let query = r"
            query ($search: String) {
                Page(page: 1, perPage: 10) {
                    media(search: $search, type: ANIME) {
                        id
                        title { romaji english }
                        synonyms
                        format
                        status
                        episodes
                        seasonYear
                        nextAiringEpisode { episode }
                    }
                }
            }
        ";

        let resp: Resp = self.post(query, Vars { search: title }).await?;
        Ok(resp
            .data
            .map(|d| d.page.media.into_iter().map(RawMedia::into_domain).collect())
            .unwrap_or_default())
    }

    pub async fn media_by_id(&self, media_id: i32) -> Result<Option<CatalogMedia>> {
        #[derive(Serialize)]
        struct Vars {
            id: i32,
        }
        #[derive(Deserialize)]
        struct Resp {
            data: Option<Data>,
        }
        #[derive(Deserialize)]
        struct Data {
            #[serde(rename = "Media")]
            media: Option<RawMedia>,
        }

        let query = r"
            query ($id: Int) {
                Media(id: $id, type: ANIME) {
                    id
                    title { romaji english }
                    synonyms
                    format
                    status
                    episodes
                    seasonYear
                    nextAiringEpisode { episode }
                }
            }
        ";

        let resp: Resp = self.post(query, Vars { id: media_id }).await?;
        Ok(resp.data.and_then(|d| d.media).map(RawMedia::into_domain))
    }

    pub async fn relations(&self, media_id: i32) -> Result<Vec<RelatedMedia>> {
        #[derive(Serialize)]
        struct Vars {
            id: i32,
        }
        #[derive(Deserialize)]
        struct Resp {
            data: Option<Data>,
        }
        #[derive(Deserialize)]
        struct Data {
            #[serde(rename = "Media")]
            media: Option<MediaRelations>,
        }
        #[derive(Deserialize)]
        struct MediaRelations {
            relations: RelationsConnection,
        }
        #[derive(Deserialize)]
        struct RelationsConnection {
            edges: Vec<RelationEdge>,
        }
        #[derive(Deserialize)]
        struct RelationEdge {
            #[serde(rename = "relationType")]
            relation_type: String,
            node: RelationNode,
        }
        #[derive(Deserialize)]
        struct RelationNode {
            id: i32,
            format: Option<String>,
            title: NodeTitle,
        }
        #[derive(Deserialize)]
        struct NodeTitle {
            romaji: Option<String>,
        }

        let query = r"
            query ($id: Int) {
                Media(id: $id, type: ANIME) {
                    relations {
                        edges {
                            relationType
                            node { id format title { romaji } }
                        }
                    }
                }
            }
        ";

        let resp: Resp = self.post(query, Vars { id: media_id }).await?;
        Ok(resp
            .data
            .and_then(|d| d.media)
            .map(|m| {
                m.relations
                    .edges
                    .into_iter()
                    .map(|e| RelatedMedia {
                        id: e.node.id,
                        relation_type: e.relation_type,
                        format: e.node.format,
                        title_romaji: e.node.title.romaji.unwrap_or_default(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Walks the paginated `airingSchedules` query (`sort: EPISODE`) for a
    /// media id, following `pageInfo.hasNextPage` until exhausted or `max_pages`
    /// is reached.
    pub async fn airing_schedule(
        &self,
        media_id: i32,
        max_pages: u32,
    ) -> Result<Vec<EpisodeAiring>> {
        #[derive(Serialize)]
        struct Vars {
            id: i32,
            page: i32,
        }
        #[derive(Deserialize)]
        struct Resp {
            data: Option<Data>,
        }
        #[derive(Deserialize)]
        struct Data {
            #[serde(rename = "Page")]
            page: Page,
        }
        #[derive(Deserialize)]
        struct Page {
            #[serde(rename = "pageInfo")]
            page_info: PageInfo,
            #[serde(rename = "airingSchedules")]
            airing_schedules: Vec<Schedule>,
        }
        #[derive(Deserialize)]
        struct PageInfo {
            #[serde(rename = "hasNextPage")]
            has_next_page: bool,
        }
        #[derive(Deserialize)]
        struct Schedule {
            episode: i32,
            #[serde(rename = "airingAt")]
            airing_at: i64,
        }

        let query = r"
            query ($id: Int, $page: Int) {
                Page(page: $page, perPage: 50) {
                    pageInfo { hasNextPage }
                    airingSchedules(mediaId: $id, sort: EPISODE) {
                        episode
                        airingAt
                    }
                }
            }
        ";

        let mut out = Vec::new();
        let mut page = 1;
        loop {
            let resp: Resp = self.post(query, Vars { id: media_id, page }).await?;
            let Some(data) = resp.data else { break };
            let has_next = data.page.page_info.has_next_page;
            for s in data.page.airing_schedules {
                if let Some(dt) = DateTime::<Utc>::from_timestamp(s.airing_at, 0) {
                    out.push(EpisodeAiring {
                        episode: s.episode,
                        airing_at: dt,
                    });
                }
            }
            page += 1;
            if !has_next || page > max_pages as i32 {
                break;
            }
        }
        Ok(out)
    }
}

#[derive(Deserialize)]
struct RawMedia {
    id: i32,
    title: RawTitle,
    synonyms: Option<Vec<String>>,
    format: Option<String>,
    status: Option<String>,
    episodes: Option<i32>,
    #[serde(rename = "seasonYear")]
    season_year: Option<i32>,
    #[serde(rename = "nextAiringEpisode")]
    next_airing_episode: Option<RawNextAiringEpisode>,
}

#[derive(Deserialize)]
struct RawNextAiringEpisode {
    episode: i32,
}

#[derive(Deserialize)]
struct RawTitle {
    romaji: Option<String>,
    english: Option<String>,
}

impl RawMedia {
    fn into_domain(self) -> CatalogMedia {
        CatalogMedia {
            id: self.id,
            title_romaji: self.title.romaji.unwrap_or_default(),
            title_english: self.title.english,
            synonyms: self.synonyms.unwrap_or_default(),
            format: self.format,
            status: self
                .status
                .as_deref()
                .map_or(MediaStatus::Planned, MediaStatus::from_anilist),
            episodes: self.episodes,
            season_year: self.season_year,
            next_airing_episode: self.next_airing_episode.map(|n| n.episode),
        }
    }
}
