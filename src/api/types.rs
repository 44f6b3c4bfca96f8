use serde::{Deserialize, Serialize};

use crate::db::{EpisodeRow, ShowRow};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ShowDto {
    pub id: i32,
    pub title_input: String,
    pub title_canonical: String,
    pub catalog_id: Option<i32>,
    pub status: String,
    pub total_eps: Option<i32>,
    pub ep_offset: i32,
}

impl From<ShowRow> for ShowDto {
    fn from(s: ShowRow) -> Self {
        Self {
            id: s.id,
            title_input: s.title_input,
            title_canonical: s.title_canonical,
            catalog_id: s.catalog_id,
            status: s.status,
            total_eps: s.total_eps,
            ep_offset: s.ep_offset,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EpisodeDto {
    pub ep_no: i32,
    pub state: String,
    pub air_datetime: Option<String>,
}

impl From<EpisodeRow> for EpisodeDto {
    fn from(e: EpisodeRow) -> Self {
        Self {
            ep_no: e.ep_no,
            state: e.state,
            air_datetime: e.air_datetime.map(|d| d.to_rfc3339()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ShowStatusDto {
    pub show_id: i32,
    pub title_canonical: String,
    pub downloaded_count: i64,
    pub total_eps: Option<i32>,
    pub latest_downloaded_episode: Option<i32>,
    pub missing_count: Option<i64>,
    pub complete: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpsertShowRequest {
    pub title_input: String,
    pub title_canonical: String,
}

#[derive(Debug, Deserialize)]
pub struct IntakeRequest {
    pub shows: Vec<IntakeShow>,
}

#[derive(Debug, Deserialize)]
pub struct IntakeShow {
    pub title_input: String,
    pub title_canonical: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub preferred_subgroups: Vec<String>,
    pub min_score: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct IntakeResultDto {
    pub show_id: i32,
    pub title_canonical: String,
}

#[derive(Debug, Serialize)]
pub struct JobOkDto {
    pub ok: bool,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl JobOkDto {
    #[must_use]
    pub fn new(extra: serde_json::Value) -> Self {
        Self { ok: true, extra }
    }
}

#[derive(Debug, Serialize)]
pub struct JobSubmittedDto {
    pub ok: bool,
    pub job_id: String,
}

#[derive(Debug, Serialize)]
pub struct JobStatusDto {
    pub id: String,
    pub kind: String,
    pub status: String,
    pub result: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthDto {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
}
