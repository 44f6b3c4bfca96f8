//! Runtime configuration, loaded entirely from the environment.
//!
//! Every recognized option is documented here and nowhere else; there is no
//! config file. `Config::load()` reads `.env` (if present) via `dotenvy`,
//! then environment variables, filling in defaults for anything unset, and
//! validates the result once at process start.

use anyhow::{Context, Result};
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub general: GeneralConfig,
    pub qbittorrent: QBittorrentConfig,
    pub library: LibraryConfig,
    pub pipeline: PipelineConfig,
    pub scheduler: SchedulerConfig,
    pub notifier: NotifierConfig,
    pub server: ServerConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone)]
pub struct GeneralConfig {
    pub database_url: String,
    pub log_level: String,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct QBittorrentConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub category: String,
    pub save_root: String,
}

impl QBittorrentConfig {
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct LibraryConfig {
    pub incoming_root: String,
    pub library_root: String,
    pub preferred_subgroups: Vec<String>,
    pub rss_urls: Vec<String>,
}

/// Bounds and budgets for the release pipeline (§6 of the spec).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_episode_queries_per_show: u32,
    pub max_search_terms_per_show: u32,
    pub max_feed_urls_per_show: u32,
    pub max_candidates_per_show: u32,
    pub rss_timeout_sec: u64,
    pub rss_max_entries_per_feed: u32,
    pub fallback_bangumi_api_pages: u32,
    pub fallback_api_results_per_show: u32,
    pub per_show_time_budget_sec: u64,
    pub max_add_per_show_per_cycle: u32,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub per_show_poll_minutes: u32,
    pub per_show_stagger_seconds: u32,
    pub reconcile_minutes: u32,
    pub torrent_maintenance_minutes: u32,
    pub catalog_sync_hours: u32,
    pub recovery_minutes: u32,
}

#[derive(Debug, Clone, Default)]
pub struct NotifierConfig {
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub jellyfin_host: Option<String>,
    pub jellyfin_port: Option<u16>,
    pub jellyfin_api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,
    pub loki_enabled: bool,
    pub loki_url: String,
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn env_csv(key: &str) -> Vec<String> {
    env::var(key)
        .ok()
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:data/curatr.db".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Default for QBittorrentConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
            username: "admin".to_string(),
            password: "adminadmin".to_string(),
            category: "anime".to_string(),
            save_root: "./downloads".to_string(),
        }
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            incoming_root: "./incoming".to_string(),
            library_root: "./library".to_string(),
            preferred_subgroups: vec![],
            rss_urls: vec![],
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_episode_queries_per_show: 6,
            max_search_terms_per_show: 12,
            max_feed_urls_per_show: 24,
            max_candidates_per_show: 180,
            rss_timeout_sec: 8,
            rss_max_entries_per_feed: 60,
            fallback_bangumi_api_pages: 1,
            fallback_api_results_per_show: 50,
            per_show_time_budget_sec: 25,
            max_add_per_show_per_cycle: 5,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            per_show_poll_minutes: 15,
            per_show_stagger_seconds: 20,
            reconcile_minutes: 10,
            torrent_maintenance_minutes: 30,
            catalog_sync_hours: 6,
            recovery_minutes: 20,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            qbittorrent: QBittorrentConfig::default(),
            library: LibraryConfig::default(),
            pipeline: PipelineConfig::default(),
            scheduler: SchedulerConfig::default(),
            notifier: NotifierConfig::default(),
            server: ServerConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Config {
    /// Loads `.env` if present, then reads environment variables over the
    /// defaults below. Unlike a config-file approach there is nothing to
    /// create on first run; unset variables simply take their default.
    pub fn load() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::info!("Loaded environment overrides from {}", path.display()),
            Err(dotenvy::Error::Io(_)) => {}
            Err(e) => tracing::warn!("Failed to parse .env file: {e}"),
        }
        Ok(Self::from_env())
    }

    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let log_format = match env_string("LOG_FORMAT", "pretty").to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Self {
            general: GeneralConfig {
                database_url: env_string("DATABASE_URL", &defaults.general.database_url),
                log_level: env_string("LOG_LEVEL", &defaults.general.log_level),
                log_format,
            },
            qbittorrent: QBittorrentConfig {
                host: env_string("QBIT_HOST", &defaults.qbittorrent.host),
                port: env_parsed("QBIT_PORT", defaults.qbittorrent.port),
                username: env_string("QBIT_USERNAME", &defaults.qbittorrent.username),
                password: env_string("QBIT_PASSWORD", &defaults.qbittorrent.password),
                category: env_string("QBIT_CATEGORY", &defaults.qbittorrent.category),
                save_root: env_string("QBIT_SAVE_ROOT", &defaults.qbittorrent.save_root),
            },
            library: LibraryConfig {
                incoming_root: env_string("INCOMING_ROOT", &defaults.library.incoming_root),
                library_root: env_string("LIBRARY_ROOT", &defaults.library.library_root),
                preferred_subgroups: {
                    let v = env_csv("PREFERRED_SUBGROUPS");
                    if v.is_empty() {
                        defaults.library.preferred_subgroups
                    } else {
                        v
                    }
                },
                rss_urls: env_csv("RSS_URLS"),
            },
            pipeline: PipelineConfig {
                max_episode_queries_per_show: env_parsed(
                    "MAX_EPISODE_QUERIES_PER_SHOW",
                    defaults.pipeline.max_episode_queries_per_show,
                ),
                max_search_terms_per_show: env_parsed(
                    "MAX_SEARCH_TERMS_PER_SHOW",
                    defaults.pipeline.max_search_terms_per_show,
                ),
                max_feed_urls_per_show: env_parsed(
                    "MAX_FEED_URLS_PER_SHOW",
                    defaults.pipeline.max_feed_urls_per_show,
                ),
                max_candidates_per_show: env_parsed(
                    "MAX_CANDIDATES_PER_SHOW",
                    defaults.pipeline.max_candidates_per_show,
                ),
                rss_timeout_sec: env_parsed("RSS_TIMEOUT_SEC", defaults.pipeline.rss_timeout_sec),
                rss_max_entries_per_feed: env_parsed(
                    "RSS_MAX_ENTRIES_PER_FEED",
                    defaults.pipeline.rss_max_entries_per_feed,
                ),
                fallback_bangumi_api_pages: env_parsed(
                    "FALLBACK_BANGUMI_API_PAGES",
                    defaults.pipeline.fallback_bangumi_api_pages,
                ),
                fallback_api_results_per_show: env_parsed(
                    "FALLBACK_API_RESULTS_PER_SHOW",
                    defaults.pipeline.fallback_api_results_per_show,
                ),
                per_show_time_budget_sec: env_parsed(
                    "PER_SHOW_TIME_BUDGET_SEC",
                    defaults.pipeline.per_show_time_budget_sec,
                ),
                max_add_per_show_per_cycle: env_parsed(
                    "MAX_ADD_PER_SHOW_PER_CYCLE",
                    defaults.pipeline.max_add_per_show_per_cycle,
                ),
            },
            scheduler: SchedulerConfig {
                enabled: env_bool("SCHEDULER_ENABLED", defaults.scheduler.enabled),
                ..defaults.scheduler
            },
            notifier: NotifierConfig {
                telegram_bot_token: env_opt("TELEGRAM_BOT_TOKEN"),
                telegram_chat_id: env_opt("TELEGRAM_CHAT_ID"),
                jellyfin_host: env_opt("JELLYFIN_HOST"),
                jellyfin_port: env::var("JELLYFIN_PORT").ok().and_then(|v| v.parse().ok()),
                jellyfin_api_key: env_opt("JELLYFIN_API_KEY"),
            },
            server: ServerConfig {
                enabled: env_bool("SERVER_ENABLED", defaults.server.enabled),
                port: env_parsed("SERVER_PORT", defaults.server.port),
            },
            observability: ObservabilityConfig {
                metrics_enabled: env_bool(
                    "METRICS_ENABLED",
                    defaults.observability.metrics_enabled,
                ),
                loki_enabled: env_bool("LOKI_ENABLED", defaults.observability.loki_enabled),
                loki_url: env_string("LOKI_URL", &defaults.observability.loki_url),
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.enabled && self.server.port == 0 {
            anyhow::bail!("SERVER_PORT must be non-zero when the web server is enabled");
        }
        if self.pipeline.max_add_per_show_per_cycle == 0 {
            anyhow::bail!("MAX_ADD_PER_SHOW_PER_CYCLE must be greater than zero");
        }
        if self.pipeline.per_show_time_budget_sec == 0 {
            anyhow::bail!("PER_SHOW_TIME_BUDGET_SEC must be greater than zero");
        }
        std::path::Path::new(&self.library.incoming_root)
            .to_str()
            .context("INCOMING_ROOT must be valid UTF-8")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.pipeline.max_add_per_show_per_cycle, 5);
        assert_eq!(config.qbittorrent.base_url(), "http://localhost:8080");
        assert!(config.scheduler.enabled);
    }

    #[test]
    fn test_env_overrides() {
        // SAFETY: test is single-threaded within this process's env mutation window.
        unsafe {
            env::set_var("MAX_ADD_PER_SHOW_PER_CYCLE", "9");
            env::set_var("PREFERRED_SUBGROUPS", "SubsPlease, Erai-raws");
        }
        let config = Config::from_env();
        unsafe {
            env::remove_var("MAX_ADD_PER_SHOW_PER_CYCLE");
            env::remove_var("PREFERRED_SUBGROUPS");
        }
        assert_eq!(config.pipeline.max_add_per_show_per_cycle, 9);
        assert_eq!(
            config.library.preferred_subgroups,
            vec!["SubsPlease".to_string(), "Erai-raws".to_string()]
        );
    }

    #[test]
    fn test_validate_rejects_zero_cap() {
        let mut config = Config::default();
        config.pipeline.max_add_per_show_per_cycle = 0;
        assert!(config.validate().is_err());
    }
}
