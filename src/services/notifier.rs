//! Best-effort external notifications: a Telegram message on notable job
//! outcomes, and a Jellyfin library-refresh nudge after organizing a file.
//! Both swallow their own failures — a notification going missing should
//! never fail the job that triggered it.
//!
//! Grounded on the original resolver's trivial `notifier` module for the
//! Telegram piece, and a reduced slice of its `jellyfin` module (multiple
//! known API paths tried in turn, first success wins) for the refresh hook.

use reqwest::Client;
use tracing::{debug, warn};

use crate::config::NotifierConfig;

#[derive(Clone)]
pub struct Notifier {
    client: Client,
    config: NotifierConfig,
}

impl Notifier {
    #[must_use]
    pub fn new(config: NotifierConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Posts `text` to Telegram if both a bot token and chat id are
    /// configured; no-ops otherwise. Errors are logged, never propagated.
    pub async fn notify(&self, text: &str) {
        let (Some(token), Some(chat_id)) = (
            self.config.telegram_bot_token.as_deref(),
            self.config.telegram_chat_id.as_deref(),
        ) else {
            return;
        };

        let url = format!("https://api.telegram.org/bot{token}/sendMessage");
        let result = self
            .client
            .post(&url)
            .timeout(std::time::Duration::from_secs(15))
            .form(&[("chat_id", chat_id), ("text", text)])
            .send()
            .await;

        if let Err(e) = result {
            warn!(error = %e, "telegram notification failed");
        }
    }

    /// Tries a small set of known Jellyfin library-refresh endpoints across
    /// server versions, in order, until one responds successfully. Gives up
    /// silently if none do or Jellyfin isn't configured.
    pub async fn refresh_jellyfin_library(&self) {
        let (Some(host), Some(api_key)) = (
            self.config.jellyfin_host.as_deref(),
            self.config.jellyfin_api_key.as_deref(),
        ) else {
            return;
        };
        let port = self.config.jellyfin_port.unwrap_or(8096);
        let base = format!("http://{host}:{port}");

        let candidate_paths = [
            "/Library/Refresh",
            "/emby/Library/Refresh",
            "/Items/Refresh",
        ];

        for path in candidate_paths {
            let url = format!("{base}{path}?api_key={api_key}");
            match self
                .client
                .post(&url)
                .timeout(std::time::Duration::from_secs(10))
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => {
                    debug!(path, "jellyfin library refresh triggered");
                    return;
                }
                Ok(resp) => debug!(path, status = %resp.status(), "jellyfin refresh path rejected"),
                Err(e) => debug!(path, error = %e, "jellyfin refresh path unreachable"),
            }
        }
        warn!("jellyfin library refresh failed on all known paths, giving up");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_without_telegram_config() {
        let notifier = Notifier::new(NotifierConfig::default());
        notifier.notify("hello").await;
    }

    #[tokio::test]
    async fn noop_without_jellyfin_config() {
        let notifier = Notifier::new(NotifierConfig::default());
        notifier.refresh_jellyfin_library().await;
    }
}
