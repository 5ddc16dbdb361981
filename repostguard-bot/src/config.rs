//! Bot configuration.
//!
//! Loaded from environment variables with sensible defaults. Matching
//! constants that are invariants of the algorithm (distance threshold,
//! segment count, match cap, grid size) are deliberately *not* configurable;
//! they live as constants in `repostguard-core`.

use std::time::Duration;

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Subreddit to watch (`SUBREDDIT`, required).
    pub subreddit: Option<String>,
    /// OAuth bearer token for replies and reports (`REDDIT_ACCESS_TOKEN`,
    /// required).
    pub reddit_token: Option<String>,
    /// SQLite database URL (`DATABASE_URL`); unset falls back to the
    /// in-memory store.
    pub database_url: Option<String>,
    /// HTTP User-Agent for every outbound request (`USER_AGENT`).
    pub user_agent: String,
    /// Wait after an upstream outage before consuming again
    /// (`BACKOFF_SECS`, default 10).
    pub backoff: Duration,
    /// Per-request image download timeout (`FETCH_TIMEOUT_SECS`, default 10).
    pub fetch_timeout: Duration,
    /// Sleep between empty listing polls (`POLL_INTERVAL_SECS`, default 10).
    pub poll_interval: Duration,
    /// Report reason attached to flagged items (`REPORT_REASON`).
    pub report_reason: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            subreddit: None,
            reddit_token: None,
            database_url: None,
            user_agent: concat!("repostguard/", env!("CARGO_PKG_VERSION")).to_string(),
            backoff: Duration::from_secs(10),
            fetch_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(10),
            report_reason: "Possible repost: check comments".to_string(),
        }
    }
}

fn env_secs(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            subreddit: std::env::var("SUBREDDIT").ok().filter(|s| !s.is_empty()),
            reddit_token: std::env::var("REDDIT_ACCESS_TOKEN")
                .ok()
                .filter(|s| !s.is_empty()),
            database_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            user_agent: std::env::var("USER_AGENT").unwrap_or(defaults.user_agent),
            backoff: env_secs("BACKOFF_SECS", defaults.backoff),
            fetch_timeout: env_secs("FETCH_TIMEOUT_SECS", defaults.fetch_timeout),
            poll_interval: env_secs("POLL_INTERVAL_SECS", defaults.poll_interval),
            report_reason: std::env::var("REPORT_REASON").unwrap_or(defaults.report_reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.subreddit.is_none());
        assert!(config.database_url.is_none());
        assert_eq!(config.backoff, Duration::from_secs(10));
        assert!(config.user_agent.starts_with("repostguard/"));
    }
}
