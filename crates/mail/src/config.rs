//! Mail core configuration
//!
//! Loaded once at startup from `mail.json` in the shared config
//! directory; every field has a default so a missing file means default
//! behavior, not an error.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Config file name inside the config directory
const CONFIG_FILE: &str = "mail.json";

/// Token file name inside the config directory
const TOKEN_FILE: &str = "token";

/// Environment variable overriding the token file
const TOKEN_ENV: &str = "FASTMAIL_API_TOKEN";

/// Default server origin for session discovery
const DEFAULT_SERVER: &str = "https://api.fastmail.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// Server origin for JMAP session discovery
    pub server_url: String,
    /// Cached-body budget; headers are uncounted
    pub max_messages: usize,
    /// Seconds between automatic refreshes of a watched folder
    pub refresh_interval_secs: u64,
    /// Messages fetched per request page
    pub page_size: usize,
    /// Total attempts per user action before rollback
    pub max_action_retries: u32,
    /// Consecutive sync failures tolerated before backoff kicks in
    pub backoff_after_failures: u32,
    /// Upper bound on sync failure backoff, in seconds
    pub backoff_cap_secs: u64,
    /// How long shutdown waits for in-flight background work
    pub shutdown_timeout_secs: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER.to_string(),
            max_messages: 500,
            refresh_interval_secs: 30,
            page_size: 50,
            max_action_retries: 3,
            backoff_after_failures: 3,
            backoff_cap_secs: 300,
            shutdown_timeout_secs: 10,
        }
    }
}

impl MailConfig {
    /// Load from the config directory, falling back to defaults when the
    /// file is absent
    pub fn load() -> Result<Self> {
        if config::config_exists(CONFIG_FILE) {
            config::load_json(CONFIG_FILE)
        } else {
            Ok(Self::default())
        }
    }

    /// Persist to the config directory
    pub fn save(&self) -> Result<()> {
        config::save_json(CONFIG_FILE, self)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// API credentials for the JMAP session
#[derive(Debug, Clone)]
pub struct Credentials {
    pub token: String,
}

impl Credentials {
    /// Resolve the API token: the environment variable wins, then the
    /// token file in the config directory
    pub fn resolve() -> Result<Self> {
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            let token = token.trim().to_string();
            if !token.is_empty() {
                return Ok(Self { token });
            }
        }

        let path = config::config_path(TOKEN_FILE)
            .context("Could not determine config directory")?;
        let token = config::read_secret_file(&path).with_context(|| {
            format!(
                "No API token: set {} or write the token to {}",
                TOKEN_ENV,
                path.display()
            )
        })?;
        Ok(Self { token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = MailConfig::default();
        assert_eq!(cfg.max_messages, 500);
        assert_eq!(cfg.refresh_interval_secs, 30);
        assert_eq!(cfg.page_size, 50);
        assert_eq!(cfg.max_action_retries, 3);
        assert_eq!(cfg.shutdown_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let cfg: MailConfig = serde_json::from_str(r#"{ "max_messages": 100 }"#).unwrap();
        assert_eq!(cfg.max_messages, 100);
        assert_eq!(cfg.page_size, 50);
        assert_eq!(cfg.server_url, "https://api.fastmail.com");
    }

    #[test]
    fn test_round_trip() {
        let cfg = MailConfig {
            max_messages: 200,
            ..Default::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: MailConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_messages, 200);
    }
}
