use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::remote::client::default_optional_columns;

/// Store used when `VOTE_SYNC_URL` is unset (a local Supabase stack).
pub const DEFAULT_STORE_URL: &str = "http://localhost:54321";
pub const DEFAULT_TABLE: &str = "votes";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Connection and sync settings for one vote table.
///
/// Unspecified fields fall back to environment variables, then to the
/// constants above.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL of the PostgREST/Supabase project
    pub store_url: String,
    /// Sent as both `apikey` and bearer token
    pub api_key: Option<String>,
    pub table: String,
    pub request_timeout_secs: u64,
    /// How often an HTTP store is polled for changes
    pub poll_interval_secs: u64,
    /// Columns sent with each write that the table may lack
    pub optional_columns: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            store_url: std::env::var("VOTE_SYNC_URL").unwrap_or_else(|_| DEFAULT_STORE_URL.into()),
            api_key: std::env::var("VOTE_SYNC_API_KEY")
                .ok()
                .filter(|key| !key.is_empty()),
            table: std::env::var("VOTE_SYNC_TABLE").unwrap_or_else(|_| DEFAULT_TABLE.into()),
            request_timeout_secs: env_secs("VOTE_SYNC_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            poll_interval_secs: env_secs("VOTE_SYNC_POLL_SECS", DEFAULT_POLL_INTERVAL_SECS),
            optional_columns: default_optional_columns(),
        }
    }
}

impl SyncConfig {
    /// Parse TOML, filling missing fields from defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SyncConfig =
            toml::from_str(content).context("Failed to parse vote sync config TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.store_url.trim().is_empty() {
            bail!("store_url must not be empty");
        }
        if !(self.store_url.starts_with("http://") || self.store_url.starts_with("https://")) {
            bail!("store_url must be an http(s) URL, got {}", self.store_url);
        }
        if self.table.trim().is_empty() {
            bail!("table must not be empty");
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be at least 1");
        }
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be at least 1");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

fn env_secs(name: &str, fallback: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = SyncConfig::from_toml_str(
            r#"
store_url = "https://demo.supabase.co"
table = "matrix_votes"
"#,
        )
        .unwrap();

        assert_eq!(config.store_url, "https://demo.supabase.co");
        assert_eq!(config.table, "matrix_votes");
        assert_eq!(config.optional_columns, vec!["updated_at".to_string()]);
        assert!(config.request_timeout_secs > 0);
    }

    #[test]
    fn test_full_toml() {
        let config = SyncConfig::from_toml_str(
            r#"
store_url = "https://demo.supabase.co"
api_key = "anon-key"
table = "votes"
request_timeout_secs = 3
poll_interval_secs = 2
optional_columns = []
"#,
        )
        .unwrap();

        assert_eq!(config.api_key.as_deref(), Some("anon-key"));
        assert_eq!(config.request_timeout(), Duration::from_secs(3));
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert!(config.optional_columns.is_empty());
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = SyncConfig::from_toml_str("store_url = \"ftp://nope\"").unwrap_err();
        assert!(err.to_string().contains("http(s)"));

        let err = SyncConfig::from_toml_str(
            "store_url = \"https://demo.supabase.co\"\nrequest_timeout_secs = 0",
        )
        .unwrap_err();
        assert!(err.to_string().contains("request_timeout_secs"));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let err = SyncConfig::from_toml_str("store_url = ").unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vote-sync.toml");
        std::fs::write(
            &path,
            "store_url = \"https://demo.supabase.co\"\npoll_interval_secs = 30\n",
        )
        .unwrap();

        let config = SyncConfig::from_file(&path).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_from_missing_file() {
        let err = SyncConfig::from_file(Path::new("/nonexistent/vote-sync.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }
}
