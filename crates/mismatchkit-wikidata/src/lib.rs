//! mismatchkit-wikidata: remote services for mismatch files
//!
//! - [`rest::WikidataRestSource`] reads entity statements from the Wikibase
//!   REST API and plugs into `mismatchkit_core::StatementFetcher`.
//! - [`finder::MismatchFinderClient`] uploads finished mismatch files to the
//!   Mismatch Finder import API.
//!
//! Both are thin HTTP layers over pure functions (`parse_statements`,
//! `ImportMetadata::validate`, `collect_upload_files`) that carry the logic
//! and the tests.

pub mod finder;
pub mod rest;

pub use finder::{FinderError, ImportMetadata, ImportReceipt, MismatchFinderClient, UploadOutcome};
pub use rest::{parse_statement, parse_statements, WikidataRestSource};

use std::time::Duration;

/// Wikidata's Wikibase REST API root.
pub const DEFAULT_REST_URL: &str = "https://www.wikidata.org/w/rest.php/wikibase/v1";

/// Wikimedia asks API clients to identify themselves.
pub const DEFAULT_USER_AGENT: &str = concat!(
    "mismatchkit/",
    env!("CARGO_PKG_VERSION"),
    " (https://www.wikidata.org/wiki/Wikidata:Mismatch_Finder)"
);

// ============================================================================
// Configuration
// ============================================================================

/// Connection settings for the knowledge-base REST API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikidataConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Retries after the first attempt for rate limits, 5xx and transport errors
    pub max_retries: u32,
    /// Wait before retry `n` is `n * retry_backoff_ms` unless the server says otherwise
    pub retry_backoff_ms: u64,
}

impl Default for WikidataConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_REST_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 30,
            max_retries: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl WikidataConfig {
    /// Defaults overridden by `WIKIDATA_REST_URL`, `WIKIDATA_USER_AGENT`,
    /// `WIKIDATA_TIMEOUT_SECS` and `WIKIDATA_MAX_RETRIES`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(url) = lookup("WIKIDATA_REST_URL") {
            config.base_url = url;
        }
        if let Some(agent) = lookup("WIKIDATA_USER_AGENT") {
            config.user_agent = agent;
        }
        if let Some(raw) = lookup("WIKIDATA_TIMEOUT_SECS") {
            config.timeout_secs = parse_number("WIKIDATA_TIMEOUT_SECS", &raw)?;
        }
        if let Some(raw) = lookup("WIKIDATA_MAX_RETRIES") {
            config.max_retries = parse_number("WIKIDATA_MAX_RETRIES", &raw)?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = url::Url::parse(&self.base_url)
            .map_err(|e| ConfigError::Invalid(format!("base_url '{}': {e}", self.base_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "base_url must be http(s), got '{}'",
                self.base_url
            )));
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::Invalid("user_agent must not be empty".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{key} must be a non-negative integer, got '{raw}'")))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Failed to create HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_is_valid() {
        let config = WikidataConfig::default();
        config.validate().unwrap();
        assert!(config.user_agent.starts_with("mismatchkit/"));
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_lookup_overrides() {
        let env: HashMap<&str, &str> = [
            ("WIKIDATA_REST_URL", "http://localhost:8080/w/rest.php/wikibase/v1"),
            ("WIKIDATA_MAX_RETRIES", "0"),
        ]
        .into_iter()
        .collect();
        let config = WikidataConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.base_url, "http://localhost:8080/w/rest.php/wikibase/v1");
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let bad_number =
            WikidataConfig::from_lookup(|k| (k == "WIKIDATA_TIMEOUT_SECS").then(|| "soon".to_string()));
        assert!(matches!(bad_number, Err(ConfigError::Invalid(_))));

        let bad_url = WikidataConfig::from_lookup(|k| (k == "WIKIDATA_REST_URL").then(|| "ftp://x".to_string()));
        assert!(bad_url.is_err());

        let config = WikidataConfig {
            timeout_secs: 0,
            ..WikidataConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
