//! Run configuration and credentials.
//!
//! [`ResearchConfig`] is read from an optional YAML file; every key has a
//! default so an empty file (or no file) is valid:
//!
//! ```yaml
//! limit: 10
//! request_delay_secs: 1.0
//! source_delays:
//!   reddit: 2.0
//! timeout_secs: 10
//! sources: [hackernews, reddit, github, arxiv]
//! primary_source: hackernews
//! include_detail: true
//! enrich_links: 3
//! normalize_timestamps: true
//! parallel: false
//! time_window: month
//! ```
//!
//! Command-line flags override the file (see [`crate::cli`]). API
//! credentials come from the environment through [`Credentials::from_env`].

use crate::aggregator::{ExecutionMode, ResearchOptions};
use crate::error::ConfigError;
use crate::fetcher::{DEFAULT_TIMEOUT, FetchSettings};
use crate::sources::{SourceKind, TimeWindow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Maximum records per source.
    pub limit: usize,
    /// Default minimum delay between requests of one adapter.
    pub request_delay_secs: f64,
    /// Per-source delay overrides, keyed by source id.
    pub source_delays: BTreeMap<String, f64>,
    /// Per-request timeout.
    pub timeout_secs: f64,
    /// Replace the randomly chosen browser User-Agent.
    pub user_agent: Option<String>,
    /// Source ids to run, in report order.
    pub sources: Vec<String>,
    /// Source that gets the detail pass; the first source when unset.
    pub primary_source: Option<String>,
    pub include_detail: bool,
    /// Outbound links to enrich; 0 disables enrichment.
    pub enrich_links: usize,
    pub normalize_timestamps: bool,
    /// Run adapters concurrently instead of one after another.
    pub parallel: bool,
    /// Recency window for sources that can filter by date.
    pub time_window: TimeWindow,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            limit: 10,
            request_delay_secs: 1.0,
            source_delays: BTreeMap::new(),
            timeout_secs: DEFAULT_TIMEOUT.as_secs_f64(),
            user_agent: None,
            sources: SourceKind::ALL.iter().map(|k| k.as_str().to_string()).collect(),
            primary_source: None,
            include_detail: true,
            enrich_links: 3,
            normalize_timestamps: true,
            parallel: false,
            time_window: TimeWindow::default(),
        }
    }
}

impl ResearchConfig {
    /// Load a YAML config file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] when the file cannot be read, [`ConfigError::Yaml`]
    /// when it is not valid YAML for this struct.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_yaml(&raw)?;
        debug!(sources = ?config.sources, limit = config.limit, "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let mut config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject source ids no adapter answers to and rewrite the rest to
    /// their canonical form (`Stack-Overflow` becomes `stackoverflow`).
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        for name in self.sources.iter_mut().chain(self.primary_source.iter_mut()) {
            let kind: SourceKind = name.parse()?;
            *name = kind.as_str().to_string();
        }
        Ok(())
    }

    /// Fetcher settings for one source, applying its delay override.
    pub fn fetch_settings(&self, source_id: &str) -> FetchSettings {
        let delay_secs = self
            .source_delays
            .get(source_id)
            .copied()
            .unwrap_or(self.request_delay_secs);

        let timeout = if self.timeout_secs.is_finite() && self.timeout_secs > 0.0 {
            Duration::from_secs_f64(self.timeout_secs)
        } else {
            DEFAULT_TIMEOUT
        };

        FetchSettings {
            delay_secs,
            timeout,
            user_agent: self.user_agent.clone(),
        }
    }

    pub fn research_options(&self) -> ResearchOptions {
        ResearchOptions {
            limit: self.limit,
            primary_source: self.primary_source.clone(),
            include_detail: self.include_detail,
            enrich_links: self.enrich_links,
            normalize_timestamps: self.normalize_timestamps,
            mode: if self.parallel {
                ExecutionMode::Parallel
            } else {
                ExecutionMode::Sequential
            },
        }
    }
}

/// Optional API credentials. Absent values mean unauthenticated requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub github_token: Option<String>,
    pub stackexchange_key: Option<String>,
    pub huggingface_token: Option<String>,
}

impl Credentials {
    /// Read `GITHUB_TOKEN`, `STACKEXCHANGE_KEY` and `HF_TOKEN`. Empty values
    /// count as absent.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            github_token: read("GITHUB_TOKEN"),
            stackexchange_key: read("STACKEXCHANGE_KEY"),
            huggingface_token: read("HF_TOKEN"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(ResearchConfig::from_yaml("").unwrap(), ResearchConfig::default());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = ResearchConfig::from_yaml(
            "limit: 4\nsources: [arxiv, npm]\nsource_delays:\n  npm: 0.25\nparallel: true\n",
        )
        .unwrap();

        assert_eq!(config.limit, 4);
        assert_eq!(config.sources, vec!["arxiv", "npm"]);
        assert_eq!(config.enrich_links, 3);
        assert_eq!(config.fetch_settings("npm").delay_secs, 0.25);
        assert_eq!(config.fetch_settings("arxiv").delay_secs, 1.0);
        assert_eq!(config.research_options().mode, ExecutionMode::Parallel);
    }

    #[test]
    fn test_unknown_source_rejected() {
        let err = ResearchConfig::from_yaml("sources: [hackernews, friendster]").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownSource(name) if name == "friendster"));
    }

    #[test]
    fn test_source_ids_are_canonicalized() {
        let config = ResearchConfig::from_yaml(
            "sources: [Hacker_News, stackoverflow]\nprimary_source: Stack-Overflow\n",
        )
        .unwrap();
        assert_eq!(config.sources, vec!["hackernews", "stackoverflow"]);
        assert_eq!(config.primary_source.as_deref(), Some("stackoverflow"));
        assert_eq!(config.time_window, TimeWindow::Month);
    }

    #[test]
    fn test_time_window_from_yaml() {
        let config = ResearchConfig::from_yaml("time_window: week").unwrap();
        assert_eq!(config.time_window, TimeWindow::Week);
        assert!(ResearchConfig::from_yaml("time_window: decade").is_err());
    }

    #[test]
    fn test_invalid_timeout_falls_back() {
        let config = ResearchConfig {
            timeout_secs: -1.0,
            ..ResearchConfig::default()
        };
        assert_eq!(config.fetch_settings("npm").timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = ResearchConfig::load("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_credentials_treat_blank_as_absent() {
        let creds = Credentials::from_lookup(|key| match key {
            "GITHUB_TOKEN" => Some("ghp_abc".to_string()),
            "HF_TOKEN" => Some("   ".to_string()),
            _ => None,
        });
        assert_eq!(creds.github_token.as_deref(), Some("ghp_abc"));
        assert_eq!(creds.huggingface_token, None);
        assert_eq!(creds.stackexchange_key, None);
    }
}
