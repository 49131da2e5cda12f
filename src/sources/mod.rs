//! Source adapters: one module per external site or API.
//!
//! Every adapter implements [`SourceAdapter`]. Each follows the same shape:
//!
//! 1. **Fetch**: build one or more requests through its own [`Fetcher`]
//! 2. **Parse**: decode the payload (JSON, HTML or Atom)
//! 3. **Map**: turn the service's fields into [`Record`]s with its own schema
//!
//! # Supported Sources
//!
//! | Source | Module | Method | Notes |
//! |--------|--------|--------|-------|
//! | Hacker News | [`hackernews`] | Algolia JSON API | Detail: story + first comments |
//! | Reddit | [`reddit`] | `search.json` | Falls back to old.reddit.com when blocked |
//! | GitHub | [`github`] | Search API | `GITHUB_TOKEN` optional; falls back to Trending HTML |
//! | Dev.to | [`devto`] | Articles API by tag | Paginated; detail: article + comments |
//! | arXiv | [`arxiv`] | Export API (Atom) | Namespace-qualified elements |
//! | Stack Overflow | [`stackoverflow`] | Stack Exchange API | `STACKEXCHANGE_KEY` optional; detail: top answers |
//! | Hugging Face | [`huggingface`] | Models API | `HF_TOKEN` optional |
//! | npm | [`npm`] | Registry search | |
//! | PyPI | [`pypi`] | Search page HTML | Paginated; detail: JSON API |
//! | crates.io | [`cratesio`] | Crates API | |
//!
//! Adapters swallow failures at the [`SourceAdapter::search`] boundary: a
//! broken source yields zero records and a log line, never an error.

pub mod arxiv;
pub mod cratesio;
pub mod devto;
pub mod github;
pub mod hackernews;
pub mod huggingface;
pub mod npm;
pub mod pypi;
pub mod reddit;
pub mod stackoverflow;

use crate::config::{Credentials, ResearchConfig};
use crate::error::{ConfigError, FetchError, SourceError};
use crate::fetcher::Fetcher;
use crate::models::Record;
use async_trait::async_trait;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;
use tracing::{info, warn};

/// Replies attached by adapters that support detail lookups.
pub const DEFAULT_DETAIL_REPLIES: usize = 5;

/// How far back date-aware searches look. Hacker News turns it into a
/// `created_at_i` filter, Reddit into its `t` parameter.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    Day,
    Week,
    #[default]
    Month,
    Year,
}

impl TimeWindow {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeWindow::Day => "day",
            TimeWindow::Week => "week",
            TimeWindow::Month => "month",
            TimeWindow::Year => "year",
        }
    }

    /// A month counts as 30 days and a year as 365.
    pub fn duration(self) -> Duration {
        match self {
            TimeWindow::Day => Duration::days(1),
            TimeWindow::Week => Duration::days(7),
            TimeWindow::Month => Duration::days(30),
            TimeWindow::Year => Duration::days(365),
        }
    }
}

/// The capability contract every site adapter implements.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable identifier, used as the report key.
    fn id(&self) -> &str;

    /// Public home page of the service. Links on the same site count as
    /// self-referential during enrichment.
    fn home_url(&self) -> &str;

    /// Search and map up to `limit` records, surfacing failures.
    async fn try_search(&self, query: &str, limit: usize) -> Result<Vec<Record>, SourceError>;

    /// Search, never failing: errors are logged and become an empty result.
    ///
    /// The returned vector holds at most `limit` records. A `limit` of zero
    /// returns immediately without touching the network.
    async fn search(&self, query: &str, limit: usize) -> Vec<Record> {
        if limit == 0 {
            return Vec::new();
        }

        let t0 = Instant::now();
        match self.try_search(query, limit).await {
            Ok(mut records) => {
                records.truncate(limit);
                info!(
                    source = self.id(),
                    count = records.len(),
                    elapsed_ms = t0.elapsed().as_millis() as u64,
                    "Search completed"
                );
                records
            }
            Err(e) => {
                warn!(
                    source = self.id(),
                    error = %e,
                    hint = e.hint(),
                    elapsed_ms = t0.elapsed().as_millis() as u64,
                    "Search failed; reporting zero results"
                );
                Vec::new()
            }
        }
    }

    /// Whether [`get_item_with_detail`](Self::get_item_with_detail) is implemented.
    fn supports_detail(&self) -> bool {
        false
    }

    /// Fetch one item plus nested child records (replies, answers,
    /// releases). Ordering of the children is adapter-defined.
    async fn get_item_with_detail(&self, _id: &str) -> Result<Record, SourceError> {
        Err(SourceError::Unsupported {
            source_id: self.id().to_string(),
            operation: "detail lookup",
        })
    }
}

/// The adapters this crate ships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    HackerNews,
    Reddit,
    GitHub,
    DevTo,
    Arxiv,
    StackOverflow,
    HuggingFace,
    Npm,
    PyPi,
    CratesIo,
}

impl SourceKind {
    /// Every kind, in the default registration order.
    pub const ALL: [SourceKind; 10] = [
        SourceKind::HackerNews,
        SourceKind::Reddit,
        SourceKind::GitHub,
        SourceKind::DevTo,
        SourceKind::Arxiv,
        SourceKind::StackOverflow,
        SourceKind::HuggingFace,
        SourceKind::Npm,
        SourceKind::PyPi,
        SourceKind::CratesIo,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::HackerNews => "hackernews",
            SourceKind::Reddit => "reddit",
            SourceKind::GitHub => "github",
            SourceKind::DevTo => "devto",
            SourceKind::Arxiv => "arxiv",
            SourceKind::StackOverflow => "stackoverflow",
            SourceKind::HuggingFace => "huggingface",
            SourceKind::Npm => "npm",
            SourceKind::PyPi => "pypi",
            SourceKind::CratesIo => "cratesio",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace(['-', '_', '.'], "");
        SourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| ConfigError::UnknownSource(s.to_string()))
    }
}

/// Construct one adapter of `kind` against its production endpoint.
///
/// Each adapter gets a fresh [`Fetcher`] with the per-source settings from
/// `config`.
pub fn build_source(
    kind: SourceKind,
    config: &ResearchConfig,
    credentials: &Credentials,
) -> Result<Box<dyn SourceAdapter>, FetchError> {
    let fetcher = Fetcher::new(&config.fetch_settings(kind.as_str()))?;
    let adapter: Box<dyn SourceAdapter> = match kind {
        SourceKind::HackerNews => Box::new(
            hackernews::HackerNews::new(fetcher).with_time_window(config.time_window),
        ),
        SourceKind::Reddit => {
            Box::new(reddit::Reddit::new(fetcher).with_time_window(config.time_window))
        }
        SourceKind::GitHub => Box::new(github::GitHub::new(
            fetcher,
            credentials.github_token.clone(),
        )),
        SourceKind::DevTo => Box::new(devto::DevTo::new(fetcher)),
        SourceKind::Arxiv => Box::new(arxiv::Arxiv::new(fetcher)),
        SourceKind::StackOverflow => Box::new(stackoverflow::StackOverflow::new(
            fetcher,
            credentials.stackexchange_key.clone(),
        )),
        SourceKind::HuggingFace => Box::new(huggingface::HuggingFace::new(
            fetcher,
            credentials.huggingface_token.clone(),
        )),
        SourceKind::Npm => Box::new(npm::Npm::new(fetcher)),
        SourceKind::PyPi => Box::new(pypi::PyPi::new(fetcher)),
        SourceKind::CratesIo => Box::new(cratesio::CratesIo::new(fetcher)),
    };
    Ok(adapter)
}

/// Build every adapter listed in `config.sources`, in order.
pub fn build_sources(
    config: &ResearchConfig,
    credentials: &Credentials,
) -> Result<Vec<Box<dyn SourceAdapter>>, ConfigError> {
    let mut adapters = Vec::with_capacity(config.sources.len());
    for name in &config.sources {
        let kind: SourceKind = name.parse()?;
        adapters.push(build_source(kind, config, credentials)?);
    }
    Ok(adapters)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    #[async_trait]
    impl SourceAdapter for Failing {
        fn id(&self) -> &str {
            "failing"
        }

        fn home_url(&self) -> &str {
            "https://failing.example"
        }

        async fn try_search(
            &self,
            _query: &str,
            _limit: usize,
        ) -> Result<Vec<Record>, SourceError> {
            Err(FetchError::Status {
                url: "https://failing.example/search".to_string(),
                status: 503,
            }
            .into())
        }
    }

    struct Generous;

    #[async_trait]
    impl SourceAdapter for Generous {
        fn id(&self) -> &str {
            "generous"
        }

        fn home_url(&self) -> &str {
            "https://generous.example"
        }

        async fn try_search(
            &self,
            _query: &str,
            _limit: usize,
        ) -> Result<Vec<Record>, SourceError> {
            Ok((0..20).map(|i| Record::new(i.to_string())).collect())
        }
    }

    #[tokio::test]
    async fn test_search_swallows_errors() {
        assert!(Failing.search("rust", 10).await.is_empty());
    }

    #[tokio::test]
    async fn test_search_enforces_limit() {
        let records = Generous.search("rust", 7).await;
        assert_eq!(records.len(), 7);
        assert_eq!(records[0].source_id(), "0");
        assert!(Generous.search("rust", 0).await.is_empty());
    }

    #[tokio::test]
    async fn test_detail_unsupported_by_default() {
        let err = Generous.get_item_with_detail("1").await.unwrap_err();
        assert!(matches!(err, SourceError::Unsupported { .. }));
        assert!(!Generous.supports_detail());
    }

    #[test]
    fn test_source_kind_parsing() {
        assert_eq!("hackernews".parse::<SourceKind>().unwrap(), SourceKind::HackerNews);
        assert_eq!("Stack-Overflow".parse::<SourceKind>().unwrap(), SourceKind::StackOverflow);
        assert_eq!("crates.io".parse::<SourceKind>().unwrap(), SourceKind::CratesIo);
        assert!("myspace".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_build_sources_in_config_order() {
        let config = ResearchConfig {
            sources: vec!["npm".to_string(), "arxiv".to_string(), "hackernews".to_string()],
            ..ResearchConfig::default()
        };
        let adapters = build_sources(&config, &Credentials::default()).unwrap();
        let ids: Vec<&str> = adapters.iter().map(|a| a.id()).collect();
        assert_eq!(ids, vec!["npm", "arxiv", "hackernews"]);
    }
}
