//! # Topic Scout
//!
//! Research one topic across developer news sites, package registries and
//! paper archives, and collect the results into a single report.
//!
//! ## Architecture
//!
//! 1. **Fetching** ([`fetcher`]): rate-limited HTTP with browser-like headers
//! 2. **Parsing** ([`parser`]): HTML, JSON or XML depending on the response
//! 3. **Adapters** ([`sources`]): one [`SourceAdapter`] per site, each mapping
//!    its API or pages onto [`Record`]s
//! 4. **Aggregation** ([`aggregator`]): runs every adapter for a query, adds
//!    detail for the primary source, normalizes timestamps and enriches
//!    outbound links
//! 5. **Output** ([`outputs`]): JSON and Markdown renderings of the
//!    [`ResearchReport`]
//!
//! ```no_run
//! use topic_scout::{Fetcher, FetchSettings, ResearchAggregator, ResearchOptions};
//! use topic_scout::sources::hackernews::HackerNews;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut aggregator = ResearchAggregator::new(ResearchOptions::default());
//! aggregator.register(Box::new(HackerNews::new(Fetcher::new(&FetchSettings::default())?)))?;
//! let report = aggregator.research_topic("rust async").await?;
//! println!("{}", report.total_records());
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod models;
pub mod normalize;
pub mod outputs;
pub mod parser;
pub mod sources;
pub mod utils;

pub use aggregator::{ExecutionMode, ResearchAggregator, ResearchOptions};
pub use config::{Credentials, ResearchConfig};
pub use error::{ConfigError, FetchError, ParseError, ResearchError, SourceError};
pub use extract::ContentExtractor;
pub use fetcher::{FetchRequest, FetchSettings, Fetcher, Page};
pub use models::{FieldValue, PageContent, Record, ResearchReport, SourceReport, TopicReports};
pub use sources::{SourceAdapter, SourceKind, TimeWindow};
