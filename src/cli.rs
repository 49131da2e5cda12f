//! Command-line interface definitions for Topic Scout.
//!
//! Flags override the values loaded from the YAML config file. API
//! credentials are not flags; they come from the environment (see
//! [`crate::config::Credentials`]).

use crate::config::ResearchConfig;
use crate::sources::TimeWindow;
use clap::Parser;

/// Command-line arguments for one research run.
///
/// # Examples
///
/// ```sh
/// # Every source, report printed to stdout
/// topic_scout "vector databases"
///
/// # A few sources in parallel, written to disk
/// topic_scout "tokio runtime" --sources hackernews,reddit,cratesio --parallel \
///     -j ./out/tokio.json -m ./out/tokio.md
///
/// # Several topics, last week only
/// topic_scout wasm zig --time-window week
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Topics to research, in report order
    #[arg(required = true)]
    pub queries: Vec<String>,

    /// Optional path to config.yaml file
    #[arg(short, long, env = "TOPIC_SCOUT_CONFIG")]
    pub config: Option<String>,

    /// Maximum records per source
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Comma-separated source ids, in report order
    #[arg(short, long, value_delimiter = ',')]
    pub sources: Vec<String>,

    /// Source whose top result gets the detail lookup
    #[arg(short, long)]
    pub primary: Option<String>,

    /// Query all sources concurrently
    #[arg(long)]
    pub parallel: bool,

    /// Skip the detail lookup
    #[arg(long)]
    pub no_detail: bool,

    /// Recency window for sources that filter by date
    #[arg(short, long, value_enum)]
    pub time_window: Option<TimeWindow>,

    /// Number of outbound links to enrich (0 disables)
    #[arg(long)]
    pub enrich: Option<usize>,

    /// Write the JSON report to this file
    #[arg(short, long)]
    pub json_output: Option<String>,

    /// Write the Markdown report to this file
    #[arg(short, long)]
    pub markdown_output: Option<String>,
}

impl Cli {
    /// Apply flags that were given on top of `config`.
    pub fn apply(&self, config: &mut ResearchConfig) {
        if let Some(limit) = self.limit {
            config.limit = limit;
        }
        if !self.sources.is_empty() {
            config.sources = self
                .sources
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(primary) = &self.primary {
            config.primary_source = Some(primary.clone());
        }
        if self.parallel {
            config.parallel = true;
        }
        if self.no_detail {
            config.include_detail = false;
        }
        if let Some(window) = self.time_window {
            config.time_window = window;
        }
        if let Some(enrich) = self.enrich {
            config.enrich_links = enrich;
        }
    }
}
