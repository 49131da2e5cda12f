//! # Topic Scout
//!
//! Command-line entry point. Loads the config, builds the configured source
//! adapters, runs one research pass per query and writes the report.
//!
//! ## Usage
//!
//! ```sh
//! topic_scout "rust async runtimes" -j ./out/report.json -m ./out/report.md
//! topic_scout wasm zig --time-window week
//! ```
//!
//! With neither output flag the JSON report goes to stdout. Several queries
//! produce one report per topic, keyed by topic. Logs always go to stderr.

use clap::Parser;
use std::error::Error;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

use topic_scout::cli::Cli;
use topic_scout::extract::DEFAULT_BODY_CHARS;
use topic_scout::outputs::{json, markdown};
use topic_scout::sources::build_sources;
use topic_scout::{ContentExtractor, Credentials, Fetcher, ResearchAggregator, ResearchConfig};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let start_time = Instant::now();
    info!("topic_scout starting up");

    let args = Cli::parse();
    debug!(queries = ?args.queries, ?args.config, "Parsed CLI arguments");

    // ---- Configuration ----
    let mut config = match &args.config {
        Some(path) => ResearchConfig::load(path)?,
        None => ResearchConfig::default(),
    };
    args.apply(&mut config);
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(e.into());
    }

    let credentials = Credentials::from_env();
    if credentials.github_token.is_none() {
        debug!("GITHUB_TOKEN not set; GitHub search runs unauthenticated");
    }

    // ---- Adapters ----
    let mut aggregator = ResearchAggregator::new(config.research_options());
    if config.enrich_links > 0 {
        let fetcher = Fetcher::new(&config.fetch_settings("enrichment"))?;
        let extractor = ContentExtractor::new(DEFAULT_BODY_CHARS)?;
        aggregator = aggregator.with_enrichment(fetcher, extractor);
    }
    for adapter in build_sources(&config, &credentials)? {
        aggregator.register(adapter)?;
    }
    info!(sources = ?aggregator.source_ids(), parallel = config.parallel, "Registered sources");

    // ---- Research ----
    let topics: Vec<&str> = args.queries.iter().map(String::as_str).collect();
    let research = aggregator.research_topics(&topics).await?;
    for report in &research.reports {
        for section in &report.sections {
            let (topic, source) = (&report.query, &section.source);
            match &section.failure {
                Some(failure) => warn!(%topic, %source, %failure, "Source failed"),
                None => info!(%topic, %source, count = section.records.len(), "Source done"),
            }
        }
    }

    // ---- Output ----
    match research.reports.as_slice() {
        [report] => {
            if let Some(path) = &args.json_output {
                json::write_report(report, path).await?;
            }
            if let Some(path) = &args.markdown_output {
                markdown::write_report(report, path).await?;
            }
            if args.json_output.is_none() && args.markdown_output.is_none() {
                println!("{}", json::report_to_json(report)?);
            }
        }
        _ => {
            if let Some(path) = &args.json_output {
                json::write_reports(&research, path).await?;
            }
            if let Some(path) = &args.markdown_output {
                markdown::write_reports(&research, path).await?;
            }
            if args.json_output.is_none() && args.markdown_output.is_none() {
                println!("{}", json::reports_to_json(&research)?);
            }
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        topics = research.reports.len(),
        records = research.total_records(),
        "Execution complete"
    );

    Ok(())
}
