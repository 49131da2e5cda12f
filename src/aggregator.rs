//! Multi-source topic research.
//!
//! [`ResearchAggregator`] owns the registered adapters and turns one query
//! into one [`ResearchReport`]:
//!
//! 1. **Search**: every adapter's [`SourceAdapter::search`], in registration
//!    order (or concurrently in [`ExecutionMode::Parallel`])
//! 2. **Detail**: the primary source's first record, expanded with replies
//! 3. **Normalize**: time-like fields rewritten into timestamps
//! 4. **Enrich**: a few outbound links fetched and run through
//!    [`ContentExtractor`]
//!
//! [`ResearchAggregator::research_topics`] repeats that pass for several
//! topics and collects the reports in topic order.
//!
//! Source failures never fail the run. A failing adapter contributes an empty
//! section; a panicking adapter contributes an empty section with a
//! `failure` descriptor.

use crate::error::ResearchError;
use crate::extract::ContentExtractor;
use crate::fetcher::Fetcher;
use crate::models::{PageContent, Record, ResearchReport, SourceReport, TopicReports};
use crate::normalize::{normalize_record, normalize_timestamps};
use crate::sources::SourceAdapter;
use crate::utils::same_site;
use chrono::Utc;
use futures::FutureExt;
use futures::future::join_all;
use itertools::Itertools;
use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// How adapter searches are scheduled within one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One adapter after another, in registration order.
    #[default]
    Sequential,
    /// All adapters at once. Each still uses its own fetcher and timer.
    Parallel,
}

/// Per-run knobs. Usually built from [`crate::config::ResearchConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResearchOptions {
    /// Records requested from each source.
    pub limit: usize,
    /// Source whose first record gets the detail lookup; defaults to the
    /// first registered adapter.
    pub primary_source: Option<String>,
    pub include_detail: bool,
    /// Number of outbound links to enrich. 0 disables enrichment.
    pub enrich_links: usize,
    pub normalize_timestamps: bool,
    pub mode: ExecutionMode,
}

impl Default for ResearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            primary_source: None,
            include_detail: true,
            enrich_links: 3,
            normalize_timestamps: true,
            mode: ExecutionMode::Sequential,
        }
    }
}

struct Enrichment {
    fetcher: Fetcher,
    extractor: ContentExtractor,
}

/// Coordinates a research run across registered [`SourceAdapter`]s.
pub struct ResearchAggregator {
    adapters: Vec<Box<dyn SourceAdapter>>,
    options: ResearchOptions,
    enrichment: Option<Enrichment>,
}

impl ResearchAggregator {
    pub fn new(options: ResearchOptions) -> Self {
        Self {
            adapters: Vec::new(),
            options,
            enrichment: None,
        }
    }

    /// Enable the enrichment pass. `fetcher` is dedicated to enrichment and
    /// never shared with an adapter.
    pub fn with_enrichment(mut self, fetcher: Fetcher, extractor: ContentExtractor) -> Self {
        self.enrichment = Some(Enrichment { fetcher, extractor });
        self
    }

    /// Add an adapter. Registration order is report order.
    ///
    /// # Errors
    ///
    /// [`ResearchError::DuplicateSource`] when an adapter with the same id is
    /// already registered.
    pub fn register(&mut self, adapter: Box<dyn SourceAdapter>) -> Result<(), ResearchError> {
        if self.adapters.iter().any(|a| a.id() == adapter.id()) {
            return Err(ResearchError::DuplicateSource(adapter.id().to_string()));
        }
        debug!(source = adapter.id(), "Registered source");
        self.adapters.push(adapter);
        Ok(())
    }

    pub fn source_ids(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.id()).collect()
    }

    /// Research `query` across every registered source.
    ///
    /// # Returns
    ///
    /// A report with exactly one section per registered adapter, in
    /// registration order, even when every source came back empty.
    ///
    /// # Errors
    ///
    /// [`ResearchError::EmptyQuery`] for a blank query. Nothing is fetched in
    /// that case.
    #[instrument(
        level = "info",
        skip(self),
        fields(sources = self.adapters.len(), mode = ?self.options.mode)
    )]
    pub async fn research_topic(&self, query: &str) -> Result<ResearchReport, ResearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ResearchError::EmptyQuery);
        }

        let run_at = Utc::now();
        let t0 = Instant::now();

        let mut sections = match self.options.mode {
            ExecutionMode::Sequential => {
                let mut sections = Vec::with_capacity(self.adapters.len());
                for adapter in &self.adapters {
                    sections.push(self.run_search(adapter.as_ref(), query).await);
                }
                sections
            }
            ExecutionMode::Parallel => {
                join_all(
                    self.adapters
                        .iter()
                        .map(|adapter| self.run_search(adapter.as_ref(), query)),
                )
                .await
            }
        };

        if self.options.include_detail {
            self.attach_detail(&mut sections).await;
        }

        if self.options.normalize_timestamps {
            for section in &mut sections {
                section.records = normalize_timestamps(std::mem::take(&mut section.records));
                section.detail = section.detail.take().map(normalize_record);
            }
        }

        let enrichments = self.enrich(&sections).await;

        let report = ResearchReport {
            query: query.to_string(),
            run_at,
            sections,
            enrichments,
        };
        info!(
            total_records = report.total_records(),
            enrichments = report.enrichments.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Research completed"
        );
        Ok(report)
    }

    /// Research each topic in turn with [`research_topic`](Self::research_topic).
    ///
    /// Topics are trimmed; repeats are researched once. The result keeps the
    /// order in which topics first appear.
    ///
    /// # Errors
    ///
    /// [`ResearchError::EmptyQuery`] if any topic is blank, checked before
    /// any source is queried.
    #[instrument(level = "info", skip_all, fields(count = topics.len()))]
    pub async fn research_topics(&self, topics: &[&str]) -> Result<TopicReports, ResearchError> {
        if topics.iter().any(|topic| topic.trim().is_empty()) {
            return Err(ResearchError::EmptyQuery);
        }

        let mut reports = Vec::with_capacity(topics.len());
        for topic in topics.iter().map(|topic| topic.trim()).unique() {
            reports.push(self.research_topic(topic).await?);
        }
        info!(topics = reports.len(), "Multi-topic research completed");
        Ok(TopicReports { reports })
    }

    async fn run_search(&self, adapter: &dyn SourceAdapter, query: &str) -> SourceReport {
        let outcome = AssertUnwindSafe(adapter.search(query, self.options.limit))
            .catch_unwind()
            .await;
        match outcome {
            Ok(records) => SourceReport::new(adapter.id(), records),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(source = adapter.id(), panic = %message, "Source adapter panicked");
                SourceReport::failed(adapter.id(), format!("adapter panicked: {message}"))
            }
        }
    }

    fn primary_index(&self) -> Option<usize> {
        match &self.options.primary_source {
            Some(id) => self.adapters.iter().position(|a| a.id() == id.as_str()),
            None if self.adapters.is_empty() => None,
            None => Some(0),
        }
    }

    async fn attach_detail(&self, sections: &mut [SourceReport]) {
        let Some(idx) = self.primary_index() else {
            if let Some(id) = &self.options.primary_source {
                warn!(source = %id, "Primary source is not registered; skipping detail");
            }
            return;
        };
        let adapter = self.adapters[idx].as_ref();
        if !adapter.supports_detail() {
            debug!(source = adapter.id(), "Primary source has no detail lookup");
            return;
        }
        let Some(first_id) = sections[idx].records.first().map(|r| r.source_id().to_string()) else {
            return;
        };

        let outcome = AssertUnwindSafe(adapter.get_item_with_detail(&first_id))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(detail)) => {
                info!(source = adapter.id(), item = %first_id, "Attached detail");
                sections[idx].detail = Some(detail);
            }
            Ok(Err(e)) => {
                warn!(
                    source = adapter.id(),
                    item = %first_id,
                    error = %e,
                    hint = e.hint(),
                    "Detail lookup failed"
                );
            }
            Err(payload) => {
                error!(
                    source = adapter.id(),
                    panic = %panic_message(payload.as_ref()),
                    "Detail lookup panicked"
                );
            }
        }
    }

    /// Outbound links eligible for enrichment, in report order.
    fn enrichment_targets(&self, sections: &[SourceReport]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut targets = Vec::new();
        for (section, adapter) in sections.iter().zip(&self.adapters) {
            for url in section.records.iter().filter_map(|r: &Record| r.text("url")) {
                if targets.len() == self.options.enrich_links {
                    return targets;
                }
                let is_http = url.starts_with("http://") || url.starts_with("https://");
                if is_http && !same_site(url, adapter.home_url()) && seen.insert(url.to_string()) {
                    targets.push(url.to_string());
                }
            }
        }
        targets
    }

    async fn enrich(&self, sections: &[SourceReport]) -> Vec<PageContent> {
        let Some(enrichment) = &self.enrichment else {
            return Vec::new();
        };
        if self.options.enrich_links == 0 {
            return Vec::new();
        }

        let targets = self.enrichment_targets(sections);
        debug!(count = targets.len(), "Enriching outbound links");

        let mut pages = Vec::with_capacity(targets.len());
        for url in targets {
            match enrichment.fetcher.get(&url).await {
                Ok(page) => match enrichment.extractor.extract(&page.body, &url) {
                    Ok(content) => pages.push(content),
                    Err(e) => warn!(%url, error = %e, "Nothing extractable on linked page"),
                },
                Err(e) => warn!(%url, error = %e, hint = e.hint(), "Enrichment fetch failed"),
            }
        }
        pages
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
