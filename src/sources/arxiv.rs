//! arXiv papers via the [export API](https://info.arxiv.org/help/api/).
//!
//! The API answers with an Atom feed. Entries are read from the generic
//! [`XmlElement`] tree, so the `arxiv:` namespaced extensions
//! (`primary_category`, `comment`) are reached by local name.

use super::SourceAdapter;
use crate::error::{ParseError, SourceError};
use crate::fetcher::{FetchRequest, Fetcher};
use crate::models::Record;
use crate::parser::{XmlElement, parse_xml};
use crate::utils::{collapse_whitespace, truncate_chars};
use async_trait::async_trait;
use itertools::Itertools;
use tracing::{debug, instrument};

pub const BASE_URL: &str = "https://export.arxiv.org";
pub const HOME_URL: &str = "https://arxiv.org";

const SUMMARY_CHARS: usize = 1000;

pub struct Arxiv {
    fetcher: Fetcher,
    base_url: String,
}

impl Arxiv {
    pub fn new(fetcher: Fetcher) -> Self {
        Self::with_base_url(fetcher, BASE_URL)
    }

    pub fn with_base_url(fetcher: Fetcher, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

/// `"graph neural networks"` → `all:graph AND all:neural AND all:networks`.
pub fn build_search_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| format!("all:{term}"))
        .join(" AND ")
}

/// `http://arxiv.org/abs/2401.01234v2` → `2401.01234v2`.
fn short_id(entry_id: &str) -> &str {
    entry_id
        .rsplit_once("/abs/")
        .map(|(_, id)| id)
        .unwrap_or(entry_id)
}

fn entry_to_record(entry: &XmlElement) -> Option<Record> {
    let entry_id = entry.child_text("id")?;

    let authors: Vec<String> = entry
        .children_named("author")
        .filter_map(|a| a.child_text("name"))
        .collect();
    let categories: Vec<String> = entry
        .children_named("category")
        .filter_map(|c| c.attr("term").map(str::to_string))
        .collect();
    let links: Vec<&XmlElement> = entry.children_named("link").collect();
    let abstract_url = links
        .iter()
        .find(|l| l.attr("rel") == Some("alternate"))
        .and_then(|l| l.attr("href"))
        .map(str::to_string)
        .unwrap_or_else(|| entry_id.clone());
    let pdf_url = links
        .iter()
        .find(|l| l.attr("title") == Some("pdf"))
        .and_then(|l| l.attr("href"))
        .map(str::to_string);

    Some(
        Record::new(short_id(&entry_id))
            .with_opt("title", entry.child_text("title").map(|t| collapse_whitespace(&t)))
            .with_opt(
                "summary",
                entry
                    .child_text("summary")
                    .map(|s| truncate_chars(&collapse_whitespace(&s), SUMMARY_CHARS)),
            )
            .with("authors", authors)
            .with("url", abstract_url)
            .with_opt("pdf_url", pdf_url)
            .with("categories", categories)
            .with_opt(
                "primary_category",
                entry
                    .child("primary_category")
                    .and_then(|c| c.attr("term"))
                    .map(str::to_string),
            )
            .with_opt("comment", entry.child_text("comment"))
            .with_opt("published", entry.child_text("published"))
            .with_opt("updated", entry.child_text("updated")),
    )
}

/// Map every `<entry>` of an Atom feed.
pub fn parse_feed(xml: &str) -> Result<Vec<Record>, ParseError> {
    feed_to_records(&parse_xml(xml)?)
}

fn feed_to_records(feed: &XmlElement) -> Result<Vec<Record>, ParseError> {
    if feed.name != "feed" {
        return Err(ParseError::Missing("Atom <feed> root".to_string()));
    }
    Ok(feed.children_named("entry").filter_map(entry_to_record).collect())
}

#[async_trait]
impl SourceAdapter for Arxiv {
    fn id(&self) -> &str {
        "arxiv"
    }

    fn home_url(&self) -> &str {
        HOME_URL
    }

    #[instrument(level = "info", skip(self), fields(source = "arxiv"))]
    async fn try_search(&self, query: &str, limit: usize) -> Result<Vec<Record>, SourceError> {
        let request = FetchRequest::get(format!("{}/api/query", self.base_url))
            .query("search_query", build_search_query(query))
            .query("start", 0)
            .query("max_results", limit)
            .query("sortBy", "relevance");

        let page = self.fetcher.fetch(request).await?;
        let feed = page.parse()?.into_xml()?;
        let records = feed_to_records(&feed)?;
        debug!(entries = records.len(), "Parsed Atom feed");
        Ok(records)
    }
}
