//! PyPI projects.
//!
//! The JSON API has no search endpoint, so search scrapes the HTML results
//! page (`/search/?q=`), following page numbers until `limit` is reached or a
//! page comes back empty. The detail lookup uses the per-project JSON API.
//!
//! | Field | Selector |
//! |-------|----------|
//! | name | `.package-snippet__name` |
//! | version | `.package-snippet__version` |
//! | description | `.package-snippet__description` |
//! | created | `.package-snippet__created time[datetime]` |

use super::{DEFAULT_DETAIL_REPLIES, SourceAdapter};
use crate::error::{ParseError, SourceError};
use crate::fetcher::{FetchRequest, Fetcher};
use crate::models::Record;
use crate::parser::selector;
use crate::utils::{collapse_whitespace, truncate_chars};
use async_trait::async_trait;
use scraper::{ElementRef, Html};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

pub const BASE_URL: &str = "https://pypi.org";

const MAX_PAGES: usize = 5;
const SUMMARY_CHARS: usize = 1000;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProjectResponse {
    info: ProjectInfo,
    releases: BTreeMap<String, Vec<ReleaseFile>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProjectInfo {
    name: String,
    version: Option<String>,
    summary: Option<String>,
    author: Option<String>,
    license: Option<String>,
    requires_python: Option<String>,
    home_page: Option<String>,
    package_url: Option<String>,
    project_urls: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReleaseFile {
    upload_time_iso_8601: Option<String>,
    yanked: bool,
}

pub struct PyPi {
    fetcher: Fetcher,
    base_url: String,
    releases: usize,
}

impl PyPi {
    pub fn new(fetcher: Fetcher) -> Self {
        Self::with_base_url(fetcher, BASE_URL)
    }

    pub fn with_base_url(fetcher: Fetcher, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            releases: DEFAULT_DETAIL_REPLIES,
        }
    }

    pub fn with_releases(mut self, releases: usize) -> Self {
        self.releases = releases;
        self
    }
}

fn text_of(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

/// Extract result snippets from one search results page.
fn parse_search_page(html: &str) -> Result<Vec<Record>, ParseError> {
    let snippet_sel = selector("a.package-snippet")?;
    let name_sel = selector(".package-snippet__name")?;
    let version_sel = selector(".package-snippet__version")?;
    let desc_sel = selector(".package-snippet__description")?;
    let created_sel = selector(".package-snippet__created time[datetime]")?;

    let document = Html::parse_document(html);
    let records = document
        .select(&snippet_sel)
        .filter_map(|snippet| {
            let name = snippet.select(&name_sel).next().map(text_of)?;
            if name.is_empty() {
                return None;
            }
            let url = snippet
                .value()
                .attr("href")
                .map(|href| format!("{BASE_URL}{href}"))
                .unwrap_or_else(|| format!("{BASE_URL}/project/{name}/"));
            let created = snippet
                .select(&created_sel)
                .next()
                .and_then(|t| t.value().attr("datetime"))
                .map(str::to_string);

            Some(
                Record::new(name.clone())
                    .with("name", name)
                    .with_opt("version", snippet.select(&version_sel).next().map(text_of))
                    .with_opt(
                        "description",
                        snippet.select(&desc_sel).next().map(text_of).filter(|d| !d.is_empty()),
                    )
                    .with("url", url)
                    .with_opt("created", created),
            )
        })
        .collect();
    Ok(records)
}

fn recent_releases(releases: BTreeMap<String, Vec<ReleaseFile>>, count: usize) -> Vec<Record> {
    let mut dated: Vec<(String, String)> = releases
        .into_iter()
        .filter_map(|(version, files)| {
            let live: Vec<ReleaseFile> = files.into_iter().filter(|f| !f.yanked).collect();
            let uploaded = live.into_iter().filter_map(|f| f.upload_time_iso_8601).min()?;
            Some((version, uploaded))
        })
        .collect();
    // ISO 8601 UTC stamps order lexicographically.
    dated.sort_by(|a, b| b.1.cmp(&a.1));
    dated
        .into_iter()
        .take(count)
        .map(|(version, uploaded)| {
            Record::new(version.clone())
                .with("version", version)
                .with("uploaded_at", uploaded)
        })
        .collect()
}

#[async_trait]
impl SourceAdapter for PyPi {
    fn id(&self) -> &str {
        "pypi"
    }

    fn home_url(&self) -> &str {
        BASE_URL
    }

    #[instrument(level = "info", skip(self), fields(source = "pypi"))]
    async fn try_search(&self, query: &str, limit: usize) -> Result<Vec<Record>, SourceError> {
        let mut records = Vec::with_capacity(limit);

        for page in 1..=MAX_PAGES {
            let request = FetchRequest::get(format!("{}/search/", self.base_url))
                .query("q", query)
                .query("page", page);
            let body = self.fetcher.fetch(request).await?.body;

            let found = parse_search_page(&body)?;
            debug!(page, found = found.len(), "Parsed search page");
            if found.is_empty() {
                break;
            }
            records.extend(found);
            if records.len() >= limit {
                break;
            }
        }

        records.truncate(limit);
        Ok(records)
    }

    fn supports_detail(&self) -> bool {
        true
    }

    /// Project metadata plus its most recent non-yanked releases (newest
    /// first) under `releases`.
    async fn get_item_with_detail(&self, id: &str) -> Result<Record, SourceError> {
        let url = format!("{}/pypi/{}/json", self.base_url, urlencoding::encode(id));
        let project: ProjectResponse = self.fetcher.get(&url).await?.json()?;
        let info = project.info;
        if info.name.is_empty() {
            return Err(ParseError::Missing(format!("project {id}")).into());
        }

        let repository = info
            .project_urls
            .as_ref()
            .and_then(|urls| {
                urls.iter()
                    .find(|(label, _)| {
                        let label = label.to_ascii_lowercase();
                        label.contains("source") || label.contains("repository")
                    })
                    .map(|(_, url)| url.clone())
            });
        let page_url = info
            .package_url
            .unwrap_or_else(|| format!("{BASE_URL}/project/{}/", info.name));

        Ok(Record::new(info.name.clone())
            .with("name", info.name)
            .with_opt("version", info.version)
            .with_opt("summary", info.summary.map(|s| truncate_chars(&s, SUMMARY_CHARS)))
            .with_opt("author", info.author.filter(|a| !a.is_empty()))
            .with_opt("license", info.license.filter(|l| !l.is_empty()))
            .with_opt("requires_python", info.requires_python.filter(|r| !r.is_empty()))
            .with_opt("homepage", info.home_page.filter(|h| !h.is_empty()))
            .with_opt("repository", repository)
            .with("url", page_url)
            .with("releases", recent_releases(project.releases, self.releases)))
    }
}
