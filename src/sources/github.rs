//! GitHub repositories.
//!
//! The primary path is the REST search API (`/search/repositories`), sorted
//! by stars. Unauthenticated callers get a small quota, so a blocked answer
//! (401/403/429) switches to the second path: the public
//! [Trending](https://github.com/trending) page, scraped and filtered down to
//! repositories whose name or description mentions a query term.
//!
//! Set `GITHUB_TOKEN` to send a bearer token with API requests.

use super::SourceAdapter;
use crate::error::{ParseError, SourceError};
use crate::fetcher::{FetchRequest, Fetcher};
use crate::models::Record;
use crate::parser::selector;
use crate::utils::collapse_whitespace;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

pub const API_URL: &str = "https://api.github.com";
pub const WEB_URL: &str = "https://github.com";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchResponse {
    total_count: u64,
    items: Vec<Repository>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Repository {
    full_name: String,
    html_url: Option<String>,
    description: Option<String>,
    stargazers_count: i64,
    forks_count: i64,
    open_issues_count: i64,
    language: Option<String>,
    topics: Vec<String>,
    updated_at: Option<String>,
    owner: Option<Owner>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Owner {
    login: String,
}

pub struct GitHub {
    fetcher: Fetcher,
    token: Option<String>,
    api_url: String,
    web_url: String,
}

impl GitHub {
    pub fn new(fetcher: Fetcher, token: Option<String>) -> Self {
        Self::with_base_urls(fetcher, token, API_URL, WEB_URL)
    }

    pub fn with_base_urls(
        fetcher: Fetcher,
        token: Option<String>,
        api_url: impl Into<String>,
        web_url: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            token,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            web_url: web_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn search_api(&self, query: &str, limit: usize) -> Result<Vec<Record>, SourceError> {
        let request = FetchRequest::get(format!("{}/search/repositories", self.api_url))
            .query("q", query)
            .query("sort", "stars")
            .query("order", "desc")
            .query("per_page", limit.min(100))
            .header("accept", "application/vnd.github+json")
            .bearer(self.token.as_deref());

        let response: SearchResponse = self.fetcher.fetch(request).await?.json()?;
        debug!(total_count = response.total_count, "GitHub search answered");
        Ok(response.items.into_iter().map(repository_to_record).collect())
    }

    async fn search_trending(&self, query: &str) -> Result<Vec<Record>, SourceError> {
        let page = self
            .fetcher
            .get(&format!("{}/trending", self.web_url))
            .await?;
        let records = parse_trending(&page.body, &self.web_url, query)?;
        info!(count = records.len(), "Matched repositories on Trending");
        Ok(records)
    }
}

fn repository_to_record(repo: Repository) -> Record {
    let url = repo
        .html_url
        .unwrap_or_else(|| format!("{WEB_URL}/{}", repo.full_name));
    Record::new(repo.full_name.clone())
        .with("name", repo.full_name)
        .with("url", url)
        .with_opt("owner", repo.owner.map(|o| o.login))
        .with_opt("description", repo.description)
        .with("stars", repo.stargazers_count)
        .with("forks", repo.forks_count)
        .with("open_issues", repo.open_issues_count)
        .with_opt("language", repo.language)
        .with("topics", repo.topics)
        .with_opt("updated_at", repo.updated_at)
}

fn text_of(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

fn parse_count(raw: &str) -> i64 {
    raw.chars()
        .filter(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .unwrap_or_default()
}

/// Scrape `article.Box-row` entries from a Trending page, keeping those that
/// mention any whitespace-separated term of `query`.
fn parse_trending(html: &str, web_url: &str, query: &str) -> Result<Vec<Record>, ParseError> {
    let row_sel = selector("article.Box-row")?;
    let link_sel = selector("h2 a[href]")?;
    let desc_sel = selector("p")?;
    let lang_sel = selector("[itemprop='programmingLanguage']")?;
    let stars_sel = selector("a[href$='/stargazers']")?;
    let forks_sel = selector("a[href$='/forks']")?;

    let terms: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
    let document = Html::parse_document(html);

    let mut records = Vec::new();
    for row in document.select(&row_sel) {
        let Some(href) = row
            .select(&link_sel)
            .next()
            .and_then(|a| a.value().attr("href"))
        else {
            continue;
        };
        let full_name = href.trim_matches('/').to_string();
        if full_name.is_empty() {
            continue;
        }
        let description = row.select(&desc_sel).next().map(text_of).filter(|d| !d.is_empty());

        let haystack = format!(
            "{} {}",
            full_name.to_lowercase(),
            description.as_deref().unwrap_or_default().to_lowercase()
        );
        if !terms.is_empty() && !terms.iter().any(|t| haystack.contains(t.as_str())) {
            continue;
        }

        records.push(
            Record::new(full_name.clone())
                .with("url", format!("{web_url}/{full_name}"))
                .with("name", full_name)
                .with_opt("description", description)
                .with_opt("language", row.select(&lang_sel).next().map(text_of))
                .with("stars", count_in(row, &stars_sel))
                .with("forks", count_in(row, &forks_sel))
                .with("via", "trending"),
        );
    }
    Ok(records)
}

fn count_in(row: ElementRef<'_>, sel: &Selector) -> i64 {
    row.select(sel)
        .next()
        .map(|a| parse_count(&text_of(a)))
        .unwrap_or_default()
}

#[async_trait]
impl SourceAdapter for GitHub {
    fn id(&self) -> &str {
        "github"
    }

    fn home_url(&self) -> &str {
        WEB_URL
    }

    #[instrument(level = "info", skip(self), fields(source = "github"))]
    async fn try_search(&self, query: &str, limit: usize) -> Result<Vec<Record>, SourceError> {
        match self.search_api(query, limit).await {
            Err(e) if e.is_blocked() => {
                warn!(error = %e, hint = e.hint(), "Search API blocked; falling back to Trending");
                self.search_trending(query).await
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetchSettings;
    use mockito::{Matcher, Server};

    fn adapter(base: &str, token: Option<&str>) -> GitHub {
        let fetcher = Fetcher::new(&FetchSettings::default().with_delay(0.0)).unwrap();
        GitHub::with_base_urls(fetcher, token.map(str::to_string), base, base)
    }

    const TRENDING_HTML: &str = r#"
        <html><body>
          <article class="Box-row">
            <h2 class="h3 lh-condensed"><a href="/tokio-rs/tokio"> tokio-rs / <span>tokio</span></a></h2>
            <p class="col-9">A runtime for writing reliable asynchronous applications with Rust.</p>
            <span itemprop="programmingLanguage">Rust</span>
            <a href="/tokio-rs/tokio/stargazers"> 26,512 </a>
            <a href="/tokio-rs/tokio/forks"> 2,431 </a>
          </article>
          <article class="Box-row">
            <h2><a href="/facebook/react">facebook / react</a></h2>
            <p>The library for web and native user interfaces.</p>
            <span itemprop="programmingLanguage">JavaScript</span>
          </article>
        </body></html>
    "#;

    #[tokio::test]
    async fn test_api_search_sends_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/search/repositories")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".into(), "async runtime".into()),
                Matcher::UrlEncoded("sort".into(), "stars".into()),
            ]))
            .match_header("authorization", "Bearer ghp_test")
            .with_status(200)
            .with_body(
                r#"{"total_count": 1, "items": [{"full_name": "tokio-rs/tokio",
                    "html_url": "https://github.com/tokio-rs/tokio", "description": "Async runtime",
                    "stargazers_count": 26512, "forks_count": 2431, "language": "Rust",
                    "topics": ["async", "rust"], "updated_at": "2024-05-01T00:00:00Z",
                    "owner": {"login": "tokio-rs"}}]}"#,
            )
            .create_async()
            .await;

        let records = adapter(&server.url(), Some("ghp_test"))
            .search("async runtime", 10)
            .await;
        mock.assert_async().await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source_id(), "tokio-rs/tokio");
        assert_eq!(records[0].get("stars").unwrap().as_integer(), Some(26512));
        assert_eq!(records[0].text("owner"), Some("tokio-rs"));
    }

    #[tokio::test]
    async fn test_rate_limited_api_falls_back_to_trending() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/search/repositories")
            .match_query(Matcher::Any)
            .with_status(403)
            .create_async()
            .await;
        let trending = server
            .mock("GET", "/trending")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(TRENDING_HTML)
            .create_async()
            .await;

        let records = adapter(&server.url(), None).search("rust async", 10).await;
        trending.assert_async().await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text("name"), Some("tokio-rs/tokio"));
        assert_eq!(records[0].get("stars").unwrap().as_integer(), Some(26512));
        assert_eq!(records[0].text("language"), Some("Rust"));
        assert_eq!(records[0].text("via"), Some("trending"));
    }

    #[tokio::test]
    async fn test_not_found_does_not_fall_back() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/search/repositories")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;
        let trending = server.mock("GET", "/trending").expect(0).create_async().await;

        let err = adapter(&server.url(), None)
            .try_search("rust", 10)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Fetch(_)));
        trending.assert_async().await;
    }

    #[test]
    fn test_parse_trending_without_terms_keeps_all() {
        let records = parse_trending(TRENDING_HTML, "https://github.com", "").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].text("url"), Some("https://github.com/facebook/react"));
        assert_eq!(records[1].get("stars").unwrap().as_integer(), Some(0));
    }
}
