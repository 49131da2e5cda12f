//! crates.io packages via the public crates API.
//!
//! crates.io asks API clients to identify themselves; the fetcher's
//! User-Agent covers that.

use super::SourceAdapter;
use crate::error::SourceError;
use crate::fetcher::{FetchRequest, Fetcher};
use crate::models::Record;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::instrument;

pub const BASE_URL: &str = "https://crates.io";

/// Largest `per_page` the API accepts.
const MAX_PER_PAGE: usize = 100;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CratesResponse {
    crates: Vec<Crate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Crate {
    id: String,
    name: String,
    description: Option<String>,
    max_version: Option<String>,
    max_stable_version: Option<String>,
    downloads: i64,
    recent_downloads: Option<i64>,
    repository: Option<String>,
    homepage: Option<String>,
    documentation: Option<String>,
    keywords: Option<Vec<String>>,
    created_at: Option<String>,
    updated_at: Option<String>,
}

pub struct CratesIo {
    fetcher: Fetcher,
    base_url: String,
}

impl CratesIo {
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

fn crate_to_record(krate: Crate) -> Record {
    let id = if krate.id.is_empty() { krate.name.clone() } else { krate.id };
    Record::new(id)
        .with("url", format!("{BASE_URL}/crates/{}", krate.name))
        .with("name", krate.name)
        .with_opt("description", krate.description.map(|d| d.trim().to_string()))
        .with_opt("version", krate.max_stable_version.or(krate.max_version))
        .with("downloads", krate.downloads)
        .with_opt("recent_downloads", krate.recent_downloads)
        .with_opt("repository", krate.repository)
        .with_opt("homepage", krate.homepage)
        .with_opt("documentation", krate.documentation)
        .with("keywords", krate.keywords.unwrap_or_default())
        .with_opt("created_at", krate.created_at)
        .with_opt("updated_at", krate.updated_at)
}

#[async_trait]
impl SourceAdapter for CratesIo {
    fn id(&self) -> &str {
        "cratesio"
    }

    fn home_url(&self) -> &str {
        BASE_URL
    }

    #[instrument(level = "info", skip(self), fields(source = "cratesio"))]
    async fn try_search(&self, query: &str, limit: usize) -> Result<Vec<Record>, SourceError> {
        let request = FetchRequest::get(format!("{}/api/v1/crates", self.base_url))
            .query("q", query)
            .query("per_page", limit.min(MAX_PER_PAGE))
            .query("sort", "relevance");

        let response: CratesResponse = self.fetcher.fetch(request).await?.json()?;
        Ok(response
            .crates
            .into_iter()
            .filter(|c| !c.name.is_empty())
            .map(crate_to_record)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetchSettings;
    use mockito::{Matcher, Server};

    #[tokio::test]
    async fn test_search_maps_crates() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/crates")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".into(), "http client".into()),
                Matcher::UrlEncoded("per_page".into(), "100".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"crates": [
                    {"id": "reqwest", "name": "reqwest", "description": " higher level HTTP client\n",
                     "max_version": "0.13.0-rc.1", "max_stable_version": "0.12.24", "downloads": 300000000,
                     "recent_downloads": 40000000, "repository": "https://github.com/seanmonstar/reqwest",
                     "keywords": ["http", "request", "client"], "updated_at": "2024-10-01T00:00:00.000000+00:00"},
                    {"id": "ureq", "name": "ureq", "downloads": 1, "keywords": null}
                ], "meta": {"total": 2}}"#,
            )
            .create_async()
            .await;

        let fetcher = Fetcher::new(&FetchSettings::default().with_delay(0.0)).unwrap();
        let records = CratesIo::with_base_url(fetcher, server.url())
            .search("http client", 500)
            .await;
        mock.assert_async().await;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].text("version"), Some("0.12.24"));
        assert_eq!(records[0].text("description"), Some("higher level HTTP client"));
        assert_eq!(records[0].text("url"), Some("https://crates.io/crates/reqwest"));
        assert!(records[1].get("version").is_none());
    }
}
