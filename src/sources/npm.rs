//! npm packages via the registry search endpoint.

use super::SourceAdapter;
use crate::error::SourceError;
use crate::fetcher::{FetchRequest, Fetcher};
use crate::models::Record;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

pub const BASE_URL: &str = "https://registry.npmjs.org";
pub const HOME_URL: &str = "https://www.npmjs.com";

/// The registry caps `size` at 250.
const MAX_SIZE: usize = 250;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchResponse {
    objects: Vec<SearchObject>,
    total: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchObject {
    package: Package,
    score: Score,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Package {
    name: String,
    version: Option<String>,
    description: Option<String>,
    keywords: Vec<String>,
    date: Option<String>,
    links: Links,
    publisher: Option<Publisher>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Links {
    npm: Option<String>,
    homepage: Option<String>,
    repository: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Publisher {
    username: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Score {
    #[serde(rename = "final")]
    overall: f64,
}

pub struct Npm {
    fetcher: Fetcher,
    base_url: String,
}

impl Npm {
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

fn object_to_record(object: SearchObject) -> Record {
    let package = object.package;
    let url = package
        .links
        .npm
        .unwrap_or_else(|| format!("{HOME_URL}/package/{}", package.name));
    Record::new(package.name.clone())
        .with("name", package.name)
        .with_opt("version", package.version)
        .with_opt("description", package.description)
        .with("keywords", package.keywords)
        .with("url", url)
        .with_opt("homepage", package.links.homepage)
        .with_opt("repository", package.links.repository)
        .with_opt("publisher", package.publisher.map(|p| p.username))
        .with("score", object.score.overall)
        .with_opt("date", package.date)
}

#[async_trait]
impl SourceAdapter for Npm {
    fn id(&self) -> &str {
        "npm"
    }

    fn home_url(&self) -> &str {
        HOME_URL
    }

    #[instrument(level = "info", skip(self), fields(source = "npm"))]
    async fn try_search(&self, query: &str, limit: usize) -> Result<Vec<Record>, SourceError> {
        let request = FetchRequest::get(format!("{}/-/v1/search", self.base_url))
            .query("text", query)
            .query("size", limit.min(MAX_SIZE));

        let response: SearchResponse = self.fetcher.fetch(request).await?.json()?;
        debug!(total = response.total, "npm search answered");
        Ok(response
            .objects
            .into_iter()
            .filter(|o| !o.package.name.is_empty())
            .map(object_to_record)
            .collect())
    }
}
