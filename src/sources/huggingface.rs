//! Hugging Face Hub models and datasets, most downloaded first.
//!
//! Results are split between the two listings, each record tagged with its
//! `kind`. When one listing runs short the other fills the remaining slots. A
//! failed dataset listing only costs the datasets.
//!
//! `HF_TOKEN` is sent as a bearer token when set; anonymous access works for
//! public repos.

use super::SourceAdapter;
use crate::error::SourceError;
use crate::fetcher::{FetchRequest, Fetcher};
use crate::models::Record;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{instrument, warn};

pub const BASE_URL: &str = "https://huggingface.co";

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Model {
    id: String,
    author: Option<String>,
    downloads: i64,
    likes: i64,
    tags: Vec<String>,
    #[serde(rename = "pipeline_tag")]
    pipeline_tag: Option<String>,
    #[serde(rename = "library_name")]
    library_name: Option<String>,
    last_modified: Option<String>,
    created_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Dataset {
    id: String,
    author: Option<String>,
    downloads: i64,
    likes: i64,
    tags: Vec<String>,
    last_modified: Option<String>,
    created_at: Option<String>,
}

pub struct HuggingFace {
    fetcher: Fetcher,
    token: Option<String>,
    base_url: String,
}

impl HuggingFace {
    pub fn new(fetcher: Fetcher, token: Option<String>) -> Self {
        Self::with_base_url(fetcher, token, BASE_URL)
    }

    pub fn with_base_url(
        fetcher: Fetcher,
        token: Option<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            token,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn datasets(&self, query: &str, limit: usize) -> Result<Vec<Record>, SourceError> {
        let datasets: Vec<Dataset> = self
            .fetcher
            .fetch(self.listing("datasets", query, limit))
            .await?
            .json()?;
        Ok(datasets
            .into_iter()
            .filter(|d| !d.id.is_empty())
            .map(dataset_to_record)
            .collect())
    }

    fn listing(&self, path: &str, query: &str, limit: usize) -> FetchRequest {
        FetchRequest::get(format!("{}/api/{path}", self.base_url))
            .query("search", query)
            .query("limit", limit)
            .query("sort", "downloads")
            .query("direction", -1)
            .bearer(self.token.as_deref())
    }
}

/// Half the slots go to datasets, the rest to models, and either side
/// backfills what the other could not use.
fn merge_listings(models: Vec<Record>, datasets: Vec<Record>, limit: usize) -> Vec<Record> {
    let dataset_share = (limit / 2).min(datasets.len());
    let model_share = (limit - dataset_share).min(models.len());
    let dataset_share = (limit - model_share).min(datasets.len());
    models
        .into_iter()
        .take(model_share)
        .chain(datasets.into_iter().take(dataset_share))
        .collect()
}

fn owner_of(id: &str) -> Option<String> {
    id.split_once('/').map(|(owner, _)| owner.to_string())
}

fn model_to_record(model: Model) -> Record {
    // Ids are "owner/name"; older models have no owner segment.
    let author = model.author.or_else(|| owner_of(&model.id));
    Record::new(model.id.clone())
        .with("kind", "model")
        .with("url", format!("{BASE_URL}/{}", model.id))
        .with("name", model.id)
        .with_opt("author", author)
        .with("downloads", model.downloads)
        .with("likes", model.likes)
        .with_opt("pipeline_tag", model.pipeline_tag)
        .with_opt("library", model.library_name)
        .with("tags", model.tags)
        .with_opt("last_modified", model.last_modified)
        .with_opt("created_at", model.created_at)
}

fn dataset_to_record(dataset: Dataset) -> Record {
    let author = dataset.author.or_else(|| owner_of(&dataset.id));
    Record::new(format!("datasets/{}", dataset.id))
        .with("kind", "dataset")
        .with("url", format!("{BASE_URL}/datasets/{}", dataset.id))
        .with("name", dataset.id)
        .with_opt("author", author)
        .with("downloads", dataset.downloads)
        .with("likes", dataset.likes)
        .with("tags", dataset.tags)
        .with_opt("last_modified", dataset.last_modified)
        .with_opt("created_at", dataset.created_at)
}

#[async_trait]
impl SourceAdapter for HuggingFace {
    fn id(&self) -> &str {
        "huggingface"
    }

    fn home_url(&self) -> &str {
        BASE_URL
    }

    #[instrument(level = "info", skip(self), fields(source = "huggingface"))]
    async fn try_search(&self, query: &str, limit: usize) -> Result<Vec<Record>, SourceError> {
        let models: Vec<Model> = self
            .fetcher
            .fetch(self.listing("models", query, limit))
            .await?
            .json()?;
        let models = models
            .into_iter()
            .filter(|m| !m.id.is_empty())
            .map(model_to_record)
            .collect();

        let datasets = match self.datasets(query, limit).await {
            Ok(datasets) => datasets,
            Err(e) => {
                warn!(error = %e, "Dataset listing failed; keeping models only");
                Vec::new()
            }
        };

        Ok(merge_listings(models, datasets, limit))
    }
}
