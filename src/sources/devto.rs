//! Dev.to articles through the [Forem API](https://developers.forem.com/api).
//!
//! Dev.to has no full-text search endpoint, so the query is turned into a
//! tag (`"Web Assembly"` → `webassembly`) and articles are listed by tag,
//! page by page, until `limit` is reached or a short page signals the end.

use super::{DEFAULT_DETAIL_REPLIES, SourceAdapter};
use crate::error::SourceError;
use crate::fetcher::{FetchRequest, Fetcher};
use crate::models::Record;
use crate::utils::{slugify_title, strip_html, truncate_chars};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

pub const BASE_URL: &str = "https://dev.to";

const PAGE_SIZE: usize = 30;
const MAX_PAGES: usize = 5;
const TEXT_CHARS: usize = 500;
const BODY_CHARS: usize = 1000;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Article {
    id: i64,
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    published_at: Option<String>,
    tag_list: TagList,
    positive_reactions_count: i64,
    comments_count: i64,
    reading_time_minutes: i64,
    body_markdown: Option<String>,
    user: Option<User>,
}

/// Listings return tags as an array, single-article lookups as a
/// comma-separated string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TagList {
    List(Vec<String>),
    Joined(String),
}

impl Default for TagList {
    fn default() -> Self {
        TagList::List(Vec::new())
    }
}

impl TagList {
    fn into_vec(self) -> Vec<String> {
        match self {
            TagList::List(tags) => tags,
            TagList::Joined(joined) => joined
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct User {
    username: String,
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Comment {
    id_code: String,
    body_html: Option<String>,
    created_at: Option<String>,
    user: Option<User>,
}

pub struct DevTo {
    fetcher: Fetcher,
    base_url: String,
    page_size: usize,
    replies: usize,
}

impl DevTo {
    pub fn new(fetcher: Fetcher) -> Self {
        Self::with_base_url(fetcher, BASE_URL)
    }

    pub fn with_base_url(fetcher: Fetcher, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            page_size: PAGE_SIZE,
            replies: DEFAULT_DETAIL_REPLIES,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_replies(mut self, replies: usize) -> Self {
        self.replies = replies;
        self
    }
}

/// Dev.to tags are lowercase alphanumerics only.
pub fn query_to_tag(query: &str) -> String {
    slugify_title(query).replace('-', "")
}

fn article_to_record(article: Article) -> Record {
    Record::new(article.id.to_string())
        .with_opt("title", article.title)
        .with_opt("description", article.description)
        .with_opt("url", article.url)
        .with_opt("author", article.user.map(|u| u.username))
        .with("tags", article.tag_list.into_vec())
        .with("reactions", article.positive_reactions_count)
        .with("comments_count", article.comments_count)
        .with("reading_time_minutes", article.reading_time_minutes)
        .with_opt("published_at", article.published_at)
}

fn comment_to_record(comment: Comment) -> Record {
    let body = comment
        .body_html
        .map(|html| truncate_chars(&strip_html(&html), TEXT_CHARS))
        .unwrap_or_default();
    Record::new(comment.id_code)
        .with_opt("author", comment.user.map(|u| u.name.unwrap_or(u.username)))
        .with("body", body)
        .with_opt("created_at", comment.created_at)
}

#[async_trait]
impl SourceAdapter for DevTo {
    fn id(&self) -> &str {
        "devto"
    }

    fn home_url(&self) -> &str {
        BASE_URL
    }

    #[instrument(level = "info", skip(self), fields(source = "devto"))]
    async fn try_search(&self, query: &str, limit: usize) -> Result<Vec<Record>, SourceError> {
        let tag = query_to_tag(query);
        if tag.is_empty() {
            debug!("Query has no tag characters; skipping request");
            return Ok(Vec::new());
        }
        let per_page = self.page_size.min(limit.max(1));
        let mut records = Vec::with_capacity(limit);

        for page in 1..=MAX_PAGES {
            let request = FetchRequest::get(format!("{}/api/articles", self.base_url))
                .query("tag", &tag)
                .query("per_page", per_page)
                .query("page", page);

            let articles: Vec<Article> = self.fetcher.fetch(request).await?.json()?;
            let fetched = articles.len();
            debug!(page, fetched, "Fetched article page");

            records.extend(articles.into_iter().map(article_to_record));
            if records.len() >= limit || fetched < per_page {
                break;
            }
        }

        records.truncate(limit);
        Ok(records)
    }

    fn supports_detail(&self) -> bool {
        true
    }

    /// Article with its body plus the first comments (API order) under
    /// `replies`.
    async fn get_item_with_detail(&self, id: &str) -> Result<Record, SourceError> {
        let id = urlencoding::encode(id).into_owned();
        let mut article: Article = self
            .fetcher
            .get(&format!("{}/api/articles/{id}", self.base_url))
            .await?
            .json()?;

        let comments: Vec<Comment> = self
            .fetcher
            .fetch(FetchRequest::get(format!("{}/api/comments", self.base_url)).query("a_id", &id))
            .await?
            .json()?;

        let body = article
            .body_markdown
            .take()
            .map(|md| truncate_chars(&md, BODY_CHARS));
        let replies: Vec<Record> = comments
            .into_iter()
            .take(self.replies)
            .map(comment_to_record)
            .collect();

        Ok(article_to_record(article)
            .with_opt("body", body)
            .with("replies", replies))
    }
}
