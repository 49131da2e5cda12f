//! Reddit via the public `.json` listing endpoints.
//!
//! Reddit answers unauthenticated API-style traffic on `www.reddit.com` with
//! 403/429 fairly often, while `old.reddit.com` serves the same JSON. Every
//! request therefore tries the primary host first and repeats once against
//! the fallback host when the primary reports a blocked status.

use super::{DEFAULT_DETAIL_REPLIES, SourceAdapter, TimeWindow};
use crate::error::{ParseError, SourceError};
use crate::fetcher::{FetchRequest, Fetcher, Page};
use crate::models::Record;
use crate::utils::truncate_chars;
use async_trait::async_trait;
use serde::Deserialize;
use std::cmp::Reverse;
use tracing::{instrument, warn};

pub const BASE_URL: &str = "https://www.reddit.com";
pub const FALLBACK_URL: &str = "https://old.reddit.com";

const TEXT_CHARS: usize = 500;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListingData {
    children: Vec<Thing>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Thing {
    kind: String,
    data: ThingData,
}

/// Union of the post (`t3`) and comment (`t1`) fields we read.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ThingData {
    id: String,
    title: Option<String>,
    subreddit: Option<String>,
    author: Option<String>,
    score: i64,
    num_comments: i64,
    permalink: Option<String>,
    url: Option<String>,
    selftext: Option<String>,
    body: Option<String>,
    created_utc: Option<f64>,
}

pub struct Reddit {
    fetcher: Fetcher,
    base_url: String,
    fallback_url: String,
    replies: usize,
    window: TimeWindow,
}

impl Reddit {
    pub fn new(fetcher: Fetcher) -> Self {
        Self::with_base_urls(fetcher, BASE_URL, FALLBACK_URL)
    }

    pub fn with_base_urls(
        fetcher: Fetcher,
        base_url: impl Into<String>,
        fallback_url: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            fallback_url: fallback_url.into().trim_end_matches('/').to_string(),
            replies: DEFAULT_DETAIL_REPLIES,
            window: TimeWindow::default(),
        }
    }

    /// Restrict search to posts from the last `window`.
    pub fn with_time_window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_replies(mut self, replies: usize) -> Self {
        self.replies = replies;
        self
    }

    /// Fetch `build(base)` from the primary host, retrying once on the
    /// fallback host if the primary is blocked.
    async fn fetch_with_fallback<F>(&self, build: F) -> Result<Page, SourceError>
    where
        F: Fn(&str) -> FetchRequest + Send + Sync,
    {
        match self.fetcher.fetch(build(&self.base_url)).await {
            Ok(page) => Ok(page),
            Err(e) if e.is_blocked() => {
                warn!(
                    status = e.status(),
                    fallback = %self.fallback_url,
                    "Primary host blocked; retrying on fallback host"
                );
                Ok(self.fetcher.fetch(build(&self.fallback_url)).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn permalink(&self, path: Option<&str>) -> Option<String> {
        path.map(|p| format!("{BASE_URL}{p}"))
    }
}

fn post_to_record(post: ThingData, permalink: Option<String>) -> Record {
    let url = post.url.filter(|u| !u.is_empty()).or_else(|| permalink.clone());
    Record::new(post.id)
        .with_opt("title", post.title)
        .with_opt("subreddit", post.subreddit)
        .with_opt("author", post.author)
        .with("score", post.score)
        .with("num_comments", post.num_comments)
        .with_opt("url", url)
        .with_opt("permalink", permalink)
        .with_opt(
            "selftext",
            post.selftext
                .filter(|t| !t.trim().is_empty())
                .map(|t| truncate_chars(&t, TEXT_CHARS)),
        )
        .with_opt("created_utc", post.created_utc)
}

fn comment_to_record(comment: ThingData) -> Record {
    Record::new(comment.id)
        .with_opt("author", comment.author)
        .with("score", comment.score)
        .with("body", truncate_chars(comment.body.as_deref().unwrap_or_default(), TEXT_CHARS))
        .with_opt("created_utc", comment.created_utc)
}

#[async_trait]
impl SourceAdapter for Reddit {
    fn id(&self) -> &str {
        "reddit"
    }

    fn home_url(&self) -> &str {
        BASE_URL
    }

    #[instrument(level = "info", skip(self), fields(source = "reddit"))]
    async fn try_search(&self, query: &str, limit: usize) -> Result<Vec<Record>, SourceError> {
        let page = self
            .fetch_with_fallback(|base| {
                FetchRequest::get(format!("{base}/search.json"))
                    .query("q", query)
                    .query("limit", limit)
                    .query("sort", "relevance")
                    .query("t", self.window.as_str())
                    .query("raw_json", 1)
            })
            .await?;

        let listing: Listing = page.json()?;
        Ok(listing
            .data
            .children
            .into_iter()
            .filter(|thing| thing.kind == "t3" && !thing.data.id.is_empty())
            .map(|thing| {
                let permalink = self.permalink(thing.data.permalink.as_deref());
                post_to_record(thing.data, permalink)
            })
            .collect())
    }

    fn supports_detail(&self) -> bool {
        true
    }

    /// Post plus its highest-scoring top-level comments under `replies`.
    async fn get_item_with_detail(&self, id: &str) -> Result<Record, SourceError> {
        let id = id.trim_start_matches("t3_");
        let page = self
            .fetch_with_fallback(|base| {
                FetchRequest::get(format!("{base}/comments/{}.json", urlencoding::encode(id)))
                    .query("raw_json", 1)
            })
            .await?;

        let mut listings: Vec<Listing> = page.json()?;
        if listings.len() < 2 {
            return Err(ParseError::Missing("post and comment listings".to_string()).into());
        }
        let comments = listings.remove(1);
        let post = listings
            .remove(0)
            .data
            .children
            .into_iter()
            .find(|thing| thing.kind == "t3")
            .ok_or_else(|| ParseError::Missing("post".to_string()))?;

        let mut top: Vec<ThingData> = comments
            .data
            .children
            .into_iter()
            .filter(|thing| thing.kind == "t1")
            .map(|thing| thing.data)
            .collect();
        top.sort_by_key(|c| Reverse(c.score));
        let replies: Vec<Record> = top
            .into_iter()
            .take(self.replies)
            .map(comment_to_record)
            .collect();

        let permalink = self.permalink(post.data.permalink.as_deref());
        Ok(post_to_record(post.data, permalink).with("replies", replies))
    }
}
