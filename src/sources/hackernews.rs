//! Hacker News via the [Algolia search API](https://hn.algolia.com/api).
//!
//! Search hits the `search` endpoint restricted to stories created within the
//! configured [`TimeWindow`]. The detail lookup
//! pulls `items/{id}`, which returns the whole comment tree; only the first
//! top-level comments are kept, in the order the API returns them.

use super::{DEFAULT_DETAIL_REPLIES, SourceAdapter, TimeWindow};
use crate::error::SourceError;
use crate::fetcher::{FetchRequest, Fetcher};
use crate::models::Record;
use crate::utils::{strip_html, truncate_chars};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, instrument};

pub const BASE_URL: &str = "https://hn.algolia.com";
pub const HOME_URL: &str = "https://news.ycombinator.com";

const COMMENT_CHARS: usize = 500;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchResponse {
    hits: Vec<Hit>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Hit {
    #[serde(rename = "objectID")]
    object_id: String,
    title: Option<String>,
    url: Option<String>,
    author: Option<String>,
    points: Option<i64>,
    num_comments: Option<i64>,
    created_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Item {
    id: i64,
    title: Option<String>,
    url: Option<String>,
    author: Option<String>,
    points: Option<i64>,
    text: Option<String>,
    created_at: Option<String>,
    children: Vec<Item>,
}

pub struct HackerNews {
    fetcher: Fetcher,
    base_url: String,
    replies: usize,
    window: TimeWindow,
}

impl HackerNews {
    pub fn new(fetcher: Fetcher) -> Self {
        Self::with_base_url(fetcher, BASE_URL)
    }

    pub fn with_base_url(fetcher: Fetcher, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            replies: DEFAULT_DETAIL_REPLIES,
            window: TimeWindow::default(),
        }
    }

    pub fn with_time_window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_replies(mut self, replies: usize) -> Self {
        self.replies = replies;
        self
    }
}

/// Algolia numeric filter keeping stories newer than `now - window`.
fn recency_filter(window: TimeWindow, now: DateTime<Utc>) -> String {
    format!("created_at_i>{}", (now - window.duration()).timestamp())
}

fn item_url(id: &str) -> String {
    format!("{HOME_URL}/item?id={id}")
}

fn hit_to_record(hit: Hit) -> Record {
    let discussion = item_url(&hit.object_id);
    let url = hit.url.filter(|u| !u.is_empty()).unwrap_or_else(|| discussion.clone());
    Record::new(hit.object_id)
        .with_opt("title", hit.title)
        .with("url", url)
        .with("discussion_url", discussion)
        .with_opt("author", hit.author)
        .with("points", hit.points.unwrap_or_default())
        .with("num_comments", hit.num_comments.unwrap_or_default())
        .with_opt("created_at", hit.created_at)
}

fn comment_to_record(comment: Item) -> Option<Record> {
    let text = strip_html(comment.text.as_deref()?);
    if text.is_empty() {
        return None;
    }
    Some(
        Record::new(comment.id.to_string())
            .with_opt("author", comment.author)
            .with("text", truncate_chars(&text, COMMENT_CHARS))
            .with_opt("created_at", comment.created_at),
    )
}

#[async_trait]
impl SourceAdapter for HackerNews {
    fn id(&self) -> &str {
        "hackernews"
    }

    fn home_url(&self) -> &str {
        HOME_URL
    }

    #[instrument(level = "info", skip(self), fields(source = "hackernews"))]
    async fn try_search(&self, query: &str, limit: usize) -> Result<Vec<Record>, SourceError> {
        let request = FetchRequest::get(format!("{}/api/v1/search", self.base_url))
            .query("query", query)
            .query("tags", "story")
            .query("numericFilters", recency_filter(self.window, Utc::now()))
            .query("hitsPerPage", limit);

        let response: SearchResponse = self.fetcher.fetch(request).await?.json()?;
        debug!(hits = response.hits.len(), "Decoded Algolia hits");

        Ok(response
            .hits
            .into_iter()
            .filter(|hit| !hit.object_id.is_empty())
            .map(hit_to_record)
            .collect())
    }

    fn supports_detail(&self) -> bool {
        true
    }

    /// Story plus its first top-level comments (API order) under `replies`.
    async fn get_item_with_detail(&self, id: &str) -> Result<Record, SourceError> {
        let url = format!("{}/api/v1/items/{}", self.base_url, urlencoding::encode(id));
        let item: Item = self.fetcher.get(&url).await?.json()?;

        let replies: Vec<Record> = item
            .children
            .into_iter()
            .filter_map(comment_to_record)
            .take(self.replies)
            .collect();

        let id = item.id.to_string();
        Ok(Record::new(id.clone())
            .with_opt("title", item.title)
            .with("url", item.url.unwrap_or_else(|| item_url(&id)))
            .with_opt("author", item.author)
            .with("points", item.points.unwrap_or_default())
            .with_opt("text", item.text.map(|t| truncate_chars(&strip_html(&t), COMMENT_CHARS)))
            .with_opt("created_at", item.created_at)
            .with("replies", replies))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetchSettings;
    use mockito::{Matcher, Server};

    fn adapter(base: String) -> HackerNews {
        let fetcher = Fetcher::new(&FetchSettings::default().with_delay(0.0)).unwrap();
        HackerNews::with_base_url(fetcher, base)
    }

    const SEARCH_BODY: &str = r#"{
        "hits": [
            {"objectID": "101", "title": "Rust 1.80 released", "url": "https://blog.rust-lang.org/2024/07/25/Rust-1.80.0.html",
             "author": "steveklabnik", "points": 512, "num_comments": 210, "created_at": "2024-07-25T15:00:00.000Z"},
            {"objectID": "102", "title": "Ask HN: Learning Rust?", "url": null,
             "author": "newbie", "points": null, "num_comments": 3, "created_at": "2024-07-26T09:30:00.000Z"}
        ]
    }"#;

    #[tokio::test]
    async fn test_search_maps_hits() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/search")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("query".into(), "rust".into()),
                Matcher::UrlEncoded("tags".into(), "story".into()),
                Matcher::UrlEncoded("hitsPerPage".into(), "10".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(SEARCH_BODY)
            .create_async()
            .await;

        let records = adapter(server.url()).search("rust", 10).await;
        mock.assert_async().await;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].source_id(), "101");
        assert_eq!(records[0].text("title"), Some("Rust 1.80 released"));
        assert_eq!(records[0].get("points").unwrap().as_integer(), Some(512));
        // Text posts link to their own discussion page.
        assert_eq!(
            records[1].text("url"),
            Some("https://news.ycombinator.com/item?id=102")
        );
        assert_eq!(records[1].get("points").unwrap().as_integer(), Some(0));
    }

    #[test]
    fn test_recency_filter_covers_window() {
        let now = DateTime::parse_from_rfc3339("2024-08-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            recency_filter(TimeWindow::Month, now),
            format!("created_at_i>{}", now.timestamp() - 2_592_000)
        );
        assert_eq!(
            recency_filter(TimeWindow::Day, now),
            format!("created_at_i>{}", now.timestamp() - 86_400)
        );
    }

    #[tokio::test]
    async fn test_search_sends_recency_filter() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/search")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("query".into(), "rust".into()),
                Matcher::Regex(r"numericFilters=created_at_i(%3E|>)\d+".into()),
            ]))
            .with_status(200)
            .with_body(SEARCH_BODY)
            .create_async()
            .await;

        let records = adapter(server.url())
            .with_time_window(TimeWindow::Week)
            .search("rust", 5)
            .await;
        mock.assert_async().await;
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_limit_keeps_backend_order() {
        let hits: Vec<String> = (0..50)
            .map(|i| format!(r#"{{"objectID": "{i}", "title": "story {i}"}}"#))
            .collect();
        let body = format!(r#"{{"hits": [{}]}}"#, hits.join(","));

        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v1/search")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let records = adapter(server.url()).search("rust", 5).await;
        let ids: Vec<&str> = records.iter().map(|r| r.source_id()).collect();
        assert_eq!(ids, vec!["0", "1", "2", "3", "4"]);
    }

    #[tokio::test]
    async fn test_repeated_search_is_stable() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v1/search")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(SEARCH_BODY)
            .expect(2)
            .create_async()
            .await;

        let hn = adapter(server.url());
        let first = hn.search("rust", 10).await;
        let second = hn.search("rust", 10).await;

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.source_id(), b.source_id());
            assert_eq!(a.fields(), b.fields());
        }
    }

    #[tokio::test]
    async fn test_retrieved_at_within_call() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v1/search")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(SEARCH_BODY)
            .create_async()
            .await;

        let start = chrono::Utc::now();
        let records = adapter(server.url()).search("rust", 10).await;
        let end = chrono::Utc::now();

        assert!(!records.is_empty());
        for record in &records {
            assert!(record.retrieved_at() >= start && record.retrieved_at() <= end);
        }
    }

    #[tokio::test]
    async fn test_malformed_json_is_parse_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v1/search")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("{not json")
            .create_async()
            .await;

        let hn = adapter(server.url());
        let err = hn.try_search("rust", 10).await.unwrap_err();
        assert!(matches!(err, SourceError::Parse(_)));
        assert!(hn.search("rust", 10).await.is_empty());
    }

    #[tokio::test]
    async fn test_detail_keeps_first_comments() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v1/items/101")
            .with_status(200)
            .with_body(
                r#"{
                    "id": 101, "title": "Rust 1.80 released", "url": "https://blog.rust-lang.org/x",
                    "author": "steveklabnik", "points": 512, "created_at": "2024-07-25T15:00:00.000Z",
                    "children": [
                        {"id": 1, "author": "a", "text": "<p>LazyCell &amp; LazyLock!</p>", "created_at": "2024-07-25T15:05:00.000Z"},
                        {"id": 2, "author": null, "text": null},
                        {"id": 3, "author": "b", "text": "Nice"},
                        {"id": 4, "author": "c", "text": "Great"}
                    ]
                }"#,
            )
            .create_async()
            .await;

        let hn = adapter(server.url()).with_replies(2);
        assert!(hn.supports_detail());
        let detail = hn.get_item_with_detail("101").await.unwrap();

        let replies = detail.get("replies").unwrap().as_records().unwrap();
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].text("text"), Some("LazyCell & LazyLock!"));
        assert_eq!(replies[1].source_id(), "3");
    }
}
