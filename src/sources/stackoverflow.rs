//! Stack Overflow questions through the
//! [Stack Exchange API](https://api.stackexchange.com/docs).
//!
//! Search uses `search/advanced` sorted by relevance and follows `page`
//! numbers while the API reports `has_more`. Titles arrive HTML-escaped and
//! are decoded. An application key (`STACKEXCHANGE_KEY`) raises the daily
//! quota but is optional.

use super::{DEFAULT_DETAIL_REPLIES, SourceAdapter};
use crate::error::{ParseError, SourceError};
use crate::fetcher::{FetchRequest, Fetcher};
use crate::models::Record;
use crate::utils::{strip_html, truncate_chars};
use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use std::cmp::Reverse;
use tracing::{debug, instrument, warn};

pub const BASE_URL: &str = "https://api.stackexchange.com";
pub const HOME_URL: &str = "https://stackoverflow.com";

const SITE: &str = "stackoverflow";
const API_VERSION: &str = "2.3";
const PAGE_SIZE: usize = 30;
const MAX_PAGES: usize = 5;
const BODY_CHARS: usize = 1000;
const ANSWER_CHARS: usize = 500;

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Wrapper<T> {
    items: Vec<T>,
    has_more: bool,
    quota_remaining: Option<i64>,
}

impl<T> Default for Wrapper<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            has_more: false,
            quota_remaining: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Question {
    question_id: i64,
    title: Option<String>,
    link: Option<String>,
    score: i64,
    answer_count: i64,
    view_count: i64,
    is_answered: bool,
    tags: Vec<String>,
    creation_date: Option<i64>,
    body: Option<String>,
    owner: Option<Owner>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Answer {
    answer_id: i64,
    score: i64,
    is_accepted: bool,
    body: Option<String>,
    creation_date: Option<i64>,
    owner: Option<Owner>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Owner {
    display_name: Option<String>,
}

pub struct StackOverflow {
    fetcher: Fetcher,
    key: Option<String>,
    base_url: String,
    page_size: usize,
    replies: usize,
}

impl StackOverflow {
    pub fn new(fetcher: Fetcher, key: Option<String>) -> Self {
        Self::with_base_url(fetcher, key, BASE_URL)
    }

    pub fn with_base_url(
        fetcher: Fetcher,
        key: Option<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            page_size: PAGE_SIZE,
            replies: DEFAULT_DETAIL_REPLIES,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, 100);
        self
    }

    pub fn with_replies(mut self, replies: usize) -> Self {
        self.replies = replies;
        self
    }

    fn request(&self, path: &str) -> FetchRequest {
        let request = FetchRequest::get(format!("{}/{API_VERSION}/{path}", self.base_url))
            .query("site", SITE);
        match &self.key {
            Some(key) => request.query("key", key),
            None => request,
        }
    }

    async fn get_wrapper<T>(&self, request: FetchRequest) -> Result<Wrapper<T>, SourceError>
    where
        T: serde::de::DeserializeOwned + Send,
    {
        let wrapper: Wrapper<T> = self.fetcher.fetch(request).await?.json()?;
        if let Some(remaining) = wrapper.quota_remaining
            && remaining < 10
        {
            warn!(quota_remaining = remaining, "Stack Exchange quota nearly exhausted");
        }
        Ok(wrapper)
    }
}

fn owner_name(owner: Option<Owner>) -> Option<String> {
    owner.and_then(|o| o.display_name).map(|n| strip_html(&n))
}

fn question_to_record(question: Question) -> Record {
    let id = question.question_id.to_string();
    let url = question
        .link
        .unwrap_or_else(|| format!("{HOME_URL}/questions/{id}"));
    Record::new(id)
        .with_opt("title", question.title.map(|t| strip_html(&t)))
        .with("url", url)
        .with("score", question.score)
        .with("answer_count", question.answer_count)
        .with("view_count", question.view_count)
        .with("is_answered", question.is_answered)
        .with("tags", question.tags)
        .with_opt("author", owner_name(question.owner))
        .with_opt(
            "creation_date",
            question.creation_date.and_then(|secs| DateTime::from_timestamp(secs, 0)),
        )
}

fn answer_to_record(answer: Answer) -> Record {
    Record::new(answer.answer_id.to_string())
        .with("score", answer.score)
        .with("is_accepted", answer.is_accepted)
        .with(
            "body",
            truncate_chars(&strip_html(answer.body.as_deref().unwrap_or_default()), ANSWER_CHARS),
        )
        .with_opt("author", owner_name(answer.owner))
        .with_opt(
            "creation_date",
            answer.creation_date.and_then(|secs| DateTime::from_timestamp(secs, 0)),
        )
}

#[async_trait]
impl SourceAdapter for StackOverflow {
    fn id(&self) -> &str {
        "stackoverflow"
    }

    fn home_url(&self) -> &str {
        HOME_URL
    }

    #[instrument(level = "info", skip(self), fields(source = "stackoverflow"))]
    async fn try_search(&self, query: &str, limit: usize) -> Result<Vec<Record>, SourceError> {
        let page_size = self.page_size.min(limit.max(1));
        let mut records = Vec::with_capacity(limit);

        for page in 1..=MAX_PAGES {
            let request = self
                .request("search/advanced")
                .query("q", query)
                .query("order", "desc")
                .query("sort", "relevance")
                .query("pagesize", page_size)
                .query("page", page);

            let wrapper: Wrapper<Question> = self.get_wrapper(request).await?;
            debug!(
                page,
                fetched = wrapper.items.len(),
                has_more = wrapper.has_more,
                "Fetched question page"
            );

            records.extend(wrapper.items.into_iter().map(question_to_record));
            if records.len() >= limit || !wrapper.has_more {
                break;
            }
        }

        records.truncate(limit);
        Ok(records)
    }

    fn supports_detail(&self) -> bool {
        true
    }

    /// Question with its body plus the highest-voted answers under `replies`.
    async fn get_item_with_detail(&self, id: &str) -> Result<Record, SourceError> {
        let id = urlencoding::encode(id).into_owned();

        let questions: Wrapper<Question> = self
            .get_wrapper(self.request(&format!("questions/{id}")).query("filter", "withbody"))
            .await?;
        let mut question = questions
            .items
            .into_iter()
            .next()
            .ok_or_else(|| ParseError::Missing(format!("question {id}")))?;

        let answers: Wrapper<Answer> = self
            .get_wrapper(
                self.request(&format!("questions/{id}/answers"))
                    .query("order", "desc")
                    .query("sort", "votes")
                    .query("filter", "withbody"),
            )
            .await?;

        let mut answers = answers.items;
        answers.sort_by_key(|a| Reverse(a.score));
        let replies: Vec<Record> = answers
            .into_iter()
            .take(self.replies)
            .map(answer_to_record)
            .collect();

        let body = question
            .body
            .take()
            .map(|html| truncate_chars(&strip_html(&html), BODY_CHARS));
        Ok(question_to_record(question)
            .with_opt("body", body)
            .with("replies", replies))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use crate::fetcher::FetchSettings;

    fn adapter(base: String, key: Option<&str>) -> StackOverflow {
        let fetcher = Fetcher::new(&FetchSettings::default().with_delay(0.0)).unwrap();
        StackOverflow::with_base_url(fetcher, key.map(str::to_string), base)
    }

    fn questions(ids: std::ops::Range<i64>, has_more: bool) -> String {
        let items: Vec<String> = ids
            .map(|id| {
                format!(r#"{{"question_id": {id}, "title": "Q{id} &amp; more", "score": {id}}}"#)
            })
            .collect();
        format!(
            r#"{{"items": [{}], "has_more": {has_more}, "quota_remaining": 290}}"#,
            items.join(",")
        )
    }

    #[tokio::test]
    async fn test_search_decodes_and_sends_key() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/2.3/search/advanced")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".into(), "borrow checker".into()),
                Matcher::UrlEncoded("site".into(), "stackoverflow".into()),
                Matcher::UrlEncoded("key".into(), "k3y".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"items": [{"question_id": 7, "title": "Why can&#39;t I borrow?",
                    "link": "https://stackoverflow.com/questions/7/why", "score": 12,
                    "answer_count": 2, "is_answered": true, "tags": ["rust"],
                    "creation_date": 1714564800, "owner": {"display_name": "Jos&#233;"}}],
                    "has_more": false}"#,
            )
            .create_async()
            .await;

        let records = adapter(server.url(), Some("k3y")).search("borrow checker", 10).await;
        mock.assert_async().await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text("title"), Some("Why can't I borrow?"));
        assert_eq!(records[0].text("author"), Some("José"));
        assert_eq!(
            records[0].get("creation_date").unwrap().as_timestamp(),
            DateTime::from_timestamp(1714564800, 0)
        );
    }

    #[tokio::test]
    async fn test_pages_while_has_more() {
        let mut server = Server::new_async().await;
        let p1 = server
            .mock("GET", "/2.3/search/advanced")
            .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
            .with_status(200)
            .with_body(questions(1..3, true))
            .create_async()
            .await;
        let p2 = server
            .mock("GET", "/2.3/search/advanced")
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_status(200)
            .with_body(questions(3..5, false))
            .create_async()
            .await;

        let records = adapter(server.url(), None)
            .with_page_size(2)
            .search("rust", 10)
            .await;
        p1.assert_async().await;
        p2.assert_async().await;

        let ids: Vec<&str> = records.iter().map(|r| r.source_id()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4"]);
        assert_eq!(records[0].text("title"), Some("Q1 & more"));
    }

    #[tokio::test]
    async fn test_detail_orders_answers_by_votes() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/2.3/questions/7")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"items": [{"question_id": 7, "title": "Why?", "body": "<p>Long story</p>"}]}"#,
            )
            .create_async()
            .await;
        server
            .mock("GET", "/2.3/questions/7/answers")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"items": [
                    {"answer_id": 1, "score": 3, "body": "<p>meh</p>"},
                    {"answer_id": 2, "score": 40, "is_accepted": true, "body": "<p>Use <code>Rc</code></p>"},
                    {"answer_id": 3, "score": 10, "body": "<p>ok</p>"}
                ]}"#,
            )
            .create_async()
            .await;

        let detail = adapter(server.url(), None)
            .with_replies(2)
            .get_item_with_detail("7")
            .await
            .unwrap();

        assert_eq!(detail.text("body"), Some("Long story"));
        let replies = detail.get("replies").unwrap().as_records().unwrap();
        let ids: Vec<&str> = replies.iter().map(|r| r.source_id()).collect();
        assert_eq!(ids, vec!["2", "3"]);
        assert_eq!(replies[0].text("body"), Some("Use Rc"));
    }

    #[tokio::test]
    async fn test_missing_question_is_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/2.3/questions/99")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"items": []}"#)
            .create_async()
            .await;

        let err = adapter(server.url(), None)
            .get_item_with_detail("99")
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Parse(ParseError::Missing(_))));
    }
}
