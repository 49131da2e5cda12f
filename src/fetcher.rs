//! Rate-limited HTTP retrieval.
//!
//! A [`Fetcher`] wraps one `reqwest::Client` and a "last request completed"
//! timestamp. Every call waits until the configured delay has elapsed since
//! the previous attempt finished, then issues exactly one request. Requests
//! from the same instance never overlap: the timer lock is held for the whole
//! attempt.
//!
//! Each source adapter owns its own fetcher, so adapters never share a timer.

use crate::error::{FetchError, ParseError};
use crate::parser::{self, ParsedDocument};
use crate::utils::truncate_for_log;
use rand::{Rng, rng};
use reqwest::{Client, Method, header::CONTENT_TYPE};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

/// Upper bound for a single request when nothing else is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Browser-like agents; one is picked per fetcher unless overridden.
pub const BROWSER_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
];

/// Pick one of [`BROWSER_USER_AGENTS`] at random.
pub fn random_user_agent() -> &'static str {
    let idx = rng().random_range(0..BROWSER_USER_AGENTS.len());
    BROWSER_USER_AGENTS[idx]
}

/// Construction parameters for a [`Fetcher`].
#[derive(Debug, Clone, PartialEq)]
pub struct FetchSettings {
    /// Minimum seconds between the end of one request and the start of the next.
    pub delay_secs: f64,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Overrides the randomly chosen browser agent.
    pub user_agent: Option<String>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            delay_secs: 1.0,
            timeout: DEFAULT_TIMEOUT,
            user_agent: None,
        }
    }
}

impl FetchSettings {
    pub fn with_delay(mut self, delay_secs: f64) -> Self {
        self.delay_secs = delay_secs;
        self
    }
}

/// One outgoing request. Built with [`FetchRequest::get`] or
/// [`FetchRequest::post_json`] and refined with the builder methods.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    method: Method,
    url: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    bearer: Option<String>,
    json: Option<serde_json::Value>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            bearer: None,
            json: None,
        }
    }

    /// A POST carrying a JSON body (e.g. a GraphQL query document).
    pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            json: Some(body),
            ..Self::get(url)
        }
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// Attach an `Authorization: Bearer` header when a token is present.
    pub fn bearer(mut self, token: Option<&str>) -> Self {
        self.bearer = token.map(str::to_string);
        self
    }
}

/// A successful (2xx) response with its body already read.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl Page {
    /// Decode the body using the response's content type as the hint.
    pub fn parse(&self) -> Result<ParsedDocument, ParseError> {
        parser::parse(&self.body, self.content_type.as_deref())
    }

    /// Decode a JSON body straight into `T`.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, ParseError> {
        parser::parse_json(&self.body).inspect_err(|e| {
            debug!(
                url = %self.url,
                error = %e,
                body = %truncate_for_log(&self.body, 200),
                "Undecodable JSON body"
            );
        })
    }
}

/// Serialized, delay-enforcing HTTP client.
#[derive(Debug)]
pub struct Fetcher {
    client: Client,
    delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl Fetcher {
    /// Build a fetcher from [`FetchSettings`].
    ///
    /// Negative or non-finite delays are treated as zero.
    pub fn new(settings: &FetchSettings) -> Result<Self, FetchError> {
        let user_agent = settings
            .user_agent
            .clone()
            .unwrap_or_else(|| random_user_agent().to_string());

        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(settings.timeout)
            .gzip(true)
            .build()
            .map_err(|e| FetchError::Transport {
                url: String::new(),
                message: format!("failed to build HTTP client: {e}"),
            })?;

        let delay = if settings.delay_secs.is_finite() && settings.delay_secs > 0.0 {
            Duration::from_secs_f64(settings.delay_secs)
        } else {
            Duration::ZERO
        };

        Ok(Self {
            client,
            delay,
            last_request: Mutex::new(None),
        })
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// GET `url` with no extra parameters.
    pub async fn get(&self, url: &str) -> Result<Page, FetchError> {
        self.fetch(FetchRequest::get(url)).await
    }

    /// Issue one request, waiting out the inter-request delay first.
    ///
    /// The completion time is recorded whether the attempt succeeded or not,
    /// so a failing request still spaces out the next one.
    #[instrument(level = "debug", skip_all, fields(url = %request.url))]
    pub async fn fetch(&self, request: FetchRequest) -> Result<Page, FetchError> {
        let mut last = self.last_request.lock().await;

        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.delay {
                let wait = self.delay - elapsed;
                debug!(wait_ms = wait.as_millis() as u64, "Waiting out request delay");
                sleep(wait).await;
            }
        }

        let result = self.send(request).await;
        *last = Some(Instant::now());

        if let Err(ref e) = result {
            warn!(error = %e, hint = e.hint(), "Fetch failed");
        }
        result
    }

    async fn send(&self, request: FetchRequest) -> Result<Page, FetchError> {
        let FetchRequest {
            method,
            url,
            query,
            headers,
            bearer,
            json,
        } = request;

        let mut builder = self.client.request(method, &url);
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = json {
            builder = builder.json(&body);
        }

        let started = Instant::now();
        let response = builder
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&url, e))?;

        let status = response.status();
        let final_url = response.url().to_string();
        debug!(
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Response received"
        );

        if !status.is_success() {
            return Err(FetchError::Status {
                url: final_url,
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(&final_url, e))?;

        Ok(Page {
            url: final_url,
            status: status.as_u16(),
            content_type,
            body,
        })
    }
}
