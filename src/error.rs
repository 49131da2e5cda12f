//! Error taxonomy shared by the fetcher, parser, adapters and aggregator.
//!
//! Failures are typed values up to the adapter boundary:
//!
//! - [`FetchError`]: the request produced no usable response (timeout,
//!   transport failure) or the server answered with a non-success status.
//! - [`ParseError`]: the payload could not be decoded into the expected
//!   structure.
//! - [`SourceError`]: what an adapter's fallible operations return.
//! - [`ResearchError`]: the only failures a research run can surface.
//!
//! Missing individual fields inside an otherwise valid document are not
//! errors; adapters resolve them with defaults.

use crate::parser::ContentKind;
use thiserror::Error;

/// A single HTTP attempt that did not yield a successful response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The request did not complete within the fetcher's timeout.
    #[error("request to {url} timed out")]
    Timeout { url: String },

    /// The server responded, but with a non-2xx status code.
    #[error("{url} responded with HTTP {status}")]
    Status { url: String, status: u16 },

    /// Connection, DNS, TLS or body-read failure.
    #[error("transport error for {url}: {message}")]
    Transport { url: String, message: String },
}

impl FetchError {
    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else {
            FetchError::Transport {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }

    /// The HTTP status, when the server responded at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// `true` for responses that signal the client is not allowed through
    /// (401, 403, 429). Adapters with a secondary path switch on this.
    pub fn is_blocked(&self) -> bool {
        matches!(self.status(), Some(401 | 403 | 429))
    }

    pub fn is_server_error(&self) -> bool {
        matches!(self.status(), Some(500..=599))
    }

    /// `true` when no response was received.
    pub fn is_no_response(&self) -> bool {
        matches!(
            self,
            FetchError::Timeout { .. } | FetchError::Transport { .. }
        )
    }

    /// Short human-readable context for log lines.
    pub fn hint(&self) -> &'static str {
        match self {
            FetchError::Timeout { .. } => "no response (timeout)",
            FetchError::Transport { .. } => "no response",
            FetchError::Status { status, .. } => status_hint(*status),
        }
    }
}

fn status_hint(status: u16) -> &'static str {
    match status {
        401 => "authentication required",
        403 => "blocked",
        404 => "not found",
        429 => "rate limited",
        500..=599 => "server error",
        _ => "unexpected status",
    }
}

/// A payload that could not be decoded into the structure a caller expected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty payload")]
    Empty,

    #[error("malformed JSON: {0}")]
    Json(String),

    #[error("malformed XML: {0}")]
    Xml(String),

    #[error("expected a {expected} document, found {found}")]
    UnexpectedKind {
        expected: ContentKind,
        found: ContentKind,
    },

    #[error("invalid selector `{0}`")]
    Selector(String),

    /// A structurally required part of the document is absent.
    #[error("document has no {0}")]
    Missing(String),
}

impl From<serde_json::Error> for ParseError {
    fn from(err: serde_json::Error) -> Self {
        ParseError::Json(err.to_string())
    }
}

impl From<quick_xml::Error> for ParseError {
    fn from(err: quick_xml::Error) -> Self {
        ParseError::Xml(err.to_string())
    }
}

/// Result of an adapter operation before it is flattened at the
/// [`search`](crate::sources::SourceAdapter::search) boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("{source_id} does not support {operation}")]
    Unsupported {
        source_id: String,
        operation: &'static str,
    },
}

impl SourceError {
    /// Log context for the failure, see [`FetchError::hint`].
    pub fn hint(&self) -> &'static str {
        match self {
            SourceError::Fetch(e) => e.hint(),
            SourceError::Parse(_) => "unparseable response",
            SourceError::Unsupported { .. } => "unsupported",
        }
    }

    /// `true` when the underlying fetch was refused (401, 403, 429).
    pub fn is_blocked(&self) -> bool {
        matches!(self, SourceError::Fetch(e) if e.is_blocked())
    }
}

/// Failures of a research run as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResearchError {
    #[error("research query must not be empty")]
    EmptyQuery,

    #[error("a source with id `{0}` is already registered")]
    DuplicateSource(String),
}

/// Failures loading a [`ResearchConfig`](crate::config::ResearchConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unknown source `{0}`")]
    UnknownSource(String),

    #[error("could not build HTTP client: {0}")]
    Client(#[from] FetchError),
}
