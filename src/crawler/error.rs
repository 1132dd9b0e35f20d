use thiserror::Error;

use crate::crawler::models::ValidationError;

/// A single page or detail fetch went wrong. Never fatal to a run.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("timed out after {secs}s: {what}")]
    Timeout { what: String, secs: u64 },

    #[error("invalid url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("no document loaded in this page")]
    NoDocument,

    #[error("rendering session is closed")]
    SessionClosed,

    #[error("{0}")]
    Other(String),
}

impl FetchError {
    pub fn from_reqwest(url: &str, err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                what: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            FetchError::Http {
                url: url.to_string(),
                source: err,
            }
        }
    }
}

/// Run-wide failures. Everything per page or per candidate is absorbed before it gets here.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("failed to start rendering session: {0}")]
    SessionStart(#[source] FetchError),

    #[error("invalid detail link pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("crawl aborted: {0}")]
    Fatal(String),
}
