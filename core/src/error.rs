//! Error types for fetch operations.
//!
//! # Design
//! A single `FetchError` enum covers local validation failures (URL, method,
//! header), transport failures (connect, timeout, malformed response) and
//! misuse of a `Response` body. Non-2xx statuses are never errors: they come
//! back as an ordinary `Response` and the caller decides what they mean.
//! Nothing here is retried by the library.

use std::io;
use std::time::Duration;

/// Errors returned by request building, dispatch, and body consumption.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The URL could not be parsed as an absolute `http`/`https` URL.
    #[error("invalid URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The method is not a valid token, or is unknown while strict mode is on.
    #[error("invalid request method `{0}`")]
    InvalidMethod(String),

    /// A header name or value cannot be sent on the wire.
    #[error("invalid header `{0}`")]
    InvalidHeader(String),

    /// DNS resolution, TCP connect, or TLS setup failed.
    #[error("could not connect to {target}: {source}")]
    Connection {
        target: String,
        #[source]
        source: io::Error,
    },

    /// The request did not complete within its time budget.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The redirect chain was longer than the configured limit.
    #[error("too many redirects (limit {limit})")]
    TooManyRedirects { limit: u32 },

    /// The response body was already taken by an earlier call.
    #[error("response body already consumed")]
    BodyAlreadyConsumed,

    /// The named charset is not supported for decoding.
    #[error("unsupported charset `{0}`")]
    InvalidCharset(String),

    /// The server sent something that is not valid HTTP/1.x.
    #[error("malformed response: {0}")]
    Protocol(String),

    /// The body could not be deserialized into the requested type.
    #[error("failed to decode response body: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl FetchError {
    pub(crate) fn invalid_url(url: &str, reason: impl ToString) -> Self {
        FetchError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    /// True for errors produced before any network I/O took place.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            FetchError::InvalidUrl { .. } | FetchError::InvalidMethod(_) | FetchError::InvalidHeader(_)
        )
    }
}

/// Whether an I/O error is the result of a socket timeout expiring.
pub(crate) fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}
