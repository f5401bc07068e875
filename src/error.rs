//! Error types shared across the crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while probing, calibrating, and extracting.
#[derive(Error, Debug)]
pub enum Error {
    /// DNS, connect, TLS, or read failure. Retried by the requester before
    /// being surfaced.
    #[error("transport error: {0}")]
    Transport(String),

    /// The per-request timer expired before the response was read.
    #[error("request timed out")]
    Timeout,

    /// The request template or a probe payload could not be turned into a
    /// well-formed HTTP request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The request template has no `<PAYLOAD>`, `<FUZZ>`, or `<INJECT>`
    /// marker.
    #[error("no injection marker found in request")]
    MarkerMissing,

    /// Calibration produced indistinguishable TRUE and FALSE responses.
    #[error("cannot differentiate TRUE from FALSE responses")]
    OracleUnclear,

    /// No engine probe pair matched the calibrated fingerprints.
    #[error("could not detect database type")]
    DetectionFailed,

    /// No dialect is available for the requested engine.
    #[error("unsupported database type: {0}")]
    UnsupportedDatabase(String),

    /// Every version query failed without recovering a single character.
    #[error("could not extract version")]
    VersionUnavailable,

    /// A probe failed mid-string; `value` holds everything extracted before
    /// the failure.
    #[error("extraction incomplete after {} chars: {source}", value.len())]
    Partial {
        value: String,
        #[source]
        source: Box<Error>,
    },

    /// Host cache read or write failed. Never fatal; the cache is an
    /// optimization.
    #[error("cache i/o error: {0}")]
    CacheIo(String),
}

impl Error {
    /// The partially extracted value carried by a `Partial` error, if any.
    pub fn partial_value(&self) -> Option<&str> {
        match self {
            Error::Partial { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Wrap an error in `Partial`, keeping whatever was extracted so far.
    /// An empty prefix is returned unwrapped.
    pub fn with_partial(self, value: String) -> Error {
        if value.is_empty() {
            self
        } else {
            Error::Partial {
                value,
                source: Box::new(self),
            }
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout
        } else {
            Error::Transport(err.to_string())
        }
    }
}
