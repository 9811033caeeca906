//! Error types for bookfetch.
//!
//! Uses `thiserror` for structured error definitions. Fetch errors are
//! values the requester reduces over; only misuse escapes a run.

use thiserror::Error;

/// Error returned by a chapter source for a single fetch attempt.
#[derive(Error, Debug)]
pub enum SourceError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },

    /// Failed to parse HTML or JSON content
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// The required element isn't found in the response
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// URL parsing or templating failed
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Rate limit exceeded or server returned 429
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// The source was handed a request shape it does not understand
    #[error("Unsupported request for {source_name}: {detail}")]
    UnsupportedRequest {
        source_name: &'static str,
        detail: String,
    },

    /// The source does not implement this operation
    #[error("{0} is not supported by this source")]
    Unsupported(&'static str),

    /// A site profile has an invalid selector, pattern, or encoding
    #[error("Invalid site profile: {0}")]
    InvalidProfile(String),

    /// No built-in site or configured profile has this name
    #[error("Unknown site: {0}")]
    UnknownSite(String),
}

/// Error raised by the book requester.
#[derive(Error, Debug)]
pub enum RequesterError {
    /// Two pages of one chapter reported different titles
    #[error("Title mismatch within one chapter: expected {expected:?}, got {found:?}")]
    TitleMismatch { expected: String, found: String },

    /// The catalogue could not be fetched, so there is nothing to retry
    #[error("Failed to fetch catalogue: {0}")]
    Catalogue(#[source] SourceError),

    /// Book metadata could not be fetched
    #[error("Failed to fetch book info: {0}")]
    BookInfo(#[source] SourceError),

    /// The HTTP session could not be built from the configured headers
    #[error("Invalid session configuration: {0}")]
    Session(String),

    /// Strategy and start request do not fit together
    #[error("Strategy {strategy} needs {expected}")]
    WrongStart {
        strategy: &'static str,
        expected: &'static str,
    },
}

/// Error type for book serialization.
#[derive(Error, Debug)]
pub enum BookError {
    /// Failed to read or write a book file
    #[error("Book I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to encode or decode JSON
    #[error("Book JSON is invalid: {0}")]
    Json(#[from] serde_json::Error),

    /// Some chapters carry ids and others do not
    #[error("Chapters {0:?} have no id while others do")]
    MissingIds(Vec<usize>),
}

/// Error type for configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Invalid configuration value
    #[error("Invalid config value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Config directory not found
    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Result type alias using anyhow for application-level error handling.
pub type Result<T> = anyhow::Result<T>;
