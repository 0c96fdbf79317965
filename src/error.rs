//! Error types for API requests.
//!
//! Errors fall into two groups. Runtime failures are delivered to a request's
//! failure listeners and each maps onto an [`ErrorKind`]. Construction errors
//! (bad URLs, bad key paths, bad headers) are returned directly from builders
//! and never reach a listener.

use http::{HeaderMap, StatusCode};
use url::Url;

/// The main error type for API requests.
///
/// # Examples
///
/// ```
/// use courier::{Error, ErrorKind};
///
/// let err = Error::BadJsonKey { path: "data.items".to_string() };
/// assert_eq!(err.kind(), Some(ErrorKind::BadJsonKey));
/// assert_eq!(err.key_path(), Some("data.items"));
/// assert_eq!(err.reason(), "Bad JSON path key: data.items");
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A key-path segment did not resolve to a key in a JSON object.
    #[error("Bad JSON path key: {path}")]
    BadJsonKey {
        /// The full dotted path that was being resolved
        path: String,
    },

    /// The configured host was not reachable and no cached response existed.
    #[error("Unreachable host: {host}")]
    UnreachableServer {
        /// The host the client is configured for
        host: String,
    },

    /// The transport completed without returning a body.
    #[error("No data returned for request")]
    EmptyResponseBody,

    /// The server answered with a 4xx or 5xx status.
    ///
    /// The raw body and headers are kept for debugging.
    #[error("HTTP error {status}: {raw_response}")]
    BadHttpStatus {
        /// The HTTP status code
        status: StatusCode,
        /// The raw response body
        raw_response: String,
        /// The response headers
        headers: HeaderMap,
        /// The URL the response came from
        url: Url,
    },

    /// A network-level error occurred (connection failed, TLS, timeout, etc.).
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The body was not JSON, or its shape could not be turned into records.
    #[error("Failed to decode response: {serde_error}")]
    JsonDecode {
        /// The raw response body that failed to decode
        raw_response: String,
        /// The decoder's error message
        serde_error: String,
    },

    /// An invalid URL was provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A dotted key path contained an empty segment.
    #[error("Invalid key path {path:?}: empty segment")]
    InvalidKeyPath {
        /// The rejected path
        path: String,
    },

    /// Invalid configuration was provided.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Failed to serialize the upload body.
    #[error("Failed to serialize request: {0}")]
    SerializationFailed(String),
}

/// The runtime failure taxonomy.
///
/// Every error delivered to a failure listener has exactly one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Key-path lookup failed.
    BadJsonKey,
    /// Host unreachable and nothing cached.
    UnreachableServer,
    /// No body in the response.
    EmptyResponseBody,
    /// 4xx or 5xx status.
    BadHttpStatus,
    /// Network or TLS failure passed through from the transport.
    Transport,
    /// Malformed body.
    JsonDecode,
}

impl Error {
    /// Returns the runtime kind of this error, or `None` for construction errors.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::BadJsonKey { .. } => Some(ErrorKind::BadJsonKey),
            Error::UnreachableServer { .. } => Some(ErrorKind::UnreachableServer),
            Error::EmptyResponseBody => Some(ErrorKind::EmptyResponseBody),
            Error::BadHttpStatus { .. } => Some(ErrorKind::BadHttpStatus),
            Error::Transport(_) => Some(ErrorKind::Transport),
            Error::JsonDecode { .. } => Some(ErrorKind::JsonDecode),
            Error::InvalidUrl(_)
            | Error::InvalidKeyPath { .. }
            | Error::ConfigurationError(_)
            | Error::SerializationFailed(_) => None,
        }
    }

    /// A human-readable reason for the failure.
    pub fn reason(&self) -> String {
        self.to_string()
    }

    /// Returns the HTTP status code for `BadHttpStatus` errors.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::BadHttpStatus { status, .. } => Some(*status),
            Error::Transport(e) => e.status(),
            _ => None,
        }
    }

    /// Returns the raw response body if this error has one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::BadHttpStatus { raw_response, .. } => Some(raw_response),
            Error::JsonDecode { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }

    /// Returns the offending key path for `BadJsonKey` errors.
    pub fn key_path(&self) -> Option<&str> {
        match self {
            Error::BadJsonKey { path } => Some(path),
            _ => None,
        }
    }

    /// Returns `true` if the transport gave up because the request timed out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Transport(e) if e.is_timeout())
    }
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
