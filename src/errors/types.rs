//! Error type definitions for playlist ingestion
//!
//! All error types are `Clone` so that a failure can be delivered both as the
//! return value of a load and as the terminal event on the event stream.

use thiserror::Error;

use crate::utils::url::UrlUtils;

/// Transport level failures, split so the UI collaborator can tell the user
/// whether the server is slow, unreachable or answering with an error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// Connect or read timeout
    #[error("Connection timeout: {url}")]
    Timeout { url: String },

    /// DNS failure, refused connection, TLS failure
    #[error("Host unreachable: {url} - {message}")]
    Unreachable { url: String, message: String },

    /// Non-2xx status from the server
    #[error("HTTP error: {status} - {url}")]
    Server { status: u16, url: String },

    /// The body stream broke after the response started
    #[error("Transfer interrupted: {url} - {message}")]
    Transfer { url: String, message: String },

    /// The request could not be built (bad URL, bad header)
    #[error("Invalid request: {url} - {message}")]
    InvalidRequest { url: String, message: String },
}

impl NetworkError {
    /// Classify a reqwest error. The URL is masked before it is stored.
    pub fn from_reqwest(err: &reqwest::Error, url: &str) -> Self {
        let url = UrlUtils::obfuscate_credentials(url);
        let message = UrlUtils::obfuscate_credentials(&err.to_string());

        if err.is_timeout() {
            Self::Timeout { url }
        } else if let Some(status) = err.status() {
            Self::Server {
                status: status.as_u16(),
                url,
            }
        } else if err.is_connect() {
            Self::Unreachable { url, message }
        } else if err.is_builder() {
            Self::InvalidRequest { url, message }
        } else if err.is_body() || err.is_decode() {
            Self::Transfer { url, message }
        } else {
            Self::Unreachable { url, message }
        }
    }

    /// Whether this failure was a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Playlist load failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    /// Network failures while resolving or downloading the playlist
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Stream read or temp-file write failures
    #[error("I/O error during {operation}: {message}")]
    Io { operation: String, message: String },

    /// Durable cache could not be replaced or removed
    #[error("Cache error: {message}")]
    Cache { message: String },

    /// The playlist URL could not be resolved
    #[error("Playlist locator error: {message}")]
    Locator { message: String },

    /// A newer load superseded this one
    #[error("Load cancelled")]
    Cancelled,

    /// The download completed but contained no channels
    #[error("Playlist contained no channels")]
    EmptyPlaylist,

    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl IngestError {
    /// Create an I/O error for the named operation
    pub fn io<O: Into<String>>(operation: O, err: &std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            message: err.to_string(),
        }
    }

    /// Create a cache error
    pub fn cache<S: Into<String>>(message: S) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    /// Create a locator error
    pub fn locator<S: Into<String>>(message: S) -> Self {
        Self::Locator {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Whether this failure came from a newer load taking over
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Program guide failures. None of these stop channel browsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EpgError {
    /// Network failures while downloading the guide
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Corrupt compressed stream
    #[error("Decompression failed: {message}")]
    Decompression { message: String },

    /// Compressed with a format this build cannot decode
    #[error("Unsupported compression: {format}")]
    UnsupportedCompression { format: String },

    /// Malformed XML document
    #[error("XML parsing error: {message}")]
    Xml { message: String },

    /// Worker thread failures
    #[error("I/O error: {message}")]
    Io { message: String },
}

impl EpgError {
    /// Create an XML error
    pub fn xml<S: Into<String>>(message: S) -> Self {
        Self::Xml {
            message: message.into(),
        }
    }
}
