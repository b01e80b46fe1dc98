//! Error types for suno-export
//!
//! This module provides the error taxonomy shared by every pipeline stage:
//! - Credential errors (missing or stale bearer token)
//! - Remote API errors carrying the HTTP status and response body
//! - Conversion errors for each phase of the WAV conversion protocol
//! - Transfer and filesystem errors raised while materializing files

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for suno-export operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for suno-export
#[derive(Debug, Error)]
pub enum Error {
    /// No credential has been captured, or the remote API rejected it
    ///
    /// This is the only error that aborts a whole export session: no further
    /// request can succeed until the token is captured again.
    #[error("not authenticated: {reason}")]
    NotAuthenticated {
        /// Why the credential is unusable
        reason: String,
    },

    /// Non-2xx response from a workspace or feed endpoint
    #[error("remote API error: HTTP {status}: {body}")]
    RemoteApi {
        /// HTTP status code
        status: u16,
        /// Response body (may be empty)
        body: String,
    },

    /// The conversion request for a clip was rejected
    #[error("WAV conversion could not be started for {clip_id}: HTTP {status}: {body}")]
    ConversionInitiation {
        /// Clip whose conversion failed to start
        clip_id: String,
        /// HTTP status code
        status: u16,
        /// Response body (may be empty)
        body: String,
    },

    /// A conversion status query failed with something other than "not ready yet"
    #[error("WAV status check failed for {clip_id}: HTTP {status}: {body}")]
    ConversionPoll {
        /// Clip being polled
        clip_id: String,
        /// HTTP status code
        status: u16,
        /// Response body (may be empty)
        body: String,
    },

    /// The WAV artifact never became ready within the polling budget
    #[error(
        "WAV conversion timeout for {clip_id} after {attempts} attempts ({}s)",
        total_wait_ms / 1000
    )]
    ConversionTimeout {
        /// Clip being polled
        clip_id: String,
        /// Number of status queries issued
        attempts: u32,
        /// Total time spent waiting between queries
        total_wait_ms: u64,
    },

    /// Non-2xx response while fetching audio bytes
    #[error("transfer of {url} failed: HTTP {status}")]
    Transfer {
        /// Source URL of the artifact
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// The clip has no rendered MP3 to transfer
    #[error("clip {clip_id} has no audio URL")]
    MissingAudio {
        /// Clip without audio
        clip_id: String,
    },

    /// Cancellation was requested while the operation was waiting
    #[error("cancelled")]
    Cancelled,

    /// Writing to the local filesystem failed (disk full, permissions, ...)
    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        /// Path being written or created
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Network error (connection refused, timeout, TLS, ...)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Response or credential file could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configured URL is malformed
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "download.mp3_pacing")
        key: Option<String>,
    },
}

impl Error {
    /// Build a filesystem error for `path`
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Build a configuration error tied to a specific key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// Whether this error must abort the whole export session
    ///
    /// Every other error is recorded against the item (or workspace) that
    /// raised it and the session moves on.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Error::NotAuthenticated { .. })
    }

    /// Whether this error reports a cancellation rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::RemoteApi { status, .. }
            | Error::ConversionInitiation { status, .. }
            | Error::ConversionPoll { status, .. }
            | Error::Transfer { status, .. } => Some(*status),
            Error::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
