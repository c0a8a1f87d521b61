//! Error types for the VLC remote-control client

use std::time::Duration;

/// Result type alias for remote-control operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to the player's web interface
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The player could not be reached (connection refused, reset, DNS...)
    #[error("Could not connect to VLC at {url}: {reason}")]
    Connectivity { url: String, reason: String },

    /// The round-trip exceeded the configured timeout
    #[error("VLC did not answer within {0:?}")]
    Timeout(Duration),

    /// The player answered with a non-success HTTP status
    #[error("VLC rejected '{command}' (HTTP {status}): {body}")]
    Rejected {
        command: String,
        status: u16,
        body: String,
    },

    /// Command name outside the supported vocabulary
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Missing or malformed command parameter
    #[error("Invalid parameter for '{command}': {reason}")]
    InvalidParameter { command: String, reason: String },

    /// The response body could not be decoded
    #[error("Failed to decode VLC response: {0}")]
    Decode(String),

    /// The HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Client(String),
}

impl Error {
    /// Create an invalid parameter error
    pub fn invalid_parameter(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            command: command.into(),
            reason: reason.into(),
        }
    }

    /// `true` when the player is unreachable or too slow to answer
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity { .. } | Self::Timeout(_))
    }

    /// `true` when the request never left the client because it was malformed
    pub fn is_invalid_request(&self) -> bool {
        matches!(self, Self::UnknownCommand(_) | Self::InvalidParameter { .. })
    }

    pub(crate) fn from_reqwest(err: reqwest::Error, url: &str, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else if err.is_builder() {
            Self::Client(err.to_string())
        } else if err.is_decode() || err.is_body() {
            Self::Decode(err.to_string())
        } else {
            Self::Connectivity {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }
}
