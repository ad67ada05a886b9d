//! Error types for the tool-call harness.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using our error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness.
///
/// Only [`Error::BinaryNotFound`] is fatal to a whole run. Every other variant is caught by the
/// orchestrator and recorded against the configuration or test case that produced it.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The server binary under test does not exist
    #[error("Server binary not found: {}", path.display())]
    BinaryNotFound { path: PathBuf },

    /// The server process could not be spawned
    #[error("Failed to spawn server: {0}")]
    Spawn(String),

    /// Connection refusal, timeout or non-2xx status
    #[error("Transport error: {url}: {message}")]
    Transport { url: String, message: String },

    /// Malformed response body or stream chunk
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] Box<std::io::Error>),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] Box<serde_json::Error>),

    /// HTTP errors
    #[error("HTTP error: {0}")]
    Http(#[from] Box<reqwest::Error>),
}

impl Error {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a spawn error.
    pub fn spawn(message: impl Into<String>) -> Self {
        Self::Spawn(message.into())
    }

    /// Create a transport error.
    pub fn transport(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Whether this error came from talking to the server rather than from the harness itself.
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Protocol(_) | Self::Http(_)
        )
    }

    /// Short machine-friendly category used in result records.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::BinaryNotFound { .. } => "binary_not_found",
            Self::Spawn(_) => "spawn",
            Self::Transport { .. } => "transport",
            Self::Protocol(_) => "protocol",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Http(_) => "http",
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Box::new(value))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(Box::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(Box::new(value))
    }
}
