use std::time::Duration;
use thiserror::Error;

/// Message the provider returns when the selected key no longer resolves to a
/// usable project. Treated as an expired or invalid credential.
pub const ENTITY_NOT_FOUND: &str = "Requested entity was not found";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    /// The remote call went through but returned no usable payload.
    #[error("{0}")]
    Generation(String),

    #[error("{0}")]
    Download(String),

    /// Recoverable credential failure; see [`GenerationError::is_auth_failure`].
    #[error("{0}")]
    Auth(String),

    #[error("{0}")]
    Transport(String),

    #[error("{0}")]
    Configuration(String),

    #[error("generation cancelled")]
    Cancelled,

    #[error("video generation did not finish within {0:?}")]
    TimedOut(Duration),
}

pub type Result<T> = std::result::Result<T, GenerationError>;

impl GenerationError {
    pub fn generation(msg: impl Into<String>) -> Self {
        GenerationError::Generation(msg.into())
    }

    pub fn download(msg: impl Into<String>) -> Self {
        GenerationError::Download(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        GenerationError::Transport(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        GenerationError::Configuration(msg.into())
    }

    /// Classify an error reported by the provider. Only the entity-not-found
    /// message is treated as a credential problem.
    pub fn from_remote(code: Option<u16>, message: &str) -> Self {
        if message.contains(ENTITY_NOT_FOUND) {
            return GenerationError::Auth(message.to_string());
        }
        match code {
            Some(code) => GenerationError::Transport(format!("{code}: {message}")),
            None => GenerationError::Transport(message.to_string()),
        }
    }

    /// True when the failure should trigger credential re-selection.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            GenerationError::Auth(_) => true,
            other => other.to_string().contains(ENTITY_NOT_FOUND),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            GenerationError::Generation(_) => "generation",
            GenerationError::Download(_) => "download",
            GenerationError::Auth(_) => "auth",
            GenerationError::Transport(_) => "transport",
            GenerationError::Configuration(_) => "configuration",
            GenerationError::Cancelled => "cancelled",
            GenerationError::TimedOut(_) => "timed_out",
        }
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        GenerationError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for GenerationError {
    fn from(err: serde_json::Error) -> Self {
        GenerationError::Transport(format!("invalid provider response: {err}"))
    }
}
