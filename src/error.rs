//! Error types for howto.

use thiserror::Error;

/// Result type alias using [`HowtoError`].
pub type Result<T> = std::result::Result<T, HowtoError>;

/// Errors that can occur while generating a command.
#[derive(Error, Debug)]
pub enum HowtoError {
    /// Config file missing or unreadable.
    #[error("Configuration error: {0}")]
    Config(String),

    /// API key missing or malformed.
    #[error("Credential error: {0}")]
    Credential(String),

    /// Conversation state could not be read or written.
    #[error("State storage error: {0}")]
    Storage(String),

    /// Transport failure: connection refused, timeout, TLS.
    #[error("Network error: {0}. Check your OpenAI API key (`howto --config` to inspect, `howto --setup` to change it).")]
    Network(String),

    /// Well-formed response without any completion.
    #[error("The API returned no completions. Did you set a valid OpenAI API key with remaining quota? (`howto --config` to inspect, `howto --setup` to change it)")]
    EmptyResponse,

    /// Response body did not match the expected shape.
    #[error("Unexpected API response: {0}")]
    InvalidResponse(String),

    /// Caller misuse, e.g. an empty prompt.
    #[error("{0}")]
    Usage(String),
}

impl HowtoError {
    pub fn storage(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Storage(format!("{}: {}", context, err))
    }

    pub fn config(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Config(format!("{}: {}", context, err))
    }

    /// Whether the caller may recover interactively (re-run setup, reset state).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, HowtoError::Config(_) | HowtoError::Storage(_))
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        1
    }
}

impl From<reqwest::Error> for HowtoError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            HowtoError::Network(format!("request timed out ({})", e))
        } else {
            HowtoError::Network(e.to_string())
        }
    }
}
