//! Error types for the monologue domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all monologue operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Prompt errors ---
    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The context task was cancelled while the loop was running.
    #[error("Task cancelled")]
    Cancelled,

    /// Terminal marker: the wrapped error was already logged and reported.
    ///
    /// Never wrapped twice; loop frames further up pass it through untouched.
    #[error("{0}")]
    Handled(Box<Error>),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap into the terminal marker unless already wrapped.
    pub fn into_handled(self) -> Self {
        match self {
            Error::Handled(_) => self,
            other => Error::Handled(Box::new(other)),
        }
    }

    pub fn is_handled(&self) -> bool {
        matches!(self, Error::Handled(_))
    }

    /// True when this error (or the error it wraps) is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled => true,
            Error::Handled(inner) => inner.is_cancelled(),
            _ => false,
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Render an error and its `source()` chain, one cause per line.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str("\n  caused by: ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Tool failures. All of these are reported back to the model so it can
/// correct the call.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Clone, Error)]
pub enum PromptError {
    #[error("Prompt template not found: {0}")]
    NotFound(String),

    #[error("Failed to read prompt template {name}: {reason}")]
    ReadFailed { name: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn handled_is_never_double_wrapped() {
        let err = Error::Internal("boom".into()).into_handled();
        let again = err.into_handled();
        match again {
            Error::Handled(inner) => assert!(matches!(*inner, Error::Internal(_))),
            other => panic!("expected handled marker, got {other:?}"),
        }
    }

    #[test]
    fn cancellation_seen_through_marker() {
        assert!(Error::Cancelled.into_handled().is_cancelled());
        assert!(!Error::Internal("x".into()).into_handled().is_cancelled());
    }

    #[test]
    fn chain_includes_sources() {
        let err = Error::Tool(ToolError::InvalidArguments("missing text".into()));
        let text = error_chain(&err);
        assert!(text.starts_with("Tool error"));
        assert!(text.contains("caused by: Invalid tool arguments: missing text"));
    }
}
