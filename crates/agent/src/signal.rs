//! Loop control signals.
//!
//! Every fallible step inside the monologue returns `Result<T, Interrupt>`.
//! The loop driver dispatches on the variant instead of unwinding:
//!
//! - `Intervened`: an operator message was recorded; restart the attempt
//! - `Repairable`: show the model a warning and keep going
//! - `Fatal`: log once, wrap as handled, terminate the task

use monologue_core::{Error, PromptError, ProviderError, ToolError};

#[derive(Debug, thiserror::Error)]
pub enum Interrupt {
    #[error("intervention")]
    Intervened,

    #[error("{0}")]
    Repairable(String),

    #[error(transparent)]
    Fatal(#[from] Error),
}

impl Interrupt {
    pub fn repairable(message: impl Into<String>) -> Self {
        Interrupt::Repairable(message.into())
    }
}

impl From<ToolError> for Interrupt {
    fn from(err: ToolError) -> Self {
        Interrupt::Repairable(err.to_string())
    }
}

impl From<ProviderError> for Interrupt {
    fn from(err: ProviderError) -> Self {
        Interrupt::Fatal(err.into())
    }
}

impl From<PromptError> for Interrupt {
    fn from(err: PromptError) -> Self {
        Interrupt::Fatal(err.into())
    }
}

/// What one inner-loop iteration decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Keep iterating
    Continue,
    /// A tool ended the turn with this message
    Finished(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_errors_are_repairable() {
        let interrupt: Interrupt = ToolError::InvalidArguments("missing text".into()).into();
        match interrupt {
            Interrupt::Repairable(msg) => assert!(msg.contains("missing text")),
            other => panic!("expected repairable, got {other:?}"),
        }
    }

    #[test]
    fn provider_errors_are_fatal() {
        let interrupt: Interrupt = ProviderError::Timeout("slow".into()).into();
        assert!(matches!(interrupt, Interrupt::Fatal(Error::Provider(_))));
    }
}
