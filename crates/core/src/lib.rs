//! # Monologue Core
//!
//! Domain types, collaborator traits, and error definitions for the monologue
//! agent engine. The engine crate drives these; implementations of the
//! model-call and prompt backends plug in from outside.
//!
//! ## Collaborators
//!
//! - [`Provider`]: the model-call backend (whole or streamed replies)
//! - [`PromptRenderer`]: template lookup and rendering
//! - [`ContextLog`]: structured operator-facing log sink
//! - [`History`]: topic-segmented conversation record

pub mod agent;
pub mod error;
pub mod history;
pub mod log;
pub mod message;
pub mod prompt;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use agent::{AgentConfig, ModelConfig};
pub use error::{Error, PromptError, ProviderError, Result, ToolError, error_chain};
pub use history::{History, HistoryMessage, MessageContent, OutputMessage};
pub use log::{ContextLog, LogItem, LogKind};
pub use message::{Message, Role};
pub use prompt::{PromptOutput, PromptRenderer, TemplatePrompts};
pub use provider::{ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage};
