//! Model-call backends for monologue.
//!
//! All providers implement the `monologue_core::Provider` trait.
//! The router selects the chat model's provider based on configuration.

pub mod openai_compat;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderRouter, build_from_config};
