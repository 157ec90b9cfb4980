//! The monologue engine: agents that think in a loop until a tool ends the turn.
//!
//! An agent repeatedly:
//!
//! 1. **Assembles** a system prompt and its history (via extensions)
//! 2. **Waits** for rate-budget headroom
//! 3. **Streams** one model reply, checking for operator interventions as it goes
//! 4. **Parses** a tool request out of the reply and runs that tool
//! 5. **Stops** when the tool says so, returning the tool's message
//!
//! Agents delegate to subordinates through the `call_subordinate` tool; their
//! answers flow back up as tool results. An [`AgentContext`] owns one chain
//! plus its background task, and a [`ContextManager`] holds many contexts.

pub mod agent;
pub mod context;
pub mod delegation;
pub mod dispatcher;
pub mod extension;
pub mod extensions;
pub mod extract;
pub mod intervention;
pub mod loop_data;
pub mod manager;
pub mod rate_gate;
pub mod services;
pub mod signal;
pub mod token;
pub mod tool;
pub mod tools;

#[cfg(test)]
pub(crate) mod test_support;

pub use agent::Agent;
pub use context::{AgentContext, ContextState, TaskHandle, TaskOutcome};
pub use delegation::{broadcast_intervention, process_chain};
pub use dispatcher::ToolDispatcher;
pub use extension::{Extension, ExtensionPoint, ExtensionRegistry};
pub use extract::{ToolRequest, parse_dirty_json, parse_tool_request};
pub use loop_data::LoopData;
pub use manager::ContextManager;
pub use rate_gate::{RateGate, RateLimits, RateUsage};
pub use services::AgentServices;
pub use signal::{Interrupt, Step};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResponse};
