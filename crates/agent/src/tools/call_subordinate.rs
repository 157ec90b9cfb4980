use std::sync::Arc;

use async_trait::async_trait;
use monologue_core::ToolError;
use tracing::info;

use crate::agent::Agent;
use crate::signal::Interrupt;
use crate::tool::{Tool, ToolCall, ToolResponse};

/// Hands a subtask to a subordinate agent and waits for its answer.
///
/// The subordinate is kept between calls so follow-ups share its history.
/// `reset: true` replaces it with a fresh one.
pub struct CallSubordinateTool;

#[async_trait]
impl Tool for CallSubordinateTool {
    fn name(&self) -> &str {
        "call_subordinate"
    }

    fn description(&self) -> &str {
        "Delegate a subtask to a subordinate agent. Args: message, reset (optional bool)"
    }

    async fn execute(&self, agent: &Arc<Agent>, call: &ToolCall) -> Result<ToolResponse, Interrupt> {
        let message = call.arg_str("message").ok_or_else(|| {
            ToolError::InvalidArguments("call_subordinate requires a string 'message' argument".into())
        })?;
        let reset = call.arg_bool("reset").unwrap_or(false);

        let subordinate = match agent.last_subordinate() {
            Some(existing) if !reset => existing,
            _ => agent.spawn_subordinate(),
        };
        info!(
            agent = %agent.name(),
            subordinate = %subordinate.name(),
            reset,
            "Delegating to subordinate"
        );

        subordinate.hist_add_user_message(message, false)?;
        // Failures are logged by the subordinate already; stop this chain too.
        let answer = subordinate.monologue().await?;
        Ok(ToolResponse::reply(answer))
    }
}
