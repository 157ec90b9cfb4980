use std::sync::Arc;

use async_trait::async_trait;
use monologue_core::{LogKind, ToolError};
use tracing::info;

use crate::agent::Agent;
use crate::signal::Interrupt;
use crate::tool::{Tool, ToolCall, ToolResponse};

/// Ends the turn with the `text` argument as the agent's answer.
pub struct ResponseTool;

#[async_trait]
impl Tool for ResponseTool {
    fn name(&self) -> &str {
        "response"
    }

    fn description(&self) -> &str {
        "Deliver the final answer to whoever asked. Args: text"
    }

    async fn before_execution(&self, agent: &Arc<Agent>, call: &ToolCall) -> Result<(), Interrupt> {
        agent.log().log(
            LogKind::Agent,
            format!("{}: Responding", agent.name()),
            call.arg_str("text").unwrap_or_default(),
            serde_json::Map::new(),
        );
        Ok(())
    }

    async fn execute(&self, agent: &Arc<Agent>, call: &ToolCall) -> Result<ToolResponse, Interrupt> {
        let text = call
            .arg_str("text")
            .ok_or_else(|| ToolError::InvalidArguments("response requires a string 'text' argument".into()))?;
        info!(agent = %agent.name(), chars = text.len(), "Responding");
        Ok(ToolResponse::finish(text))
    }

    // The answer leaves the loop as the monologue result, not as history.
    async fn after_execution(
        &self,
        _agent: &Arc<Agent>,
        _call: &ToolCall,
        _response: &ToolResponse,
    ) -> Result<(), Interrupt> {
        Ok(())
    }
}
