use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::agent::Agent;
use crate::signal::Interrupt;
use crate::tool::{Tool, ToolCall, ToolResponse};

/// Stands in for any name the registry doesn't know. Tells the model what it
/// can call instead.
pub struct UnknownTool;

#[async_trait]
impl Tool for UnknownTool {
    fn name(&self) -> &str {
        "unknown"
    }

    fn description(&self) -> &str {
        "Fallback for unrecognized tool names"
    }

    async fn execute(&self, agent: &Arc<Agent>, call: &ToolCall) -> Result<ToolResponse, Interrupt> {
        warn!(agent = %agent.name(), tool = %call.name, "Model requested an unknown tool");
        let tools = agent.services().tools.names().join(", ");
        let message = agent.read_prompt("fw.tool_not_found", &[("tool_name", call.name.as_str()), ("tools", tools.as_str())])?;
        Ok(ToolResponse::reply(message))
    }
}
