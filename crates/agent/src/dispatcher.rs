//! Tool dispatch with intervention checks between lifecycle steps.

use std::sync::Arc;

use tracing::debug;

use crate::agent::Agent;
use crate::loop_data::LoopData;
use crate::signal::{Interrupt, Step};
use crate::tool::{ToolCall, ToolRegistry};

pub struct ToolDispatcher<'a> {
    registry: &'a ToolRegistry,
}

impl<'a> ToolDispatcher<'a> {
    pub fn new(registry: &'a ToolRegistry) -> Self {
        Self { registry }
    }

    /// Run `call` through before/execute/after. An operator message arriving
    /// at any boundary abandons the rest of the lifecycle.
    pub async fn dispatch(
        &self,
        agent: &Arc<Agent>,
        loop_data: &mut LoopData,
        call: ToolCall,
    ) -> Result<Step, Interrupt> {
        let tool = self.registry.resolve(&call.name);
        debug!(agent = %agent.name(), requested = %call.name, resolved = tool.name(), "Dispatching tool");

        agent.handle_intervention(loop_data, "").await?;
        tool.before_execution(agent, &call).await?;
        agent.handle_intervention(loop_data, "").await?;
        let response = tool.execute(agent, &call).await?;
        agent.handle_intervention(loop_data, "").await?;
        tool.after_execution(agent, &call, &response).await?;
        agent.handle_intervention(loop_data, "").await?;

        if response.break_loop {
            Ok(Step::Finished(response.message))
        } else {
            Ok(Step::Continue)
        }
    }
}
