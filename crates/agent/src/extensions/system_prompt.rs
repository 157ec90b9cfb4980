use std::sync::Arc;

use async_trait::async_trait;

use crate::agent::Agent;
use crate::extension::Extension;
use crate::loop_data::LoopData;
use crate::signal::Interrupt;

/// Adds the main role prompt and the tool list to the system fragments.
pub struct SystemPrompt;

#[async_trait]
impl Extension for SystemPrompt {
    fn name(&self) -> &str {
        "system_prompt"
    }

    async fn execute(&self, agent: &Arc<Agent>, loop_data: &mut LoopData) -> Result<(), Interrupt> {
        let main = agent.read_prompt("agent.system.main", &[("agent_name", agent.name())])?;
        let tools = agent.services().tools.describe();
        let tools = agent.read_prompt("agent.system.tools", &[("tools", tools.as_str())])?;
        loop_data.system.push(main);
        loop_data.system.push(tools);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::agent_with;

    #[tokio::test]
    async fn pushes_role_and_tools() {
        let (agent, _) = agent_with(vec![]);
        let mut data = LoopData::default();
        SystemPrompt.execute(&agent, &mut data).await.unwrap();
        assert_eq!(data.system.len(), 2);
        assert!(data.system[0].contains("Agent 0"));
        assert!(data.system[1].contains("- call_subordinate:"));
        assert!(data.system[1].contains("- response:"));
    }
}
