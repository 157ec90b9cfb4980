//! Moving work and messages along a superior/subordinate chain.

use std::sync::Arc;

use monologue_core::Error;
use tracing::debug;

use crate::agent::Agent;

/// Run `message` through `agent`, then hand each answer up to the superior
/// as a `call_subordinate` result until the top of the chain answers.
///
/// Every error returned here has already been logged.
pub async fn process_chain(agent: Arc<Agent>, message: String) -> Result<String, Error> {
    let mut agent = agent;
    let mut message = message;
    let mut from_user = true;

    loop {
        let added = if from_user {
            agent.hist_add_user_message(&message, false)
        } else {
            agent.hist_add_tool_result("call_subordinate", &message)
        };
        if let Err(err) = added {
            return Err(agent.handle_critical(err));
        }

        let response = agent.monologue().await?;
        let Some(superior) = agent.superior() else {
            return Ok(response);
        };

        debug!(from = %agent.name(), to = %superior.name(), "Passing answer to superior");
        agent = superior;
        message = response;
        from_user = false;
    }
}

/// Set `message` as the pending intervention on `start` and up to
/// `broadcast_level - 1` of its superiors. `None` reaches the whole chain.
///
/// Returns how many agents received it.
pub fn broadcast_intervention(start: &Arc<Agent>, message: &str, broadcast_level: Option<usize>) -> usize {
    let mut remaining = broadcast_level;
    let mut current = Some(start.clone());
    let mut reached = 0;

    while let Some(agent) = current {
        if remaining == Some(0) {
            break;
        }
        agent.set_intervention(message);
        reached += 1;
        remaining = remaining.map(|n| n - 1);
        current = agent.superior();
    }
    reached
}
