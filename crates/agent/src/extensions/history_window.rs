use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::agent::Agent;
use crate::extension::Extension;
use crate::loop_data::LoopData;
use crate::signal::Interrupt;
use crate::token::estimate_tokens;

/// Per-message overhead, matching `estimate_message_tokens`.
const MESSAGE_OVERHEAD: usize = 4;

/// Drops the oldest rendered history entries until they fit the model's
/// `ctx_length`. The newest entry is always kept. Stored history is untouched.
pub struct HistoryWindow;

#[async_trait]
impl Extension for HistoryWindow {
    fn name(&self) -> &str {
        "history_window"
    }

    async fn execute(&self, agent: &Arc<Agent>, loop_data: &mut LoopData) -> Result<(), Interrupt> {
        let budget = agent.config().chat_model.ctx_length;
        if budget == 0 {
            return Ok(());
        }

        let cost = |content: &str| estimate_tokens(content) + MESSAGE_OVERHEAD;
        let mut total: usize = loop_data.history_output.iter().map(|m| cost(&m.content)).sum();
        let mut dropped = 0;
        while total > budget && loop_data.history_output.len() - dropped > 1 {
            total -= cost(&loop_data.history_output[dropped].content);
            dropped += 1;
        }

        if dropped > 0 {
            loop_data.history_output.drain(..dropped);
            debug!(agent = %agent.name(), dropped, remaining_tokens = total, "Trimmed history to fit context");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::agent_with_config;
    use monologue_core::{AgentConfig, OutputMessage};

    fn output(contents: &[&str]) -> Vec<OutputMessage> {
        contents
            .iter()
            .map(|c| OutputMessage {
                ai: false,
                content: c.to_string(),
            })
            .collect()
    }

    fn config(ctx_length: usize) -> AgentConfig {
        let mut config = AgentConfig::default();
        config.chat_model.ctx_length = ctx_length;
        config
    }

    #[tokio::test]
    async fn drops_oldest_first() {
        // 40 chars -> 10 tokens + 4 overhead = 14 each
        let entry = "x".repeat(40);
        let (agent, _) = agent_with_config(vec![], config(30));
        let mut data = LoopData {
            history_output: output(&[&entry, &entry, "newest"]),
            ..LoopData::default()
        };
        HistoryWindow.execute(&agent, &mut data).await.unwrap();
        assert_eq!(data.history_output.len(), 2);
        assert_eq!(data.history_output[1].content, "newest");
    }

    #[tokio::test]
    async fn keeps_the_last_entry_even_when_oversized() {
        let (agent, _) = agent_with_config(vec![], config(5));
        let mut data = LoopData {
            history_output: output(&["old", &"y".repeat(400)]),
            ..LoopData::default()
        };
        HistoryWindow.execute(&agent, &mut data).await.unwrap();
        assert_eq!(data.history_output.len(), 1);
    }

    #[tokio::test]
    async fn zero_budget_disables_trimming() {
        let (agent, _) = agent_with_config(vec![], config(0));
        let mut data = LoopData {
            history_output: output(&[&"z".repeat(4000), "b"]),
            ..LoopData::default()
        };
        HistoryWindow.execute(&agent, &mut data).await.unwrap();
        assert_eq!(data.history_output.len(), 2);
    }
}
