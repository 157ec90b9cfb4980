//! Extension hooks around the monologue.
//!
//! Extensions run in registration order at four fixed points. They can
//! mutate the loop data (usually `system` or `history_output`) and can end
//! the attempt by returning an `Interrupt`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use crate::agent::Agent;
use crate::extensions::{HistoryWindow, SystemPrompt};
use crate::loop_data::LoopData;
use crate::signal::Interrupt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtensionPoint {
    /// Once per outer pass, before the first iteration
    MonologueStart,
    /// Every iteration, before the system prompt is joined
    MessageLoopPrompts,
    /// After every iteration, whatever its outcome
    MessageLoopEnd,
    /// After the monologue returns or restarts
    MonologueEnd,
}

impl ExtensionPoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtensionPoint::MonologueStart => "monologue_start",
            ExtensionPoint::MessageLoopPrompts => "message_loop_prompts",
            ExtensionPoint::MessageLoopEnd => "message_loop_end",
            ExtensionPoint::MonologueEnd => "monologue_end",
        }
    }
}

impl fmt::Display for ExtensionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait Extension: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, agent: &Arc<Agent>, loop_data: &mut LoopData) -> Result<(), Interrupt>;
}

#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    hooks: HashMap<ExtensionPoint, Vec<Arc<dyn Extension>>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// System prompt assembly followed by history trimming.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(ExtensionPoint::MessageLoopPrompts, Arc::new(SystemPrompt));
        registry.register(ExtensionPoint::MessageLoopPrompts, Arc::new(HistoryWindow));
        registry
    }

    pub fn register(&mut self, point: ExtensionPoint, extension: Arc<dyn Extension>) {
        self.hooks.entry(point).or_default().push(extension);
    }

    pub fn count(&self, point: ExtensionPoint) -> usize {
        self.hooks.get(&point).map_or(0, Vec::len)
    }

    /// Run every extension at `point` in order, stopping at the first interrupt.
    pub async fn run(
        &self,
        point: ExtensionPoint,
        agent: &Arc<Agent>,
        loop_data: &mut LoopData,
    ) -> Result<(), Interrupt> {
        for extension in self.hooks.get(&point).into_iter().flatten() {
            trace!(point = %point, extension = extension.name(), "Running extension");
            extension.execute(agent, loop_data).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::agent_with;
    use std::sync::Mutex;

    struct Record {
        label: &'static str,
        seen: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Extension for Record {
        fn name(&self) -> &str {
            self.label
        }

        async fn execute(&self, _agent: &Arc<Agent>, loop_data: &mut LoopData) -> Result<(), Interrupt> {
            self.seen.lock().unwrap().push(self.label);
            loop_data.system.push(self.label.to_string());
            Ok(())
        }
    }

    struct Stop;

    #[async_trait]
    impl Extension for Stop {
        fn name(&self) -> &str {
            "stop"
        }

        async fn execute(&self, _agent: &Arc<Agent>, _loop_data: &mut LoopData) -> Result<(), Interrupt> {
            Err(Interrupt::Intervened)
        }
    }

    #[tokio::test]
    async fn runs_in_registration_order() {
        let (agent, _) = agent_with(vec![]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ExtensionRegistry::new();
        for label in ["a", "b", "c"] {
            registry.register(
                ExtensionPoint::MonologueStart,
                Arc::new(Record {
                    label,
                    seen: seen.clone(),
                }),
            );
        }

        let mut data = LoopData::default();
        registry
            .run(ExtensionPoint::MonologueStart, &agent, &mut data)
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(data.system, vec!["a", "b", "c"]);

        // other points are untouched
        registry
            .run(ExtensionPoint::MonologueEnd, &agent, &mut data)
            .await
            .unwrap();
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn interrupt_stops_the_chain() {
        let (agent, _) = agent_with(vec![]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ExtensionRegistry::new();
        registry.register(ExtensionPoint::MessageLoopEnd, Arc::new(Stop));
        registry.register(
            ExtensionPoint::MessageLoopEnd,
            Arc::new(Record {
                label: "after",
                seen: seen.clone(),
            }),
        );

        let mut data = LoopData::default();
        let result = registry.run(ExtensionPoint::MessageLoopEnd, &agent, &mut data).await;
        assert!(matches!(result, Err(Interrupt::Intervened)));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn defaults_hook_prompt_assembly() {
        let registry = ExtensionRegistry::with_defaults();
        assert_eq!(registry.count(ExtensionPoint::MessageLoopPrompts), 2);
        assert_eq!(registry.count(ExtensionPoint::MonologueStart), 0);
        assert_eq!(ExtensionPoint::MessageLoopEnd.to_string(), "message_loop_end");
    }
}
