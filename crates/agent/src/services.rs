//! Collaborators shared by every agent in a context.

use std::sync::Arc;

use monologue_core::{AgentConfig, PromptRenderer, Provider, TemplatePrompts};

use crate::extension::ExtensionRegistry;
use crate::tool::{Tool, ToolRegistry};

/// The model backend, tools, extensions and prompts an agent runs with.
pub struct AgentServices {
    pub provider: Arc<dyn Provider>,
    pub config: AgentConfig,
    pub tools: ToolRegistry,
    pub extensions: ExtensionRegistry,
    pub prompts: Arc<dyn PromptRenderer>,
}

impl AgentServices {
    /// Built-in tools, default extensions and built-in prompt templates.
    pub fn new(provider: Arc<dyn Provider>, config: AgentConfig) -> Self {
        Self {
            provider,
            config,
            tools: ToolRegistry::with_builtins(),
            extensions: ExtensionRegistry::with_defaults(),
            prompts: Arc::new(TemplatePrompts::builtin()),
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Add one tool on top of the current registry.
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn with_extensions(mut self, extensions: ExtensionRegistry) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_prompts(mut self, prompts: Arc<dyn PromptRenderer>) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}
