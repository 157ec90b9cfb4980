//! Agent and model configuration types.

use serde::{Deserialize, Serialize};

/// Settings for one model endpoint, including its rate budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider name as registered in the router
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model identifier passed to the provider
    #[serde(default = "default_model")]
    pub name: String,

    /// Token budget for rendered history (0 = no trimming)
    #[serde(default = "default_ctx_length")]
    pub ctx_length: usize,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max calls per window (0 = unlimited)
    #[serde(default)]
    pub limit_requests: usize,

    /// Max input tokens per window (0 = unlimited)
    #[serde(default)]
    pub limit_input: usize,

    /// Max output tokens per window (0 = unlimited)
    #[serde(default)]
    pub limit_output: usize,

    /// Width of the sliding rate window
    #[serde(default = "default_rate_window_secs")]
    pub rate_window_secs: u64,

    /// Extra parameters forwarded to the provider
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub kwargs: serde_json::Map<String, serde_json::Value>,
}

fn default_provider() -> String {
    "openrouter".into()
}
fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_ctx_length() -> usize {
    100_000
}
fn default_temperature() -> f32 {
    0.7
}
fn default_rate_window_secs() -> u64 {
    60
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            name: default_model(),
            ctx_length: default_ctx_length(),
            temperature: default_temperature(),
            limit_requests: 0,
            limit_input: 0,
            limit_output: 0,
            rate_window_secs: default_rate_window_secs(),
            kwargs: serde_json::Map::new(),
        }
    }
}

/// Configuration for the agent's behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub chat_model: ModelConfig,

    /// Prompt template subdirectory searched before `default`
    #[serde(default = "default_prompts_subdir")]
    pub prompts_subdir: String,

    /// How often a paused loop re-checks the pause flag
    #[serde(default = "default_pause_poll_ms")]
    pub pause_poll_ms: u64,

    /// Superior hops an intervention travels (0 = the whole chain)
    #[serde(default = "default_broadcast_level")]
    pub broadcast_level: usize,
}

fn default_prompts_subdir() -> String {
    "default".into()
}
fn default_pause_poll_ms() -> u64 {
    100
}
fn default_broadcast_level() -> usize {
    1
}

impl AgentConfig {
    /// Hop limit for interventions; `None` walks every superior.
    pub fn broadcast_hops(&self) -> Option<usize> {
        (self.broadcast_level > 0).then_some(self.broadcast_level)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            chat_model: ModelConfig::default(),
            prompts_subdir: default_prompts_subdir(),
            pause_poll_ms: default_pause_poll_ms(),
            broadcast_level: default_broadcast_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_default_to_unlimited() {
        let model = ModelConfig::default();
        assert_eq!(model.limit_requests, 0);
        assert_eq!(model.limit_input, 0);
        assert_eq!(model.limit_output, 0);
        assert_eq!(model.rate_window_secs, 60);
    }

    #[test]
    fn broadcast_level_zero_means_whole_chain() {
        let mut config = AgentConfig::default();
        assert_eq!(config.broadcast_hops(), Some(1));
        config.broadcast_level = 0;
        assert_eq!(config.broadcast_hops(), None);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: AgentConfig =
            serde_json::from_str(r#"{"chat_model": {"name": "gpt-4o", "limit_requests": 5}}"#).unwrap();
        assert_eq!(config.chat_model.name, "gpt-4o");
        assert_eq!(config.chat_model.provider, "openrouter");
        assert_eq!(config.chat_model.limit_requests, 5);
        assert_eq!(config.pause_poll_ms, 100);
    }
}
