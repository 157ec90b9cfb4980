//! Shared test helpers: a scripted streaming provider and agent builders.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use monologue_core::{
    AgentConfig, ChunkReceiver, Provider, ProviderError, ProviderRequest, ProviderResponse, StreamChunk,
};
use tokio::sync::{Notify, mpsc};

use crate::agent::Agent;
use crate::context::{AgentContext, ContextState};
use crate::services::AgentServices;
use crate::tool::Tool;

/// Lets a test observe and release a stream stopped halfway.
#[derive(Clone, Default)]
pub struct Gate {
    pub started: Arc<Notify>,
    pub release: Arc<Notify>,
}

/// What one `stream` call does.
pub enum Script {
    /// Send these chunks, then finish
    Reply(Vec<String>),
    /// Send `first`, notify `started`, wait for `release`, send `rest`
    Gated { first: String, rest: String, gate: Gate },
    /// Never send anything and never close
    Hang,
    /// Refuse the call
    Fail(ProviderError),
}

impl Script {
    pub fn gated(first: &str, rest: &str) -> (Gate, Script) {
        let gate = Gate::default();
        let script = Script::Gated {
            first: first.to_string(),
            rest: rest.to_string(),
            gate: gate.clone(),
        };
        (gate, script)
    }
}

/// One-chunk reply.
pub fn reply(text: &str) -> Script {
    Script::Reply(vec![text.to_string()])
}

/// A reply calling the response tool with `text`, streamed in two chunks.
pub fn respond(text: &str) -> Script {
    let body = serde_json::json!({
        "thoughts": ["answering"],
        "tool_name": "response",
        "tool_args": {"text": text},
    })
    .to_string();
    let (head, tail) = body.split_at(body.len() / 2);
    Script::Reply(vec![head.to_string(), tail.to_string()])
}

/// Plays back scripted streams in order and records every request.
pub struct ScriptedProvider {
    steps: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ProviderRequest>>,
    // keeps `Hang` streams open
    held: Mutex<Vec<mpsc::Sender<Result<StreamChunk, ProviderError>>>>,
}

impl ScriptedProvider {
    pub fn new(steps: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
            held: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::NotConfigured("scripted provider only streams".into()))
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let step = self.steps.lock().unwrap().pop_front();
        let Some(step) = step else {
            panic!("ScriptedProvider: no more scripted streams (call #{})", self.call_count());
        };

        let (tx, rx) = mpsc::channel(16);
        match step {
            Script::Reply(chunks) => {
                tokio::spawn(async move {
                    for chunk in chunks {
                        if tx.send(Ok(StreamChunk::text(chunk))).await.is_err() {
                            return;
                        }
                    }
                    let _ = tx.send(Ok(StreamChunk::finished())).await;
                });
            }
            Script::Gated { first, rest, gate } => {
                tokio::spawn(async move {
                    let _ = tx.send(Ok(StreamChunk::text(first))).await;
                    gate.started.notify_one();
                    gate.release.notified().await;
                    let _ = tx.send(Ok(StreamChunk::text(rest))).await;
                    let _ = tx.send(Ok(StreamChunk::finished())).await;
                });
            }
            Script::Hang => self.held.lock().unwrap().push(tx),
            Script::Fail(err) => return Err(err),
        }
        Ok(rx)
    }
}

/// Defaults with a short pause poll.
pub fn test_config() -> AgentConfig {
    AgentConfig {
        pause_poll_ms: 5,
        ..AgentConfig::default()
    }
}

pub fn services(steps: Vec<Script>) -> AgentServices {
    AgentServices::new(ScriptedProvider::new(steps), test_config())
}

fn root_agent(provider: Arc<ScriptedProvider>, config: AgentConfig, tool: Option<Arc<dyn Tool>>) -> Arc<Agent> {
    let mut services = AgentServices::new(provider, config);
    if let Some(tool) = tool {
        services = services.with_tool(tool);
    }
    Agent::new(0, Arc::new(ContextState::new("test")), services.into_shared())
}

pub fn agent_with(steps: Vec<Script>) -> (Arc<Agent>, Arc<ScriptedProvider>) {
    agent_with_config(steps, test_config())
}

pub fn agent_with_config(steps: Vec<Script>, config: AgentConfig) -> (Arc<Agent>, Arc<ScriptedProvider>) {
    let provider = ScriptedProvider::new(steps);
    (root_agent(provider.clone(), config, None), provider)
}

pub fn agent_with_tool(steps: Vec<Script>, tool: Arc<dyn Tool>) -> (Arc<Agent>, Arc<ScriptedProvider>) {
    let provider = ScriptedProvider::new(steps);
    (root_agent(provider.clone(), test_config(), Some(tool)), provider)
}

pub fn context_with(steps: Vec<Script>) -> (AgentContext, Arc<ScriptedProvider>) {
    let provider = ScriptedProvider::new(steps);
    let services = AgentServices::new(provider.clone(), test_config()).into_shared();
    (AgentContext::new(services, Some("test".into()), None, 1), provider)
}
