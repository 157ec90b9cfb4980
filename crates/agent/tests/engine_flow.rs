//! End-to-end flows through the public engine API.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use monologue_agent::{
    AgentServices, ContextManager, RateGate, RateLimits, broadcast_intervention, process_chain,
};
use monologue_core::{
    AgentConfig, ChunkReceiver, LogKind, MessageContent, Provider, ProviderError, ProviderRequest,
    ProviderResponse, Role, StreamChunk,
};
use tokio::sync::{Notify, mpsc};

enum Turn {
    Chunks(Vec<String>),
    Gated {
        first: String,
        rest: String,
        started: Arc<Notify>,
        release: Arc<Notify>,
    },
    Hang,
}

struct Scripted {
    turns: Mutex<VecDeque<Turn>>,
    requests: Mutex<Vec<ProviderRequest>>,
    held: Mutex<Vec<mpsc::Sender<Result<StreamChunk, ProviderError>>>>,
}

impl Scripted {
    fn new(turns: Vec<Turn>) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
            held: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::NotConfigured("stream only".into()))
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let turn = self.turns.lock().unwrap().pop_front().expect("script exhausted");
        let (tx, rx) = mpsc::channel(16);
        match turn {
            Turn::Chunks(chunks) => {
                tokio::spawn(async move {
                    for chunk in chunks {
                        let _ = tx.send(Ok(StreamChunk::text(chunk))).await;
                    }
                    let _ = tx.send(Ok(StreamChunk::finished())).await;
                });
            }
            Turn::Gated {
                first,
                rest,
                started,
                release,
            } => {
                tokio::spawn(async move {
                    let _ = tx.send(Ok(StreamChunk::text(first))).await;
                    started.notify_one();
                    release.notified().await;
                    let _ = tx.send(Ok(StreamChunk::text(rest))).await;
                    let _ = tx.send(Ok(StreamChunk::finished())).await;
                });
            }
            Turn::Hang => self.held.lock().unwrap().push(tx),
        }
        Ok(rx)
    }
}

fn respond(text: &str) -> Turn {
    let body = serde_json::json!({"tool_name": "response", "tool_args": {"text": text}}).to_string();
    Turn::Chunks(vec![body])
}

fn services(provider: Arc<Scripted>) -> Arc<AgentServices> {
    let config = AgentConfig {
        pause_poll_ms: 5,
        ..AgentConfig::default()
    };
    AgentServices::new(provider, config).into_shared()
}

#[tokio::test]
async fn hello_resolves_with_the_response_text() {
    let provider = Scripted::new(vec![respond("hi")]);
    let manager = ContextManager::new();
    let context = manager.create(services(provider.clone()), None, None).await;

    let handle = context.communicate("hello", Some(1)).await;
    assert_eq!(handle.result().await.unwrap(), "hi");
    assert_eq!(provider.calls(), 1);

    let request = provider.requests.lock().unwrap()[0].clone();
    let turns: Vec<_> = request.messages.iter().filter(|m| m.role != Role::System).collect();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].role, Role::User);
    assert_eq!(turns[0].content, "hello");

    let first = context.root().history().messages().next().cloned().unwrap();
    assert_eq!(first.content.as_text(), Some("hello"));
}

#[tokio::test]
async fn second_message_intervenes_in_the_running_task() {
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let provider = Scripted::new(vec![
        Turn::Gated {
            first: "thinking about ".into(),
            rest: "it".into(),
            started: started.clone(),
            release: release.clone(),
        },
        respond("changed course"),
    ]);
    let manager = ContextManager::new();
    let context = manager.create(services(provider.clone()), None, None).await;

    let first = context.communicate("do a thing", Some(1)).await;
    started.notified().await;

    let second = context.communicate("do another thing", Some(1)).await;
    assert_eq!(first.id(), second.id(), "no new task while one is alive");

    release.notify_one();
    assert_eq!(first.result().await.unwrap(), "changed course");

    let history = context.root().history();
    let entries: Vec<_> = history.messages().collect();
    // user turn, flushed partial reply, intervention, final reply
    assert_eq!(entries[0].content.as_text(), Some("do a thing"));
    assert!(entries[1].ai);
    let partial = entries[1].content.as_text().unwrap();
    assert!(partial.starts_with("thinking about"));
    match &entries[2].content {
        MessageContent::Fields(fields) => assert_eq!(fields["user_intervention"], "do another thing"),
        other => panic!("expected an intervention turn, got {other:?}"),
    }
}

#[tokio::test]
async fn new_task_cancels_the_previous_one() {
    let provider = Scripted::new(vec![Turn::Hang, respond("fresh")]);
    let manager = ContextManager::new();
    let context = manager.create(services(provider.clone()), None, None).await;

    let stuck = context.communicate("hello", None).await;
    while provider.calls() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let fresh = context.nudge().await;
    let err = stuck.result().await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(fresh.result().await.unwrap(), "fresh");
    assert!(
        context
            .log()
            .items()
            .iter()
            .any(|item| item.kind == LogKind::Warning && item.heading == "Terminated")
    );
}

#[tokio::test]
async fn delegation_chain_feeds_results_upward() {
    let provider = Scripted::new(vec![respond("leaf answer"), respond("top answer")]);
    let manager = ContextManager::new();
    let context = manager.create(services(provider.clone()), None, None).await;

    let top = context.root();
    let leaf = top.spawn_subordinate();
    let answer = process_chain(leaf.clone(), "subtask".into()).await.unwrap();

    assert_eq!(answer, "top answer");
    assert_eq!(provider.calls(), 2);
    let fed = top.history().messages().next().cloned().unwrap();
    match fed.content {
        MessageContent::Fields(fields) => assert_eq!(fields["tool_result"], "leaf answer"),
        other => panic!("expected a tool result, got {other:?}"),
    }
}

#[tokio::test]
async fn interventions_are_last_write_wins() {
    let provider = Scripted::new(vec![]);
    let manager = ContextManager::new();
    let context = manager.create(services(provider), None, None).await;
    let root = context.root();

    broadcast_intervention(&root, "first", Some(1));
    broadcast_intervention(&root, "second", Some(1));
    assert_eq!(root.take_intervention().as_deref(), Some("second"));
    assert_eq!(root.take_intervention(), None);
}

#[tokio::test(start_paused = true)]
async fn rate_gate_holds_the_extra_call() {
    let gate = RateGate::new(RateLimits {
        max_calls: 2,
        max_input_tokens: 0,
        max_output_tokens: 0,
        window: Duration::from_secs(60),
    });

    assert_eq!(gate.limit_call_and_input(10).await, Duration::ZERO);
    assert_eq!(gate.limit_call_and_input(10).await, Duration::ZERO);
    let waited = gate.limit_call_and_input(10).await;
    assert!(waited >= Duration::from_secs(60));
    assert_eq!(gate.usage().calls, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn follow_up_after_an_answer_is_a_fresh_task() {
    const ROUNDS: usize = 200;
    let turns = (0..ROUNDS).flat_map(|_| [respond("a"), respond("b")]).collect();
    let provider = Scripted::new(turns);
    let manager = ContextManager::new();
    let context = manager.create(services(provider.clone()), None, None).await;

    for _ in 0..ROUNDS {
        let first = context.communicate("one", Some(1)).await;
        assert_eq!(first.result().await.unwrap(), "a");

        let second = context.communicate("two", Some(1)).await;
        assert_ne!(second.id(), first.id(), "follow-up went to the finished task");
        assert_eq!(second.result().await.unwrap(), "b");
    }
    assert_eq!(provider.calls(), 2 * ROUNDS);
    assert_eq!(context.root().take_intervention(), None);
}
