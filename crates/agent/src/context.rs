//! Agent contexts and their background tasks.
//!
//! A context owns one agent chain, its log and at most one running task.
//! Operator messages go through [`AgentContext::communicate`]: if a task is
//! running they become interventions, otherwise they start a new task.
//!
//! Tasks are cancelled cooperatively. `kill_process` trips the task's
//! cancellation token and waits for the task to wind down, so callers never
//! see two tasks live in one context.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, Utc};
use monologue_core::{ContextLog, Error, LogKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::agent::{Agent, lock};
use crate::delegation::{broadcast_intervention, process_chain};
use crate::services::AgentServices;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// What a finished task produced. Errors are shared so every handle can see them.
pub type TaskOutcome = Result<String, Arc<Error>>;

/// State every agent in a context shares.
pub struct ContextState {
    /// Context id, also the tracing field on every log line
    id: String,
    /// Operator pause; loops hold at their next poll point while set
    paused: AtomicBool,
    /// The agent currently generating. Weak so a reset root can drop
    streaming: Mutex<Weak<Agent>>,
    /// Operator-facing record shared by every agent in the chain
    log: ContextLog,
}

impl ContextState {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            paused: AtomicBool::new(false),
            streaming: Mutex::new(Weak::new()),
            log: ContextLog::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn log(&self) -> &ContextLog {
        &self.log
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    /// The agent whose loop is currently running, if any.
    pub fn streaming_agent(&self) -> Option<Arc<Agent>> {
        lock(&self.streaming).upgrade()
    }

    pub fn set_streaming(&self, agent: &Arc<Agent>) {
        *lock(&self.streaming) = Arc::downgrade(agent);
    }

    pub fn clear_streaming(&self) {
        *lock(&self.streaming) = Weak::new();
    }
}

/// A cloneable view of one task's result.
#[derive(Clone)]
pub struct TaskHandle {
    /// Process-wide task number
    id: u64,
    /// `None` until the task publishes its outcome
    outcome: watch::Receiver<Option<TaskOutcome>>,
}

impl TaskHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// Wait for the task to finish.
    pub async fn result(&self) -> TaskOutcome {
        let mut outcome = self.outcome.clone();
        let value = match outcome.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };
        // a task that vanished without reporting was torn down
        value.unwrap_or_else(|| Err(Arc::new(Error::Cancelled.into_handled())))
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("finished", &self.is_finished())
            .finish()
    }
}

struct ContextTask {
    handle: TaskHandle,
    /// Tripped by `kill`; the spawned wrapper races it against the work
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl ContextTask {
    /// Run `work` in the background. Cancellation is reported through `agent`.
    fn spawn<F>(agent: Arc<Agent>, work: F) -> Self
    where
        F: Future<Output = Result<String, Error>> + Send + 'static,
    {
        let id = NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let (tx, rx) = watch::channel(None);

        let cancelled = token.clone();
        let join = tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = cancelled.cancelled() => Err(agent.handle_critical(Error::Cancelled)),
                result = work => result,
            };
            tx.send_replace(Some(outcome.map_err(Arc::new)));
        });

        Self {
            handle: TaskHandle { id, outcome: rx },
            token,
            join,
        }
    }

    /// Alive until the outcome is published; the join handle only finishes
    /// after that.
    fn is_alive(&self) -> bool {
        !self.handle.is_finished() && !self.join.is_finished()
    }

    async fn kill(self) {
        self.token.cancel();
        if let Err(err) = self.join.await {
            debug!(task = self.handle.id, error = %err, "Task ended abnormally");
        }
    }
}

/// One conversation: a root agent, its subordinates, a log and a task slot.
pub struct AgentContext {
    /// Optional display name
    name: Option<String>,
    /// Creation order within the manager
    no: u64,
    created_at: DateTime<Utc>,
    state: Arc<ContextState>,
    /// Handed to every agent the context builds, including after `reset`
    services: Arc<AgentServices>,
    /// Agent 0; replaced by `reset`
    root: Mutex<Arc<Agent>>,
    /// Current or last task. Held across awaits, hence the tokio mutex
    task: tokio::sync::Mutex<Option<ContextTask>>,
}

impl AgentContext {
    /// A fresh context. A missing `id` gets a random one.
    pub fn new(services: Arc<AgentServices>, id: Option<String>, name: Option<String>, no: u64) -> Self {
        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let state = Arc::new(ContextState::new(id));
        let root = Agent::new(0, state.clone(), services.clone());
        Self {
            name,
            no,
            created_at: Utc::now(),
            state,
            services,
            root: Mutex::new(root),
            task: tokio::sync::Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        self.state.id()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn no(&self) -> u64 {
        self.no
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn log(&self) -> &ContextLog {
        self.state.log()
    }

    pub fn services(&self) -> &Arc<AgentServices> {
        &self.services
    }

    pub fn root(&self) -> Arc<Agent> {
        lock(&self.root).clone()
    }

    pub fn streaming_agent(&self) -> Option<Arc<Agent>> {
        self.state.streaming_agent()
    }

    /// The streaming agent, or the root when nothing is running.
    pub fn current_agent(&self) -> Arc<Agent> {
        self.streaming_agent().unwrap_or_else(|| self.root())
    }

    pub fn pause(&self) {
        self.state.set_paused(true);
        info!(context = %self.id(), "Paused");
    }

    pub fn resume(&self) {
        self.state.set_paused(false);
        info!(context = %self.id(), "Resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.state.is_paused()
    }

    /// Handle of the current (or last) task.
    pub async fn task(&self) -> Option<TaskHandle> {
        self.task.lock().await.as_ref().map(|t| t.handle.clone())
    }

    pub async fn is_running(&self) -> bool {
        self.task.lock().await.as_ref().is_some_and(ContextTask::is_alive)
    }

    /// Deliver an operator message.
    ///
    /// While a task is running the message becomes an intervention on the
    /// current agent and up to `broadcast_level` superiors (`None` means the
    /// whole chain) and the running task's handle is returned. Otherwise a
    /// new task runs the message through the agent chain.
    pub async fn communicate(&self, message: impl Into<String>, broadcast_level: Option<usize>) -> TaskHandle {
        let message = message.into();
        self.state.set_paused(false);

        let mut slot = self.task.lock().await;
        let current = self.current_agent();

        if let Some(task) = slot.as_ref().filter(|t| t.is_alive()) {
            let reached = broadcast_intervention(&current, &message, broadcast_level);
            info!(context = %self.id(), agents = reached, "Delivered message as intervention");
            return task.handle.clone();
        }

        if let Some(finished) = slot.take() {
            finished.kill().await;
        }

        self.log()
            .log(LogKind::User, "User message", message.clone(), serde_json::Map::new());
        let task = ContextTask::spawn(current.clone(), process_chain(current, message));
        let handle = task.handle.clone();
        info!(context = %self.id(), task = handle.id(), "Started task");
        *slot = Some(task);
        handle
    }

    /// Restart the loop of whichever agent was last streaming, or the root.
    pub async fn nudge(&self) -> TaskHandle {
        let mut slot = self.task.lock().await;
        if let Some(old) = slot.take() {
            old.kill().await;
        }
        self.state.set_paused(false);

        let agent = self.current_agent();
        let runner = agent.clone();
        let task = ContextTask::spawn(agent, async move { runner.monologue().await });
        let handle = task.handle.clone();
        info!(context = %self.id(), task = handle.id(), "Nudged");
        *slot = Some(task);
        handle
    }

    /// Stop the running task, if any, and wait for it to end.
    pub async fn kill_process(&self) {
        let mut slot = self.task.lock().await;
        if let Some(task) = slot.take() {
            debug!(context = %self.id(), task = task.handle.id, "Killing task");
            task.kill().await;
        }
    }

    /// Kill the task, clear the log and start over with a fresh root agent.
    pub async fn reset(&self) {
        let mut slot = self.task.lock().await;
        if let Some(task) = slot.take() {
            task.kill().await;
        }
        self.log().reset();
        *lock(&self.root) = Agent::new(0, self.state.clone(), self.services.clone());
        self.state.clear_streaming();
        self.state.set_paused(false);
        info!(context = %self.id(), "Reset");
    }
}
