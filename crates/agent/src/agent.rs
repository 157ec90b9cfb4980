//! The agent and its monologue.
//!
//! A monologue is one agent's run to a final answer. The outer loop restarts
//! the attempt whenever an operator intervenes; the inner loop asks the model
//! for one reply, interprets it, and dispatches at most one tool per reply
//! until a tool ends the turn.
//!
//! ```text
//! monologue:   [MonologueStart] -> iterate* -> [MonologueEnd]
//! iterate:     [MessageLoopPrompts] -> rate gate -> stream -> parse -> tool
//!              -> [MessageLoopEnd]
//! ```

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use monologue_core::{
    AgentConfig, ContextLog, Error, History, HistoryMessage, LogKind, Message, MessageContent,
    OutputMessage, PromptOutput, ProviderRequest, Role, error_chain,
};
use tracing::{debug, error, info, warn};

use crate::context::ContextState;
use crate::dispatcher::ToolDispatcher;
use crate::extension::ExtensionPoint;
use crate::extract::{parse_dirty_json, parse_tool_request};
use crate::intervention::InterventionSlot;
use crate::loop_data::LoopData;
use crate::rate_gate::{RateGate, RateLimits};
use crate::services::AgentServices;
use crate::signal::{Interrupt, Step};
use crate::token::{estimate_messages_tokens, estimate_tokens};
use crate::tool::ToolCall;

/// Lock a std mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Superior/subordinate wiring. Superiors are weak so a chain never keeps
/// itself alive.
#[derive(Default)]
struct AgentLinks {
    superior: Weak<Agent>,
    /// In spawn order; `call_subordinate` reuses the last one
    subordinates: Vec<Arc<Agent>>,
    /// Context window of the latest model call
    last_rendered_prompt: Option<String>,
}

/// One node of a delegation chain.
pub struct Agent {
    /// Depth in the chain; the root is 0
    number: usize,
    /// "Agent {number}", used in log headings
    name: String,
    /// State shared with the rest of the chain
    context: Arc<ContextState>,
    services: Arc<AgentServices>,
    /// Written only from this agent's own loop
    history: Mutex<History>,
    /// Seeds `LoopData` on every outer pass
    last_user_message: Mutex<Option<HistoryMessage>>,
    /// Pending operator message, last write wins
    intervention: InterventionSlot,
    /// Per-agent call and token budget
    rate_gate: RateGate,
    links: Mutex<AgentLinks>,
}

impl Agent {
    /// Agent number `number` in `context`. The root of a chain is number 0.
    pub fn new(number: usize, context: Arc<ContextState>, services: Arc<AgentServices>) -> Arc<Self> {
        let rate_gate =
            RateGate::new(RateLimits::from(&services.config.chat_model)).with_log(context.log().clone());
        Arc::new(Self {
            number,
            name: format!("Agent {number}"),
            context,
            services,
            history: Mutex::new(History::new()),
            last_user_message: Mutex::new(None),
            intervention: InterventionSlot::default(),
            rate_gate,
            links: Mutex::new(AgentLinks::default()),
        })
    }

    pub fn number(&self) -> usize {
        self.number
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &Arc<ContextState> {
        &self.context
    }

    pub fn services(&self) -> &Arc<AgentServices> {
        &self.services
    }

    pub fn config(&self) -> &AgentConfig {
        &self.services.config
    }

    pub fn log(&self) -> &ContextLog {
        self.context.log()
    }

    pub fn rate_gate(&self) -> &RateGate {
        &self.rate_gate
    }

    // --- links ---

    pub fn superior(&self) -> Option<Arc<Agent>> {
        lock(&self.links).superior.upgrade()
    }

    pub fn subordinates(&self) -> Vec<Arc<Agent>> {
        lock(&self.links).subordinates.clone()
    }

    pub fn last_subordinate(&self) -> Option<Arc<Agent>> {
        lock(&self.links).subordinates.last().cloned()
    }

    /// Create the next agent down the chain and link it both ways.
    pub fn spawn_subordinate(self: &Arc<Self>) -> Arc<Agent> {
        let subordinate = Agent::new(self.number + 1, self.context.clone(), self.services.clone());
        lock(&subordinate.links).superior = Arc::downgrade(self);
        lock(&self.links).subordinates.push(subordinate.clone());
        debug!(agent = %self.name, subordinate = %subordinate.name, "Spawned subordinate");
        subordinate
    }

    /// The last context window sent to the model, as plain text.
    pub fn last_rendered_prompt(&self) -> Option<String> {
        lock(&self.links).last_rendered_prompt.clone()
    }

    // --- interventions ---

    pub fn set_intervention(&self, message: impl Into<String>) {
        if self.intervention.set(message).is_some() {
            debug!(agent = %self.name, "Replaced an unconsumed intervention");
        }
    }

    pub fn take_intervention(&self) -> Option<String> {
        self.intervention.take()
    }

    pub fn has_intervention(&self) -> bool {
        self.intervention.is_pending()
    }

    // --- history ---

    /// Snapshot of the agent's history.
    pub fn history(&self) -> History {
        lock(&self.history).clone()
    }

    /// Mutate history in place, e.g. to restore a persisted conversation.
    pub fn with_history<R>(&self, f: impl FnOnce(&mut History) -> R) -> R {
        f(&mut lock(&self.history))
    }

    pub fn history_output(&self) -> Vec<OutputMessage> {
        lock(&self.history).output()
    }

    pub fn last_user_message(&self) -> Option<HistoryMessage> {
        lock(&self.last_user_message).clone()
    }

    /// Open a new topic with a user (or intervention) message.
    pub fn hist_add_user_message(&self, message: &str, intervention: bool) -> Result<(), Error> {
        let template = if intervention { "fw.intervention" } else { "fw.user_message" };
        let content = self.parse_prompt(template, &[("message", message)])?;
        let added = {
            let mut history = lock(&self.history);
            history.new_topic();
            push_output(&mut history, false, content)
        };
        *lock(&self.last_user_message) = added;
        Ok(())
    }

    /// Record a model reply and remember it for repeat detection.
    pub fn hist_add_ai_response(&self, loop_data: &mut LoopData, message: &str) -> Result<(), Error> {
        let content = self.parse_prompt("fw.ai_response", &[("message", message)])?;
        push_output(&mut lock(&self.history), true, content);
        loop_data.last_response = message.to_string();
        Ok(())
    }

    pub fn hist_add_warning(&self, message: &str) -> Result<(), Error> {
        let content = self.parse_prompt("fw.warning", &[("message", message)])?;
        push_output(&mut lock(&self.history), false, content);
        Ok(())
    }

    pub fn hist_add_tool_result(&self, tool_name: &str, tool_result: &str) -> Result<(), Error> {
        let content = self.parse_prompt(
            "fw.tool_result",
            &[("tool_name", tool_name), ("tool_result", tool_result)],
        )?;
        push_output(&mut lock(&self.history), false, content);
        Ok(())
    }

    // --- prompts ---

    pub fn parse_prompt(&self, template: &str, vars: &[(&str, &str)]) -> Result<PromptOutput, Error> {
        Ok(self.services.prompts.render(template, vars)?)
    }

    pub fn read_prompt(&self, template: &str, vars: &[(&str, &str)]) -> Result<String, Error> {
        Ok(self.parse_prompt(template, vars)?.into_text())
    }

    // --- monologue ---

    /// Run until a tool ends the turn, returning its message.
    ///
    /// Interventions restart the attempt with a fresh `LoopData`. Every error
    /// that leaves here has been logged and wrapped in `Error::Handled`.
    pub async fn monologue(self: &Arc<Self>) -> Result<String, Error> {
        loop {
            let mut loop_data = LoopData::new(self.last_user_message());
            let pass = self.monologue_pass(&mut loop_data).await;

            let outcome = match pass {
                Ok(response) => Ok(Some(response)),
                Err(Interrupt::Intervened) => Ok(None),
                Err(Interrupt::Repairable(message)) => Err(self.handle_critical(Error::Internal(message))),
                Err(Interrupt::Fatal(err)) => Err(self.handle_critical(err)),
            };

            self.context.clear_streaming();
            let end = self
                .services
                .extensions
                .run(ExtensionPoint::MonologueEnd, self, &mut loop_data)
                .await;
            match end {
                Ok(()) | Err(Interrupt::Intervened) => {}
                Err(Interrupt::Repairable(message)) if outcome.is_ok() => {
                    return Err(self.handle_critical(Error::Internal(message)));
                }
                Err(Interrupt::Fatal(err)) if outcome.is_ok() => return Err(self.handle_critical(err)),
                Err(other) => warn!(agent = %self.name, error = %other, "Monologue end hook failed"),
            }

            match outcome {
                Ok(Some(response)) => {
                    info!(agent = %self.name, iterations = loop_data.iteration + 1, "Monologue finished");
                    return Ok(response);
                }
                Ok(None) => debug!(agent = %self.name, "Restarting monologue after intervention"),
                Err(err) => return Err(err),
            }
        }
    }

    async fn monologue_pass(self: &Arc<Self>, loop_data: &mut LoopData) -> Result<String, Interrupt> {
        self.services
            .extensions
            .run(ExtensionPoint::MonologueStart, self, loop_data)
            .await?;

        loop {
            self.context.set_streaming(self);
            loop_data.iteration += 1;

            let resolved = match self.iterate(loop_data).await {
                Ok(Step::Finished(response)) => Ok(Some(response)),
                Ok(Step::Continue) | Err(Interrupt::Intervened) => Ok(None),
                Err(Interrupt::Repairable(message)) => self
                    .surface_repairable(&message)
                    .map(|()| None)
                    .map_err(Interrupt::Fatal),
                Err(Interrupt::Fatal(err)) => Err(Interrupt::Fatal(self.handle_critical(err))),
            };

            let end = self
                .services
                .extensions
                .run(ExtensionPoint::MessageLoopEnd, self, loop_data)
                .await;

            match resolved {
                Ok(Some(response)) => {
                    end?;
                    return Ok(response);
                }
                Ok(None) => end?,
                Err(interrupt) => return Err(interrupt),
            }
        }
    }

    /// One model call and whatever the reply asks for.
    async fn iterate(self: &Arc<Self>, loop_data: &mut LoopData) -> Result<Step, Interrupt> {
        loop_data.system.clear();
        loop_data.history_output = self.history_output();
        self.services
            .extensions
            .run(ExtensionPoint::MessageLoopPrompts, self, loop_data)
            .await?;

        let system = loop_data.system.join("\n\n");
        let mut messages = Vec::with_capacity(loop_data.history_output.len() + 1);
        if !system.is_empty() {
            messages.push(Message::system(system));
        }
        messages.extend(History::to_messages(&loop_data.history_output));

        let input_tokens = estimate_messages_tokens(&messages);
        lock(&self.links).last_rendered_prompt = Some(render_window(&messages));
        self.rate_gate.limit_call_and_input(input_tokens).await;

        let response = self.call_chat_model(loop_data, messages).await?;
        self.handle_intervention(loop_data, &response).await?;

        if loop_data.last_response == response {
            self.hist_add_ai_response(loop_data, &response)?;
            let warning = self.read_prompt("fw.msg_repeat", &[])?;
            self.hist_add_warning(&warning)?;
            warn!(agent = %self.name, iteration = loop_data.iteration, "Model repeated its last reply");
            self.log().log(
                LogKind::Warning,
                format!("{}: Repeated response", self.name),
                warning,
                serde_json::Map::new(),
            );
            return Ok(Step::Continue);
        }

        self.hist_add_ai_response(loop_data, &response)?;
        self.process_tools(loop_data, &response).await
    }

    /// Stream one reply, checking for interventions after every fragment.
    async fn call_chat_model(
        &self,
        loop_data: &mut LoopData,
        messages: Vec<Message>,
    ) -> Result<String, Interrupt> {
        let model = &self.services.config.chat_model;
        let request = ProviderRequest {
            model: model.name.clone(),
            messages,
            temperature: model.temperature,
            max_tokens: None,
            stream: true,
            stop: Vec::new(),
            extra: model.kwargs.clone(),
        };

        debug!(
            agent = %self.name,
            provider = self.services.provider.name(),
            model = %model.name,
            iteration = loop_data.iteration,
            "Generating"
        );
        let log_no = self.log().log(
            LogKind::Agent,
            format!("{}: Generating", self.name),
            "",
            serde_json::Map::new(),
        );

        let mut chunks = self.services.provider.stream(request).await?;
        let mut response = String::new();
        while let Some(chunk) = chunks.recv().await {
            let chunk = chunk?;
            if let Some(text) = chunk.content.as_deref().filter(|t| !t.is_empty()) {
                response.push_str(text);
                self.rate_gate.record_output(estimate_tokens(text));
                self.log_from_stream(log_no, text, &response);
                // dropping `chunks` on interrupt stops the producer
                self.handle_intervention(loop_data, &response).await?;
            }
            if chunk.done {
                break;
            }
        }
        Ok(response)
    }

    /// Show the reply so far, with its fields once it parses as an object.
    fn log_from_stream(&self, log_no: usize, text: &str, response: &str) {
        if response.len() >= 25 {
            if let Some(serde_json::Value::Object(kvps)) = parse_dirty_json(response) {
                self.log().update(log_no, response, kvps);
                return;
            }
        }
        self.log().stream(log_no, text);
    }

    /// Dispatch the tool a reply asks for, or warn the model it asked for none.
    async fn process_tools(self: &Arc<Self>, loop_data: &mut LoopData, response: &str) -> Result<Step, Interrupt> {
        let Some(request) = parse_tool_request(response) else {
            let warning = self.read_prompt("fw.msg_misformat", &[])?;
            self.hist_add_warning(&warning)?;
            warn!(agent = %self.name, iteration = loop_data.iteration, "Message misformat");
            self.log().log(
                LogKind::Error,
                format!("{}: Message misformat", self.name),
                warning,
                serde_json::Map::new(),
            );
            return Ok(Step::Continue);
        };

        let call = ToolCall {
            name: request.name,
            args: request.args,
            message: response.to_string(),
        };
        ToolDispatcher::new(&self.services.tools)
            .dispatch(self, loop_data, call)
            .await
    }

    /// Show the model a recoverable problem and keep looping.
    fn surface_repairable(&self, message: &str) -> Result<(), Error> {
        self.hist_add_warning(message)?;
        warn!(agent = %self.name, warning = message, "Recoverable error");
        self.log().log(
            LogKind::Error,
            format!("{}: Recoverable error", self.name),
            message,
            serde_json::Map::new(),
        );
        Ok(())
    }

    /// Log a terminal error once and mark it handled.
    pub fn handle_critical(&self, err: Error) -> Error {
        match err {
            Error::Handled(_) => err,
            Error::Cancelled => {
                let message = format!("Context {} terminated during message loop", self.context.id());
                warn!(context = %self.context.id(), agent = %self.name, "{message}");
                self.log().log(LogKind::Warning, "Terminated", message, serde_json::Map::new());
                Error::Cancelled.into_handled()
            }
            other => {
                let detail = error_chain(&other);
                error!(context = %self.context.id(), agent = %self.name, error = %detail, "Critical error in message loop");
                let mut kvps = serde_json::Map::new();
                kvps.insert("text".into(), other.to_string().into());
                self.log().log(LogKind::Error, "Error", detail, kvps);
                other.into_handled()
            }
        }
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("context", &self.context.id())
            .finish_non_exhaustive()
    }
}

/// Append rendered prompt output as one or more history messages.
fn push_output(history: &mut History, ai: bool, output: PromptOutput) -> Option<HistoryMessage> {
    match output {
        PromptOutput::Text(text) => Some(history.add_message(ai, text)),
        PromptOutput::Lines(lines) => lines.into_iter().map(|line| history.add_message(ai, line)).last(),
        PromptOutput::Fields(fields) => Some(history.add_message(ai, MessageContent::Fields(fields))),
    }
}

fn render_window(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            format!("{role}: {}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
