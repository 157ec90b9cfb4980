//! Sliding-window rate gate for model calls.
//!
//! Tracks calls, input tokens and output tokens over one window. Callers wait
//! in `limit_call_and_input` until every budget has headroom; output tokens
//! are debited after the fact as they stream in.
//!
//! Uses `tokio::time::Instant` so paused-clock tests drive the window.

use std::sync::Mutex;
use std::time::Duration;

use monologue_core::{ContextLog, LogKind, ModelConfig};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Per-window budgets. Zero disables a budget.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimits {
    pub max_calls: usize,
    pub max_input_tokens: usize,
    pub max_output_tokens: usize,
    pub window: Duration,
}

impl RateLimits {
    pub fn unlimited() -> Self {
        Self {
            max_calls: 0,
            max_input_tokens: 0,
            max_output_tokens: 0,
            window: Duration::from_secs(60),
        }
    }
}

impl From<&ModelConfig> for RateLimits {
    fn from(model: &ModelConfig) -> Self {
        Self {
            max_calls: model.limit_requests,
            max_input_tokens: model.limit_input,
            max_output_tokens: model.limit_output,
            window: Duration::from_secs(model.rate_window_secs.max(1)),
        }
    }
}

/// Usage inside the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateUsage {
    pub calls: usize,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

#[derive(Default)]
struct Window {
    calls: Vec<Instant>,
    input: Vec<(Instant, usize)>,
    output: Vec<(Instant, usize)>,
}

impl Window {
    fn expire(&mut self, now: Instant, width: Duration) {
        self.calls.retain(|t| now.duration_since(*t) < width);
        self.input.retain(|(t, _)| now.duration_since(*t) < width);
        self.output.retain(|(t, _)| now.duration_since(*t) < width);
    }
}

pub struct RateGate {
    limits: RateLimits,
    window: Mutex<Window>,
    log: Option<ContextLog>,
}

impl RateGate {
    pub fn new(limits: RateLimits) -> Self {
        Self {
            limits,
            window: Mutex::new(Window::default()),
            log: None,
        }
    }

    /// Report waits to the context log as well as tracing.
    pub fn with_log(mut self, log: ContextLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn limits(&self) -> &RateLimits {
        &self.limits
    }

    /// Wait until one more call carrying `input_tokens` fits, then commit it.
    ///
    /// Returns how long the caller was held back. A single request larger
    /// than the whole input budget is admitted once the window is empty.
    pub async fn limit_call_and_input(&self, input_tokens: usize) -> Duration {
        let started = Instant::now();
        let mut announced = false;

        loop {
            let wait = {
                let mut window = self.window.lock().unwrap_or_else(|e| e.into_inner());
                let now = Instant::now();
                window.expire(now, self.limits.window);

                match self.time_to_headroom(&window, input_tokens, now) {
                    None => {
                        window.calls.push(now);
                        if input_tokens > 0 {
                            window.input.push((now, input_tokens));
                        }
                        break;
                    }
                    Some(wait) => wait,
                }
            };

            if !announced {
                announced = true;
                warn!(
                    wait_secs = wait.as_secs_f64(),
                    input_tokens, "Rate limit exceeded, waiting"
                );
                if let Some(log) = &self.log {
                    log.log(
                        LogKind::Util,
                        "Rate limit exceeded",
                        format!("Waiting {:.1}s for the rate window", wait.as_secs_f64()),
                        serde_json::Map::new(),
                    );
                }
            }

            tokio::time::sleep(wait).await;
        }

        let waited = started.elapsed();
        debug!(input_tokens, waited_ms = waited.as_millis() as u64, "Rate gate admitted call");
        waited
    }

    /// Debit streamed output against the output budget.
    pub fn record_output(&self, tokens: usize) {
        if tokens == 0 {
            return;
        }
        let mut window = self.window.lock().unwrap_or_else(|e| e.into_inner());
        window.output.push((Instant::now(), tokens));
    }

    pub fn usage(&self) -> RateUsage {
        let mut window = self.window.lock().unwrap_or_else(|e| e.into_inner());
        window.expire(Instant::now(), self.limits.window);
        RateUsage {
            calls: window.calls.len(),
            input_tokens: window.input.iter().map(|(_, n)| n).sum(),
            output_tokens: window.output.iter().map(|(_, n)| n).sum(),
        }
    }

    /// `None` when the call fits now, otherwise how long until it might.
    fn time_to_headroom(&self, window: &Window, input_tokens: usize, now: Instant) -> Option<Duration> {
        let width = self.limits.window;
        let until = |t: Instant| (t + width).saturating_duration_since(now);
        let mut wait: Option<Duration> = None;

        if self.limits.max_calls > 0 && window.calls.len() >= self.limits.max_calls {
            let oldest_to_drop = window.calls[window.calls.len() - self.limits.max_calls];
            wait = wait.max(Some(until(oldest_to_drop)));
        }

        if self.limits.max_input_tokens > 0 {
            if let Some(t) = release_point(&window.input, self.limits.max_input_tokens, input_tokens) {
                wait = wait.max(Some(until(t)));
            }
        }

        // output needs at least one token of headroom
        if self.limits.max_output_tokens > 0 {
            if let Some(t) = release_point(&window.output, self.limits.max_output_tokens, 1) {
                wait = wait.max(Some(until(t)));
            }
        }

        wait
    }
}

/// The entry whose expiry leaves room for `extra` more under `limit`.
fn release_point(entries: &[(Instant, usize)], limit: usize, extra: usize) -> Option<Instant> {
    let mut total: usize = entries.iter().map(|(_, n)| n).sum();
    if total + extra <= limit {
        return None;
    }
    for (t, n) in entries {
        total -= n;
        if total + extra <= limit {
            return Some(*t);
        }
    }
    entries.last().map(|(t, _)| *t)
}
