//! Operator interventions and pause handling.
//!
//! Each agent has one pending-message slot. Writers overwrite; the loop takes
//! the message at its poll points (every streamed fragment and every tool
//! lifecycle boundary).

use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, info};

use crate::agent::Agent;
use crate::loop_data::LoopData;
use crate::signal::Interrupt;

/// At most one pending operator message. Last write wins.
#[derive(Debug, Default)]
pub struct InterventionSlot {
    pending: Mutex<Option<String>>,
}

impl InterventionSlot {
    /// Store `message`, returning the unconsumed message it replaced.
    pub fn set(&self, message: impl Into<String>) -> Option<String> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(message.into())
    }

    pub fn take(&self) -> Option<String> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }
}

impl Agent {
    /// Wait out a pause, then consume a pending intervention if there is one.
    ///
    /// Non-blank `progress` (partial model output) is recorded before the
    /// intervention turn so nothing generated so far is lost. Returns
    /// `Interrupt::Intervened` once the intervention is in history.
    pub async fn handle_intervention(
        &self,
        loop_data: &mut LoopData,
        progress: &str,
    ) -> Result<(), Interrupt> {
        if self.context().is_paused() {
            debug!(agent = %self.name(), "Paused, waiting");
            let poll = Duration::from_millis(self.config().pause_poll_ms.max(1));
            while self.context().is_paused() {
                tokio::time::sleep(poll).await;
            }
        }

        let Some(message) = self.take_intervention() else {
            return Ok(());
        };

        info!(agent = %self.name(), "Intervention received");
        if !progress.trim().is_empty() {
            self.hist_add_ai_response(loop_data, progress)?;
        }
        self.hist_add_user_message(&message, true)?;
        Err(Interrupt::Intervened)
    }
}
