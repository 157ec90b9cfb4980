//! State scoped to one outer pass of the monologue.

use monologue_core::{HistoryMessage, OutputMessage};

/// Rebuilt on every outer pass; extensions read and mutate it in place.
#[derive(Debug, Clone)]
pub struct LoopData {
    /// -1 until the first inner iteration starts
    pub iteration: i64,
    /// System prompt fragments for the current iteration
    pub system: Vec<String>,
    /// The user turn that started this pass
    pub user_message: Option<HistoryMessage>,
    /// Rendered history snapshot for the current iteration
    pub history_output: Vec<OutputMessage>,
    /// Previous model reply, for repeat detection
    pub last_response: String,
    pub attachments: Vec<String>,
}

impl LoopData {
    pub fn new(user_message: Option<HistoryMessage>) -> Self {
        Self {
            iteration: -1,
            system: Vec::new(),
            user_message,
            history_output: Vec::new(),
            last_response: String::new(),
            attachments: Vec::new(),
        }
    }
}

impl Default for LoopData {
    fn default() -> Self {
        Self::new(None)
    }
}
