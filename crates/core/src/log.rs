//! Context log: the operator-facing record of what a context did.
//!
//! Append-only list of structured items (kind, heading, content, key-value
//! pairs). Every append or update is also published on a broadcast channel so
//! a UI can follow along live. The engine writes here but never reads back.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Agent,
    User,
    Tool,
    Info,
    Warning,
    Error,
    Util,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogItem {
    /// Position in the log, stable for the lifetime of the item
    pub no: usize,
    pub kind: LogKind,
    pub heading: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub kvps: serde_json::Map<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

/// Shared handle; clones write to the same log.
#[derive(Debug, Clone)]
pub struct ContextLog {
    items: Arc<Mutex<Vec<LogItem>>>,
    sender: broadcast::Sender<LogItem>,
}

impl ContextLog {
    /// Create a log whose live subscribers buffer up to `capacity` items.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            items: Arc::new(Mutex::new(Vec::new())),
            sender,
        }
    }

    /// Append an item and return its number.
    pub fn log(
        &self,
        kind: LogKind,
        heading: impl Into<String>,
        content: impl Into<String>,
        kvps: serde_json::Map<String, serde_json::Value>,
    ) -> usize {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        let item = LogItem {
            no: items.len(),
            kind,
            heading: heading.into(),
            content: content.into(),
            kvps,
            timestamp: Utc::now(),
        };
        let no = item.no;
        // no subscribers is fine
        let _ = self.sender.send(item.clone());
        items.push(item);
        no
    }

    /// Append streamed text to an existing item.
    pub fn stream(&self, no: usize, text: &str) {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(item) = items.get_mut(no) {
            item.content.push_str(text);
            let _ = self.sender.send(item.clone());
        }
    }

    /// Replace an item's content and key-value pairs.
    pub fn update(&self, no: usize, content: impl Into<String>, kvps: serde_json::Map<String, serde_json::Value>) {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(item) = items.get_mut(no) {
            item.content = content.into();
            item.kvps = kvps;
            let _ = self.sender.send(item.clone());
        }
    }

    pub fn items(&self) -> Vec<LogItem> {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn reset(&self) {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogItem> {
        self.sender.subscribe()
    }
}

impl Default for ContextLog {
    fn default() -> Self {
        Self::new(256)
    }
}
