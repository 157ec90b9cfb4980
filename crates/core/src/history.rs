//! Topic-segmented conversation history.
//!
//! Each new user message opens a topic; the agent loop appends model replies,
//! warnings and tool results to the current topic. The whole structure is
//! serializable so collaborators can persist and reload it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::Message;

/// Body of a history entry: plain text or structured fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Fields(serde_json::Map<String, serde_json::Value>),
}

impl MessageContent {
    /// The form handed to the model: text as-is, fields as compact JSON.
    pub fn render(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Fields(map) => serde_json::Value::Object(map.clone()).to_string(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(text) => Some(text),
            MessageContent::Fields(_) => None,
        }
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::Text(text.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        MessageContent::Text(text)
    }
}

/// One recorded turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub id: String,
    /// True for model output, false for everything addressed to the model.
    pub ai: bool,
    pub content: MessageContent,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Topic {
    pub messages: Vec<HistoryMessage>,
}

/// A rendered history entry, ready for prompt assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputMessage {
    pub ai: bool,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct History {
    topics: Vec<Topic>,
    current: Topic,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the current topic. No-op when it is still empty.
    pub fn new_topic(&mut self) {
        if !self.current.messages.is_empty() {
            self.topics.push(std::mem::take(&mut self.current));
        }
    }

    pub fn add_message(&mut self, ai: bool, content: impl Into<MessageContent>) -> HistoryMessage {
        let message = HistoryMessage {
            id: Uuid::new_v4().to_string(),
            ai,
            content: content.into(),
            timestamp: Utc::now(),
        };
        self.current.messages.push(message.clone());
        message
    }

    /// All messages across topics, oldest first.
    pub fn messages(&self) -> impl Iterator<Item = &HistoryMessage> {
        self.topics
            .iter()
            .flat_map(|t| t.messages.iter())
            .chain(self.current.messages.iter())
    }

    pub fn last(&self) -> Option<&HistoryMessage> {
        self.messages().last()
    }

    pub fn len(&self) -> usize {
        self.topics.iter().map(|t| t.messages.len()).sum::<usize>() + self.current.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len() + usize::from(!self.current.messages.is_empty())
    }

    pub fn clear(&mut self) {
        self.topics.clear();
        self.current = Topic::default();
    }

    pub fn output(&self) -> Vec<OutputMessage> {
        self.messages()
            .map(|m| OutputMessage {
                ai: m.ai,
                content: m.content.render(),
            })
            .collect()
    }

    /// Flattened transcript, one `label: content` line per message.
    pub fn output_text(&self, human_label: &str, ai_label: &str) -> String {
        self.output()
            .iter()
            .map(|m| {
                let label = if m.ai { ai_label } else { human_label };
                format!("{label}: {}", m.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Convert rendered output into provider chat messages.
    pub fn to_messages(output: &[OutputMessage]) -> Vec<Message> {
        output
            .iter()
            .map(|m| {
                if m.ai {
                    Message::assistant(m.content.clone())
                } else {
                    Message::user(m.content.clone())
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;

    #[test]
    fn new_topic_segments_messages() {
        let mut history = History::new();
        history.new_topic();
        assert_eq!(history.topic_count(), 0);

        history.add_message(false, "first");
        history.add_message(true, "reply");
        history.new_topic();
        history.add_message(false, "second");

        assert_eq!(history.topic_count(), 2);
        assert_eq!(history.len(), 3);
        assert_eq!(history.last().unwrap().content.as_text(), Some("second"));
    }

    #[test]
    fn fields_render_as_json() {
        let mut map = serde_json::Map::new();
        map.insert("system_warning".into(), "careful".into());
        let mut history = History::new();
        history.add_message(false, MessageContent::Fields(map));

        let output = history.output();
        assert_eq!(output[0].content, r#"{"system_warning":"careful"}"#);
    }

    #[test]
    fn output_text_labels_roles() {
        let mut history = History::new();
        history.add_message(false, "hello");
        history.add_message(true, "hi");
        assert_eq!(history.output_text("user", "ai"), "user: hello\nai: hi");
    }

    #[test]
    fn to_messages_maps_roles() {
        let mut history = History::new();
        history.add_message(false, "hello");
        history.add_message(true, "hi");
        let messages = History::to_messages(&history.output());
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
    }

    #[test]
    fn history_survives_serialization() {
        let mut history = History::new();
        history.add_message(false, "hello");
        history.new_topic();
        history.add_message(false, "again");
        let json = serde_json::to_string(&history).unwrap();
        let restored: History = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.topic_count(), 2);
        assert_eq!(restored.output(), history.output());
    }
}
