//! Prompt backend: template lookup and rendering.
//!
//! Templates are markdown files named `{id}.md`. A body that is a JSON object
//! or array renders to structured output; anything else renders to text.
//! `{{name}}` placeholders are substituted from the caller's variables.

use std::path::PathBuf;

use serde_json::Value;

use crate::error::PromptError;

/// The three shapes a rendered template can take.
#[derive(Debug, Clone, PartialEq)]
pub enum PromptOutput {
    /// One message
    Text(String),
    /// Several messages, in order
    Lines(Vec<String>),
    /// Keyword fields for one structured message
    Fields(serde_json::Map<String, Value>),
}

impl PromptOutput {
    /// Collapse any shape to plain text.
    pub fn into_text(self) -> String {
        match self {
            PromptOutput::Text(text) => text,
            PromptOutput::Lines(lines) => lines.join("\n"),
            PromptOutput::Fields(map) => Value::Object(map).to_string(),
        }
    }
}

/// Renders a template identifier with keyword substitutions.
pub trait PromptRenderer: Send + Sync {
    fn render(&self, template: &str, vars: &[(&str, &str)]) -> Result<PromptOutput, PromptError>;
}

const BUILTIN: &[(&str, &str)] = &[
    (
        "agent.system.main",
        "You are {{agent_name}}, an autonomous agent solving tasks step by step.\n\
         Every reply must be exactly one JSON object of the form \
         {\"thoughts\": [\"...\"], \"tool_name\": \"...\", \"tool_args\": {}}.\n\
         Use the response tool with a \"text\" argument to deliver the final answer.\n\
         Use call_subordinate with a \"message\" argument to delegate a subtask.",
    ),
    ("agent.system.tools", "Available tools: {{tools}}"),
    ("fw.user_message", "{{message}}"),
    ("fw.intervention", r#"{"user_intervention": "{{message}}"}"#),
    ("fw.ai_response", "{{message}}"),
    ("fw.warning", r#"{"system_warning": "{{message}}"}"#),
    (
        "fw.tool_result",
        r#"{"tool_name": "{{tool_name}}", "tool_result": "{{tool_result}}"}"#,
    ),
    (
        "fw.tool_not_found",
        "Tool {{tool_name}} not found. Available tools: {{tools}}",
    ),
    (
        "fw.msg_repeat",
        "You have sent the same message again. You have to do something else!",
    ),
    (
        "fw.msg_misformat",
        "You have misformatted your message. Reply with a single JSON object \
         containing tool_name and tool_args.",
    ),
];

/// File-backed templates with built-in fallbacks.
///
/// Lookup order: `{root}/{subdir}/{id}.md`, `{root}/default/{id}.md`, built-in.
#[derive(Debug, Clone, Default)]
pub struct TemplatePrompts {
    search: Vec<PathBuf>,
}

impl TemplatePrompts {
    /// Built-in templates only.
    pub fn builtin() -> Self {
        Self::default()
    }

    pub fn new(root: impl Into<PathBuf>, subdir: &str) -> Self {
        let root = root.into();
        let mut search = Vec::new();
        if !subdir.is_empty() && subdir != "default" {
            search.push(root.join(subdir));
        }
        search.push(root.join("default"));
        Self { search }
    }

    fn load(&self, name: &str) -> Result<String, PromptError> {
        for dir in &self.search {
            let path = dir.join(format!("{name}.md"));
            if path.is_file() {
                tracing::trace!(template = name, path = %path.display(), "Loading prompt template");
                return std::fs::read_to_string(&path).map_err(|e| PromptError::ReadFailed {
                    name: name.to_string(),
                    reason: e.to_string(),
                });
            }
        }
        tracing::trace!(template = name, "Using built-in prompt template");
        BUILTIN
            .iter()
            .find(|(id, _)| *id == name)
            .map(|(_, body)| body.to_string())
            .ok_or_else(|| PromptError::NotFound(name.to_string()))
    }
}

impl PromptRenderer for TemplatePrompts {
    fn render(&self, template: &str, vars: &[(&str, &str)]) -> Result<PromptOutput, PromptError> {
        let body = self.load(template)?;
        Ok(render_body(strip_code_fences(&body), vars))
    }
}

/// Render a template body. JSON bodies are substituted leaf by leaf so that
/// quotes or newlines in the values cannot break the structure.
pub fn render_body(body: &str, vars: &[(&str, &str)]) -> PromptOutput {
    let trimmed = body.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            match substitute_value(value, vars) {
                Value::Object(map) => return PromptOutput::Fields(map),
                Value::Array(items) => {
                    return PromptOutput::Lines(
                        items
                            .into_iter()
                            .map(|item| match item {
                                Value::String(s) => s,
                                other => other.to_string(),
                            })
                            .collect(),
                    );
                }
                _ => {}
            }
        }
    }
    PromptOutput::Text(substitute(trimmed, vars))
}

fn substitute_value(value: Value, vars: &[(&str, &str)]) -> Value {
    match value {
        Value::String(s) => Value::String(substitute(&s, vars)),
        Value::Array(items) => Value::Array(items.into_iter().map(|v| substitute_value(v, vars)).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, substitute_value(v, vars)))
                .collect(),
        ),
        other => other,
    }
}

/// Single pass, so placeholders inside substituted values stay literal.
/// Unknown placeholders are left as written.
fn substitute(text: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let key = after[..end].trim();
        match vars.iter().find(|(k, _)| *k == key) {
            Some((_, value)) => out.push_str(value),
            None => out.push_str(&rest[start..start + end + 4]),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

fn strip_code_fences(body: &str) -> &str {
    let trimmed = body.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string ("json", "md", ...) on the opening fence line
    let inner = match inner.find('\n') {
        Some(pos) => &inner[pos + 1..],
        None => "",
    };
    inner
        .trim_end()
        .strip_suffix("```")
        .map(str::trim_end)
        .unwrap_or(inner)
}
