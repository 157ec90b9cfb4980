//! Lenient extraction of tool requests from model replies.
//!
//! Models wrap JSON in prose or code fences, leave trailing commas, or stop
//! mid-object. We take the first `{`, try a strict parse of the first JSON
//! value, and fall back to a light repair pass that strips fence lines first.

use std::borrow::Cow;

use serde_json::Value;

/// A tool invocation found in a reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRequest {
    pub name: String,
    pub args: serde_json::Map<String, Value>,
}

/// Find `{"tool_name": ..., "tool_args": {...}}` in `text`.
///
/// `tool_args` defaults to an empty map when missing or not an object.
pub fn parse_tool_request(text: &str) -> Option<ToolRequest> {
    let value = parse_dirty_json(text)?;
    let object = value.as_object()?;
    let name = object.get("tool_name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }
    let args = object
        .get("tool_args")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    Some(ToolRequest {
        name: name.to_string(),
        args,
    })
}

/// Parse the first JSON object in `text`, repairing common damage.
pub fn parse_dirty_json(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let candidate = &text[start..];

    let mut values = serde_json::Deserializer::from_str(candidate).into_iter::<Value>();
    if let Some(Ok(value)) = values.next() {
        return Some(value);
    }

    serde_json::from_str(&repair(&strip_fences(candidate))).ok()
}

/// Drop lines that open or close a markdown code fence.
fn strip_fences(text: &str) -> Cow<'_, str> {
    if !text.contains("```") {
        return Cow::Borrowed(text);
    }
    let kept: Vec<&str> = text
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect();
    Cow::Owned(kept.join("\n"))
}

/// Drop trailing commas, close an open string and balance brackets.
/// Stops at the bracket that closes the outermost object.
fn repair(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len() + 8);
    let mut closers: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in fragment.chars() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '{' => {
                closers.push('}');
                out.push(c);
            }
            '[' => {
                closers.push(']');
                out.push(c);
            }
            '}' | ']' => {
                trim_trailing_comma(&mut out);
                if closers.last() == Some(&c) {
                    closers.pop();
                }
                out.push(c);
                if closers.is_empty() {
                    return out;
                }
            }
            _ => out.push(c),
        }
    }

    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }
    while let Some(closer) = closers.pop() {
        trim_trailing_comma(&mut out);
        out.push(closer);
    }
    out
}

fn trim_trailing_comma(out: &mut String) {
    let trimmed_len = out.trim_end().len();
    if out[..trimmed_len].ends_with(',') {
        out.truncate(trimmed_len - 1);
    }
}
