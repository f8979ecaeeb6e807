/// Transcript record models
///
/// One JSON object per line of a session transcript. Only the fields the
/// scanner reads are modelled; everything else is ignored.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

/// Notice the host writes into a tool result when the user rejects a tool call
pub const REJECTION_NOTICE: &str = "The user doesn't want to proceed with this tool use";

// Text after this (case-insensitive) in a rejection is the user's feedback
const FEEDBACK_LEAD: &str = "the user said:";

// User records starting with these are host echoes, not something typed
const ECHO_PREFIXES: &[&str] = &[
    "<command-name>",
    "<command-message>",
    "<command-args>",
    "<local-command-stdout>",
    "<local-command-stderr>",
    "Caveat:",
    "<system-reminder>",
];

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptRecord {
    #[serde(rename = "type")]
    pub record_type: Option<String>,
    #[serde(default)]
    pub is_meta: bool,
    pub message: Option<TranscriptMessage>,
    pub timestamp: Option<String>,
    pub tool_use_result: Option<Value>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TranscriptMessage {
    pub role: Option<String>,
    pub content: Option<Value>,
}

/// What a record means to the scanner
#[derive(Debug, Clone, PartialEq)]
pub enum Turn {
    /// Something the user actually typed
    User(String),
    /// A rejected tool call, with whatever the user said about it
    Rejection(String),
    /// Assistant text, kept only as context
    Assistant(String),
}

impl TranscriptRecord {
    pub fn is_user(&self) -> bool {
        self.record_type.as_deref() == Some("user")
    }

    pub fn is_assistant(&self) -> bool {
        self.record_type.as_deref() == Some("assistant")
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let raw = self.timestamp.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    fn content(&self) -> Option<&Value> {
        self.message.as_ref()?.content.as_ref()
    }

    /// Plain text of the message, text blocks joined by newlines
    pub fn text(&self) -> Option<String> {
        let text = match self.content()? {
            Value::String(s) => s.clone(),
            Value::Array(blocks) => blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n"),
            _ => return None,
        };
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }

    /// Rejection notice text, if this record carries one
    fn rejection_notice(&self) -> Option<String> {
        if let Some(Value::Array(blocks)) = self.content() {
            for block in blocks {
                if block.get("type").and_then(Value::as_str) != Some("tool_result") {
                    continue;
                }
                let text = match block.get("content") {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Array(parts)) => parts
                        .iter()
                        .filter_map(|p| p.get("text").and_then(Value::as_str))
                        .collect::<Vec<_>>()
                        .join("\n"),
                    _ => continue,
                };
                if text.contains(REJECTION_NOTICE) {
                    return Some(text);
                }
            }
        }

        match &self.tool_use_result {
            Some(Value::String(s)) if s.contains(REJECTION_NOTICE) => Some(s.clone()),
            _ => None,
        }
    }

    /// Interpret the record, None for anything the scanner ignores
    pub fn turn(&self) -> Option<Turn> {
        if self.is_assistant() {
            return self.text().map(Turn::Assistant);
        }
        if !self.is_user() || self.is_meta {
            return None;
        }

        if let Some(notice) = self.rejection_notice() {
            return Some(Turn::Rejection(rejection_feedback(&notice)));
        }

        let text = self.text()?;
        if is_command_echo(&text) {
            return None;
        }
        Some(Turn::User(text))
    }
}

/// Feedback the user gave with a rejection, empty when none
pub fn rejection_feedback(notice: &str) -> String {
    // Searched in the original text so offsets stay valid for any script
    notice
        .char_indices()
        .map(|(idx, _)| idx)
        .find(|idx| {
            notice
                .get(*idx..*idx + FEEDBACK_LEAD.len())
                .is_some_and(|s| s.eq_ignore_ascii_case(FEEDBACK_LEAD))
        })
        .map(|idx| notice[idx + FEEDBACK_LEAD.len()..].trim().to_string())
        .unwrap_or_default()
}

pub fn is_command_echo(text: &str) -> bool {
    let text = text.trim_start();
    ECHO_PREFIXES.iter().any(|p| text.starts_with(p))
}
