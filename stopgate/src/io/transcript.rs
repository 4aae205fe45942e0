//! Reader for the host's JSONL conversation transcript.
//!
//! The stop gate needs two facts: the most recent assistant text and the
//! timestamp of the most recent user entry. Compaction capture reads a
//! bounded excerpt of the conversation instead. Malformed lines are skipped.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Total characters of conversation handed to the analyzer.
pub const CONVERSATION_CHAR_LIMIT: usize = 50_000;

/// Characters kept from each message.
pub const MESSAGE_CHAR_LIMIT: usize = 2_000;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptSummary {
    pub last_assistant_text: String,
    pub last_user_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    role: String,
    #[serde(default)]
    content: Value,
    #[serde(default)]
    message: Option<Message>,
    #[serde(default)]
    timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Value,
}

/// Read and summarize a transcript. A missing or unreadable file is empty.
pub fn read_transcript(path: &Path) -> TranscriptSummary {
    match fs::read_to_string(path) {
        Ok(contents) => summarize(&contents),
        Err(err) => {
            debug!(path = %path.display(), err = %err, "transcript unavailable");
            TranscriptSummary::default()
        }
    }
}

pub fn summarize(contents: &str) -> TranscriptSummary {
    let mut summary = TranscriptSummary::default();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(entry) = serde_json::from_str::<Entry>(line) else {
            continue;
        };
        match entry.kind.as_str() {
            "assistant" => {
                if let Some(text) = entry.message.as_ref().and_then(|m| last_text(&m.content)) {
                    summary.last_assistant_text = text;
                }
            }
            "user" => {
                if let Some(at) = entry.timestamp.as_deref().and_then(parse_timestamp) {
                    summary.last_user_at = Some(at);
                }
            }
            _ => {}
        }
    }
    summary
}

/// Read the conversation excerpt of a transcript. A missing file is empty.
pub fn read_conversation(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(contents) => conversation_excerpt(&contents),
        Err(err) => {
            debug!(path = %path.display(), err = %err, "transcript unavailable");
            String::new()
        }
    }
}

/// `USER:` and `ASSISTANT:` paragraphs in transcript order.
///
/// User entries count only when their content is a string (tool results are
/// skipped); assistant entries contribute their first text block. Collection
/// stops once [`CONVERSATION_CHAR_LIMIT`] characters are gathered.
pub fn conversation_excerpt(contents: &str) -> String {
    let mut parts = Vec::new();
    let mut total = 0;
    for line in contents.lines() {
        if total >= CONVERSATION_CHAR_LIMIT {
            break;
        }
        let Ok(entry) = serde_json::from_str::<Entry>(line.trim()) else {
            continue;
        };
        let role = if entry.kind.is_empty() {
            entry.role.as_str()
        } else {
            entry.kind.as_str()
        };
        let content = entry.message.as_ref().map_or(&entry.content, |m| &m.content);
        let chunk = match role {
            "user" => content
                .as_str()
                .filter(|text| !text.trim().is_empty())
                .map(|text| format!("USER: {}", clip(text))),
            "assistant" => first_text(content).map(|text| format!("ASSISTANT: {}", clip(&text))),
            _ => None,
        };
        if let Some(chunk) = chunk {
            total += chunk.chars().count();
            parts.push(chunk);
        }
    }
    parts.join("\n\n")
}

fn clip(text: &str) -> String {
    text.chars().take(MESSAGE_CHAR_LIMIT).collect()
}

/// First non-blank text in a content value.
fn first_text(content: &Value) -> Option<String> {
    match content {
        Value::String(text) => Some(text.clone()),
        Value::Array(blocks) => blocks.iter().find_map(|block| match block {
            Value::Object(obj) if obj.get("type").and_then(Value::as_str) == Some("text") => obj
                .get("text")
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        }),
        _ => None,
    }
    .filter(|text| !text.trim().is_empty())
}

/// Last text in a content value: a plain string, or the last `text` block / string item.
fn last_text(content: &Value) -> Option<String> {
    match content {
        Value::String(text) => Some(text.clone()),
        Value::Array(blocks) => blocks.iter().rev().find_map(|block| match block {
            Value::String(text) => Some(text.clone()),
            Value::Object(obj) if obj.get("type").and_then(Value::as_str) == Some("text") => {
                obj.get("text").and_then(Value::as_str).map(str::to_string)
            }
            _ => None,
        }),
        _ => None,
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|at| at.with_timezone(&Utc))
}
