use crate::worklog::window::TimeWindow;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    fn from_record_type(raw: &str) -> Option<Self> {
        match raw {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Turn {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

/// User prompts starting with one of these are tool chatter, not effort.
const NOISE_MARKERS: [&str; 1] = ["<shell-maker"];
/// User turns at or under this many characters are acks and slash commands.
const MIN_USER_CHARS: usize = 10;

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let normalized = match trimmed.strip_suffix('Z') {
        Some(head) => format!("{head}+00:00"),
        None => trimmed.to_string(),
    };
    if let Ok(ts) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Text of a message payload: either a plain string or the `text` parts of
/// a content list joined by newlines.
fn message_text(message: &Value) -> Option<String> {
    match message.get("content")? {
        Value::String(s) => Some(s.clone()),
        Value::Array(parts) => {
            let texts = parts
                .iter()
                .filter(|part| part.get("type").and_then(Value::as_str) == Some("text"))
                .map(|part| part.get("text").and_then(Value::as_str).unwrap_or(""))
                .collect::<Vec<_>>();
            Some(texts.join("\n"))
        }
        _ => None,
    }
}

fn is_noise_user_text(text: &str) -> bool {
    NOISE_MARKERS.iter().any(|m| text.starts_with(m)) || text.chars().count() <= MIN_USER_CHARS
}

/// One record to at most one turn. `None` for anything that is not a usable
/// user or assistant message.
pub fn turn_from_record(record: &Value, with_timestamps: bool) -> Option<Turn> {
    let timestamp = if with_timestamps {
        Some(parse_timestamp(record.get("timestamp")?.as_str()?)?)
    } else {
        None
    };

    let role = Role::from_record_type(record.get("type")?.as_str()?)?;
    let message = record.get("message")?;
    if !message.is_object() {
        return None;
    }

    let text = message_text(message)?;
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if role == Role::User && is_noise_user_text(text) {
        return None;
    }

    Some(Turn {
        role,
        text: text.to_string(),
        timestamp,
    })
}

/// Ordered turns of one session log. A missing file reads as empty.
pub fn extract(path: &Path, with_timestamps: bool) -> Result<Vec<Turn>> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err).with_context(|| format!("failed to open {}", path.display())),
    };
    let reader = BufReader::new(file);

    let mut turns = Vec::new();
    for line in reader.split(b'\n') {
        let raw = line.with_context(|| format!("failed to read line from {}", path.display()))?;
        let decoded = String::from_utf8_lossy(&raw);
        let trimmed = decoded.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Ok(record) = serde_json::from_str::<Value>(trimmed) else {
            continue;
        };
        if let Some(turn) = turn_from_record(&record, with_timestamps) {
            turns.push(turn);
        }
    }
    Ok(turns)
}

/// Turns whose timestamp falls inside the window, bounds included.
pub fn filter_window(turns: Vec<Turn>, window: &TimeWindow) -> Vec<Turn> {
    turns
        .into_iter()
        .filter(|t| t.timestamp.is_some_and(|ts| window.contains(ts)))
        .collect()
}
