/// Snapshot readers over the gateway's on-disk session state.
///
/// Every reader is a fresh, stateless query: absent or malformed files are
/// "no data yet" and degrade to an empty result, never an error.
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Context window assumed when a session reports none.
const DEFAULT_CONTEXT_TOKENS: u64 = 128_000;
/// Only the trailing entries of a transcript are scanned.
const MESSAGE_SCAN_LINES: usize = 100;
/// And only the most recent reconstructed messages are returned.
const MESSAGE_RETURN_CAP: usize = 20;
/// Display text cap; the full text is retained alongside.
const MESSAGE_PREVIEW_CHARS: usize = 500;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEntry {
    pub key: String,
    pub session_id: String,
    pub updated_at: Value,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub context_tokens: u64,
    pub compaction_count: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionInfo {
    pub sessions: Vec<SessionEntry>,
}

/// List all sessions in the keyed registry object. Entries without a
/// `sessionId` are skipped; missing metric fields take documented defaults.
pub fn read_sessions(registry_path: &Path) -> SessionInfo {
    let Some(data) = read_json(registry_path) else {
        return SessionInfo::default();
    };
    let Some(entries) = data.as_object() else {
        return SessionInfo::default();
    };

    let mut sessions = Vec::new();
    for (key, session) in entries {
        let Some(obj) = session.as_object() else {
            continue;
        };
        let Some(session_id) = obj.get("sessionId").and_then(Value::as_str) else {
            continue;
        };
        let field = |name: &str| obj.get(name).and_then(Value::as_u64).unwrap_or(0);
        sessions.push(SessionEntry {
            key: key.clone(),
            session_id: session_id.to_string(),
            updated_at: obj.get("updatedAt").cloned().unwrap_or(Value::Null),
            model: obj
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            input_tokens: field("inputTokens"),
            output_tokens: field("outputTokens"),
            total_tokens: field("totalTokens"),
            context_tokens: obj
                .get("contextTokens")
                .or_else(|| obj.get("contextWindow"))
                .and_then(Value::as_u64)
                .unwrap_or(DEFAULT_CONTEXT_TOKENS),
            compaction_count: field("compactionCount"),
        });
    }
    SessionInfo { sessions }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEntry {
    pub id: Value,
    pub time: Value,
    pub role: String,
    pub content: String,
    pub full_content: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MessageFeed {
    pub messages: Vec<MessageEntry>,
}

/// Reconstruct the recent model conversation from the most recently modified
/// transcript in the sessions directory. Malformed lines are skipped
/// individually.
pub fn read_messages(sessions_dir: &Path) -> MessageFeed {
    let Some(transcript) = latest_transcript(sessions_dir) else {
        return MessageFeed::default();
    };
    let Ok(content) = std::fs::read_to_string(&transcript) else {
        return MessageFeed::default();
    };

    let lines: Vec<&str> = content.trim().split('\n').collect();
    let skip = lines.len().saturating_sub(MESSAGE_SCAN_LINES);

    let mut messages = Vec::new();
    for line in &lines[skip..] {
        let Ok(data) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        if data.get("type").and_then(Value::as_str) != Some("message") {
            continue;
        }
        let Some(msg) = data.get("message") else {
            continue;
        };
        let text = render_content(msg.get("content"));
        messages.push(MessageEntry {
            id: data.get("id").cloned().unwrap_or(Value::Null),
            time: data.get("timestamp").cloned().unwrap_or(Value::Null),
            role: msg
                .get("role")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            content: text.chars().take(MESSAGE_PREVIEW_CHARS).collect(),
            full_content: text,
        });
    }

    let skip = messages.len().saturating_sub(MESSAGE_RETURN_CAP);
    MessageFeed {
        messages: messages.split_off(skip),
    }
}

/// Display text from mixed content parts: plain text verbatim, tool
/// invocations as a short placeholder naming the tool, tool results as a
/// fixed placeholder.
fn render_content(content: Option<&Value>) -> String {
    match content {
        Some(Value::Array(parts)) => {
            let mut text = String::new();
            for item in parts {
                match item.get("type").and_then(Value::as_str) {
                    Some("text") => {
                        text.push_str(item.get("text").and_then(Value::as_str).unwrap_or(""));
                    }
                    Some("tool_use") => {
                        let name = item.get("name").and_then(Value::as_str).unwrap_or("");
                        text.push_str(&format!("[工具调用: {name}]"));
                    }
                    Some("tool_result") => text.push_str("[工具返回]"),
                    _ => {}
                }
            }
            text
        }
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    }
}

/// Most recently modified `.jsonl` transcript, excluding files tagged
/// deleted or lock.
fn latest_transcript(sessions_dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(sessions_dir).ok()?;
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.ends_with(".jsonl") || name.contains("deleted") || name.contains("lock") {
            continue;
        }
        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };
        if newest.as_ref().is_none_or(|(t, _)| modified > *t) {
            newest = Some((modified, entry.path()));
        }
    }
    newest.map(|(_, path)| path)
}

fn read_json(path: &Path) -> Option<Value> {
    let content = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}
