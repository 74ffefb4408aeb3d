/// Log line classification: turn one raw gateway log line into a structured
/// event. Total — any input, including binary garbage, yields a well-formed
/// event; malformed JSON degrades to a plain-text event.
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Structured events carry at most this many characters of message text.
/// The raw line is retained separately for observers that want all of it.
const MESSAGE_CAP: usize = 200;

/// Ordered trigger-phrase → label mapping, matched case-insensitively
/// against the message, first match wins. Order is significant: earlier
/// entries take priority, so keep this list stable.
const EVENT_LABELS: &[(&str, &str)] = &[
    ("embedded run agent start", "🚀 Agent 开始运行"),
    ("embedded run agent end", "✅ Agent 运行结束"),
    ("embedded run prompt start", "📝 发送提示词"),
    ("embedded run tool start", "🔧 开始执行工具"),
    ("embedded run tool end", "✅ 工具执行完成"),
    ("lane enqueue", "📥 任务入队"),
    ("lane dequeue", "📤 任务出队"),
    ("session state", "📊 会话状态变更"),
    ("run registered", "📋 运行已注册"),
    ("compaction", "🗜️ 上下文压缩"),
    ("browser", "🌐 浏览器操作"),
    ("web_fetch", "🔗 网页抓取"),
    ("exec", "⚡ 执行命令"),
    ("gateway", "🌉 网关"),
    ("error", "❌ 错误"),
    ("failed", "❌ 失败"),
    ("telegram", "📨 Telegram"),
];

const DEFAULT_LABEL: &str = "📋 日志";

/// One classified log line. Immutable once created.
#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    pub time: DateTime<Utc>,
    pub level: String,
    pub subsystem: String,
    pub label: String,
    pub message: String,
    pub raw: String,
}

/// Look up the human label for a message. First match in `EVENT_LABELS` wins.
fn event_label(message: &str) -> &'static str {
    let lower = message.to_lowercase();
    for (trigger, label) in EVENT_LABELS {
        if lower.contains(trigger) {
            return label;
        }
    }
    DEFAULT_LABEL
}

/// Char-safe truncation (the cap is in characters, not bytes).
fn truncate(text: &str, cap: usize) -> String {
    text.chars().take(cap).collect()
}

/// Classify one raw log line.
///
/// Gateway logs are JSON objects in a positional format: field `"1"` holds
/// the message, field `"0"` the subsystem (itself sometimes a nested JSON
/// string carrying a `subsystem` field), `time` / `_meta.date` the
/// timestamp, and `_meta.logLevelName` the level. Anything that does not
/// fit that shape is treated as a plain-text line.
pub fn classify(line: &str) -> LogEvent {
    classify_structured(line).unwrap_or_else(|| plain_text_event(line))
}

fn classify_structured(line: &str) -> Option<LogEvent> {
    let data: Value = serde_json::from_str(line).ok()?;
    let obj = data.as_object()?;

    let message = match obj.get("1").and_then(Value::as_str) {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => truncate(&data.to_string(), MESSAGE_CAP),
    };

    let subsystem = match obj.get("0") {
        Some(Value::String(s)) if s.contains("subsystem") => {
            // Nested structured subsystem, e.g. {"subsystem":"agent/embedded"}.
            // If the re-parse fails the whole line is treated as plain text.
            let nested: Value = serde_json::from_str(s).ok()?;
            nested
                .get("subsystem")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string()
        }
        Some(Value::String(s)) => s.clone(),
        _ => "unknown".to_string(),
    };

    let time = obj
        .get("time")
        .or_else(|| obj.get("_meta").and_then(|m| m.get("date")))
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let level = obj
        .get("_meta")
        .and_then(|m| m.get("logLevelName"))
        .and_then(Value::as_str)
        .unwrap_or("INFO")
        .to_string();

    Some(LogEvent {
        time,
        level,
        subsystem,
        label: event_label(&message).to_string(),
        message: truncate(&message, MESSAGE_CAP),
        raw: line.to_string(),
    })
}

fn plain_text_event(line: &str) -> LogEvent {
    LogEvent {
        time: Utc::now(),
        level: "INFO".to_string(),
        subsystem: "system".to_string(),
        label: event_label(line).to_string(),
        message: truncate(line, MESSAGE_CAP),
        raw: line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_line() {
        let event = classify("just a plain line");
        assert_eq!(event.level, "INFO");
        assert_eq!(event.subsystem, "system");
        assert_eq!(event.message, "just a plain line");
        assert_eq!(event.label, DEFAULT_LABEL);
        assert_eq!(event.raw, "just a plain line");
    }

    #[test]
    fn test_empty_line() {
        let event = classify("");
        assert_eq!(event.message, "");
        assert_eq!(event.label, DEFAULT_LABEL);
    }

    #[test]
    fn test_binary_garbage_is_total() {
        let event = classify("\u{0}\u{1}\u{fffd}{{{");
        assert_eq!(event.subsystem, "system");
        assert_eq!(event.raw, "\u{0}\u{1}\u{fffd}{{{");
    }

    #[test]
    fn test_structured_line() {
        let line = r#"{"0":"agent","1":"embedded run agent start","time":"2026-02-01T10:00:00Z","_meta":{"logLevelName":"DEBUG"}}"#;
        let event = classify(line);
        assert_eq!(event.subsystem, "agent");
        assert_eq!(event.message, "embedded run agent start");
        assert_eq!(event.level, "DEBUG");
        assert_eq!(event.label, "🚀 Agent 开始运行");
        assert_eq!(event.time.to_rfc3339(), "2026-02-01T10:00:00+00:00");
    }

    #[test]
    fn test_nested_subsystem_string() {
        let line = r#"{"0":"{\"subsystem\":\"agent/embedded\"}","1":"lane enqueue"}"#;
        let event = classify(line);
        assert_eq!(event.subsystem, "agent/embedded");
        assert_eq!(event.label, "📥 任务入队");
    }

    #[test]
    fn test_unparseable_nested_subsystem_falls_back_to_plain_text() {
        let line = r#"{"0":"subsystem but not json","1":"hello"}"#;
        let event = classify(line);
        assert_eq!(event.subsystem, "system");
        assert_eq!(event.message, line);
    }

    #[test]
    fn test_missing_message_serializes_object() {
        let line = r#"{"0":"agent","time":"2026-02-01T10:00:00Z"}"#;
        let event = classify(line);
        assert!(event.message.contains("agent"));
        assert!(event.message.len() <= MESSAGE_CAP);
    }

    #[test]
    fn test_meta_date_fallback() {
        let line = r#"{"0":"agent","1":"hi","_meta":{"date":"2026-02-01T11:30:00Z"}}"#;
        let event = classify(line);
        assert_eq!(event.time.to_rfc3339(), "2026-02-01T11:30:00+00:00");
    }

    #[test]
    fn test_non_object_json_is_plain_text() {
        let event = classify("42");
        assert_eq!(event.subsystem, "system");
        assert_eq!(event.message, "42");
    }

    #[test]
    fn test_label_first_match_wins() {
        // "embedded run agent start" matches before the bare "error" entry.
        let event = classify("embedded run agent start after error");
        assert_eq!(event.label, "🚀 Agent 开始运行");
    }

    #[test]
    fn test_label_case_insensitive() {
        let event = classify("Telegram bridge reconnected");
        assert_eq!(event.label, "📨 Telegram");
    }

    #[test]
    fn test_error_label() {
        let event = classify("ERROR: Chrome extension relay is running, but no tab is connected");
        assert_eq!(event.label, "❌ 错误");
    }

    #[test]
    fn test_message_truncated_to_cap() {
        let long = "x".repeat(500);
        let event = classify(&long);
        assert_eq!(event.message.chars().count(), MESSAGE_CAP);
        assert_eq!(event.raw.len(), 500);
    }

    #[test]
    fn test_truncation_is_char_safe() {
        let long = "错".repeat(300);
        let event = classify(&long);
        assert_eq!(event.message.chars().count(), MESSAGE_CAP);
    }
}
