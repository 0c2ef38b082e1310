//! Shared types for the lead pipeline.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Format of the `capturedAt` column.
pub const CAPTURED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Sender recorded when a message does not say who wrote it.
pub const UNKNOWN_SENDER: &str = "unknown sender";

// ── Raw message ─────────────────────────────────────────────────────

/// A message exactly as the connector reported it.
///
/// Connectors hand over one of two shapes. On the wire a JSON array decodes
/// to `Sequence` and a JSON object to `Object`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawMessage {
    /// Legacy shape: `[sender, content, ...]`.
    Sequence(Vec<serde_json::Value>),
    /// Structured shape with a declared message type.
    Object(RawMessageObject),
}

/// Structured message as reported by newer connector versions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMessageObject {
    /// Connector message-type label, e.g. "text", "time", "SystemMessage".
    #[serde(default, rename = "type", alias = "kind", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Message body. Non-string values mark attachments (images, files).
    #[serde(default)]
    pub content: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<serde_json::Value>,
}

impl RawMessage {
    /// Convenience constructor for the legacy pair shape.
    pub fn pair(sender: &str, content: &str) -> Self {
        Self::Sequence(vec![sender.into(), content.into()])
    }

    /// Decode a loosely-typed JSON value. `None` if it matches neither shape.
    pub fn from_value(value: serde_json::Value) -> Option<Self> {
        serde_json::from_value(value).ok()
    }

    /// Convenience constructor for a plain text object message.
    pub fn text(sender: &str, content: &str) -> Self {
        Self::Object(RawMessageObject {
            kind: Some("text".into()),
            content: content.into(),
            sender: Some(sender.into()),
        })
    }
}

// ── Parsed message ──────────────────────────────────────────────────

/// A content-bearing chat message in canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    /// Always non-empty.
    pub content: String,
    pub sender: String,
}

// ── Lead record ─────────────────────────────────────────────────────

/// One accepted lead, as written to the table.
///
/// Field order is the column order of the persisted table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadRecord {
    pub captured_at: String,
    pub source_name: String,
    pub sender: String,
    pub content: String,
}

impl LeadRecord {
    /// Build a record stamped with the given capture time.
    pub fn new(captured_at: DateTime<Local>, source_name: &str, message: ParsedMessage) -> Self {
        Self {
            captured_at: captured_at.format(CAPTURED_AT_FORMAT).to_string(),
            source_name: source_name.to_string(),
            sender: message.sender,
            content: message.content,
        }
    }
}

// ── Cycle bookkeeping ───────────────────────────────────────────────

/// Where the orchestrator currently is in its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Polling,
    Processing,
    Flushing,
    Sleeping,
    Stopped,
}

/// Result of one polling cycle.
///
/// Every variant lets the loop continue; `FatalFailure` only means the cycle
/// itself produced nothing durable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every matched source was read and the batch (if any) was saved.
    Ok { leads: usize },
    /// Some sources failed; leads from the others were saved.
    PartialFailure { leads: usize, reason: String },
    /// Sources could not be listed or the batch could not be saved.
    FatalFailure { reason: String },
}

impl CycleOutcome {
    /// Leads durably written during this cycle.
    pub fn leads(&self) -> usize {
        match self {
            Self::Ok { leads } | Self::PartialFailure { leads, .. } => *leads,
            Self::FatalFailure { .. } => 0,
        }
    }

    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ok { .. } => "ok",
            Self::PartialFailure { .. } => "partial_failure",
            Self::FatalFailure { .. } => "fatal_failure",
        }
    }
}
