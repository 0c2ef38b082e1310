//! Record normalizer: turns connector messages into `ParsedMessage`s.
//!
//! Returns `None` for anything that is not sender-authored text: time
//! dividers, system notices, attachments, and malformed shapes.

use serde_json::Value;

use crate::pipeline::types::{ParsedMessage, RawMessage, RawMessageObject, UNKNOWN_SENDER};

/// Normalize one raw message.
pub fn normalize(raw: &RawMessage) -> Option<ParsedMessage> {
    let (sender, content) = match raw {
        RawMessage::Sequence(items) => {
            if items.len() < 2 {
                return None;
            }
            (Some(&items[0]), &items[1])
        }
        RawMessage::Object(obj) => {
            if is_non_chat(obj) {
                return None;
            }
            (obj.sender.as_ref(), &obj.content)
        }
    };

    let content = match content {
        Value::String(s) if !s.is_empty() => s.clone(),
        _ => return None,
    };

    let sender = match sender {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        _ => UNKNOWN_SENDER.to_string(),
    };

    Some(ParsedMessage { content, sender })
}

/// Time dividers and system notices carry no sender-authored content.
fn is_non_chat(obj: &RawMessageObject) -> bool {
    let Some(kind) = obj.kind.as_deref() else {
        return false;
    };
    let kind = kind.to_ascii_lowercase();
    matches!(kind.as_str(), "time" | "system")
        || kind.contains("timemessage")
        || kind.contains("systemmessage")
}
