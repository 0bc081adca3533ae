//! Wire message types
//!
//! Two message surfaces meet in this crate: the render engine's control JSON
//! and the `{"type", "content"}` envelope relayed to the viewer.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Terminal status value the render engine sends when a segment is done.
pub const STATUS_COMPLETED: &str = "completed";

/// A structured status event from the render engine.
///
/// Only `status` is interpreted; every other field is passed through to the
/// viewer untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlMessage {
    /// Processing status reported by the engine (e.g. "processing",
    /// "completed").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Pass-through payload fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ControlMessage {
    /// Whether this message carries the terminal "completed" status
    pub fn is_terminal(&self) -> bool {
        self.status.as_deref() == Some(STATUS_COMPLETED)
    }
}

/// Outbound message to the viewer, serialized as `{"type": .., "content": ..}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewerMessage {
    /// Base64 audio payload of the clip about to be rendered.
    Audio { content: String },
    /// Transcribed viewer speech.
    TextUser { content: String },
    /// Generated assistant reply.
    TextAssistant { content: String },
    /// Non-fatal error surfaced to the viewer.
    Error { content: String },
}

impl ViewerMessage {
    /// Serialize to the wire JSON string
    pub fn to_json(&self) -> String {
        // The envelope contains only string fields; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_message_terminal() {
        let msg: ControlMessage = serde_json::from_str(r#"{"status":"completed"}"#).unwrap();
        assert!(msg.is_terminal());

        let msg: ControlMessage = serde_json::from_str(r#"{"status":"processing"}"#).unwrap();
        assert!(!msg.is_terminal());

        let msg: ControlMessage = serde_json::from_str(r#"{"progress":42}"#).unwrap();
        assert!(!msg.is_terminal());
        assert_eq!(msg.extra.get("progress"), Some(&Value::from(42)));
    }

    #[test]
    fn test_viewer_message_envelope() {
        let msg = ViewerMessage::TextUser {
            content: "hello".to_string(),
        };
        let json = msg.to_json();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "text_user");
        assert_eq!(value["content"], "hello");
    }

    #[test]
    fn test_viewer_message_roundtrip() {
        let msg = ViewerMessage::Audio {
            content: "aGVsbG8=".to_string(),
        };
        let parsed: ViewerMessage = serde_json::from_str(&msg.to_json()).unwrap();
        assert_eq!(parsed, msg);
    }
}
