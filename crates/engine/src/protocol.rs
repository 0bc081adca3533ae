//! Render engine wire protocol
//!
//! One outbound JSON request per clip; inbound messages are either control
//! JSON or opaque binary frames. Decoding happens once at the connection
//! boundary so every message dispatches to exactly one handling path.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::Message;

use avatar_agent_core::{Clip, ControlMessage};

use crate::EngineError;

/// Per-request transfer options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderOptions {
    pub jpeg_quality: u8,
    pub batch_send: bool,
    pub verbose: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            jpeg_quality: 50,
            batch_send: false,
            verbose: false,
        }
    }
}

/// Outbound render request for one clip
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderRequest {
    /// Path of the audio file the engine reads
    pub audio_path: String,
    /// Avatar variant matching the clip's style tag
    pub avatar: String,
    /// Transfer options
    pub options: RenderOptions,
}

impl RenderRequest {
    /// Build the request for a clip
    pub fn for_clip(clip: &Clip, options: RenderOptions) -> Self {
        Self {
            audio_path: clip.audio_path.clone(),
            avatar: clip.style.clone(),
            options,
        }
    }
}

/// One decoded inbound engine message
#[derive(Debug)]
pub enum EngineMessage {
    /// Control JSON; `raw` is kept so non-terminal messages can be forwarded
    /// to the viewer verbatim.
    Control { message: ControlMessage, raw: String },
    /// Opaque binary video frame.
    Frame(Bytes),
}

/// Decode one websocket message into an engine message.
///
/// Returns `Ok(None)` for transport-level messages (ping/pong) that carry no
/// engine payload. Close frames are handled by the read loop before decoding.
pub fn decode_message(message: Message) -> Result<Option<EngineMessage>, EngineError> {
    match message {
        Message::Text(text) => {
            let raw = text.as_str().to_string();
            let control: ControlMessage = serde_json::from_str(&raw)
                .map_err(|e| EngineError::Protocol(format!("Malformed control message: {}", e)))?;
            Ok(Some(EngineMessage::Control { message: control, raw }))
        }
        Message::Binary(payload) => Ok(Some(EngineMessage::Frame(payload))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_request_shape() {
        let clip = Clip::new("/audio/seg0.wav", "avatar_happy", 0);
        let request = RenderRequest::for_clip(&clip, RenderOptions::default());
        let json = serde_json::to_string(&request).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["audio_path"], "/audio/seg0.wav");
        assert_eq!(value["avatar"], "avatar_happy");
        assert_eq!(value["options"]["jpeg_quality"], 50);
        assert_eq!(value["options"]["batch_send"], false);
        assert_eq!(value["options"]["verbose"], false);
    }

    #[test]
    fn test_decode_control_message() {
        let msg = Message::text(r#"{"status":"completed"}"#);
        match decode_message(msg).unwrap() {
            Some(EngineMessage::Control { message, raw }) => {
                assert!(message.is_terminal());
                assert_eq!(raw, r#"{"status":"completed"}"#);
            }
            other => panic!("unexpected decode: {:?}", other),
        }
    }

    #[test]
    fn test_decode_frame() {
        let msg = Message::Binary(Bytes::from_static(b"\xff\xd8jpeg"));
        match decode_message(msg).unwrap() {
            Some(EngineMessage::Frame(payload)) => assert_eq!(payload.len(), 6),
            other => panic!("unexpected decode: {:?}", other),
        }
    }

    #[test]
    fn test_decode_malformed_control() {
        let msg = Message::text("not json at all");
        assert!(decode_message(msg).is_err());
    }

    #[test]
    fn test_decode_ping_is_ignored() {
        let msg = Message::Ping(Bytes::new());
        assert!(decode_message(msg).unwrap().is_none());
    }
}
