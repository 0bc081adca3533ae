//! Video frame types

use bytes::Bytes;
use std::time::Instant;

/// One binary video frame received from the render engine, awaiting delivery
/// to the viewer.
///
/// Transient: a frame lives only between receipt on the engine connection and
/// delivery (or eviction) in the relay buffer.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Opaque frame payload.
    pub payload: Bytes,

    /// When the frame arrived from the render engine.
    pub received_at: Instant,

    /// The viewer session this frame belongs to.
    pub session_id: String,
}

impl VideoFrame {
    /// Create a frame stamped with the current time
    pub fn new(payload: Bytes, session_id: impl Into<String>) -> Self {
        Self {
            payload,
            received_at: Instant::now(),
            session_id: session_id.into(),
        }
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
