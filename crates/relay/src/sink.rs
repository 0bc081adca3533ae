//! Viewer sink trait
//!
//! Abstract interface for the downstream viewer transport.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Viewer delivery errors
#[derive(Error, Debug)]
pub enum SinkError {
    /// The viewer transport is closed; delivery cannot succeed again.
    #[error("Viewer connection closed")]
    Closed,

    /// A transient transport failure; delivery may succeed on retry.
    #[error("Viewer transport error: {0}")]
    Transport(String),
}

/// Downstream viewer transport.
///
/// One sink per viewer session. Implementations must be safe to share between
/// the delivery loop, the engine read loop and the sequencer, all of which
/// send concurrently.
#[async_trait]
pub trait ViewerSink: Send + Sync {
    /// Send a text message (control/event JSON) to the viewer
    async fn send_text(&self, text: &str) -> Result<(), SinkError>;

    /// Send a binary frame payload to the viewer
    async fn send_binary(&self, payload: Bytes) -> Result<(), SinkError>;

    /// Whether the viewer transport is still open
    fn is_open(&self) -> bool;
}
