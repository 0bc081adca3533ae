//! Viewer sink over an axum websocket
//!
//! Adapts the shared websocket send half to the relay's `ViewerSink` trait so
//! the delivery loop, the engine read loop and the sequencer can all send to
//! the viewer concurrently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::stream::SplitSink;
use futures::SinkExt;

use avatar_agent_relay::{SinkError, ViewerSink};

/// `ViewerSink` implementation over the viewer's websocket
pub struct WsViewerSink {
    sender: tokio::sync::Mutex<SplitSink<WebSocket, Message>>,
    open: AtomicBool,
}

impl WsViewerSink {
    /// Wrap the send half of a viewer websocket
    pub fn new(sender: SplitSink<WebSocket, Message>) -> Arc<Self> {
        Arc::new(Self {
            sender: tokio::sync::Mutex::new(sender),
            open: AtomicBool::new(true),
        })
    }

    /// Mark the transport closed; subsequent sends fail fast with `Closed`
    pub fn mark_closed(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl ViewerSink for WsViewerSink {
    async fn send_text(&self, text: &str) -> Result<(), SinkError> {
        if !self.is_open() {
            return Err(SinkError::Closed);
        }

        let mut sender = self.sender.lock().await;
        sender
            .send(Message::Text(text.to_string()))
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))
    }

    async fn send_binary(&self, payload: Bytes) -> Result<(), SinkError> {
        if !self.is_open() {
            return Err(SinkError::Closed);
        }

        let mut sender = self.sender.lock().await;
        sender
            .send(Message::Binary(payload.to_vec()))
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}
