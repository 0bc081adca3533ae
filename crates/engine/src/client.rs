//! Render Session Client
//!
//! Owns one duplex websocket to the render engine and splits its inbound
//! stream into two independent paths: control messages (forwarded to the
//! viewer, or turned into a completion signal) and binary frames (handed to
//! the session's relay buffer without ever blocking the receive path).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use avatar_agent_core::{Clip, ControlMessage, VideoFrame};
use avatar_agent_relay::{FrameRelayBuffer, ViewerSink};

use crate::protocol::{decode_message, EngineMessage, RenderOptions, RenderRequest};
use crate::signal::{CompletionGate, TerminalStatus};
use crate::EngineError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Buffer occupancy is logged every this many frames.
const FRAME_STATUS_LOG_INTERVAL: u64 = 30;

/// Engine client configuration
#[derive(Debug, Clone)]
pub struct EngineClientConfig {
    /// WebSocket URL of the render engine
    pub url: String,
    /// Connection establishment bound
    pub connect_timeout: Duration,
    /// Transfer options sent with every request
    pub options: RenderOptions,
}

impl Default for EngineClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8765".to_string(),
            connect_timeout: Duration::from_secs(10),
            options: RenderOptions::default(),
        }
    }
}

/// Render connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Not yet connected
    New,
    /// Connection open, read loop running
    Connected,
    /// Connection closed (gracefully or not)
    Closed,
}

/// Client for one render session.
///
/// Created per render job, shared between the sequencer (submit side) and its
/// own spawned read loop (receive side).
pub struct RenderSessionClient {
    session_id: String,
    config: EngineClientConfig,
    state: RwLock<ClientState>,
    writer: tokio::sync::Mutex<Option<SplitSink<WsStream, Message>>>,
    gate: Arc<CompletionGate>,
    frames: Arc<FrameRelayBuffer>,
    viewer: Arc<dyn ViewerSink>,
    message_count: AtomicU64,
    frame_count: AtomicU64,
    frame_bytes: AtomicU64,
}

impl RenderSessionClient {
    /// Create a new client (not yet connected)
    pub fn new(
        session_id: impl Into<String>,
        config: EngineClientConfig,
        frames: Arc<FrameRelayBuffer>,
        viewer: Arc<dyn ViewerSink>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            config,
            state: RwLock::new(ClientState::New),
            writer: tokio::sync::Mutex::new(None),
            gate: Arc::new(CompletionGate::new()),
            frames,
            viewer,
            message_count: AtomicU64::new(0),
            frame_count: AtomicU64::new(0),
            frame_bytes: AtomicU64::new(0),
        }
    }

    /// Session this client belongs to
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Completion gate shared with the sequencer
    pub fn gate(&self) -> Arc<CompletionGate> {
        self.gate.clone()
    }

    /// Current connection state
    pub fn state(&self) -> ClientState {
        *self.state.read()
    }

    /// Whether the connection is open
    pub fn is_connected(&self) -> bool {
        *self.state.read() == ClientState::Connected
    }

    /// Establish the connection and start the read loop.
    ///
    /// Also starts the session's frame delivery loop, so frames arriving
    /// immediately after the first submit have somewhere to go.
    pub async fn connect(self: &Arc<Self>) -> Result<(), EngineError> {
        let (stream, response) =
            match timeout(self.config.connect_timeout, connect_async(self.config.url.as_str()))
                .await
            {
                Ok(Ok(pair)) => pair,
                Ok(Err(e)) => return Err(EngineError::ConnectionFailed(e.to_string())),
                Err(_) => return Err(EngineError::ConnectionTimeout(self.config.connect_timeout)),
            };

        tracing::info!(
            session_id = %self.session_id,
            status = %response.status(),
            "Connected to render engine"
        );

        let (writer, reader) = stream.split();
        *self.writer.lock().await = Some(writer);
        *self.state.write() = ClientState::Connected;

        self.frames.start();

        let client = Arc::clone(self);
        tokio::spawn(async move {
            client.run_read_loop(reader).await;
        });

        Ok(())
    }

    /// Submit one clip for rendering.
    ///
    /// Requires an open connection. Resets the per-clip frame counters.
    pub async fn submit(&self, clip: &Clip) -> Result<(), EngineError> {
        if !self.is_connected() {
            return Err(EngineError::SendFailure(
                "render connection is not open".to_string(),
            ));
        }

        let request = RenderRequest::for_clip(clip, self.config.options.clone());
        let json = serde_json::to_string(&request)
            .map_err(|e| EngineError::Protocol(e.to_string()))?;

        tracing::info!(
            session_id = %self.session_id,
            clip_index = clip.index,
            request = %json,
            "Submitting clip to render engine"
        );

        {
            let mut writer = self.writer.lock().await;
            let sink = writer
                .as_mut()
                .ok_or_else(|| EngineError::SendFailure("render connection is not open".to_string()))?;

            if let Err(e) = sink.send(Message::text(json)).await {
                tracing::error!(session_id = %self.session_id, error = %e, "Failed to send render request");
                self.gate.signal(TerminalStatus::EngineError);
                *self.state.write() = ClientState::Closed;
                return Err(EngineError::SendFailure(e.to_string()));
            }
        }

        self.frame_count.store(0, Ordering::Relaxed);
        self.frame_bytes.store(0, Ordering::Relaxed);

        Ok(())
    }

    /// Close the connection and release frame resources. Idempotent.
    pub async fn close(&self) {
        {
            let mut writer = self.writer.lock().await;
            if let Some(mut sink) = writer.take() {
                let _ = sink.close().await;
            }
        }

        *self.state.write() = ClientState::Closed;
        self.frames.stop();

        tracing::info!(session_id = %self.session_id, "Render connection closed");
    }

    /// Read loop: the sole consumer of the inbound stream.
    async fn run_read_loop(self: Arc<Self>, mut reader: SplitStream<WsStream>) {
        while let Some(message) = reader.next().await {
            match message {
                Ok(Message::Close(frame)) => {
                    tracing::info!(
                        session_id = %self.session_id,
                        close_frame = ?frame,
                        "Render engine closed the connection"
                    );
                    break;
                }
                Ok(message) => match decode_message(message) {
                    Ok(Some(EngineMessage::Control { message, raw })) => {
                        self.handle_control(message, raw).await;
                    }
                    Ok(Some(EngineMessage::Frame(payload))) => {
                        self.handle_frame(payload);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::error!(session_id = %self.session_id, error = %e, "Protocol error");
                        self.gate.signal(TerminalStatus::EngineError);
                    }
                },
                Err(e) => {
                    tracing::error!(session_id = %self.session_id, error = %e, "Render connection error");
                    self.gate.signal(TerminalStatus::EngineError);
                    break;
                }
            }
        }

        self.on_disconnect();
    }

    /// Handle one control message: terminal status signals completion, all
    /// other control JSON is forwarded to the viewer verbatim.
    async fn handle_control(&self, message: ControlMessage, raw: String) {
        let count = self.message_count.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(session_id = %self.session_id, count, "Control message received");

        if message.is_terminal() {
            tracing::info!(session_id = %self.session_id, "Segment rendering completed");
            self.log_frame_statistics();
            self.gate.signal(TerminalStatus::Completed);
            return;
        }

        if let Err(e) = self.viewer.send_text(&raw).await {
            tracing::warn!(
                session_id = %self.session_id,
                error = %e,
                "Failed to forward control message to viewer"
            );
        }
    }

    /// Handle one binary frame: hand it to the relay buffer without blocking.
    fn handle_frame(&self, payload: bytes::Bytes) {
        let count = self.frame_count.fetch_add(1, Ordering::Relaxed) + 1;
        let total = self
            .frame_bytes
            .fetch_add(payload.len() as u64, Ordering::Relaxed)
            + payload.len() as u64;

        let accepted = self
            .frames
            .add_frame(VideoFrame::new(payload, self.session_id.clone()));
        if !accepted {
            tracing::warn!(session_id = %self.session_id, frame = count, "Frame rejected by relay buffer");
        } else {
            tracing::debug!(
                session_id = %self.session_id,
                frame = count,
                total_bytes = total,
                "Frame buffered"
            );
        }

        if count % FRAME_STATUS_LOG_INTERVAL == 0 {
            tracing::info!(
                session_id = %self.session_id,
                status = %self.frames.status(),
                "Frame buffer status"
            );
        }
    }

    /// Connection gone: release frame resources and make sure a waiting
    /// sequencer observes a terminal signal.
    fn on_disconnect(&self) {
        *self.state.write() = ClientState::Closed;
        self.frames.stop();
        self.gate.signal(TerminalStatus::ConnectionClosed);
    }

    fn log_frame_statistics(&self) {
        let frames = self.frame_count.load(Ordering::Relaxed);
        let total = self.frame_bytes.load(Ordering::Relaxed);

        if frames > 0 {
            tracing::info!(
                session_id = %self.session_id,
                frames,
                total_kb = total / 1024,
                avg_frame_kb = (total as f64 / frames as f64) / 1024.0,
                "Segment frame statistics"
            );
        }
    }
}
