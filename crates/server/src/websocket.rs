//! WebSocket Handler
//!
//! The viewer-facing endpoint: accumulates uploaded PCM audio, and on the
//! `audio_end` control runs one conversation turn: transcribe, generate,
//! synthesize, then render the clips through the segment sequencer while the
//! relay buffer streams frames back.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use avatar_agent_core::ViewerMessage;
use avatar_agent_engine::{
    EngineClientConfig, RenderOptions, RenderSessionClient, SegmentSequencer,
};
use avatar_agent_relay::ViewerSink;
use avatar_agent_services::GeneratedReply;

use crate::metrics;
use crate::session::Session;
use crate::sink::WsViewerSink;
use crate::state::AppState;

/// Style used when the generator replied with plain text instead of a
/// styled clip plan.
const DEFAULT_STYLE: &str = "neutral";

/// Inbound viewer control messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// The viewer finished uploading audio for this turn.
    AudioEnd,
    /// End the session.
    EndSession,
}

/// WebSocket handler
pub struct WebSocketHandler;

impl WebSocketHandler {
    /// Handle WebSocket upgrade
    pub async fn handle(
        ws: WebSocketUpgrade,
        State(state): State<AppState>,
        Path(session_id): Path<String>,
    ) -> Result<Response, axum::http::StatusCode> {
        let session = state
            .sessions
            .get(&session_id)
            .ok_or(axum::http::StatusCode::NOT_FOUND)?;

        metrics::record_request("ws");
        Ok(ws.on_upgrade(move |socket| Self::handle_socket(socket, session, state)))
    }

    /// Handle WebSocket connection
    async fn handle_socket(socket: WebSocket, session: Arc<Session>, state: AppState) {
        let (sender, mut receiver) = socket.split();
        let sink = WsViewerSink::new(sender);

        // The registry owns the frame buffer for this viewer session from
        // open to close.
        state.registry.create_buffer(&session.id, sink.clone());
        tracing::info!(session_id = %session.id, "Viewer connected");

        while let Some(message) = receiver.next().await {
            match message {
                Ok(Message::Binary(data)) => {
                    session.touch();
                    tracing::debug!(
                        session_id = %session.id,
                        bytes = data.len(),
                        "Audio data received"
                    );
                    session.append_audio(&data);
                }
                Ok(Message::Text(text)) => {
                    session.touch();

                    let Ok(control) = serde_json::from_str::<ClientMessage>(&text) else {
                        tracing::debug!(session_id = %session.id, "Ignoring unknown viewer message");
                        continue;
                    };

                    match control {
                        ClientMessage::AudioEnd => {
                            Self::start_turn(&state, &session, &sink).await;
                        }
                        ClientMessage::EndSession => {
                            session.close();
                            break;
                        }
                    }
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Ok(Message::Close(_)) => break,
                Err(e) => {
                    tracing::error!(session_id = %session.id, error = %e, "WebSocket error");
                    break;
                }
            }
        }

        // Cleanup: the sink first so in-flight deliveries fail fast, then the
        // render pipeline, then the registry entry.
        sink.mark_closed();
        session.shutdown_pipeline().await;
        state.registry.remove_buffer(&session.id);
        state.sessions.remove(&session.id);

        tracing::info!(session_id = %session.id, "Viewer disconnected");
    }

    /// Flush the accumulated audio to a file and run the turn pipeline on its
    /// own task, so the receive loop keeps pumping viewer messages.
    async fn start_turn(state: &AppState, session: &Arc<Session>, sink: &Arc<WsViewerSink>) {
        let pcm = session.take_audio();
        if pcm.is_empty() {
            tracing::warn!(session_id = %session.id, "audio_end with no audio buffered");
            return;
        }

        // A new turn supersedes any still-rendering one.
        session.shutdown_pipeline().await;

        let audio_dir = PathBuf::from(&state.config.services.audio_dir);
        let path = audio_dir.join(format!("{}.pcm", uuid::Uuid::new_v4()));

        if let Err(e) = tokio::fs::create_dir_all(&audio_dir).await {
            tracing::error!(session_id = %session.id, error = %e, "Failed to create audio dir");
            return;
        }
        if let Err(e) = tokio::fs::write(&path, &pcm).await {
            tracing::error!(session_id = %session.id, error = %e, "Failed to persist turn audio");
            return;
        }
        tracing::info!(
            session_id = %session.id,
            path = %path.display(),
            bytes = pcm.len(),
            "Turn audio persisted"
        );

        let state = state.clone();
        let session = session.clone();
        let sink = sink.clone();
        tokio::spawn(async move {
            run_pipeline_turn(state, session, sink, path).await;
        });
    }
}

/// One conversation turn: audio file -> text -> reply -> clips -> rendering.
///
/// Per-stage failures are reported to the viewer and end the turn; the
/// connection stays usable for the next one.
async fn run_pipeline_turn(
    state: AppState,
    session: Arc<Session>,
    sink: Arc<WsViewerSink>,
    audio_path: PathBuf,
) {
    metrics::record_request("turn");

    let text = match state.transcriber.transcribe(&audio_path).await {
        Ok(Some(text)) => text,
        Ok(None) => {
            tracing::info!(session_id = %session.id, "No speech recognized, skipping turn");
            return;
        }
        Err(e) => {
            tracing::error!(session_id = %session.id, error = %e, "Transcription failed");
            metrics::record_error("transcription");
            send_viewer_error(&sink, "transcription failed").await;
            return;
        }
    };

    let echo = ViewerMessage::TextUser {
        content: text.clone(),
    };
    if let Err(e) = sink.send_text(&echo.to_json()).await {
        tracing::warn!(session_id = %session.id, error = %e, "Failed to echo transcript");
    }

    let reply = match state.generator.generate(&text).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::error!(session_id = %session.id, error = %e, "Generation failed");
            metrics::record_error("generation");
            send_viewer_error(&sink, "generation failed").await;
            return;
        }
    };

    let assistant = ViewerMessage::TextAssistant {
        content: reply.display_text(),
    };
    if let Err(e) = sink.send_text(&assistant.to_json()).await {
        tracing::warn!(session_id = %session.id, error = %e, "Failed to send assistant reply");
    }

    let clips = match &reply {
        GeneratedReply::ClipPlan(lines) => state.synthesizer.synthesize_plan(lines).await,
        GeneratedReply::Text(text) => state.synthesizer.synthesize(text, DEFAULT_STYLE).await,
    };
    let clips = match clips {
        Ok(clips) => clips,
        Err(e) => {
            tracing::error!(session_id = %session.id, error = %e, "Synthesis failed");
            metrics::record_error("synthesis");
            send_viewer_error(&sink, "synthesis failed").await;
            return;
        }
    };

    // Fresh buffer and render connection for this turn; the registry stops
    // and replaces whatever a previous turn left behind.
    let buffer = state.registry.create_buffer(&session.id, sink.clone());
    let client = Arc::new(RenderSessionClient::new(
        session.id.clone(),
        EngineClientConfig {
            url: state.config.engine.url.clone(),
            connect_timeout: state.config.engine.connect_timeout(),
            options: RenderOptions {
                jpeg_quality: state.config.engine.jpeg_quality,
                batch_send: state.config.engine.batch_send,
                verbose: state.config.engine.verbose,
            },
        },
        buffer,
        sink.clone(),
    ));
    let sequencer = Arc::new(SegmentSequencer::new(
        session.id.clone(),
        client,
        sink.clone(),
        state.config.engine.segment_timeout(),
    ));
    session.set_sequencer(sequencer.clone());

    let started = Instant::now();
    let report = sequencer.process(&clips).await;
    metrics::record_turn(&report, started.elapsed());

    if let Some((index, reason)) = &report.failure {
        tracing::error!(
            session_id = %session.id,
            clip_index = index,
            reason = %reason,
            "Render turn stopped early"
        );
        send_viewer_error(&sink, &format!("rendering stopped at clip {}: {}", index, reason))
            .await;
    } else {
        tracing::info!(
            session_id = %session.id,
            clips = report.completed_count(),
            "Render turn complete"
        );
    }

    session.clear_sequencer();
}

async fn send_viewer_error(sink: &Arc<WsViewerSink>, message: &str) {
    let error = ViewerMessage::Error {
        content: message.to_string(),
    };
    if let Err(e) = sink.send_text(&error.to_json()).await {
        tracing::debug!(error = %e, "Failed to deliver error to viewer");
    }
}
