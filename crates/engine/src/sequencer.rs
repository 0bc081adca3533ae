//! Segment Sequencer
//!
//! Drives the ordered processing of a clip list against one render session:
//! each clip fully completes (or fails, or times out) before the next is
//! submitted. A failure aborts the remaining clips rather than the process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;

use avatar_agent_core::{Clip, ViewerMessage};
use avatar_agent_relay::ViewerSink;

use crate::client::RenderSessionClient;
use crate::signal::TerminalStatus;
use crate::EngineError;

/// Sequencer state, per render session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    /// Between clips, or before the first one
    Idle,
    /// A clip has been submitted; waiting for its terminal signal
    Submitted,
    /// The last submitted clip completed
    Completed,
    /// The last submitted clip failed
    Failed,
    /// The last submitted clip timed out
    TimedOut,
    /// The clip list was abandoned
    Aborted,
}

/// Machine-readable reason a clip sequence stopped
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SegmentFailure {
    #[error("Render engine connection timed out")]
    ConnectTimeout,

    #[error("Render engine connection failed: {0}")]
    ConnectFailed(String),

    #[error("Render request could not be sent: {0}")]
    Send(String),

    #[error("No terminal signal within the segment timeout")]
    Timeout,

    #[error("Render engine reported an error")]
    Engine,

    #[error("Render connection closed before completion")]
    ConnectionClosed,

    #[error("Clip list aborted")]
    Aborted,
}

/// Outcome of one clip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipOutcome {
    /// The clip's position in the submission order
    pub index: usize,
    /// Success, or the reason the clip failed
    pub result: Result<(), SegmentFailure>,
}

/// Result of processing one clip list
#[derive(Debug, Default)]
pub struct ProcessReport {
    /// Per-clip outcomes, in submission order. Clips never submitted because
    /// of an earlier failure have no outcome.
    pub outcomes: Vec<ClipOutcome>,
    /// Index and reason of the first failure, if any
    pub failure: Option<(usize, SegmentFailure)>,
}

impl ProcessReport {
    /// Whether every clip completed
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Number of clips that completed
    pub fn completed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    fn record_success(&mut self, index: usize) {
        self.outcomes.push(ClipOutcome {
            index,
            result: Ok(()),
        });
    }

    fn record_failure(&mut self, index: usize, reason: SegmentFailure) {
        self.outcomes.push(ClipOutcome {
            index,
            result: Err(reason.clone()),
        });
        self.failure = Some((index, reason));
    }
}

/// Ordered clip-list processor for one render session
pub struct SegmentSequencer {
    session_id: String,
    client: Arc<RenderSessionClient>,
    viewer: Arc<dyn ViewerSink>,
    segment_timeout: Duration,
    state: Mutex<SequencerState>,
    aborted: AtomicBool,
}

impl SegmentSequencer {
    /// Create a sequencer over a not-yet-connected client
    pub fn new(
        session_id: impl Into<String>,
        client: Arc<RenderSessionClient>,
        viewer: Arc<dyn ViewerSink>,
        segment_timeout: Duration,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            client,
            viewer,
            segment_timeout,
            state: Mutex::new(SequencerState::Idle),
            aborted: AtomicBool::new(false),
        }
    }

    /// Current sequencer state
    pub fn state(&self) -> SequencerState {
        *self.state.lock()
    }

    /// Abandon the clip list. Idempotent; safe to call while a completion
    /// wait is in flight (closing the connection wakes the waiter).
    pub async fn abort(&self) {
        if !self.aborted.swap(true, Ordering::SeqCst) {
            tracing::info!(session_id = %self.session_id, "Aborting clip sequence");
            self.client.close().await;
        }
    }

    /// Process a clip list strictly in order.
    ///
    /// For each clip: echo its audio to the viewer, submit it to the render
    /// engine, wait for the terminal signal, then continue, or abort the
    /// remaining clips on failure or timeout. An empty list returns
    /// immediately without touching the connection.
    pub async fn process(&self, clips: &[Clip]) -> ProcessReport {
        let mut report = ProcessReport::default();

        if clips.is_empty() {
            tracing::info!(session_id = %self.session_id, "Empty clip list, nothing to process");
            return report;
        }

        tracing::info!(
            session_id = %self.session_id,
            clips = clips.len(),
            "Processing clip list"
        );

        if let Err(e) = self.client.connect().await {
            let reason = match e {
                EngineError::ConnectionTimeout(_) => SegmentFailure::ConnectTimeout,
                other => SegmentFailure::ConnectFailed(other.to_string()),
            };
            tracing::error!(session_id = %self.session_id, error = %reason, "Render engine unavailable");
            *self.state.lock() = SequencerState::Failed;
            report.record_failure(clips[0].index, reason);
            return report;
        }

        let gate = self.client.gate();

        for clip in clips {
            if self.aborted.load(Ordering::SeqCst) {
                *self.state.lock() = SequencerState::Aborted;
                report.record_failure(clip.index, SegmentFailure::Aborted);
                break;
            }

            *self.state.lock() = SequencerState::Idle;
            self.echo_audio(clip).await;
            gate.reset();

            if let Err(e) = self.client.submit(clip).await {
                tracing::error!(
                    session_id = %self.session_id,
                    clip_index = clip.index,
                    error = %e,
                    "Clip submission failed"
                );
                *self.state.lock() = SequencerState::Failed;
                report.record_failure(clip.index, SegmentFailure::Send(e.to_string()));
                break;
            }
            *self.state.lock() = SequencerState::Submitted;

            match gate.wait(self.segment_timeout).await {
                Some(TerminalStatus::Completed) => {
                    tracing::info!(
                        session_id = %self.session_id,
                        clip_index = clip.index,
                        "Clip completed"
                    );
                    *self.state.lock() = SequencerState::Completed;
                    report.record_success(clip.index);
                }
                Some(TerminalStatus::EngineError) => {
                    tracing::error!(
                        session_id = %self.session_id,
                        clip_index = clip.index,
                        "Clip failed: engine error"
                    );
                    *self.state.lock() = SequencerState::Failed;
                    report.record_failure(clip.index, SegmentFailure::Engine);
                    break;
                }
                Some(TerminalStatus::ConnectionClosed) => {
                    tracing::error!(
                        session_id = %self.session_id,
                        clip_index = clip.index,
                        "Clip failed: connection closed"
                    );
                    *self.state.lock() = SequencerState::Failed;
                    report.record_failure(clip.index, SegmentFailure::ConnectionClosed);
                    break;
                }
                None => {
                    tracing::error!(
                        session_id = %self.session_id,
                        clip_index = clip.index,
                        timeout_secs = self.segment_timeout.as_secs(),
                        "Clip timed out waiting for completion"
                    );
                    *self.state.lock() = SequencerState::TimedOut;
                    report.record_failure(clip.index, SegmentFailure::Timeout);
                    break;
                }
            }
        }

        self.client.close().await;

        if report.is_success() {
            *self.state.lock() = SequencerState::Idle;
            tracing::info!(
                session_id = %self.session_id,
                clips = report.completed_count(),
                "Clip list fully processed"
            );
        }

        report
    }

    /// Echo the clip's audio payload to the viewer for local playback.
    /// Delivery failure here is non-fatal.
    async fn echo_audio(&self, clip: &Clip) {
        let Some(base64) = &clip.audio_base64 else {
            return;
        };

        let message = ViewerMessage::Audio {
            content: base64.clone(),
        };
        if let Err(e) = self.viewer.send_text(&message.to_json()).await {
            tracing::warn!(
                session_id = %self.session_id,
                clip_index = clip.index,
                error = %e,
                "Failed to echo clip audio to viewer"
            );
        }
    }
}
