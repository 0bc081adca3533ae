//! Render engine integration for the avatar agent
//!
//! Talks to the external avatar-rendering engine over one duplex websocket
//! per session and drives multi-clip render jobs strictly one segment at a
//! time:
//! - [`RenderSessionClient`]: owns the connection; demultiplexes inbound
//!   control messages and binary frames
//! - [`CompletionGate`]: idempotent, non-blocking per-segment completion
//!   signal between the read loop and the sequencer
//! - [`SegmentSequencer`]: ordered clip submission with bounded completion
//!   waits and abort-on-failure

pub mod client;
pub mod protocol;
pub mod sequencer;
pub mod signal;

pub use client::{ClientState, EngineClientConfig, RenderSessionClient};
pub use protocol::{EngineMessage, RenderOptions, RenderRequest};
pub use sequencer::{ClipOutcome, ProcessReport, SegmentFailure, SegmentSequencer, SequencerState};
pub use signal::{CompletionGate, TerminalStatus};

use std::time::Duration;
use thiserror::Error;

/// Render engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Connection timeout: render engine did not accept within {0:?}")]
    ConnectionTimeout(Duration),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Send failure: {0}")]
    SendFailure(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}
