//! Collaborator services for the avatar agent
//!
//! Thin call-out/response clients with no internal state machine:
//! - [`Transcriber`]: audio file -> text
//! - [`Generator`]: text -> reply text or a styled clip plan
//! - [`Synthesizer`]: text -> ordered audio clips for rendering

pub mod generate;
pub mod synthesize;
pub mod transcribe;

pub use generate::{GeneratedReply, Generator, GeneratorConfig, HttpGenerator, StyledLine};
pub use synthesize::{HttpSynthesizer, Synthesizer, SynthesizerConfig};
pub use transcribe::{HttpTranscriber, Transcriber, TranscriberConfig};

use thiserror::Error;

/// Collaborator service errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Service returned no usable result: {0}")]
    MissingResult(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),
}
