//! Core types for the avatar agent
//!
//! This crate provides foundational types used across all other crates:
//! - Audio clip and video frame types
//! - Wire message types (render engine control, viewer envelope)
//! - Error types

pub mod clip;
pub mod error;
pub mod frame;
pub mod message;

pub use clip::Clip;
pub use error::{Error, Result};
pub use frame::VideoFrame;
pub use message::{ControlMessage, ViewerMessage};
