//! Frame relay for the avatar agent
//!
//! Decouples the rate at which the render engine produces video frames from
//! the rate at which a viewer can accept them:
//! - [`FrameRelayBuffer`]: bounded drop-oldest queue with a dedicated
//!   delivery loop per session
//! - [`SessionRegistry`]: authoritative map from viewer session to its buffer,
//!   with periodic health reporting and stale-session reclamation
//! - [`ViewerSink`]: the downstream transport abstraction frames and control
//!   messages are delivered through

pub mod buffer;
pub mod registry;
pub mod sink;

pub use buffer::{BufferStatus, FrameRelayBuffer, RelayBufferConfig};
pub use registry::{RegistryStatus, SessionRegistry, SessionRegistryConfig};
pub use sink::{SinkError, ViewerSink};
