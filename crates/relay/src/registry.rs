//! Session Registry
//!
//! Authoritative mapping from viewer-session identifiers to their frame
//! buffers. The registry exclusively owns buffer lifetime: create, look up,
//! remove, sweep stale entries, and report aggregate health.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;

use crate::buffer::{FrameRelayBuffer, RelayBufferConfig};
use crate::sink::ViewerSink;

/// Registry configuration
#[derive(Debug, Clone)]
pub struct SessionRegistryConfig {
    /// Configuration applied to every buffer the registry creates
    pub buffer: RelayBufferConfig,
    /// Aggregate status report interval
    pub status_interval: std::time::Duration,
    /// Stale buffer sweep interval
    pub sweep_interval: std::time::Duration,
    /// Aggregate utilization above which a capacity-pressure warning is logged
    pub pressure_warn_ratio: f64,
}

impl Default for SessionRegistryConfig {
    fn default() -> Self {
        Self {
            buffer: RelayBufferConfig::default(),
            status_interval: std::time::Duration::from_secs(30),
            sweep_interval: std::time::Duration::from_secs(300),
            pressure_warn_ratio: 0.8,
        }
    }
}

/// Aggregate status across all buffers
#[derive(Debug, Clone)]
pub struct RegistryStatus {
    /// Registered buffers
    pub total_buffers: usize,
    /// Buffers whose delivery loop is running
    pub running_buffers: usize,
    /// Frames buffered across all sessions
    pub total_occupancy: usize,
    /// Capacity across all sessions
    pub total_capacity: usize,
}

impl RegistryStatus {
    /// Aggregate occupancy as a fraction of aggregate capacity
    pub fn usage(&self) -> f64 {
        if self.total_capacity == 0 {
            0.0
        } else {
            self.total_occupancy as f64 / self.total_capacity as f64
        }
    }
}

impl fmt::Display for RegistryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "buffers={}/{}, frames={}/{}({:.1}%)",
            self.running_buffers,
            self.total_buffers,
            self.total_occupancy,
            self.total_capacity,
            self.usage() * 100.0
        )
    }
}

/// Per-session frame buffer registry
pub struct SessionRegistry {
    buffers: RwLock<HashMap<String, Arc<FrameRelayBuffer>>>,
    config: SessionRegistryConfig,
}

impl SessionRegistry {
    /// Create a new registry
    pub fn new(config: SessionRegistryConfig) -> Self {
        Self {
            buffers: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Create and start a buffer for a session.
    ///
    /// An existing buffer under the same identifier is stopped and replaced:
    /// it means a stale session was not cleaned up.
    pub fn create_buffer(
        &self,
        session_id: &str,
        sink: Arc<dyn ViewerSink>,
    ) -> Arc<FrameRelayBuffer> {
        let buffer = Arc::new(FrameRelayBuffer::new(
            session_id,
            sink,
            self.config.buffer.clone(),
        ));
        buffer.start();

        let old = self
            .buffers
            .write()
            .insert(session_id.to_string(), buffer.clone());
        if let Some(old) = old {
            tracing::warn!(session_id, "Replacing existing frame buffer; stopping the old one");
            old.stop();
        }

        tracing::info!(session_id, "Created frame buffer");
        buffer
    }

    /// Look up a session's buffer
    pub fn get_buffer(&self, session_id: &str) -> Option<Arc<FrameRelayBuffer>> {
        self.buffers.read().get(session_id).cloned()
    }

    /// Stop and discard a session's buffer. Safe to call multiple times.
    pub fn remove_buffer(&self, session_id: &str) {
        if let Some(buffer) = self.buffers.write().remove(session_id) {
            buffer.stop();
            tracing::info!(session_id, "Removed frame buffer");
        }
    }

    /// Number of registered buffers
    pub fn count(&self) -> usize {
        self.buffers.read().len()
    }

    /// Aggregate status across all buffers
    pub fn aggregate_status(&self) -> RegistryStatus {
        let buffers = self.buffers.read();
        let mut status = RegistryStatus {
            total_buffers: buffers.len(),
            running_buffers: 0,
            total_occupancy: 0,
            total_capacity: 0,
        };

        for buffer in buffers.values() {
            let s = buffer.status();
            if s.running {
                status.running_buffers += 1;
            }
            status.total_occupancy += s.occupancy;
            status.total_capacity += s.capacity;
        }

        status
    }

    /// Remove buffers whose viewer is closed and whose delivery loop has
    /// already stopped. A safety net against leaks from missed
    /// `remove_buffer` calls.
    pub fn sweep_stale(&self) {
        let mut buffers = self.buffers.write();
        buffers.retain(|session_id, buffer| {
            let status = buffer.status();
            if !status.viewer_open && !status.running {
                tracing::info!(session_id, "Sweeping stale frame buffer");
                buffer.stop();
                false
            } else {
                true
            }
        });
    }

    /// Start the periodic status-report and stale-sweep tasks.
    ///
    /// Returns a shutdown sender that stops the task.
    pub fn start_maintenance(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let registry = Arc::clone(self);

        tokio::spawn(async move {
            let mut status_timer = tokio::time::interval(registry.config.status_interval);
            status_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut sweep_timer = tokio::time::interval(registry.config.sweep_interval);
            sweep_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = status_timer.tick() => {
                        registry.log_aggregate_status();
                    }
                    _ = sweep_timer.tick() => {
                        let before = registry.count();
                        registry.sweep_stale();
                        let after = registry.count();
                        if before != after {
                            tracing::info!(
                                "Buffer sweep: removed {} stale buffers ({} remaining)",
                                before - after,
                                after
                            );
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("Registry maintenance task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }

    /// Stop every buffer and clear the registry. Used at process teardown.
    pub fn shutdown(&self) {
        let mut buffers = self.buffers.write();
        for buffer in buffers.values() {
            buffer.stop();
        }
        buffers.clear();
        tracing::info!("Session registry shut down");
    }

    fn log_aggregate_status(&self) {
        if self.count() == 0 {
            return;
        }

        let status = self.aggregate_status();
        tracing::info!(status = %status, "Frame relay status");

        if status.usage() > self.config.pressure_warn_ratio {
            tracing::warn!(
                usage_percent = status.usage() * 100.0,
                "Frame relay under capacity pressure"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::SinkError;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct StubSink {
        open: AtomicBool,
    }

    impl StubSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                open: AtomicBool::new(true),
            })
        }
    }

    #[async_trait]
    impl ViewerSink for StubSink {
        async fn send_text(&self, _text: &str) -> Result<(), SinkError> {
            Ok(())
        }

        async fn send_binary(&self, _payload: Bytes) -> Result<(), SinkError> {
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn test_create_and_get_buffer() {
        let registry = SessionRegistry::new(SessionRegistryConfig::default());
        let buffer = registry.create_buffer("s1", StubSink::new());

        assert!(buffer.is_running());
        assert!(registry.get_buffer("s1").is_some());
        assert!(registry.get_buffer("s2").is_none());
        assert_eq!(registry.count(), 1);

        registry.shutdown();
    }

    #[tokio::test]
    async fn test_replace_stops_old_buffer() {
        let registry = SessionRegistry::new(SessionRegistryConfig::default());
        let old = registry.create_buffer("s1", StubSink::new());
        let new = registry.create_buffer("s1", StubSink::new());

        assert!(!old.is_running());
        assert!(new.is_running());
        assert_eq!(registry.count(), 1);

        registry.shutdown();
    }

    #[tokio::test]
    async fn test_remove_buffer_idempotent() {
        let registry = SessionRegistry::new(SessionRegistryConfig::default());
        let buffer = registry.create_buffer("s1", StubSink::new());

        registry.remove_buffer("s1");
        assert!(!buffer.is_running());
        assert!(registry.get_buffer("s1").is_none());

        // Second remove is a no-op.
        registry.remove_buffer("s1");
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn test_sweep_removes_closed_and_stopped() {
        let registry = SessionRegistry::new(SessionRegistryConfig::default());

        let live_sink = StubSink::new();
        registry.create_buffer("live", live_sink);

        let dead_sink = StubSink::new();
        let dead = registry.create_buffer("dead", dead_sink.clone());
        dead_sink.open.store(false, Ordering::SeqCst);
        dead.stop();

        registry.sweep_stale();

        assert!(registry.get_buffer("live").is_some());
        assert!(registry.get_buffer("dead").is_none());

        registry.shutdown();
    }

    #[tokio::test]
    async fn test_sweep_keeps_running_buffer_with_closed_viewer() {
        let registry = SessionRegistry::new(SessionRegistryConfig::default());

        let sink = StubSink::new();
        registry.create_buffer("s1", sink.clone());
        sink.open.store(false, Ordering::SeqCst);

        // Delivery loop still running: the sweep must not reclaim it yet.
        registry.sweep_stale();
        assert!(registry.get_buffer("s1").is_some());

        registry.shutdown();
    }

    #[tokio::test]
    async fn test_aggregate_status() {
        let registry = SessionRegistry::new(SessionRegistryConfig::default());
        registry.create_buffer("s1", StubSink::new());
        registry.create_buffer("s2", StubSink::new());

        let status = registry.aggregate_status();
        assert_eq!(status.total_buffers, 2);
        assert_eq!(status.running_buffers, 2);
        assert_eq!(status.total_capacity, 200);
        assert_eq!(status.total_occupancy, 0);
        assert_eq!(status.usage(), 0.0);

        registry.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_stops_everything() {
        let registry = SessionRegistry::new(SessionRegistryConfig::default());
        let b1 = registry.create_buffer("s1", StubSink::new());
        let b2 = registry.create_buffer("s2", StubSink::new());

        registry.shutdown();

        assert!(!b1.is_running());
        assert!(!b2.is_running());
        assert_eq!(registry.count(), 0);
    }
}
