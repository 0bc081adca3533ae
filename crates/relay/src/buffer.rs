//! Frame Relay Buffer
//!
//! Bounded, drop-oldest frame queue decoupling frame receipt from frame
//! delivery. The engine read loop pushes frames without ever blocking; one
//! dedicated delivery loop per session drains them to the viewer.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::timeout;

use avatar_agent_core::VideoFrame;

use crate::sink::{SinkError, ViewerSink};

/// Relay buffer configuration
#[derive(Debug, Clone)]
pub struct RelayBufferConfig {
    /// Maximum buffered frames per session
    pub capacity: usize,
    /// Bound on each delivery-loop wait, so the loop can re-check liveness
    pub poll_interval: Duration,
    /// Delivery attempts per frame before it is declared lost
    pub max_attempts: u32,
    /// Backoff step between attempts (linear: step x attempt number)
    pub backoff_step: Duration,
    /// Delivery latency above which a slow-delivery warning is logged
    pub slow_delivery_warn: Duration,
}

impl Default for RelayBufferConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            poll_interval: Duration::from_millis(1000),
            max_attempts: 3,
            backoff_step: Duration::from_millis(100),
            slow_delivery_warn: Duration::from_millis(100),
        }
    }
}

/// Buffer status snapshot, for monitoring
#[derive(Debug, Clone)]
pub struct BufferStatus {
    /// Frames currently buffered
    pub occupancy: usize,
    /// Configured capacity
    pub capacity: usize,
    /// Whether the delivery loop is running
    pub running: bool,
    /// Whether the viewer transport is open
    pub viewer_open: bool,
    /// Frames evicted under overflow since start
    pub overflow_dropped: u64,
    /// Frames lost after exhausting delivery retries since start
    pub delivery_lost: u64,
}

impl BufferStatus {
    /// Occupancy as a fraction of capacity
    pub fn usage(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.occupancy as f64 / self.capacity as f64
        }
    }
}

impl fmt::Display for BufferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "size={}/{}({:.1}%), running={}, viewer_open={}, evicted={}, lost={}",
            self.occupancy,
            self.capacity,
            self.usage() * 100.0,
            self.running,
            self.viewer_open,
            self.overflow_dropped,
            self.delivery_lost
        )
    }
}

/// Bounded frame queue with a dedicated delivery loop.
///
/// Single producer (the engine read loop) and single consumer (the delivery
/// loop spawned by [`FrameRelayBuffer::start`]). `add_frame` never suspends;
/// overflow evicts the oldest buffered frame.
pub struct FrameRelayBuffer {
    session_id: String,
    config: RelayBufferConfig,
    queue: Mutex<VecDeque<VideoFrame>>,
    notify: Notify,
    running: AtomicBool,
    sink: Arc<dyn ViewerSink>,
    overflow_dropped: AtomicU64,
    delivery_lost: AtomicU64,
}

impl FrameRelayBuffer {
    /// Create a new buffer for a session (not yet running)
    pub fn new(
        session_id: impl Into<String>,
        sink: Arc<dyn ViewerSink>,
        config: RelayBufferConfig,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            config,
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            running: AtomicBool::new(false),
            sink,
            overflow_dropped: AtomicU64::new(0),
            delivery_lost: AtomicU64::new(0),
        }
    }

    /// Session this buffer belongs to
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Start the delivery loop. Idempotent.
    pub fn start(self: &Arc<Self>) {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let buffer = Arc::clone(self);
            tokio::spawn(async move {
                buffer.run_delivery_loop().await;
            });
            tracing::info!(session_id = %self.session_id, "Frame delivery loop started");
        }
    }

    /// Stop the delivery loop and discard buffered frames. Idempotent.
    pub fn stop(&self) {
        if self
            .running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let discarded = {
                let mut queue = self.queue.lock();
                let len = queue.len();
                queue.clear();
                len
            };
            self.notify.notify_waiters();
            tracing::info!(
                session_id = %self.session_id,
                discarded,
                "Frame delivery loop stopped"
            );
        }
    }

    /// Whether the delivery loop is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Enqueue a frame for delivery. Never blocks.
    ///
    /// Returns false if the buffer is stopped. At capacity, the single oldest
    /// frame is evicted to admit the new one.
    pub fn add_frame(&self, frame: VideoFrame) -> bool {
        if !self.running.load(Ordering::SeqCst) {
            tracing::warn!(session_id = %self.session_id, "Delivery loop not running, dropping frame");
            return false;
        }

        {
            let mut queue = self.queue.lock();
            if queue.len() >= self.config.capacity {
                queue.pop_front();
                self.overflow_dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(session_id = %self.session_id, "Buffer full, evicted oldest frame");
            }
            queue.push_back(frame);
        }

        self.notify.notify_one();
        true
    }

    /// Current status snapshot
    pub fn status(&self) -> BufferStatus {
        BufferStatus {
            occupancy: self.queue.lock().len(),
            capacity: self.config.capacity,
            running: self.running.load(Ordering::SeqCst),
            viewer_open: self.sink.is_open(),
            overflow_dropped: self.overflow_dropped.load(Ordering::Relaxed),
            delivery_lost: self.delivery_lost.load(Ordering::Relaxed),
        }
    }

    /// Delivery loop body: drain the queue to the viewer until stopped.
    async fn run_delivery_loop(&self) {
        tracing::debug!(session_id = %self.session_id, "Delivery loop entered");

        while self.running.load(Ordering::SeqCst) {
            let next = self.queue.lock().pop_front();

            match next {
                Some(frame) => {
                    if !self.deliver_with_retry(frame).await {
                        // Viewer gone; stop ourselves rather than spin on a
                        // dead transport.
                        self.stop();
                        break;
                    }
                }
                None => {
                    // Bounded wait so the running flag is re-checked
                    // periodically even when no frames arrive.
                    let _ = timeout(self.config.poll_interval, self.notify.notified()).await;
                }
            }
        }

        tracing::debug!(session_id = %self.session_id, "Delivery loop exited");
    }

    /// Deliver one frame with bounded retries.
    ///
    /// Returns false when the viewer transport is closed and the loop should
    /// stop. A frame that exhausts its retries is logged as lost and the loop
    /// continues.
    async fn deliver_with_retry(&self, frame: VideoFrame) -> bool {
        let mut attempt = 0u32;

        while attempt < self.config.max_attempts && self.running.load(Ordering::SeqCst) {
            attempt += 1;

            if !self.sink.is_open() {
                tracing::warn!(session_id = %self.session_id, "Viewer closed, stopping delivery");
                return false;
            }

            match self.sink.send_binary(frame.payload.clone()).await {
                Ok(()) => {
                    let latency = frame.received_at.elapsed();
                    if latency > self.config.slow_delivery_warn {
                        tracing::warn!(
                            session_id = %self.session_id,
                            latency_ms = latency.as_millis() as u64,
                            "Slow frame delivery"
                        );
                    }
                    return true;
                }
                Err(SinkError::Closed) => {
                    tracing::warn!(session_id = %self.session_id, "Viewer closed, stopping delivery");
                    return false;
                }
                Err(SinkError::Transport(err)) => {
                    tracing::warn!(
                        session_id = %self.session_id,
                        attempt,
                        max_attempts = self.config.max_attempts,
                        error = %err,
                        "Frame delivery failed"
                    );

                    if attempt < self.config.max_attempts {
                        tokio::time::sleep(self.config.backoff_step * attempt).await;
                    }
                }
            }
        }

        if !self.running.load(Ordering::SeqCst) {
            // Stopped mid-delivery; the frame goes with the rest of the
            // discarded queue.
            return true;
        }

        self.delivery_lost.fetch_add(1, Ordering::Relaxed);
        tracing::error!(
            session_id = %self.session_id,
            attempts = attempt,
            "Frame permanently lost after exhausting delivery retries"
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::AtomicU32;

    /// Sink recording every delivered payload.
    struct RecordingSink {
        sent: Mutex<Vec<Bytes>>,
        attempts: AtomicU32,
        open: AtomicBool,
        /// Number of leading attempts that fail with a transport error.
        fail_first: u32,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self::failing(0)
        }

        fn failing(fail_first: u32) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                attempts: AtomicU32::new(0),
                open: AtomicBool::new(true),
                fail_first,
            }
        }

        fn close(&self) {
            self.open.store(false, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ViewerSink for RecordingSink {
        async fn send_text(&self, _text: &str) -> Result<(), SinkError> {
            Ok(())
        }

        async fn send_binary(&self, payload: Bytes) -> Result<(), SinkError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.fail_first {
                return Err(SinkError::Transport("simulated failure".to_string()));
            }
            self.sent.lock().push(payload);
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }
    }

    fn frame(i: u32) -> VideoFrame {
        VideoFrame::new(Bytes::copy_from_slice(&i.to_le_bytes()), "test-session")
    }

    fn frame_index(payload: &Bytes) -> u32 {
        u32::from_le_bytes(payload.as_ref().try_into().unwrap())
    }

    fn small_config() -> RelayBufferConfig {
        RelayBufferConfig {
            capacity: 100,
            poll_interval: Duration::from_millis(20),
            max_attempts: 3,
            backoff_step: Duration::from_millis(100),
            slow_delivery_warn: Duration::from_millis(100),
        }
    }

    #[tokio::test]
    async fn test_add_frame_rejected_when_stopped() {
        let sink = Arc::new(RecordingSink::new());
        let buffer = Arc::new(FrameRelayBuffer::new("s", sink, small_config()));

        assert!(!buffer.add_frame(frame(0)));
        assert_eq!(buffer.status().occupancy, 0);
    }

    // Runs on the current-thread test runtime: the spawned delivery loop gets
    // no chance to run between the synchronous add_frame calls, so the queue
    // fills exactly as if no consumer were draining.
    #[tokio::test]
    async fn test_occupancy_never_exceeds_capacity() {
        let sink = Arc::new(RecordingSink::new());
        let buffer = Arc::new(FrameRelayBuffer::new("s", sink, small_config()));
        buffer.start();

        for i in 0..150u32 {
            assert!(buffer.add_frame(frame(i)));
            assert!(buffer.status().occupancy <= 100);
        }

        let status = buffer.status();
        assert_eq!(status.occupancy, 100);
        assert_eq!(status.overflow_dropped, 50);
        buffer.stop();
    }

    #[tokio::test]
    async fn test_drop_oldest_retains_most_recent_in_order() {
        let sink = Arc::new(RecordingSink::new());
        let mut config = small_config();
        config.capacity = 5;
        let buffer = Arc::new(FrameRelayBuffer::new("s", sink, config));
        buffer.start();

        for i in 0..8u32 {
            buffer.add_frame(frame(i));
        }

        let retained: Vec<u32> = buffer
            .queue
            .lock()
            .iter()
            .map(|f| frame_index(&f.payload))
            .collect();
        assert_eq!(retained, vec![3, 4, 5, 6, 7]);
        buffer.stop();
    }

    #[tokio::test]
    async fn test_delivery_in_arrival_order() {
        let sink = Arc::new(RecordingSink::new());
        let buffer = Arc::new(FrameRelayBuffer::new("s", sink.clone(), small_config()));
        buffer.start();

        for i in 0..5u32 {
            buffer.add_frame(frame(i));
        }

        // Let the delivery loop drain the queue.
        for _ in 0..50 {
            if sink.sent.lock().len() == 5 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let delivered: Vec<u32> = sink.sent.lock().iter().map(frame_index).collect();
        assert_eq!(delivered, vec![0, 1, 2, 3, 4]);
        assert_eq!(buffer.status().occupancy, 0);
        buffer.stop();
    }

    #[tokio::test]
    async fn test_idempotent_stop() {
        let sink = Arc::new(RecordingSink::new());
        let buffer = Arc::new(FrameRelayBuffer::new("s", sink, small_config()));
        buffer.start();
        buffer.add_frame(frame(0));

        buffer.stop();
        buffer.stop();

        assert!(!buffer.is_running());
        assert_eq!(buffer.status().occupancy, 0);
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let sink = Arc::new(RecordingSink::new());
        let buffer = Arc::new(FrameRelayBuffer::new("s", sink.clone(), small_config()));

        buffer.start();
        buffer.stop();
        buffer.start();
        assert!(buffer.is_running());
        assert!(buffer.add_frame(frame(1)));
        buffer.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_with_linear_backoff_then_success() {
        let sink = Arc::new(RecordingSink::failing(2));
        let buffer = Arc::new(FrameRelayBuffer::new("s", sink.clone(), small_config()));
        buffer.start();

        let started = tokio::time::Instant::now();
        buffer.add_frame(frame(7));

        for _ in 0..200 {
            if sink.sent.lock().len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // Two failures cost 100ms + 200ms of backoff before the third
        // attempt succeeds.
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(sink.sent.lock().len(), 1);
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert_eq!(buffer.status().delivery_lost, 0);
        buffer.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_lost_after_exhausting_retries() {
        let sink = Arc::new(RecordingSink::failing(u32::MAX));
        let buffer = Arc::new(FrameRelayBuffer::new("s", sink.clone(), small_config()));
        buffer.start();

        buffer.add_frame(frame(0));

        for _ in 0..200 {
            if buffer.status().delivery_lost == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // The frame is gone but the loop survives and delivers what follows.
        assert_eq!(buffer.status().delivery_lost, 1);
        assert!(buffer.is_running());
        buffer.stop();
    }

    #[tokio::test]
    async fn test_viewer_close_stops_loop_without_retries() {
        let sink = Arc::new(RecordingSink::new());
        let buffer = Arc::new(FrameRelayBuffer::new("s", sink.clone(), small_config()));
        buffer.start();

        sink.close();
        buffer.add_frame(frame(0));

        for _ in 0..50 {
            if !buffer.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(!buffer.is_running());
        // The closed check precedes any send: no delivery attempts were made.
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_status_usage() {
        let status = BufferStatus {
            occupancy: 80,
            capacity: 100,
            running: true,
            viewer_open: true,
            overflow_dropped: 0,
            delivery_lost: 0,
        };
        assert!((status.usage() - 0.8).abs() < f64::EPSILON);
        assert!(status.to_string().contains("size=80/100"));
    }
}
