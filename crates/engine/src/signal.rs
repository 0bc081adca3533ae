//! Segment completion signaling
//!
//! The engine read loop must never block waiting for the sequencer: the same
//! task also pumps video frames. `CompletionGate` gives it a fire-and-forget
//! signal with exactly-once semantics on the waiting side.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Terminal outcome of one submitted segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalStatus {
    /// The engine reported the segment completed.
    Completed,
    /// The engine reported an error, or a message could not be decoded.
    EngineError,
    /// The engine connection closed before a completion arrived.
    ConnectionClosed,
}

/// One-shot, idempotent completion signal per submitted segment.
///
/// Single producer (the connection read loop), single consumer (the
/// sequencer). Signaling never blocks and only the first signal per segment
/// is retained; the consumer drains stale state with [`CompletionGate::reset`]
/// before each submission.
pub struct CompletionGate {
    tx: mpsc::Sender<TerminalStatus>,
    rx: tokio::sync::Mutex<mpsc::Receiver<TerminalStatus>>,
}

impl CompletionGate {
    /// Create a new gate
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    /// Record a terminal status. Non-blocking; a second signal for the same
    /// segment is dropped.
    pub fn signal(&self, status: TerminalStatus) {
        match self.tx.try_send(status) {
            Ok(()) => {}
            Err(TrySendError::Full(status)) => {
                tracing::debug!(?status, "Completion already signaled, dropping duplicate");
            }
            Err(TrySendError::Closed(status)) => {
                tracing::debug!(?status, "Completion gate closed, dropping signal");
            }
        }
    }

    /// Wait for the segment's terminal status, bounded by `timeout`.
    ///
    /// Returns `None` if no signal arrives within the bound.
    pub async fn wait(&self, timeout: Duration) -> Option<TerminalStatus> {
        let mut rx = self.rx.lock().await;
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    }

    /// Drain any stale signal left over from a previous segment.
    pub fn reset(&self) {
        if let Ok(mut rx) = self.rx.try_lock() {
            while rx.try_recv().is_ok() {}
        }
    }
}

impl Default for CompletionGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_signal_then_wait() {
        let gate = CompletionGate::new();
        gate.signal(TerminalStatus::Completed);

        let status = gate.wait(Duration::from_millis(50)).await;
        assert_eq!(status, Some(TerminalStatus::Completed));
    }

    #[tokio::test]
    async fn test_only_first_signal_matters() {
        let gate = CompletionGate::new();
        gate.signal(TerminalStatus::Completed);
        gate.signal(TerminalStatus::EngineError);
        gate.signal(TerminalStatus::ConnectionClosed);

        assert_eq!(
            gate.wait(Duration::from_millis(50)).await,
            Some(TerminalStatus::Completed)
        );
        // The duplicates were dropped, not queued.
        assert_eq!(gate.wait(Duration::from_millis(10)).await, None);
    }

    #[tokio::test]
    async fn test_wait_times_out_without_signal() {
        let gate = CompletionGate::new();
        let status = gate.wait(Duration::from_millis(10)).await;
        assert_eq!(status, None);
    }

    #[tokio::test]
    async fn test_reset_drains_stale_signal() {
        let gate = CompletionGate::new();
        gate.signal(TerminalStatus::EngineError);
        gate.reset();

        assert_eq!(gate.wait(Duration::from_millis(10)).await, None);

        // A fresh signal after reset is observed normally.
        gate.signal(TerminalStatus::Completed);
        assert_eq!(
            gate.wait(Duration::from_millis(50)).await,
            Some(TerminalStatus::Completed)
        );
    }

    #[tokio::test]
    async fn test_signal_delivered_to_concurrent_waiter() {
        let gate = std::sync::Arc::new(CompletionGate::new());
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait(Duration::from_secs(1)).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        gate.signal(TerminalStatus::Completed);

        let status = waiter.await.unwrap();
        assert_eq!(status, Some(TerminalStatus::Completed));
    }
}
