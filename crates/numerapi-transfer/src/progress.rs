//! Progress snapshots and throttling.
//!
//! A transfer publishes [`TransferProgress`] snapshots into a channel at a
//! bounded cadence. The receiving half is a [`ProgressStream`], which ends
//! when the transfer that feeds it finishes.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Point-in-time view of a running transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferProgress {
    /// Bytes on disk (download) or sent (upload), including resumed bytes.
    pub bytes_transferred: u64,
    /// Total size if the server or caller told us.
    pub total_bytes: Option<u64>,
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
}

impl TransferProgress {
    /// Snapshot taken now.
    pub fn now(bytes_transferred: u64, total_bytes: Option<u64>) -> Self {
        Self {
            bytes_transferred,
            total_bytes,
            timestamp: Utc::now(),
        }
    }

    /// Completed fraction in `0.0..=1.0`, if the total is known and non-zero.
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> Option<f64> {
        self.total_bytes
            .filter(|total| *total > 0)
            .map(|total| (self.bytes_transferred as f64 / total as f64).min(1.0))
    }
}

/// How often snapshots may be emitted.
///
/// A snapshot goes out when either limit is reached, whichever comes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressCadence {
    /// Minimum time between snapshots.
    pub min_interval: Duration,
    /// Emit anyway once this many bytes moved since the last snapshot.
    pub byte_threshold: u64,
}

impl Default for ProgressCadence {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(100),
            byte_threshold: 1024 * 1024,
        }
    }
}

/// Rate-limiter for progress updates.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    last_emit: Option<Instant>,
    last_bytes: u64,
    cadence: ProgressCadence,
}

impl ProgressThrottle {
    /// Create a new throttle with the given cadence.
    pub const fn new(cadence: ProgressCadence) -> Self {
        Self {
            last_emit: None,
            last_bytes: 0,
            cadence,
        }
    }

    /// Check if a snapshot at `bytes` should be emitted, recording it if so.
    pub fn should_emit(&mut self, bytes: u64) -> bool {
        let now = Instant::now();
        let due = match self.last_emit {
            None => true,
            Some(last) => {
                now.duration_since(last) >= self.cadence.min_interval
                    || bytes.saturating_sub(self.last_bytes) >= self.cadence.byte_threshold
            }
        };
        if due {
            self.last_emit = Some(now);
            self.last_bytes = bytes;
        }
        due
    }

    /// Force the next check to return true.
    pub const fn reset(&mut self) {
        self.last_emit = None;
    }
}

/// Sending half, owned by the engine for the duration of one transfer.
#[derive(Debug, Clone)]
pub(crate) struct ProgressReporter {
    tx: mpsc::UnboundedSender<TransferProgress>,
    throttle: ProgressThrottle,
}

impl ProgressReporter {
    /// Publish a snapshot if the cadence allows it.
    pub(crate) fn update(&mut self, bytes: u64, total: Option<u64>) {
        if self.throttle.should_emit(bytes) {
            let _ = self.tx.send(TransferProgress::now(bytes, total));
        }
    }

    /// Publish a snapshot unconditionally.
    pub(crate) fn finish(&mut self, bytes: u64, total: Option<u64>) {
        self.throttle.reset();
        let _ = self.tx.send(TransferProgress::now(bytes, total));
    }
}

/// Lazy, finite sequence of progress snapshots for one transfer.
#[derive(Debug)]
pub struct ProgressStream {
    rx: mpsc::UnboundedReceiver<TransferProgress>,
}

impl ProgressStream {
    /// Wait for the next snapshot; `None` once the transfer has ended.
    pub async fn recv(&mut self) -> Option<TransferProgress> {
        self.rx.recv().await
    }
}

impl Stream for ProgressStream {
    type Item = TransferProgress;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Create a connected reporter/stream pair.
pub(crate) fn channel(cadence: ProgressCadence) -> (ProgressReporter, ProgressStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ProgressReporter {
            tx,
            throttle: ProgressThrottle::new(cadence),
        },
        ProgressStream { rx },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn slow_cadence() -> ProgressCadence {
        ProgressCadence {
            min_interval: Duration::from_secs(3600),
            byte_threshold: 100,
        }
    }

    #[test]
    fn throttle_first_emit() {
        let mut throttle = ProgressThrottle::new(slow_cadence());
        assert!(throttle.should_emit(0));
    }

    #[test]
    fn throttle_respects_byte_threshold() {
        let mut throttle = ProgressThrottle::new(slow_cadence());
        assert!(throttle.should_emit(0));
        assert!(!throttle.should_emit(50));
        assert!(throttle.should_emit(100));
        assert!(!throttle.should_emit(150));
    }

    #[test]
    fn throttle_respects_interval() {
        let mut throttle = ProgressThrottle::new(ProgressCadence {
            min_interval: Duration::from_millis(50),
            byte_threshold: u64::MAX,
        });
        assert!(throttle.should_emit(1));
        assert!(!throttle.should_emit(2));

        std::thread::sleep(Duration::from_millis(60));
        assert!(throttle.should_emit(3));
    }

    #[test]
    fn throttle_reset() {
        let mut throttle = ProgressThrottle::new(slow_cadence());
        throttle.should_emit(0);
        assert!(!throttle.should_emit(1));

        throttle.reset();
        assert!(throttle.should_emit(1));
    }

    #[test]
    fn fraction_needs_total() {
        assert_eq!(TransferProgress::now(5, None).fraction(), None);
        assert_eq!(TransferProgress::now(5, Some(0)).fraction(), None);
        assert_eq!(TransferProgress::now(5, Some(10)).fraction(), Some(0.5));
    }

    #[tokio::test]
    async fn stream_ends_when_reporter_drops() {
        let (mut reporter, stream) = channel(slow_cadence());
        reporter.update(0, Some(300));
        reporter.update(10, Some(300));
        reporter.update(150, Some(300));
        reporter.finish(300, Some(300));
        drop(reporter);

        let snapshots: Vec<_> = stream.collect().await;
        let bytes: Vec<u64> = snapshots.iter().map(|p| p.bytes_transferred).collect();
        assert_eq!(bytes, vec![0, 150, 300]);
        assert!(snapshots.iter().all(|p| p.total_bytes == Some(300)));
    }
}
