use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Per-endpoint traffic counters.
///
/// Cloning yields another handle onto the same counters, so a harness can keep
/// one after the endpoint itself has moved onto a worker thread.
#[derive(Clone, Debug, Default)]
pub struct EndpointMetrics {
    inner: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    sent: AtomicU64,
    bytes_sent: AtomicU64,
    received: AtomicU64,
    bytes_received: AtomicU64,
    send_failures: AtomicU64,
}

impl EndpointMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_send(&self, len: usize) {
        self.inner.sent.fetch_add(1, Ordering::Relaxed);
        self.inner
            .bytes_sent
            .fetch_add(len as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_receive(&self, len: usize) {
        self.inner.received.fetch_add(1, Ordering::Relaxed);
        self.inner
            .bytes_received
            .fetch_add(len as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_send_failure(&self) {
        self.inner.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> EndpointMetricsSnapshot {
        EndpointMetricsSnapshot {
            sent: self.inner.sent.load(Ordering::Relaxed),
            bytes_sent: self.inner.bytes_sent.load(Ordering::Relaxed),
            received: self.inner.received.load(Ordering::Relaxed),
            bytes_received: self.inner.bytes_received.load(Ordering::Relaxed),
            send_failures: self.inner.send_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EndpointMetricsSnapshot {
    pub sent: u64,
    pub bytes_sent: u64,
    pub received: u64,
    pub bytes_received: u64,
    pub send_failures: u64,
}
