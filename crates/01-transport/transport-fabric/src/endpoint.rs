use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use transport::{Delivery, Rank, Transport, TransportError, TransportResult};

use crate::metrics::EndpointMetrics;

/// One rank's view of an in-process fabric.
pub struct FabricEndpoint {
    rank: Rank,
    count: usize,
    /// Sender into every peer's inbox, `None` at this endpoint's own index.
    peers: Vec<Option<Sender<Delivery>>>,
    inbox: Receiver<Delivery>,
    metrics: EndpointMetrics,
    closed: bool,
}

impl FabricEndpoint {
    pub(crate) fn new(
        rank: Rank,
        peers: Vec<Option<Sender<Delivery>>>,
        inbox: Receiver<Delivery>,
    ) -> Self {
        Self {
            rank,
            count: peers.len(),
            peers,
            inbox,
            metrics: EndpointMetrics::new(),
            closed: false,
        }
    }

    /// Shared handle onto this endpoint's traffic counters.
    pub fn metrics(&self) -> EndpointMetrics {
        self.metrics.clone()
    }

    /// Number of buffers queued in this endpoint's inbox.
    pub fn pending(&self) -> usize {
        self.inbox.len()
    }

    fn ensure_open(&self) -> TransportResult<()> {
        if self.closed {
            return Err(TransportError::Shutdown(self.rank));
        }
        Ok(())
    }

    fn accept(&self, delivery: Delivery) -> Delivery {
        tracing::trace!(
            rank = self.rank,
            from = delivery.0,
            len = delivery.1.len(),
            "fabric receive"
        );
        self.metrics.record_receive(delivery.1.len());
        delivery
    }
}

impl Transport for FabricEndpoint {
    fn my_rank(&self) -> Rank {
        self.rank
    }

    fn process_count(&self) -> usize {
        self.count
    }

    fn send(&self, to: Rank, bytes: Vec<u8>) -> TransportResult<()> {
        self.ensure_open()?;
        let peer = self.peers.get(to).ok_or(TransportError::UnknownRank {
            rank: to,
            count: self.count,
        })?;
        let sender = peer.as_ref().ok_or(TransportError::Loopback(to))?;
        let len = bytes.len();
        match sender.send((self.rank, bytes)) {
            Ok(()) => {
                tracing::trace!(rank = self.rank, to, len, "fabric send");
                self.metrics.record_send(len);
                Ok(())
            }
            Err(_) => {
                self.metrics.record_send_failure();
                tracing::debug!(rank = self.rank, to, "fabric peer disconnected");
                Err(TransportError::Disconnected(to))
            }
        }
    }

    fn receive(&self) -> TransportResult<Delivery> {
        self.ensure_open()?;
        self.inbox
            .recv()
            .map(|delivery| self.accept(delivery))
            .map_err(|_| TransportError::Disconnected(self.rank))
    }

    fn try_receive(&self) -> TransportResult<Option<Delivery>> {
        self.ensure_open()?;
        match self.inbox.try_recv() {
            Ok(delivery) => Ok(Some(self.accept(delivery))),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TransportError::Disconnected(self.rank)),
        }
    }

    fn receive_timeout(&self, timeout: Duration) -> TransportResult<Option<Delivery>> {
        self.ensure_open()?;
        match self.inbox.recv_timeout(timeout) {
            Ok(delivery) => Ok(Some(self.accept(delivery))),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Disconnected(self.rank)),
        }
    }

    fn shutdown(&mut self) -> TransportResult<()> {
        if !self.closed {
            tracing::debug!(rank = self.rank, "fabric endpoint shut down");
            self.closed = true;
            // Dropping our senders lets peers observe disconnection once
            // everyone else has gone too.
            self.peers.iter_mut().for_each(|peer| *peer = None);
        }
        Ok(())
    }
}

impl std::fmt::Debug for FabricEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FabricEndpoint")
            .field("rank", &self.rank)
            .field("count", &self.count)
            .field("pending", &self.inbox.len())
            .field("closed", &self.closed)
            .finish()
    }
}
