use std::time::Duration;

use crate::error::TransportResult;

/// Integer identity of a process within a run, in `[0, process_count)`.
pub type Rank = usize;

/// Rank that acts as the controller by convention.
pub const CONTROLLER_RANK: Rank = 0;

/// A buffer received from a peer, tagged with the sender's rank.
pub type Delivery = (Rank, Vec<u8>);

/// Point-to-point message passing between numbered processes.
///
/// Implementations deliver buffers between any ordered pair of ranks in FIFO
/// order. No ordering is promised across different senders. Each rank drives
/// its endpoint from a single thread of control.
pub trait Transport: Send {
    /// Rank of the local process.
    fn my_rank(&self) -> Rank;

    /// Total number of processes in the run.
    fn process_count(&self) -> usize;

    /// Sends `bytes` to rank `to`.
    fn send(&self, to: Rank, bytes: Vec<u8>) -> TransportResult<()>;

    /// Blocks until the next buffer addressed to this rank arrives.
    fn receive(&self) -> TransportResult<Delivery>;

    /// Returns the next buffer if one is already queued.
    fn try_receive(&self) -> TransportResult<Option<Delivery>>;

    /// Blocks for at most `timeout`, returning `None` if nothing arrived.
    fn receive_timeout(&self, timeout: Duration) -> TransportResult<Option<Delivery>>;

    /// Releases the endpoint. Subsequent sends and receives fail.
    fn shutdown(&mut self) -> TransportResult<()> {
        Ok(())
    }
}
