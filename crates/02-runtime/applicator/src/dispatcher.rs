//! Controller-side staging, dispatch and result collection.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use bytes::Bytes;
use transport::{DoneRepV1, Packet, Rank, RunCmdV1, Transport};
use transport_codecs::{Decode, Encode, MessageReader, MessageWriter};

use crate::config::ApplicatorConfig;
use crate::error::{ApplicatorError, ApplicatorResult};
use crate::registry::ProcessRegistry;

/// Result of [`next_avail_process`](crate::Applicator::next_avail_process).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Assignment {
    /// `rank` is now busy and will receive the next `apply`.
    Assigned(Rank),
    /// Every worker is busy and `rank` has results waiting; `get` them first.
    Collect(Rank),
}

impl Assignment {
    pub fn rank(self) -> Rank {
        match self {
            Assignment::Assigned(rank) | Assignment::Collect(rank) => rank,
        }
    }

    pub fn is_assigned(self) -> bool {
        matches!(self, Assignment::Assigned(_))
    }
}

/// A dispatch whose completion signal has not arrived yet.
#[derive(Debug)]
struct InFlight {
    dispatch: u64,
    algorithm: String,
    /// Results received ahead of the completion signal.
    results: Option<Bytes>,
}

/// A finished dispatch still owning its rank.
#[derive(Debug)]
pub(crate) struct Completion {
    pub(crate) rank: Rank,
    pub(crate) dispatch: u64,
    pub(crate) outcome: Result<Bytes, String>,
}

/// Results currently being drained by `get`.
#[derive(Debug)]
struct Cursor {
    rank: Rank,
    dispatch: u64,
    reader: MessageReader,
}

/// Everything a dispatcher call needs besides its own state.
pub(crate) struct Link<'a, T: Transport + ?Sized> {
    pub(crate) transport: &'a T,
    pub(crate) registry: &'a ProcessRegistry,
    pub(crate) config: &'a ApplicatorConfig,
}

#[derive(Debug, Default)]
pub(crate) struct Dispatcher {
    outbound: MessageWriter,
    assigned: Option<Rank>,
    in_flight: HashMap<Rank, InFlight>,
    completed: VecDeque<Completion>,
    cursor: Option<Cursor>,
    next_dispatch: u64,
}

impl Dispatcher {
    pub(crate) fn put<V: Encode + ?Sized>(&mut self, value: &V) -> ApplicatorResult<()> {
        self.outbound.put(value)?;
        Ok(())
    }

    /// Dispatched ranks not yet released.
    pub(crate) fn outstanding(&self) -> usize {
        self.in_flight.len() + self.completed.len() + usize::from(self.cursor.is_some())
    }

    pub(crate) fn next_avail_process<T: Transport + ?Sized>(
        &mut self,
        link: &Link<'_, T>,
        algorithm: &str,
    ) -> ApplicatorResult<Assignment> {
        if let Some(rank) = self.assigned {
            tracing::warn!(rank, algorithm, "worker already assigned and not yet applied");
            return Ok(Assignment::Assigned(rank));
        }

        let deadline = link.config.acquire_timeout.map(|d| Instant::now() + d);
        loop {
            self.pump(link)?;
            if let Some(rank) = link.registry.try_acquire_idle()? {
                tracing::debug!(rank, algorithm, "worker assigned");
                self.assigned = Some(rank);
                return Ok(Assignment::Assigned(rank));
            }
            if let Some(rank) = self.undrained_rank() {
                tracing::debug!(rank, "all workers busy, results waiting");
                return Ok(Assignment::Collect(rank));
            }
            if self.in_flight.is_empty() {
                // Every rank is held by something this dispatcher does not track.
                return Err(ApplicatorError::NothingPending);
            }
            self.await_frame(link, deadline, link.config.acquire_timeout)?;
        }
    }

    /// Takes the rank reserved for the next `apply` and the staged inputs.
    /// Without a reservation the staged inputs are dropped, so they cannot
    /// leak into the next dispatch.
    pub(crate) fn take_assignment(&mut self) -> ApplicatorResult<(Rank, u64, Bytes)> {
        let Some(rank) = self.assigned.take() else {
            if !self.outbound.is_empty() {
                tracing::warn!(
                    values = self.outbound.len(),
                    "apply without an assigned worker, staged inputs dropped"
                );
                self.outbound.clear();
            }
            return Err(ApplicatorError::NoAssignedWorker);
        };
        let dispatch = self.next_dispatch;
        self.next_dispatch += 1;
        Ok((rank, dispatch, self.outbound.take()))
    }

    pub(crate) fn apply<T: Transport + ?Sized>(
        &mut self,
        link: &Link<'_, T>,
        algorithm: &str,
    ) -> ApplicatorResult<()> {
        let (rank, dispatch, inputs) = self.take_assignment()?;
        let sent = send_dispatch(link.transport, rank, dispatch, algorithm, inputs);
        if let Err(err) = sent {
            link.registry.release(rank)?;
            return Err(err);
        }
        tracing::debug!(rank, dispatch, algorithm, "dispatched");
        self.in_flight.insert(
            rank,
            InFlight {
                dispatch,
                algorithm: algorithm.to_owned(),
                results: None,
            },
        );
        Ok(())
    }

    /// Records a dispatch that ran in-process (serial mode).
    pub(crate) fn complete_locally(
        &mut self,
        registry: &ProcessRegistry,
        completion: Completion,
    ) -> ApplicatorResult<()> {
        self.finish(registry, completion)
    }

    pub(crate) fn get<V: Decode, T: Transport + ?Sized>(
        &mut self,
        link: &Link<'_, T>,
    ) -> ApplicatorResult<V> {
        if self.cursor.is_none() {
            self.wait_for_cursor(link)?;
        }
        let Some(cursor) = self.cursor.as_mut() else {
            return Err(ApplicatorError::NothingPending);
        };
        let rank = cursor.rank;
        match cursor.reader.get::<V>() {
            Ok(value) => {
                if cursor.reader.is_exhausted() {
                    tracing::debug!(rank, dispatch = cursor.dispatch, "results drained");
                    self.cursor = None;
                    link.registry.release(rank)?;
                }
                Ok(value)
            }
            Err(err) => {
                tracing::warn!(rank, %err, "aborting result message");
                self.cursor = None;
                link.registry.release(rank)?;
                Err(err.into())
            }
        }
    }

    /// Non-blocking completion check.
    pub(crate) fn next_process_done<T: Transport + ?Sized>(
        &mut self,
        link: &Link<'_, T>,
    ) -> ApplicatorResult<Option<Rank>> {
        if let Some(cursor) = &self.cursor {
            return Ok(Some(cursor.rank));
        }
        self.pump(link)?;
        self.promote(link.registry)
    }

    /// Blocks until some dispatch completes; returns the rank whose results
    /// the following `get` calls will read.
    pub(crate) fn wait_process_done<T: Transport + ?Sized>(
        &mut self,
        link: &Link<'_, T>,
    ) -> ApplicatorResult<Rank> {
        if let Some(cursor) = &self.cursor {
            return Ok(cursor.rank);
        }
        self.wait_for_cursor(link)?;
        self.cursor
            .as_ref()
            .map(|cursor| cursor.rank)
            .ok_or(ApplicatorError::NothingPending)
    }

    /// Drops the results being drained and releases their rank.
    pub(crate) fn discard_results(
        &mut self,
        registry: &ProcessRegistry,
    ) -> ApplicatorResult<Option<Rank>> {
        let Some(cursor) = self.cursor.take() else {
            return Ok(None);
        };
        tracing::debug!(rank = cursor.rank, dispatch = cursor.dispatch, "results discarded");
        registry.release(cursor.rank)?;
        Ok(Some(cursor.rank))
    }

    fn undrained_rank(&self) -> Option<Rank> {
        self.cursor
            .as_ref()
            .map(|cursor| cursor.rank)
            .or_else(|| self.completed.front().map(|completion| completion.rank))
    }

    fn wait_for_cursor<T: Transport + ?Sized>(
        &mut self,
        link: &Link<'_, T>,
    ) -> ApplicatorResult<()> {
        let deadline = link.config.done_timeout.map(|d| Instant::now() + d);
        loop {
            self.pump(link)?;
            if self.promote(link.registry)?.is_some() {
                return Ok(());
            }
            if self.in_flight.is_empty() {
                return Err(ApplicatorError::NothingPending);
            }
            self.await_frame(link, deadline, link.config.done_timeout)?;
        }
    }

    /// Moves the oldest completion under the cursor. A failed completion
    /// releases its rank and is returned as an error.
    fn promote(&mut self, registry: &ProcessRegistry) -> ApplicatorResult<Option<Rank>> {
        let Some(completion) = self.completed.pop_front() else {
            return Ok(None);
        };
        let rank = completion.rank;
        match completion.outcome {
            Ok(results) => {
                self.cursor = Some(Cursor {
                    rank,
                    dispatch: completion.dispatch,
                    reader: MessageReader::new(results),
                });
                Ok(Some(rank))
            }
            Err(reason) => {
                registry.release(rank)?;
                Err(ApplicatorError::WorkerFailed { rank, reason })
            }
        }
    }

    /// Handles every frame already queued, up to the configured batch.
    /// Nothing is read while no dispatch is in flight.
    fn pump<T: Transport + ?Sized>(&mut self, link: &Link<'_, T>) -> ApplicatorResult<()> {
        for _ in 0..link.config.poll_batch {
            if self.in_flight.is_empty() {
                break;
            }
            match link.transport.try_receive()? {
                Some((from, bytes)) => self.handle(link.registry, from, &bytes)?,
                None => break,
            }
        }
        Ok(())
    }

    /// Blocks on the transport for one frame, honouring `deadline`.
    fn await_frame<T: Transport + ?Sized>(
        &mut self,
        link: &Link<'_, T>,
        deadline: Option<Instant>,
        limit: Option<Duration>,
    ) -> ApplicatorResult<()> {
        let delivery = match (deadline, limit) {
            (Some(deadline), Some(waited)) => {
                let left = deadline.saturating_duration_since(Instant::now());
                link.transport
                    .receive_timeout(left)?
                    .ok_or(ApplicatorError::WorkerUnresponsive { waited })?
            }
            _ => link.transport.receive()?,
        };
        self.handle(link.registry, delivery.0, &delivery.1)
    }

    fn handle(
        &mut self,
        registry: &ProcessRegistry,
        from: Rank,
        bytes: &[u8],
    ) -> ApplicatorResult<()> {
        let packet = Packet::decode(bytes)?;
        tracing::trace!(from, kind = packet.kind(), len = bytes.len(), "controller frame");
        let kind = packet.kind();
        let Some(flight) = self.in_flight.get_mut(&from) else {
            return Err(ApplicatorError::UnexpectedFrame { from, kind });
        };
        match packet {
            Packet::Data(results) if flight.results.is_none() => {
                flight.results = Some(Bytes::from(results));
                Ok(())
            }
            Packet::Done(done) if done.dispatch == flight.dispatch => {
                let flight = self
                    .in_flight
                    .remove(&from)
                    .ok_or(ApplicatorError::UnexpectedFrame { from, kind })?;
                self.finish(registry, completion_from(from, flight, done))
            }
            _ => Err(ApplicatorError::UnexpectedFrame { from, kind }),
        }
    }

    fn finish(
        &mut self,
        registry: &ProcessRegistry,
        completion: Completion,
    ) -> ApplicatorResult<()> {
        match &completion.outcome {
            Ok(results) if results.is_empty() => {
                tracing::debug!(
                    rank = completion.rank,
                    dispatch = completion.dispatch,
                    "completed without results"
                );
                registry.release(completion.rank)?;
                return Ok(());
            }
            Ok(results) => tracing::debug!(
                rank = completion.rank,
                dispatch = completion.dispatch,
                len = results.len(),
                "completed"
            ),
            Err(reason) => tracing::warn!(
                rank = completion.rank,
                dispatch = completion.dispatch,
                %reason,
                "worker reported failure"
            ),
        }
        self.completed.push_back(completion);
        Ok(())
    }
}

fn completion_from(rank: Rank, flight: InFlight, done: DoneRepV1) -> Completion {
    let outcome = match done.failure {
        Some(reason) => Err(reason),
        None if done.algorithm != flight.algorithm => Err(format!(
            "ran {} but {} was dispatched",
            done.algorithm, flight.algorithm
        )),
        None => Ok(flight.results.unwrap_or_default()),
    };
    Completion {
        rank,
        dispatch: flight.dispatch,
        outcome,
    }
}

fn send_dispatch<T: Transport + ?Sized>(
    transport: &T,
    rank: Rank,
    dispatch: u64,
    algorithm: &str,
    inputs: Bytes,
) -> ApplicatorResult<()> {
    transport.send(rank, Packet::Data(inputs.to_vec()).encode()?)?;
    let run = RunCmdV1 {
        dispatch,
        algorithm: algorithm.to_owned(),
    };
    transport.send(rank, Packet::Run(run).encode()?)?;
    Ok(())
}
