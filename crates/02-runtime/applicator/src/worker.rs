//! Worker-side service loop.

use bytes::Bytes;
use transport::{DoneRepV1, Packet, Rank, Transport, CONTROLLER_RANK};

use crate::algorithm::{execute, Algorithm, WorkerState};
use crate::error::{ApplicatorError, ApplicatorResult};

/// What a worker did before it was told to stop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ServeSummary {
    /// Dispatches that completed successfully.
    pub tasks: u64,
    /// Dispatches answered with a failure.
    pub failures: u64,
}

/// Drives one worker rank: waits for a dispatch, runs the algorithm and
/// replies, until the controller sends a stop signal.
pub(crate) struct WorkerLoop<'a, T: Transport + ?Sized> {
    transport: &'a T,
    rank: Rank,
    state: WorkerState,
    staged: Option<Bytes>,
    summary: ServeSummary,
}

impl<'a, T: Transport + ?Sized> WorkerLoop<'a, T> {
    pub(crate) fn new(transport: &'a T) -> Self {
        Self {
            transport,
            rank: transport.my_rank(),
            state: WorkerState::WaitingForWork,
            staged: None,
            summary: ServeSummary::default(),
        }
    }

    pub(crate) fn serve(mut self, algorithm: &mut dyn Algorithm) -> ApplicatorResult<ServeSummary> {
        let span = tracing::debug_span!("worker", rank = self.rank, algorithm = algorithm.name());
        let _enter = span.enter();
        tracing::debug!("serving");

        loop {
            let (from, bytes) = self.transport.receive().map_err(|err| {
                tracing::error!(%err, "worker lost its transport");
                ApplicatorError::from(err)
            })?;
            let packet = Packet::decode(&bytes)?;
            tracing::trace!(from, kind = packet.kind(), len = bytes.len(), "worker frame");
            if from != CONTROLLER_RANK {
                return Err(self.unexpected(from, packet.kind()));
            }
            match packet {
                Packet::Data(inputs) if self.staged.is_none() => {
                    self.staged = Some(Bytes::from(inputs));
                }
                Packet::Run(run) => {
                    let inputs = self.staged.take().unwrap_or_default();
                    let outcome = if run.algorithm == algorithm.name() {
                        execute(algorithm, inputs, |state| self.enter(state))
                    } else {
                        Err(format!(
                            "asked to run {} but serves {}",
                            run.algorithm,
                            algorithm.name()
                        ))
                    };
                    self.reply(run.dispatch, algorithm.name(), outcome)?;
                }
                Packet::Stop => {
                    tracing::debug!(
                        tasks = self.summary.tasks,
                        failures = self.summary.failures,
                        "stopping"
                    );
                    return Ok(self.summary);
                }
                other => return Err(self.unexpected(from, other.kind())),
            }
        }
    }

    fn enter(&mut self, state: WorkerState) {
        tracing::trace!(from = ?self.state, to = ?state, "worker state");
        self.state = state;
    }

    fn reply(
        &mut self,
        dispatch: u64,
        algorithm: &str,
        outcome: Result<Bytes, String>,
    ) -> ApplicatorResult<()> {
        let failure = match outcome {
            Ok(results) => {
                self.transport
                    .send(CONTROLLER_RANK, Packet::Data(results.to_vec()).encode()?)?;
                self.summary.tasks += 1;
                None
            }
            Err(reason) => {
                tracing::warn!(dispatch, %reason, "dispatch failed");
                self.summary.failures += 1;
                Some(reason)
            }
        };
        let done = DoneRepV1 {
            dispatch,
            algorithm: algorithm.to_owned(),
            failure,
        };
        self.transport
            .send(CONTROLLER_RANK, Packet::Done(done).encode()?)?;
        self.enter(WorkerState::WaitingForWork);
        Ok(())
    }

    fn unexpected(&self, from: Rank, kind: &'static str) -> ApplicatorError {
        tracing::error!(from, kind, "unexpected frame");
        ApplicatorError::UnexpectedFrame { from, kind }
    }
}
