//! Process roles and worker availability.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use transport::{Rank, Transport, CONTROLLER_RANK};

use crate::error::{ApplicatorError, ApplicatorResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Controller,
    Worker,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessState {
    Idle,
    Busy,
}

#[derive(Debug)]
struct RegistryState {
    /// Dispatchable ranks in scan order with their availability.
    pool: Vec<(Rank, ProcessState)>,
}

impl RegistryState {
    fn take_first_idle(&mut self) -> Option<Rank> {
        let slot = self
            .pool
            .iter_mut()
            .find(|(_, state)| *state == ProcessState::Idle)?;
        slot.1 = ProcessState::Busy;
        Some(slot.0)
    }

    fn count(&self, wanted: ProcessState) -> usize {
        self.pool.iter().filter(|(_, state)| *state == wanted).count()
    }
}

/// Single source of truth for which ranks exist and which are idle.
///
/// On the controller the pool holds every worker rank, or rank 0 itself when
/// the run has a single process. Workers keep an empty pool. The registry is
/// `Sync`: [`acquire_idle`](Self::acquire_idle) parks on a condition variable
/// until another thread calls [`release`](Self::release).
///
/// An [`Applicator`](crate::Applicator) never parks on that condition variable.
/// Its controller polls [`try_acquire_idle`](Self::try_acquire_idle) and blocks
/// on the transport instead, since only an incoming completion can free a rank.
/// It also keeps its registry private and hands out a [`RegistryView`].
#[derive(Debug)]
pub struct ProcessRegistry {
    rank: Rank,
    count: usize,
    role: Role,
    state: Mutex<RegistryState>,
    idle: Condvar,
}

impl ProcessRegistry {
    pub fn new(rank: Rank, count: usize) -> ApplicatorResult<Self> {
        if rank >= count {
            return Err(ApplicatorError::UnknownRank { rank, count });
        }
        let role = if rank == CONTROLLER_RANK {
            Role::Controller
        } else {
            Role::Worker
        };
        let pool = match role {
            Role::Controller if count == 1 => vec![(CONTROLLER_RANK, ProcessState::Idle)],
            Role::Controller => (1..count).map(|r| (r, ProcessState::Idle)).collect(),
            Role::Worker => Vec::new(),
        };
        Ok(Self {
            rank,
            count,
            role,
            state: Mutex::new(RegistryState { pool }),
            idle: Condvar::new(),
        })
    }

    pub fn from_transport<T: Transport + ?Sized>(transport: &T) -> ApplicatorResult<Self> {
        Self::new(transport.my_rank(), transport.process_count())
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn process_count(&self) -> usize {
        self.count
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_controller(&self) -> bool {
        self.role == Role::Controller
    }

    pub fn is_worker(&self) -> bool {
        self.role == Role::Worker
    }

    /// Marks the first idle rank busy and returns it, or `None` if all are busy.
    pub fn try_acquire_idle(&self) -> ApplicatorResult<Option<Rank>> {
        self.ensure_controller()?;
        Ok(self.state.lock().take_first_idle())
    }

    /// Blocks until some rank is idle, then marks it busy.
    pub fn acquire_idle(&self) -> ApplicatorResult<Rank> {
        self.ensure_controller()?;
        let mut state = self.state.lock();
        loop {
            if let Some(rank) = state.take_first_idle() {
                return Ok(rank);
            }
            self.idle.wait(&mut state);
        }
    }

    /// Like [`acquire_idle`](Self::acquire_idle) but gives up after `timeout`.
    pub fn acquire_idle_timeout(&self, timeout: Duration) -> ApplicatorResult<Rank> {
        self.ensure_controller()?;
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(rank) = state.take_first_idle() {
                return Ok(rank);
            }
            if self.idle.wait_until(&mut state, deadline).timed_out() {
                return state
                    .take_first_idle()
                    .ok_or(ApplicatorError::WorkerUnresponsive { waited: timeout });
            }
        }
    }

    /// Returns a busy rank to the idle pool and wakes one waiter.
    pub fn release(&self, rank: Rank) -> ApplicatorResult<()> {
        self.ensure_controller()?;
        let mut state = self.state.lock();
        let slot = state
            .pool
            .iter_mut()
            .find(|(r, _)| *r == rank)
            .ok_or(ApplicatorError::UnknownRank {
                rank,
                count: self.count,
            })?;
        if slot.1 != ProcessState::Busy {
            return Err(ApplicatorError::NotBusy(rank));
        }
        slot.1 = ProcessState::Idle;
        drop(state);
        self.idle.notify_one();
        Ok(())
    }

    /// State of `rank`, or `None` if it is not in the pool.
    pub fn state(&self, rank: Rank) -> Option<ProcessState> {
        self.state
            .lock()
            .pool
            .iter()
            .find(|(r, _)| *r == rank)
            .map(|(_, state)| *state)
    }

    pub fn idle_count(&self) -> usize {
        self.state.lock().count(ProcessState::Idle)
    }

    pub fn busy_count(&self) -> usize {
        self.state.lock().count(ProcessState::Busy)
    }

    /// Ranks this registry can dispatch to, in scan order.
    pub fn worker_ranks(&self) -> Vec<Rank> {
        self.state.lock().pool.iter().map(|(rank, _)| *rank).collect()
    }

    fn ensure_controller(&self) -> ApplicatorResult<()> {
        match self.role {
            Role::Controller => Ok(()),
            Role::Worker => Err(ApplicatorError::NotController(self.rank)),
        }
    }
}

/// Read-only access to the registry an [`Applicator`](crate::Applicator) owns.
///
/// Only the dispatcher may acquire or release ranks it manages, so the view
/// leaves out every mutator.
#[derive(Clone, Copy, Debug)]
pub struct RegistryView<'a> {
    registry: &'a ProcessRegistry,
}

impl<'a> RegistryView<'a> {
    pub(crate) fn new(registry: &'a ProcessRegistry) -> Self {
        Self { registry }
    }

    pub fn role(&self) -> Role {
        self.registry.role()
    }

    pub fn process_count(&self) -> usize {
        self.registry.process_count()
    }

    pub fn state(&self, rank: Rank) -> Option<ProcessState> {
        self.registry.state(rank)
    }

    pub fn idle_count(&self) -> usize {
        self.registry.idle_count()
    }

    pub fn busy_count(&self) -> usize {
        self.registry.busy_count()
    }

    pub fn worker_ranks(&self) -> Vec<Rank> {
        self.registry.worker_ranks()
    }
}
