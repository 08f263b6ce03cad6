use transport::{Packet, Rank, Transport, TransportError, CONTROLLER_RANK};
use transport_codecs::{Decode, Encode};

use crate::algorithm::{execute, Algorithm};
use crate::config::ApplicatorConfig;
use crate::dispatcher::{Assignment, Completion, Dispatcher, Link};
use crate::error::{ApplicatorError, ApplicatorResult};
use crate::registry::{ProcessRegistry, RegistryView};
use crate::worker::{ServeSummary, WorkerLoop};

/// Per-process context tying a transport endpoint to the dispatch machinery.
///
/// Construct one per rank with [`Applicator::init`]. Rank 0 becomes the
/// controller and uses `put`/`apply`/`get`; every other rank registers an
/// algorithm and calls [`serve`](Self::serve).
pub struct Applicator<T: Transport> {
    transport: T,
    registry: ProcessRegistry,
    config: ApplicatorConfig,
    algorithm: Option<Box<dyn Algorithm>>,
    dispatcher: Dispatcher,
    closed: bool,
}

impl<T: Transport> Applicator<T> {
    pub fn init(transport: T, config: ApplicatorConfig) -> ApplicatorResult<Self> {
        config.validate()?;
        let registry = ProcessRegistry::from_transport(&transport)?;
        tracing::debug!(
            rank = registry.rank(),
            processes = registry.process_count(),
            role = ?registry.role(),
            "applicator initialised"
        );
        Ok(Self {
            transport,
            registry,
            config,
            algorithm: None,
            dispatcher: Dispatcher::default(),
            closed: false,
        })
    }

    /// Registers the algorithm this process runs. Allowed once per process.
    pub fn define_algorithm<A: Algorithm + 'static>(&mut self, algorithm: A) -> ApplicatorResult<()> {
        if let Some(existing) = &self.algorithm {
            return Err(ApplicatorError::DuplicateRegistration {
                rank: self.rank(),
                existing: existing.name().to_owned(),
            });
        }
        tracing::debug!(rank = self.rank(), algorithm = algorithm.name(), "algorithm defined");
        self.algorithm = Some(Box::new(algorithm));
        Ok(())
    }

    pub fn is_controller(&self) -> bool {
        self.registry.is_controller()
    }

    pub fn is_worker(&self) -> bool {
        self.registry.is_worker()
    }

    pub fn rank(&self) -> Rank {
        self.registry.rank()
    }

    pub fn num_procs(&self) -> usize {
        self.registry.process_count()
    }

    /// True when the controller is the only process and runs dispatches itself.
    pub fn is_serial(&self) -> bool {
        self.num_procs() == 1
    }

    /// Rank availability as the dispatcher sees it.
    pub fn registry(&self) -> RegistryView<'_> {
        RegistryView::new(&self.registry)
    }

    pub fn config(&self) -> &ApplicatorConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Stages a value for the next [`apply`](Self::apply).
    pub fn put<V: Encode + ?Sized>(&mut self, value: &V) -> ApplicatorResult<()> {
        self.ensure_controller()?;
        self.dispatcher.put(value)
    }

    /// Reserves an idle worker for `algorithm`, blocking while none is free.
    ///
    /// Returns [`Assignment::Collect`] instead of blocking forever when every
    /// worker is busy and one of them has results the caller has not drained.
    pub fn next_avail_process(&mut self, algorithm: &dyn Algorithm) -> ApplicatorResult<Assignment> {
        self.ensure_controller()?;
        let link = Link {
            transport: &self.transport,
            registry: &self.registry,
            config: &self.config,
        };
        self.dispatcher.next_avail_process(&link, algorithm.name())
    }

    /// Sends the staged values to the reserved worker and tells it to run.
    pub fn apply(&mut self, algorithm: &dyn Algorithm) -> ApplicatorResult<()> {
        self.ensure_controller()?;
        if !self.is_serial() {
            let link = Link {
                transport: &self.transport,
                registry: &self.registry,
                config: &self.config,
            };
            return self.dispatcher.apply(&link, algorithm.name());
        }

        let (rank, dispatch, inputs) = self.dispatcher.take_assignment()?;
        let Some(local) = self.algorithm.as_mut() else {
            self.registry.release(rank)?;
            return Err(ApplicatorError::NoAlgorithm(rank));
        };
        let outcome = if local.name() == algorithm.name() {
            execute(local.as_mut(), inputs, |_| {})
        } else {
            Err(format!(
                "asked to run {} but serves {}",
                algorithm.name(),
                local.name()
            ))
        };
        tracing::debug!(rank, dispatch, algorithm = algorithm.name(), "ran in-process");
        self.dispatcher.complete_locally(
            &self.registry,
            Completion {
                rank,
                dispatch,
                outcome,
            },
        )
    }

    /// Decodes the next result value, blocking until some dispatch completes.
    pub fn get<V: Decode>(&mut self) -> ApplicatorResult<V> {
        self.ensure_controller()?;
        let link = Link {
            transport: &self.transport,
            registry: &self.registry,
            config: &self.config,
        };
        self.dispatcher.get(&link)
    }

    /// Non-blocking: the rank whose results the next `get` will read, if any
    /// dispatch has finished.
    pub fn next_process_done(&mut self) -> ApplicatorResult<Option<Rank>> {
        self.ensure_controller()?;
        let link = Link {
            transport: &self.transport,
            registry: &self.registry,
            config: &self.config,
        };
        self.dispatcher.next_process_done(&link)
    }

    /// Blocking variant of [`next_process_done`](Self::next_process_done).
    pub fn wait_process_done(&mut self) -> ApplicatorResult<Rank> {
        self.ensure_controller()?;
        let link = Link {
            transport: &self.transport,
            registry: &self.registry,
            config: &self.config,
        };
        self.dispatcher.wait_process_done(&link)
    }

    /// Drops whatever is left of the results being read and frees their rank.
    pub fn discard_results(&mut self) -> ApplicatorResult<Option<Rank>> {
        self.ensure_controller()?;
        self.dispatcher.discard_results(&self.registry)
    }

    /// Dispatches whose rank has not been released yet.
    pub fn outstanding(&self) -> usize {
        self.dispatcher.outstanding()
    }

    /// Runs the worker loop until the controller shuts the run down.
    pub fn serve(&mut self) -> ApplicatorResult<ServeSummary> {
        if !self.is_worker() {
            return Err(ApplicatorError::NotWorker(self.rank()));
        }
        let rank = self.rank();
        let algorithm = self
            .algorithm
            .as_mut()
            .ok_or(ApplicatorError::NoAlgorithm(rank))?;
        WorkerLoop::new(&self.transport).serve(algorithm.as_mut())
    }

    /// On the controller, tells every worker to stop; then closes the transport.
    pub fn shutdown(&mut self) -> ApplicatorResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.is_controller() && !self.is_serial() {
            let outstanding = self.outstanding();
            if outstanding > 0 {
                tracing::warn!(outstanding, "shutting down with undrained dispatches");
            }
            let stop = Packet::Stop.encode()?;
            for rank in (0..self.num_procs()).filter(|r| *r != CONTROLLER_RANK) {
                match self.transport.send(rank, stop.clone()) {
                    // Already gone; nothing left to stop.
                    Err(TransportError::Disconnected(_)) => {
                        tracing::debug!(rank, "worker already disconnected");
                    }
                    other => other?,
                }
            }
            tracing::debug!(workers = self.num_procs() - 1, "stop sent");
        }
        self.transport.shutdown()?;
        Ok(())
    }

    fn ensure_controller(&self) -> ApplicatorResult<()> {
        if self.is_controller() {
            Ok(())
        } else {
            Err(ApplicatorError::NotController(self.rank()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::testing::Scale;
    use crate::registry::ProcessState;
    use std::thread;
    use transport_fabric::{build_fabric, FabricEndpoint};

    fn single() -> Applicator<FabricEndpoint> {
        let endpoint = build_fabric(1).unwrap().pop().unwrap();
        Applicator::init(endpoint, ApplicatorConfig::default()).unwrap()
    }

    #[test]
    fn second_registration_fails_fast() {
        let mut app = single();
        app.define_algorithm(Scale::default()).unwrap();
        assert!(matches!(
            app.define_algorithm(Scale::default()),
            Err(ApplicatorError::DuplicateRegistration { rank: 0, ref existing }) if existing == "scale"
        ));
    }

    #[test]
    fn serial_mode_runs_in_process() {
        let mut app = single();
        assert!(app.is_serial() && app.is_controller() && !app.is_worker());
        app.define_algorithm(Scale::default()).unwrap();
        let probe = Scale::default();

        for round in 1..=3 {
            assert_eq!(app.next_avail_process(&probe).unwrap(), Assignment::Assigned(0));
            app.put(&round).unwrap();
            app.put(&0.5).unwrap();
            app.apply(&probe).unwrap();
            assert_eq!(app.outstanding(), 1);
            // Busy with undrained results: must collect before reassigning.
            assert_eq!(app.next_avail_process(&probe).unwrap(), Assignment::Collect(0));
            assert_eq!(app.get::<f64>().unwrap(), f64::from(round) * 0.5);
            assert!(app.get::<bool>().unwrap());
            assert_eq!(app.outstanding(), 0);
        }
        app.shutdown().unwrap();
    }

    #[test]
    fn serial_mode_without_algorithm_is_reported() {
        let mut app = single();
        let probe = Scale::default();
        app.next_avail_process(&probe).unwrap();
        assert!(matches!(app.apply(&probe), Err(ApplicatorError::NoAlgorithm(0))));
        assert_eq!(app.registry().idle_count(), 1);
    }

    #[test]
    fn staging_does_not_survive_a_rejected_apply() {
        let mut app = single();
        app.define_algorithm(Scale::default()).unwrap();
        let probe = Scale::default();
        app.put(&99).unwrap();
        assert!(matches!(app.apply(&probe), Err(ApplicatorError::NoAssignedWorker)));

        app.next_avail_process(&probe).unwrap();
        app.put(&2).unwrap();
        app.put(&0.5).unwrap();
        app.apply(&probe).unwrap();
        assert_eq!(app.get::<f64>().unwrap(), 1.0);
        assert!(app.get::<bool>().unwrap());
    }

    #[test]
    fn in_flight_rank_is_never_handed_out_twice() {
        let mut endpoints = build_fabric(2).unwrap();
        let worker_endpoint = endpoints.pop().unwrap();
        let worker = thread::spawn(move || {
            let mut app = Applicator::init(worker_endpoint, ApplicatorConfig::default())?;
            app.define_algorithm(Scale::default())?;
            app.serve()
        });

        let mut app = Applicator::init(endpoints.pop().unwrap(), ApplicatorConfig::default()).unwrap();
        let probe = Scale::default();
        assert_eq!(app.next_avail_process(&probe).unwrap(), Assignment::Assigned(1));
        app.put(&2).unwrap();
        app.put(&1.5).unwrap();
        app.apply(&probe).unwrap();

        let view = app.registry();
        assert_eq!(view.state(1), Some(ProcessState::Busy));
        assert_eq!((view.idle_count(), view.busy_count()), (0, 1));
        assert_eq!(view.worker_ranks(), vec![1]);
        // The only worker is owed a collection, not a second assignment.
        assert_eq!(app.next_avail_process(&probe).unwrap(), Assignment::Collect(1));
        assert_eq!(app.outstanding(), 1);
        assert_eq!(app.get::<f64>().unwrap(), 3.0);
        assert!(app.get::<bool>().unwrap());
        assert_eq!(app.next_avail_process(&probe).unwrap(), Assignment::Assigned(1));

        app.put(&1).unwrap();
        app.put(&1.0).unwrap();
        app.apply(&probe).unwrap();
        app.wait_process_done().unwrap();
        app.discard_results().unwrap();
        app.shutdown().unwrap();
        assert_eq!(worker.join().unwrap().unwrap().tasks, 2);
    }

    #[test]
    fn roles_gate_the_api() {
        let mut endpoints = build_fabric(2).unwrap();
        let mut worker = Applicator::init(endpoints.pop().unwrap(), ApplicatorConfig::default()).unwrap();
        let mut controller =
            Applicator::init(endpoints.pop().unwrap(), ApplicatorConfig::default()).unwrap();

        assert!(matches!(worker.put(&1), Err(ApplicatorError::NotController(1))));
        assert!(matches!(worker.get::<i32>(), Err(ApplicatorError::NotController(1))));
        assert!(matches!(worker.serve(), Err(ApplicatorError::NoAlgorithm(1))));
        assert!(matches!(controller.serve(), Err(ApplicatorError::NotWorker(0))));
        assert!(matches!(controller.apply(&Scale::default()), Err(ApplicatorError::NoAssignedWorker)));
        assert!(matches!(controller.get::<i32>(), Err(ApplicatorError::NothingPending)));
    }

    #[test]
    fn controller_and_worker_round_trip() {
        let mut endpoints = build_fabric(2).unwrap();
        let worker_endpoint = endpoints.pop().unwrap();
        let worker = thread::spawn(move || {
            let mut app = Applicator::init(worker_endpoint, ApplicatorConfig::default())?;
            app.define_algorithm(Scale::default())?;
            app.serve()
        });

        let mut app = Applicator::init(endpoints.pop().unwrap(), ApplicatorConfig::default()).unwrap();
        let probe = Scale::default();
        assert_eq!(app.next_avail_process(&probe).unwrap(), Assignment::Assigned(1));
        app.put(&7).unwrap();
        app.put(&3.5).unwrap();
        app.apply(&probe).unwrap();
        assert_eq!(app.wait_process_done().unwrap(), 1);
        assert_eq!(app.get::<f64>().unwrap(), 24.5);
        assert!(app.get::<bool>().unwrap());
        assert_eq!(app.registry().idle_count(), 1);

        app.shutdown().unwrap();
        app.shutdown().unwrap();
        let summary = worker.join().unwrap().unwrap();
        assert_eq!(summary.tasks, 1);
    }
}
