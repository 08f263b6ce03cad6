#![deny(missing_docs)]
//! Native harness that runs an N-rank applicator job on OS threads.
//!
//! Each worker rank gets its own thread, its own fabric endpoint and its own
//! algorithm instance; the controller runs on the calling thread. The harness
//! always stops the workers and joins them, even if the controller closure
//! fails or panics.

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, ScopedJoinHandle};

use anyhow::{anyhow, Context, Result};
use applicator::{Algorithm, Applicator, ApplicatorConfig, ApplicatorResult, ServeSummary};
use transport::{Rank, Transport, CONTROLLER_RANK};
use transport_fabric::{build_fabric, EndpointMetrics, EndpointMetricsSnapshot, FabricEndpoint};

/// Controller-side handle handed to the job closure.
pub type LocalApplicator = Applicator<FabricEndpoint>;

/// How one worker rank ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerReport {
    /// Rank of the worker.
    pub rank: Rank,
    /// Dispatches it served.
    pub summary: ServeSummary,
    /// Traffic through its endpoint.
    pub metrics: EndpointMetricsSnapshot,
}

/// Outcome of [`run_local`].
#[derive(Debug)]
pub struct LocalRun<R> {
    /// Value returned by the controller closure.
    pub output: R,
    /// One report per worker rank, in rank order.
    pub workers: Vec<WorkerReport>,
    /// Traffic through the controller's endpoint.
    pub controller: EndpointMetricsSnapshot,
}

impl<R> LocalRun<R> {
    /// Dispatches completed successfully across all workers.
    pub fn total_tasks(&self) -> u64 {
        self.workers.iter().map(|worker| worker.summary.tasks).sum()
    }

    /// Dispatches answered with a failure across all workers.
    pub fn total_failures(&self) -> u64 {
        self.workers.iter().map(|worker| worker.summary.failures).sum()
    }
}

/// Runs `controller` on rank 0 of a `processes`-rank in-process fabric.
///
/// `make_algorithm` builds the algorithm for each worker rank (and for rank 0
/// itself when `processes == 1`, where the controller runs in serial mode).
pub fn run_local<A, M, F, R>(
    processes: usize,
    config: ApplicatorConfig,
    make_algorithm: M,
    controller: F,
) -> Result<LocalRun<R>>
where
    A: Algorithm + 'static,
    M: Fn(Rank) -> A + Sync,
    F: FnOnce(&mut LocalApplicator) -> Result<R>,
{
    let mut endpoints = build_fabric(processes).context("building fabric")?;
    let mut app = Applicator::init(endpoints.remove(0), config.clone())
        .context("initialising controller")?;
    if app.is_serial() {
        app.define_algorithm(make_algorithm(CONTROLLER_RANK))?;
    }
    let controller_metrics = app.transport().metrics();
    tracing::info!(processes, "local run starting");

    thread::scope(|scope| {
        let mut workers = Vec::with_capacity(endpoints.len());
        let mut spawn_error = None;
        for endpoint in endpoints {
            let rank = endpoint.my_rank();
            let metrics = endpoint.metrics();
            let config = config.clone();
            let make_algorithm = &make_algorithm;
            let spawned = thread::Builder::new()
                .name(format!("rank-{rank}"))
                .spawn_scoped(scope, move || serve_rank(endpoint, config, make_algorithm(rank)));
            match spawned {
                Ok(handle) => workers.push((rank, metrics, handle)),
                Err(err) => {
                    spawn_error = Some(anyhow!(err).context(format!("spawning rank {rank}")));
                    break;
                }
            }
        }

        let outcome = match spawn_error {
            Some(err) => Ok(Err(err)),
            None => panic::catch_unwind(AssertUnwindSafe(|| controller(&mut app))),
        };
        let stopped = app.shutdown();
        let reports = join_workers(workers);

        let output = match outcome {
            Ok(output) => output?,
            Err(payload) => panic::resume_unwind(payload),
        };
        stopped.context("stopping workers")?;
        let workers = reports?;
        tracing::info!(processes, "local run finished");
        Ok(LocalRun {
            output,
            workers,
            controller: controller_metrics.snapshot(),
        })
    })
}

fn serve_rank<A: Algorithm + 'static>(
    endpoint: FabricEndpoint,
    config: ApplicatorConfig,
    algorithm: A,
) -> ApplicatorResult<ServeSummary> {
    let mut app = Applicator::init(endpoint, config)?;
    app.define_algorithm(algorithm)?;
    let summary = app.serve();
    app.shutdown()?;
    summary
}

type WorkerHandle<'scope> = (
    Rank,
    EndpointMetrics,
    ScopedJoinHandle<'scope, ApplicatorResult<ServeSummary>>,
);

/// Joins every worker before reporting the first failure.
fn join_workers(workers: Vec<WorkerHandle<'_>>) -> Result<Vec<WorkerReport>> {
    let joined: Vec<Result<WorkerReport>> = workers
        .into_iter()
        .map(|(rank, metrics, handle)| {
            let summary = handle
                .join()
                .map_err(|_| anyhow!("rank {rank} panicked"))?
                .with_context(|| format!("rank {rank} stopped with an error"))?;
            Ok(WorkerReport {
                rank,
                summary,
                metrics: metrics.snapshot(),
            })
        })
        .collect();
    joined.into_iter().collect()
}
