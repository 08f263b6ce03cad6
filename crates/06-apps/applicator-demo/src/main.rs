//! Estimates pi by farming quadrature chunks across local ranks.

mod quadrature;

use std::collections::BTreeMap;

use anyhow::{ensure, Context, Result};
use applicator::{ApplicatorConfig, Assignment, ConfigArgs};
use clap::Parser;
use runtime_native::{run_local, LocalApplicator};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use crate::quadrature::{stage, QuadratureChunk};

#[derive(Parser, Debug)]
#[command(author, version, about = "Estimate pi by farming quadrature chunks across local ranks")]
struct Args {
    /// Processes in the run, controller included (1 runs serially)
    #[arg(long, default_value_t = 4)]
    procs: usize,

    /// Number of slices [0, 1] is cut into
    #[arg(long, default_value_t = 16)]
    chunks: usize,

    /// Midpoint steps per slice
    #[arg(long, default_value_t = 100_000)]
    steps: i32,

    #[command(flatten)]
    runtime: ConfigArgs,
}

/// Outcome of one estimation run.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    pub value: f64,
    pub chunks: usize,
    pub steps: i64,
    /// Chunks completed per rank.
    pub per_rank: BTreeMap<usize, usize>,
}

/// Text rendering helpers used by the CLI.
mod render {
    use super::Estimate;
    use std::fmt::Write;

    pub fn report(estimate: &Estimate) -> String {
        let mut out = String::new();
        let error = (estimate.value - std::f64::consts::PI).abs();
        writeln!(out, "pi ~= {:.12} (error {error:.3e})", estimate.value).expect("write value");
        writeln!(
            out,
            "{} chunk(s), {} step(s), {} rank(s)",
            estimate.chunks,
            estimate.steps,
            estimate.per_rank.len()
        )
        .expect("write totals");
        for (rank, chunks) in &estimate.per_rank {
            writeln!(out, "  rank {rank}: {chunks} chunk(s)").expect("write rank");
        }
        out
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let config = ApplicatorConfig::try_from(args.runtime)?;
    let estimate = estimate_pi(args.procs, args.chunks, args.steps, config)?;
    print!("{}", render::report(&estimate));
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Ignore error if already set (e.g., during tests).
    let _ = fmt().with_env_filter(env_filter).try_init();
}

fn estimate_pi(
    procs: usize,
    chunks: usize,
    steps: i32,
    config: ApplicatorConfig,
) -> Result<Estimate> {
    ensure!(procs > 0, "--procs must be at least 1");
    ensure!(chunks > 0, "--chunks must be at least 1");
    ensure!(steps > 0, "--steps must be at least 1");

    let run = run_local(
        procs,
        config,
        |_| QuadratureChunk::default(),
        |app| farm(app, chunks, steps),
    )?;
    info!(
        tasks = run.total_tasks(),
        sent = run.controller.sent,
        received = run.controller.received,
        "run complete"
    );
    Ok(run.output)
}

fn farm(app: &mut LocalApplicator, chunks: usize, steps: i32) -> Result<Estimate> {
    let probe = QuadratureChunk::default();
    let width = 1.0 / chunks as f64;
    let mut estimate = Estimate {
        value: 0.0,
        chunks,
        steps: 0,
        per_rank: BTreeMap::new(),
    };

    for chunk in 0..chunks {
        loop {
            match app.next_avail_process(&probe)? {
                Assignment::Assigned(_) => break,
                Assignment::Collect(_) => collect(app, &mut estimate)?,
            }
        }
        let start = chunk as f64 * width;
        let end = if chunk + 1 == chunks {
            1.0
        } else {
            start + width
        };
        stage(app, start, end, steps)?;
        app.apply(&probe)
            .with_context(|| format!("dispatching chunk {chunk}"))?;
    }
    while app.outstanding() > 0 {
        collect(app, &mut estimate)?;
    }
    Ok(estimate)
}

fn collect(app: &mut LocalApplicator, estimate: &mut Estimate) -> Result<()> {
    let rank = app.wait_process_done()?;
    let partial = app.get::<f64>()?;
    let steps = app.get::<i32>()?;
    estimate.value += partial;
    estimate.steps += i64::from(steps);
    *estimate.per_rank.entry(rank).or_default() += 1;
    Ok(())
}
