//! End-to-end dispatch scenarios over the in-process fabric.

use std::thread;
use std::time::{Duration, Instant};

use applicator::{ApplicatorConfig, Assignment, ProcessRegistry, ProcessState};
use crossbeam_channel::{bounded, Receiver, Sender};
use runtime_native::{run_local, LocalApplicator};

use crate::algorithms::{CheckPair, Describe, Gated};

fn config() -> ApplicatorConfig {
    ApplicatorConfig::default()
        .with_acquire_timeout(Duration::from_secs(10))
        .with_done_timeout(Duration::from_secs(10))
}

fn assigned(app: &mut LocalApplicator, probe: &dyn applicator::Algorithm) -> usize {
    match app.next_avail_process(probe).unwrap() {
        Assignment::Assigned(rank) => rank,
        other => panic!("expected an idle worker, got {other:?}"),
    }
}

/// One gate per rank; rank 0 never runs gated work.
fn gates(processes: usize) -> (Vec<Sender<()>>, Vec<Receiver<()>>) {
    (0..processes).map(|_| bounded(1)).unzip()
}

fn poll_until_done(app: &mut LocalApplicator) -> usize {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(rank) = app.next_process_done().unwrap() {
            return rank;
        }
        assert!(Instant::now() < deadline, "no worker finished");
        thread::yield_now();
    }
}

#[test]
fn single_dispatch_round_trip() {
    let run = run_local(3, config(), |_| CheckPair::default(), |app| {
        let probe = CheckPair::default();
        let rank = assigned(app, &probe);
        app.put(&7_i32)?;
        app.put(&3.5_f64)?;
        app.apply(&probe)?;
        assert_eq!(app.registry().state(rank), Some(ProcessState::Busy));

        assert!(app.get::<bool>()?);
        assert_eq!(app.registry().state(rank), Some(ProcessState::Idle));
        assert_eq!(app.outstanding(), 0);
        Ok(rank)
    })
    .unwrap();

    assert_eq!(run.output, 1);
    assert_eq!(run.total_tasks(), 1);
    assert_eq!(run.total_failures(), 0);
}

#[test]
fn vector_transfer_keeps_shape_and_values() {
    let run = run_local(2, config(), |_| Describe::default(), |app| {
        let probe = Describe::default();
        assigned(app, &probe);
        app.put(&vec![1_i32, 2, 3])?;
        app.apply(&probe)?;
        let dims = app.get::<Vec<i32>>()?;
        let values = app.get::<Vec<i32>>()?;
        Ok((dims, values))
    })
    .unwrap();

    assert_eq!(run.output, (vec![3], vec![1, 2, 3]));
}

#[test]
fn empty_vector_decodes_cleanly() {
    let run = run_local(2, config(), |_| Describe::default(), |app| {
        let probe = Describe::default();
        assigned(app, &probe);
        app.put(&Vec::<f64>::new())?;
        app.apply(&probe)?;
        let dims = app.get::<Vec<i32>>()?;
        let values = app.get::<Vec<f64>>()?;
        Ok((dims, values))
    })
    .unwrap();

    assert_eq!(run.output, (vec![0], Vec::<f64>::new()));
    assert_eq!(run.total_failures(), 0);
}

#[test]
fn acquire_blocks_until_a_rank_is_released() {
    let registry = ProcessRegistry::new(0, 3).unwrap();
    assert_eq!(registry.acquire_idle().unwrap(), 1);
    assert_eq!(registry.acquire_idle().unwrap(), 2);
    assert_eq!(registry.idle_count(), 0);

    let (tx, rx) = bounded(1);
    thread::scope(|scope| {
        scope.spawn(|| tx.send(registry.acquire_idle().unwrap()).unwrap());

        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        registry.release(2).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 2);
    });
    assert_eq!(registry.busy_count(), 2);
}

#[test]
fn busy_controller_waits_for_a_worker_to_finish() {
    let (open, gate) = gates(3);
    let run = run_local(
        3,
        config(),
        |rank| Gated::new(gate[rank].clone()),
        move |app| {
            let probe = Gated::new(bounded(0).1);
            for input in [10_i32, 20] {
                assigned(app, &probe);
                app.put(&input)?;
                app.apply(&probe)?;
            }
            assert_eq!(app.registry().idle_count(), 0);

            let first = open[1].clone();
            let opener = thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                first.send(()).unwrap();
            });
            let started = Instant::now();
            let next = app.next_avail_process(&probe)?;
            assert!(started.elapsed() >= Duration::from_millis(40));
            assert_eq!(next, Assignment::Collect(1));
            opener.join().unwrap();

            // Rank 1 is only reusable once its results are drained.
            assert_eq!(app.registry().state(1), Some(ProcessState::Busy));
            assert_eq!(app.get::<i32>()?, 10);
            assert_eq!(app.next_avail_process(&probe)?, Assignment::Assigned(1));
            app.put(&30_i32)?;
            app.apply(&probe)?;

            open[1].send(())?;
            open[2].send(())?;
            let mut rest = Vec::new();
            while app.outstanding() > 0 {
                app.wait_process_done()?;
                rest.push(app.get::<i32>()?);
            }
            rest.sort();
            Ok(rest)
        },
    )
    .unwrap();

    assert_eq!(run.output, vec![20, 30]);
    assert_eq!(run.total_tasks(), 3);
}

#[test]
fn completion_polling_reports_the_finished_rank_only() {
    let (open, gate) = gates(3);
    let run = run_local(
        3,
        config(),
        |rank| Gated::new(gate[rank].clone()),
        move |app| {
            let probe = Gated::new(bounded(0).1);
            assert_eq!(assigned(app, &probe), 1);
            app.put(&10_i32)?;
            app.apply(&probe)?;
            assert_eq!(assigned(app, &probe), 2);
            app.put(&20_i32)?;
            app.apply(&probe)?;

            for _ in 0..20 {
                assert_eq!(app.next_process_done()?, None);
                thread::sleep(Duration::from_millis(1));
            }

            open[1].send(())?;
            assert_eq!(poll_until_done(app), 1);
            // Still reading rank 1; rank 2 is untouched.
            assert_eq!(app.next_process_done()?, Some(1));
            assert_eq!(app.outstanding(), 2);
            assert_eq!(app.registry().state(2), Some(ProcessState::Busy));
            assert_eq!(app.get::<i32>()?, 10);

            assert_eq!(app.next_process_done()?, None);
            assert_eq!(app.outstanding(), 1);
            open[2].send(())?;
            assert_eq!(app.wait_process_done()?, 2);
            Ok(app.get::<i32>()?)
        },
    )
    .unwrap();

    assert_eq!(run.output, 20);
    assert_eq!(run.total_tasks(), 2);
}
