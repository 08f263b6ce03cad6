use std::time::Duration;

use applicator::{
    Algorithm, ApplicatorConfig, ApplicatorError, ArrayD, Assignment, Complex64, IxDyn,
    ProcessState,
};
use runtime_native::{run_local, LocalApplicator};

use crate::algorithms::{CheckPair, Describe};

fn dispatch<A: Algorithm>(app: &mut LocalApplicator, probe: &A) -> anyhow::Result<usize> {
    match app.next_avail_process(probe)? {
        Assignment::Assigned(rank) => Ok(rank),
        Assignment::Collect(rank) => anyhow::bail!("rank {rank} left undrained"),
    }
}

#[test]
fn rounds_of_work_reuse_every_worker() {
    let run = run_local(4, ApplicatorConfig::default(), |_| Describe::default(), |app| {
        let probe = Describe::default();
        let mut totals = Vec::new();
        for round in 0..5 {
            for rank in 1..4_i32 {
                dispatch(app, &probe)?;
                app.put(&vec![round, rank, round * rank])?;
                app.apply(&probe)?;
            }
            let mut sum = 0;
            while app.outstanding() > 0 {
                app.wait_process_done()?;
                assert_eq!(app.get::<Vec<i32>>()?, vec![3]);
                sum += app.get::<Vec<i32>>()?.iter().sum::<i32>();
            }
            totals.push(sum);
        }
        Ok(totals)
    })
    .unwrap();

    // Each round sums round*3 + (1+2+3) + round*6.
    assert_eq!(run.output, vec![6, 15, 24, 33, 42]);
    assert_eq!(run.total_tasks(), 15);
    assert!(run.workers.iter().all(|worker| worker.summary.tasks == 5));
}

#[test]
fn complex_matrix_survives_the_round_trip() {
    let matrix = ArrayD::from_shape_vec(
        IxDyn(&[2, 3]),
        (0..6)
            .map(|i| Complex64::new(f64::from(i), -f64::from(i)))
            .collect(),
    )
    .unwrap();
    let sent = matrix.clone();
    let run = run_local(2, ApplicatorConfig::default(), |_| Describe::default(), move |app| {
        let probe = Describe::default();
        dispatch(app, &probe)?;
        app.put(&sent)?;
        app.apply(&probe)?;
        let dims = app.get::<Vec<i32>>()?;
        let back = app.get::<ArrayD<Complex64>>()?;
        Ok((dims, back))
    })
    .unwrap();

    assert_eq!(run.output.0, vec![2, 3]);
    assert_eq!(run.output.1, matrix);
}

#[test]
fn worker_failure_is_reported_and_serving_continues() {
    let run = run_local(2, ApplicatorConfig::default(), |_| CheckPair::default(), |app| {
        let probe = CheckPair::default();
        let rank = dispatch(app, &probe)?;
        app.put(&8_i32)?;
        app.put(&3.5_f64)?;
        app.apply(&probe)?;
        match app.get::<bool>() {
            Err(ApplicatorError::WorkerFailed { rank: failed, reason }) => {
                assert_eq!(failed, rank);
                assert_eq!(reason, "task: expected 7, got 8");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(app.registry().state(rank), Some(ProcessState::Idle));

        dispatch(app, &probe)?;
        app.put(&7_i32)?;
        app.put(&3.5_f64)?;
        app.apply(&probe)?;
        Ok(app.get::<bool>()?)
    })
    .unwrap();

    assert!(run.output);
    assert_eq!(run.total_tasks(), 1);
    assert_eq!(run.total_failures(), 1);
}

#[test]
fn short_inputs_fail_the_dispatch() {
    let run = run_local(2, ApplicatorConfig::default(), |_| CheckPair::default(), |app| {
        let probe = CheckPair::default();
        dispatch(app, &probe)?;
        app.put(&7_i32)?;
        app.apply(&probe)?;
        Ok(matches!(
            app.get::<bool>(),
            Err(ApplicatorError::WorkerFailed { ref reason, .. }) if reason.starts_with("decoding inputs")
        ))
    })
    .unwrap();
    assert!(run.output);
}

#[test]
fn serial_mode_reports_a_mismatched_algorithm() {
    let run = run_local(1, ApplicatorConfig::default(), |_| CheckPair::default(), |app| {
        let wrong = Describe::default();
        assert_eq!(dispatch(app, &wrong)?, 0);
        app.put(&1_i32)?;
        app.apply(&wrong)?;
        let failed = app.get::<Vec<i32>>();
        assert_eq!(app.registry().state(0), Some(ProcessState::Idle));
        Ok(match failed {
            Err(ApplicatorError::WorkerFailed { rank: 0, reason }) => reason,
            other => panic!("unexpected {other:?}"),
        })
    })
    .unwrap();
    assert_eq!(run.output, "asked to run describe but serves check-pair");
}

#[test]
fn discarded_results_free_the_worker() {
    let config = ApplicatorConfig::default().with_done_timeout(Duration::from_secs(10));
    let run = run_local(2, config, |_| Describe::default(), |app| {
        let probe = Describe::default();
        let rank = dispatch(app, &probe)?;
        app.put(&vec![0.5_f64; 16])?;
        app.apply(&probe)?;
        assert_eq!(app.wait_process_done()?, rank);
        assert_eq!(app.get::<Vec<i32>>()?, vec![16]);
        assert_eq!(app.discard_results()?, Some(rank));
        assert_eq!(app.discard_results()?, None);
        assert_eq!(app.outstanding(), 0);
        Ok(app.registry().state(rank))
    })
    .unwrap();
    assert_eq!(run.output, Some(ProcessState::Idle));
}
