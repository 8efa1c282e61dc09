//! End-to-end driver scenarios over the public API.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use torus_core::{PhysicsModule, TaskStatus};
use torus_driver::{Driver, DriverConfig, DriverError, DriverState};
use torus_task::{TaskCollections, TaskPhase};
use torus_test_utils::{counting_op, failing_op, flaky_op, recording_op, CallLog};

/// Module stub with a fixed timestep estimate.
struct FixedDt {
    name: &'static str,
    dt: f64,
}

impl PhysicsModule for FixedDt {
    fn name(&self) -> &str {
        self.name
    }
    fn new_dt(&self) -> f64 {
        self.dt
    }
}

fn one_step_config() -> DriverConfig {
    DriverConfig {
        integrator: "rk2".to_string(),
        tlim: 1.0,
        nlim: Some(1),
        cfl: 1.0,
        max_stage_passes: None,
    }
}

#[test]
fn phases_execute_in_order_every_stage() {
    let log: CallLog = Rc::new(RefCell::new(Vec::new()));
    let mut tasks = TaskCollections::new();
    tasks
        .add_task(TaskPhase::Start, "pre", &[], recording_op(&log, "pre"))
        .unwrap();
    let work = tasks
        .add_task(TaskPhase::Run, "work", &[], recording_op(&log, "work"))
        .unwrap();
    tasks
        .add_task(TaskPhase::Run, "more", &[work], recording_op(&log, "more"))
        .unwrap();
    tasks
        .add_task(TaskPhase::End, "post", &[], recording_op(&log, "post"))
        .unwrap();

    let mut driver = Driver::new(one_step_config(), tasks, Vec::new()).unwrap();
    let summary = driver.execute().unwrap();

    assert_eq!(summary.ncycle, 1);
    // rk2 has two stages; each repeats the full phase sequence.
    assert_eq!(
        *log.borrow(),
        vec!["pre", "work", "more", "post", "pre", "work", "more", "post"]
    );
    assert_eq!(driver.state(), DriverState::StageDone);
    assert_eq!(driver.metrics().stages, 2);
    assert_eq!(driver.metrics().operator_invocations, 8);
}

#[test]
fn each_task_runs_exactly_once_per_stage_across_many_steps() {
    let calls = Rc::new(Cell::new(0));
    let mut tasks = TaskCollections::new();
    tasks
        .add_task(TaskPhase::Run, "work", &[], counting_op(&calls))
        .unwrap();

    let cfg = DriverConfig {
        integrator: "rk3".to_string(),
        tlim: 1e6,
        nlim: Some(100),
        cfl: 1.0,
        max_stage_passes: None,
    };
    let module = Rc::new(RefCell::new(FixedDt {
        name: "stub",
        dt: 1.0,
    }));
    let mut driver = Driver::new(cfg, tasks, vec![module]).unwrap();
    let summary = driver.execute().unwrap();

    assert_eq!(summary.ncycle, 100);
    // 100 steps x 3 stages, exactly one invocation each.
    assert_eq!(calls.get(), 300);
}

#[test]
fn incomplete_operator_polled_within_stage() {
    let calls = Rc::new(Cell::new(0));
    let mut tasks = TaskCollections::new();
    tasks
        .add_task(TaskPhase::Run, "poll", &[], flaky_op(&calls, 2))
        .unwrap();

    let cfg = DriverConfig {
        integrator: "rk1".to_string(),
        nlim: Some(1),
        ..one_step_config()
    };
    let mut driver = Driver::new(cfg, tasks, Vec::new()).unwrap();
    driver.execute().unwrap();

    assert_eq!(calls.get(), 3);
    assert_eq!(driver.metrics().run_passes, 3);
}

#[test]
fn failure_halts_driver_and_pending_tasks_never_rerun() {
    // Three-task run list: one completes, one fails on its second
    // invocation, one keeps polling. After the failure the polling task
    // must show no further invocations.
    let ok_calls = Rc::new(Cell::new(0));
    let fail_calls = Rc::new(Cell::new(0));
    let poll_calls = Rc::new(Cell::new(0));

    let mut tasks = TaskCollections::new();
    tasks
        .add_task(TaskPhase::Run, "ok", &[], counting_op(&ok_calls))
        .unwrap();
    tasks
        .add_task(TaskPhase::Run, "bad", &[], failing_op(&fail_calls, 2))
        .unwrap();
    tasks
        .add_task(TaskPhase::Run, "poll", &[], flaky_op(&poll_calls, 1000))
        .unwrap();

    let cfg = DriverConfig {
        integrator: "rk1".to_string(),
        ..one_step_config()
    };
    let mut driver = Driver::new(cfg, tasks, Vec::new()).unwrap();
    let err = driver.execute().unwrap_err();

    match err {
        DriverError::TaskFailed(task_err) => {
            assert_eq!(task_err.name, "bad");
            assert_eq!(task_err.stage, 1);
        }
        other => panic!("expected TaskFailed, got {other:?}"),
    }
    assert_eq!(driver.state(), DriverState::Failed);
    assert_eq!(ok_calls.get(), 1);
    assert_eq!(fail_calls.get(), 2);
    // Pass 1 polled it once; the pass-2 failure aborted before reaching it.
    assert_eq!(poll_calls.get(), 1);
    assert_eq!(driver.ncycle(), 0);

    // A failed driver never steps again.
    let summary = driver.execute().unwrap();
    assert_eq!(summary.ncycle, 0);
    assert_eq!(poll_calls.get(), 1);
}

#[test]
fn dt_reduced_over_modules_with_cfl() {
    let mut tasks = TaskCollections::new();
    tasks
        .add_task(
            TaskPhase::Run,
            "work",
            &[],
            Box::new(|_| TaskStatus::Complete),
        )
        .unwrap();

    let fast = Rc::new(RefCell::new(FixedDt {
        name: "fast",
        dt: 0.5,
    }));
    let slow = Rc::new(RefCell::new(FixedDt {
        name: "slow",
        dt: 0.2,
    }));
    let cfg = DriverConfig {
        integrator: "rk2".to_string(),
        tlim: 10.0,
        nlim: Some(1),
        cfl: 0.5,
        max_stage_passes: None,
    };
    let mut driver = Driver::new(cfg, tasks, vec![fast, slow]).unwrap();
    // Tightest module estimate is 0.2; CFL 0.5 halves it.
    assert!((driver.dt() - 0.1).abs() < 1e-14);
    let summary = driver.execute().unwrap();
    assert!((summary.time - 0.1).abs() < 1e-14);
}

#[test]
fn final_step_clamped_to_tlim() {
    let mut tasks = TaskCollections::new();
    tasks
        .add_task(
            TaskPhase::Run,
            "work",
            &[],
            Box::new(|_| TaskStatus::Complete),
        )
        .unwrap();
    let module = Rc::new(RefCell::new(FixedDt {
        name: "stub",
        dt: 0.4,
    }));
    let cfg = DriverConfig {
        integrator: "rk1".to_string(),
        tlim: 1.0,
        nlim: None,
        cfl: 1.0,
        max_stage_passes: None,
    };
    let mut driver = Driver::new(cfg, tasks, vec![module]).unwrap();
    let summary = driver.execute().unwrap();
    assert!((summary.time - 1.0).abs() < 1e-12);
    // 0.4 + 0.4 + 0.2: the last step shrank to land on tlim.
    assert_eq!(summary.ncycle, 3);
    // The clamp applies only to the step that lands on tlim; a finished
    // run still reports the CFL estimate, not a zeroed timestep.
    assert!((summary.dt - 0.4).abs() < 1e-12);
    assert!(driver.dt() > 0.0);
}
