//! Reusable task-operator fixtures.
//!
//! Four standard operator builders for scheduler and driver testing:
//!
//! - [`counting_op`] — completes immediately, counting invocations.
//! - [`recording_op`] — completes immediately, appending its label to a
//!   shared log (for ordering assertions).
//! - [`flaky_op`] — reports incomplete for the first N invocations, then
//!   complete (models a pending receive).
//! - [`failing_op`] — reports incomplete until the K-th invocation, which
//!   fails.
//!
//! The scheduler is single-threaded, so shared counters are plain
//! `Rc<Cell>` / `Rc<RefCell>` handles.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use torus_core::{TaskStatus, TimeIntegrator};
use torus_task::TaskFn;

/// Shared invocation counter.
pub type CallCount = Rc<Cell<u64>>;

/// Shared invocation log for ordering assertions.
pub type CallLog = Rc<RefCell<Vec<String>>>;

/// The rk2 integrator, the usual fixture scheme for driver tests.
pub fn rk2() -> TimeIntegrator {
    TimeIntegrator::from_name("rk2").expect("rk2 is a known scheme")
}

/// An operator that completes immediately and counts its invocations.
pub fn counting_op(counter: &CallCount) -> TaskFn {
    let counter = Rc::clone(counter);
    Box::new(move |_ctx| {
        counter.set(counter.get() + 1);
        TaskStatus::Complete
    })
}

/// An operator that completes immediately and appends `label` to the log.
pub fn recording_op(log: &CallLog, label: &str) -> TaskFn {
    let log = Rc::clone(log);
    let label = label.to_string();
    Box::new(move |_ctx| {
        log.borrow_mut().push(label.clone());
        TaskStatus::Complete
    })
}

/// An operator that reports incomplete for its first `incomplete_calls`
/// invocations and complete afterwards. Counts every invocation.
pub fn flaky_op(counter: &CallCount, incomplete_calls: u64) -> TaskFn {
    let counter = Rc::clone(counter);
    Box::new(move |_ctx| {
        counter.set(counter.get() + 1);
        if counter.get() <= incomplete_calls {
            TaskStatus::Incomplete
        } else {
            TaskStatus::Complete
        }
    })
}

/// An operator that reports incomplete until invocation `fail_on_call`,
/// which fails. Counts every invocation.
pub fn failing_op(counter: &CallCount, fail_on_call: u64) -> TaskFn {
    let counter = Rc::clone(counter);
    Box::new(move |_ctx| {
        counter.set(counter.get() + 1);
        if counter.get() >= fail_on_call {
            TaskStatus::Fail
        } else {
            TaskStatus::Incomplete
        }
    })
}
