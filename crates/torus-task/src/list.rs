//! The [`TaskList`] execution engine.
//!
//! A list holds tasks in registration order plus the per-stage completion
//! mask. [`run_available`](TaskList::run_available) makes exactly one pass
//! over the list; the driver calls it repeatedly until the list reports
//! complete or a pass makes no progress.

use std::error::Error;
use std::fmt;

use torus_core::{TaskId, TaskIdSet, TaskStatus};

use crate::context::StageContext;
use crate::task::Task;

/// Error raised when an operator reports [`TaskStatus::Fail`]. Aborts the
/// current pass immediately and propagates to the driver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskError {
    /// Name of the failed task.
    pub name: String,
    /// Id of the failed task.
    pub id: TaskId,
    /// Stage during which the failure occurred.
    pub stage: usize,
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "task '{}' (id {}) failed during stage {}",
            self.name, self.id, self.stage
        )
    }
}

impl Error for TaskError {}

/// Result of one pass over a task list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PassOutcome {
    /// `Complete` if every task in the list is now in the completion mask.
    pub status: TaskStatus,
    /// Number of operator invocations made during this pass.
    pub invoked: u32,
    /// Number of tasks newly marked complete during this pass. Zero while
    /// tasks remain pending is the stall (deadlock) condition.
    pub newly_completed: u32,
}

/// A pending task and its unmet dependencies, for stall diagnostics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StuckTask {
    /// Name of the pending task.
    pub name: String,
    /// Id of the pending task.
    pub id: TaskId,
    /// Dependency ids not yet complete.
    pub unmet: Vec<TaskId>,
}

/// An ordered container of tasks plus the live per-stage completion mask.
///
/// Membership is assembled once at setup and never changes; only the
/// completion mask is stage-scoped. Registration order is a scheduling
/// hint (tasks likely ready early are registered early) — correctness
/// relies solely on the explicit dependency checks.
#[derive(Debug, Default)]
pub struct TaskList {
    tasks: Vec<Task>,
    mask: TaskIdSet,
}

impl TaskList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, task: Task) {
        self.tasks.push(task);
    }

    pub(crate) fn task_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id() == id)
    }

    /// Tasks in registration order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Number of tasks in the list.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the list holds no tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// The live completion mask for the in-progress stage.
    pub fn completion_mask(&self) -> &TaskIdSet {
        &self.mask
    }

    /// Reset the completion mask at the start of a stage.
    pub fn clear_mask(&mut self) {
        self.mask.clear();
    }

    /// Whether every task in the list is in the completion mask.
    pub fn is_complete(&self) -> bool {
        self.tasks.iter().all(|t| self.mask.contains(t.id()))
    }

    /// Perform exactly one pass over the list in registration order.
    ///
    /// For each task not yet in the completion mask whose dependencies
    /// are covered by `mask ∪ done_before`, the operator is invoked once.
    /// `Complete` adds the id to the mask (a completion earlier in the
    /// pass can make a later task in the same pass ready); `Incomplete`
    /// leaves the task pending for a later pass in the same stage; `Fail`
    /// aborts the pass immediately. Calling on an already-complete list
    /// is an idempotent no-op.
    pub fn run_available(
        &mut self,
        ctx: &StageContext<'_>,
        done_before: &TaskIdSet,
    ) -> Result<PassOutcome, TaskError> {
        let mut invoked = 0u32;
        let mut newly_completed = 0u32;
        let mut all_done = true;

        for task in &mut self.tasks {
            if self.mask.contains(task.id()) {
                continue;
            }
            if !task.is_ready(&self.mask, done_before) {
                all_done = false;
                continue;
            }
            invoked += 1;
            match task.invoke(ctx) {
                TaskStatus::Complete => {
                    self.mask.insert(task.id());
                    newly_completed += 1;
                }
                TaskStatus::Incomplete => {
                    all_done = false;
                }
                TaskStatus::Fail => {
                    return Err(TaskError {
                        name: task.name().to_string(),
                        id: task.id(),
                        stage: ctx.stage,
                    });
                }
            }
        }

        let status = if all_done {
            TaskStatus::Complete
        } else {
            TaskStatus::Incomplete
        };
        Ok(PassOutcome {
            status,
            invoked,
            newly_completed,
        })
    }

    /// Pending tasks and their unmet dependency ids, given the prior
    /// completions visible to this list. Used for stall diagnostics.
    pub fn stuck_tasks(&self, done_before: &TaskIdSet) -> Vec<StuckTask> {
        let visible = self.mask.union(done_before);
        self.tasks
            .iter()
            .filter(|t| !self.mask.contains(t.id()))
            .map(|t| StuckTask {
                name: t.name().to_string(),
                id: t.id(),
                unmet: t.deps().difference(&visible).iter().collect(),
            })
            .collect()
    }
}
