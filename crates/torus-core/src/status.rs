//! The [`TaskStatus`] outcome code.

/// Outcome of one operator invocation, and the aggregate outcome of one
/// pass over a task list.
///
/// Operators that issue non-blocking communication report
/// [`Incomplete`](TaskStatus::Incomplete) and are polled again on a later
/// pass within the same stage; they must therefore be safe to re-invoke.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    /// The operator's work for this stage is fully done.
    Complete,
    /// The operator could not finish (typically a pending receive) and
    /// must be retried on a later pass within the same stage.
    Incomplete,
    /// The operator hit an unrecoverable condition; the driver halts.
    Fail,
}

impl TaskStatus {
    /// Returns `true` for [`TaskStatus::Complete`].
    pub fn is_complete(self) -> bool {
        matches!(self, TaskStatus::Complete)
    }

    /// Combine two sub-outcomes into one: `Fail` dominates, then
    /// `Incomplete`. Used by operators that drive several exchanges and
    /// may only report complete once every one of them has finished.
    pub fn and(self, other: TaskStatus) -> TaskStatus {
        use TaskStatus::*;
        match (self, other) {
            (Fail, _) | (_, Fail) => Fail,
            (Incomplete, _) | (_, Incomplete) => Incomplete,
            (Complete, Complete) => Complete,
        }
    }
}
