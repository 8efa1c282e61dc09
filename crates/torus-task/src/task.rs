//! The [`Task`] type: one operator bound to its id and dependency set.

use smallvec::SmallVec;
use torus_core::{TaskId, TaskIdSet, TaskStatus};

use crate::context::StageContext;

/// The operator call shape. Closures capture their owning module (via a
/// shared handle) and return a [`TaskStatus`] per invocation.
pub type TaskFn = Box<dyn FnMut(&StageContext<'_>) -> TaskStatus>;

/// One schedulable operator: an id, a name for diagnostics, the set of
/// ids it depends on, and the callable itself.
///
/// List membership is fixed at assembly; only the owning list's
/// completion mask changes per stage. The dependency set may grow after
/// registration through late cross-module wiring
/// ([`TaskCollections::add_dependency`](crate::TaskCollections::add_dependency)).
pub struct Task {
    id: TaskId,
    name: String,
    deps: TaskIdSet,
    dep_ids: SmallVec<[TaskId; 8]>,
    op: TaskFn,
}

impl Task {
    pub(crate) fn new(id: TaskId, name: String, dep_ids: &[TaskId], op: TaskFn) -> Self {
        let deps: TaskIdSet = dep_ids.iter().copied().collect();
        Self {
            id,
            name,
            deps,
            dep_ids: SmallVec::from_slice(dep_ids),
            op,
        }
    }

    /// The task's unique id.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// The task's diagnostic name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The task's dependency set.
    pub fn deps(&self) -> &TaskIdSet {
        &self.deps
    }

    /// Dependency ids in the order they were declared.
    pub fn dep_ids(&self) -> &[TaskId] {
        &self.dep_ids
    }

    pub(crate) fn add_dep(&mut self, dep: TaskId) {
        if !self.deps.contains(dep) {
            self.deps.insert(dep);
            self.dep_ids.push(dep);
        }
    }

    /// Whether every dependency is in `mask ∪ done_before`.
    pub fn is_ready(&self, mask: &TaskIdSet, done_before: &TaskIdSet) -> bool {
        self.deps.is_subset_of_union(mask, done_before)
    }

    pub(crate) fn invoke(&mut self, ctx: &StageContext<'_>) -> TaskStatus {
        (self.op)(ctx)
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("deps", &self.dep_ids)
            .finish_non_exhaustive()
    }
}
