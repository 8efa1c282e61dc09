//! Task registration: the id registry, the three phase lists, and
//! assembly-time graph validation.

use std::error::Error;
use std::fmt;

use indexmap::IndexMap;
use torus_core::{TaskId, TaskIdSet};

use crate::list::TaskList;
use crate::task::{Task, TaskFn};

// ── Registry ───────────────────────────────────────────────────────

/// Allocates globally unique task ids within one driver instance.
///
/// Ids are sequential and never reassigned, so an id doubles as a bit
/// position in a [`TaskIdSet`]. A dependency on an id the registry has
/// not yet allocated is an assembly-time error.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    names: Vec<String>,
}

impl TaskRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&mut self, name: &str) -> TaskId {
        let id = TaskId(self.names.len() as u32);
        self.names.push(name.to_string());
        id
    }

    /// Whether `id` has been allocated.
    pub fn is_registered(&self, id: TaskId) -> bool {
        (id.0 as usize) < self.names.len()
    }

    /// Diagnostic name of a registered task.
    pub fn name(&self, id: TaskId) -> Option<&str> {
        self.names.get(id.0 as usize).map(String::as_str)
    }

    /// Total number of registered tasks.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether no tasks have been registered.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

// ── Phases ─────────────────────────────────────────────────────────

/// Which of the three per-stage lists a task belongs to. Phases execute
/// strictly in this order within every stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaskPhase {
    /// Runs to completion before the main list (receive posting).
    Start,
    /// The main per-stage work list.
    Run,
    /// Runs after the main list completes (send teardown).
    End,
}

impl fmt::Display for TaskPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Run => write!(f, "run"),
            Self::End => write!(f, "end"),
        }
    }
}

// ── Errors ─────────────────────────────────────────────────────────

/// Setup-time configuration errors, all fatal before any step executes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssemblyError {
    /// A task declared a dependency on an id the registry has not
    /// allocated.
    UnknownDependency {
        /// Name of the task declaring the dependency.
        task: String,
        /// The unregistered id.
        dep: TaskId,
    },
    /// An id passed to [`TaskCollections::add_dependency`] does not name
    /// a registered task.
    UnknownTask {
        /// The unregistered id.
        id: TaskId,
    },
    /// A task depends on itself.
    SelfDependency {
        /// Name of the offending task.
        task: String,
    },
    /// A task depends on an id that lives in a later phase, which can
    /// never complete first.
    PhaseOrdering {
        /// Name of the dependent task.
        task: String,
        /// Phase of the dependent task.
        phase: TaskPhase,
        /// Name of the dependency.
        dep: String,
        /// Phase of the dependency.
        dep_phase: TaskPhase,
    },
    /// A dependency cycle among tasks within one list.
    Cycle {
        /// Names of the tasks on the cycle (or reachable only through it).
        tasks: Vec<String>,
    },
}

impl fmt::Display for AssemblyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownDependency { task, dep } => {
                write!(f, "task '{task}' depends on unregistered task id {dep}")
            }
            Self::UnknownTask { id } => write!(f, "task id {id} is not registered"),
            Self::SelfDependency { task } => write!(f, "task '{task}' depends on itself"),
            Self::PhaseOrdering {
                task,
                phase,
                dep,
                dep_phase,
            } => write!(
                f,
                "task '{task}' in the {phase} list depends on '{dep}' \
                 in the later {dep_phase} list"
            ),
            Self::Cycle { tasks } => {
                write!(f, "dependency cycle among tasks: ")?;
                for (i, name) in tasks.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "'{name}'")?;
                }
                Ok(())
            }
        }
    }
}

impl Error for AssemblyError {}

// ── Collections ────────────────────────────────────────────────────

/// The shared id registry plus the three phase lists every module
/// appends into.
///
/// This is the sole integration point between the scheduler and physics
/// code: a module's assembly function takes `&mut TaskCollections`, adds
/// its operators, and publishes the resulting ids in its task-id handle
/// struct so other modules can depend on them.
#[derive(Debug, Default)]
pub struct TaskCollections {
    registry: TaskRegistry,
    /// The start-phase list.
    pub start: TaskList,
    /// The run-phase list.
    pub run: TaskList,
    /// The end-phase list.
    pub end: TaskList,
    phase_of: Vec<TaskPhase>,
}

impl TaskCollections {
    /// Create empty collections with a fresh registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared id registry.
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    fn list_mut(&mut self, phase: TaskPhase) -> &mut TaskList {
        match phase {
            TaskPhase::Start => &mut self.start,
            TaskPhase::Run => &mut self.run,
            TaskPhase::End => &mut self.end,
        }
    }

    /// The phase a registered task belongs to.
    pub fn phase_of(&self, id: TaskId) -> Option<TaskPhase> {
        self.phase_of.get(id.0 as usize).copied()
    }

    /// Register a new task in the given phase list.
    ///
    /// Every id in `deps` must already be registered; the fresh id is
    /// allocated only after the dependency set is accepted, so a task can
    /// never name itself. Returns the new task's id for publication in
    /// the module's task-id handle struct.
    pub fn add_task(
        &mut self,
        phase: TaskPhase,
        name: &str,
        deps: &[TaskId],
        op: TaskFn,
    ) -> Result<TaskId, AssemblyError> {
        for &dep in deps {
            if !self.registry.is_registered(dep) {
                return Err(AssemblyError::UnknownDependency {
                    task: name.to_string(),
                    dep,
                });
            }
        }
        let id = self.registry.register(name);
        self.phase_of.push(phase);
        self.list_mut(phase).push(Task::new(id, name.to_string(), deps, op));
        Ok(id)
    }

    /// Add a dependency to an already-registered task (late cross-module
    /// wiring, e.g. a diffusion operator inserting itself before the host
    /// fluid's update).
    pub fn add_dependency(&mut self, task: TaskId, dep: TaskId) -> Result<(), AssemblyError> {
        if !self.registry.is_registered(task) {
            return Err(AssemblyError::UnknownTask { id: task });
        }
        if !self.registry.is_registered(dep) {
            return Err(AssemblyError::UnknownDependency {
                task: self.registry.name(task).unwrap_or_default().to_string(),
                dep,
            });
        }
        if task == dep {
            return Err(AssemblyError::SelfDependency {
                task: self.registry.name(task).unwrap_or_default().to_string(),
            });
        }
        let phase = self.phase_of(task).ok_or(AssemblyError::UnknownTask { id: task })?;
        let entry = self
            .list_mut(phase)
            .task_mut(task)
            .ok_or(AssemblyError::UnknownTask { id: task })?;
        entry.add_dep(dep);
        Ok(())
    }

    /// Clear all three completion masks at the start of a stage.
    pub fn clear_masks(&mut self) {
        self.start.clear_mask();
        self.run.clear_mask();
        self.end.clear_mask();
    }

    /// Validate the assembled graph. Called once by the driver after all
    /// modules have assembled, before any step executes.
    ///
    /// Checks, in order: no self-dependencies, no dependency on a
    /// later-phase list, and no cycle within any list (Kahn scan —
    /// cycles are only constructible through late dependency addition,
    /// since `add_task` accepts previously registered ids only).
    pub fn validate(&self) -> Result<(), AssemblyError> {
        for list in [&self.start, &self.run, &self.end] {
            for task in list.tasks() {
                if task.deps().contains(task.id()) {
                    return Err(AssemblyError::SelfDependency {
                        task: task.name().to_string(),
                    });
                }
            }
        }
        for (phase, list) in [
            (TaskPhase::Start, &self.start),
            (TaskPhase::Run, &self.run),
            (TaskPhase::End, &self.end),
        ] {
            for task in list.tasks() {
                for dep in task.deps().iter() {
                    let dep_phase =
                        self.phase_of(dep).ok_or(AssemblyError::UnknownDependency {
                            task: task.name().to_string(),
                            dep,
                        })?;
                    if dep_phase > phase {
                        return Err(AssemblyError::PhaseOrdering {
                            task: task.name().to_string(),
                            phase,
                            dep: self.registry.name(dep).unwrap_or_default().to_string(),
                            dep_phase,
                        });
                    }
                }
            }
            self.check_acyclic(list)?;
        }
        Ok(())
    }

    /// Kahn topological scan over the edges internal to one list.
    fn check_acyclic(&self, list: &TaskList) -> Result<(), AssemblyError> {
        let local: IndexMap<TaskId, usize> = list
            .tasks()
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id(), i))
            .collect();

        let mut indegree = vec![0usize; list.len()];
        let mut out_edges: Vec<Vec<usize>> = vec![Vec::new(); list.len()];
        for (i, task) in list.tasks().iter().enumerate() {
            for dep in task.deps().iter() {
                if let Some(&j) = local.get(&dep) {
                    indegree[i] += 1;
                    out_edges[j].push(i);
                }
            }
        }

        let mut ready: Vec<usize> = indegree
            .iter()
            .enumerate()
            .filter(|(_, &d)| d == 0)
            .map(|(i, _)| i)
            .collect();
        let mut processed = 0usize;
        while let Some(i) = ready.pop() {
            processed += 1;
            for &j in &out_edges[i] {
                indegree[j] -= 1;
                if indegree[j] == 0 {
                    ready.push(j);
                }
            }
        }

        if processed < list.len() {
            let tasks = list
                .tasks()
                .iter()
                .enumerate()
                .filter(|(i, _)| indegree[*i] > 0)
                .map(|(_, t)| t.name().to_string())
                .collect();
            return Err(AssemblyError::Cycle { tasks });
        }
        Ok(())
    }

    /// Completion mask visible to the run list: everything the start list
    /// finished this stage.
    pub fn done_before_run(&self) -> TaskIdSet {
        self.start.completion_mask().clone()
    }

    /// Completion mask visible to the end list: everything the start and
    /// run lists finished this stage.
    pub fn done_before_end(&self) -> TaskIdSet {
        self.start
            .completion_mask()
            .union(self.run.completion_mask())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use torus_core::TaskStatus;

    fn noop() -> TaskFn {
        Box::new(|_| TaskStatus::Complete)
    }

    #[test]
    fn ids_are_unique_and_sequential_across_lists() {
        let mut tl = TaskCollections::new();
        let a = tl.add_task(TaskPhase::Start, "a", &[], noop()).unwrap();
        let b = tl.add_task(TaskPhase::Run, "b", &[], noop()).unwrap();
        let c = tl.add_task(TaskPhase::End, "c", &[], noop()).unwrap();
        assert_eq!((a, b, c), (TaskId(0), TaskId(1), TaskId(2)));
        assert_eq!(tl.registry().len(), 3);
        assert_eq!(tl.registry().name(b), Some("b"));
        assert_eq!(tl.phase_of(c), Some(TaskPhase::End));
    }

    #[test]
    fn dependency_on_unregistered_id_rejected() {
        // Task D depends on the id E would get, but E is not assembled
        // yet: registration must fail before any stage executes.
        let mut tl = TaskCollections::new();
        let future_e = TaskId(5);
        let err = tl
            .add_task(TaskPhase::Run, "d", &[future_e], noop())
            .unwrap_err();
        assert_eq!(
            err,
            AssemblyError::UnknownDependency {
                task: "d".to_string(),
                dep: future_e,
            }
        );
        // Nothing was registered by the failed call.
        assert!(tl.registry().is_empty());
    }

    #[test]
    fn late_dependency_validates_ids() {
        let mut tl = TaskCollections::new();
        let a = tl.add_task(TaskPhase::Run, "a", &[], noop()).unwrap();
        assert!(matches!(
            tl.add_dependency(TaskId(9), a),
            Err(AssemblyError::UnknownTask { .. })
        ));
        assert!(matches!(
            tl.add_dependency(a, TaskId(9)),
            Err(AssemblyError::UnknownDependency { .. })
        ));
        assert!(matches!(
            tl.add_dependency(a, a),
            Err(AssemblyError::SelfDependency { .. })
        ));
    }

    #[test]
    fn cycle_detected_at_validation() {
        let mut tl = TaskCollections::new();
        let a = tl.add_task(TaskPhase::Run, "a", &[], noop()).unwrap();
        let b = tl.add_task(TaskPhase::Run, "b", &[a], noop()).unwrap();
        let c = tl.add_task(TaskPhase::Run, "c", &[b], noop()).unwrap();
        assert!(tl.validate().is_ok());

        // Close the loop a -> b -> c -> a.
        tl.add_dependency(a, c).unwrap();
        match tl.validate() {
            Err(AssemblyError::Cycle { tasks }) => {
                assert_eq!(tasks.len(), 3);
            }
            other => panic!("expected Cycle, got {other:?}"),
        }
    }

    #[test]
    fn acyclic_graph_with_cross_list_deps_validates() {
        let mut tl = TaskCollections::new();
        let pre = tl.add_task(TaskPhase::Start, "pre", &[], noop()).unwrap();
        let work = tl.add_task(TaskPhase::Run, "work", &[pre], noop()).unwrap();
        tl.add_task(TaskPhase::End, "post", &[work], noop()).unwrap();
        assert!(tl.validate().is_ok());
    }

    #[test]
    fn dependency_on_later_phase_rejected() {
        let mut tl = TaskCollections::new();
        let teardown = tl.add_task(TaskPhase::End, "teardown", &[], noop()).unwrap();
        tl.add_task(TaskPhase::Run, "work", &[teardown], noop())
            .unwrap();
        match tl.validate() {
            Err(AssemblyError::PhaseOrdering {
                task,
                phase,
                dep,
                dep_phase,
            }) => {
                assert_eq!(task, "work");
                assert_eq!(phase, TaskPhase::Run);
                assert_eq!(dep, "teardown");
                assert_eq!(dep_phase, TaskPhase::End);
            }
            other => panic!("expected PhaseOrdering, got {other:?}"),
        }
    }

    #[test]
    fn clear_masks_resets_all_phases() {
        let mut tl = TaskCollections::new();
        tl.add_task(TaskPhase::Start, "a", &[], noop()).unwrap();
        let integ = torus_core::TimeIntegrator::from_name("rk1").unwrap();
        let ctx = crate::StageContext {
            stage: 1,
            dt: 1.0,
            time: 0.0,
            integrator: &integ,
        };
        tl.start.run_available(&ctx, &TaskIdSet::empty()).unwrap();
        assert!(tl.start.is_complete());
        tl.clear_masks();
        assert!(!tl.start.is_complete());
    }
}
