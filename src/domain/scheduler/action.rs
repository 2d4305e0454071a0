use serde::Serialize;
use slotmap::new_key_type;
use std::fmt;

use crate::domain::resource::core_element::Implementation;
use crate::domain::utils::id::{CoreId, TaskId, WorkerId};

new_key_type! {
    pub struct ActionKey;
}

/// Lifecycle state of an allocatable action.
///
/// `Completed` and `Failed` are terminal. `Error` is transient: the action leaves it in the same
/// operation that entered it, either back to `Executable` or on to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ActionState {
    /// Waits for data or resource predecessors.
    Pending,

    /// Every predecessor is done; waits for a reservation on its worker.
    Executable,

    /// Holds a reservation on its worker but has not been handed to the executor yet.
    Scheduled,

    /// Handed to the executor.
    Running,

    /// An execution attempt failed; retry or terminal failure is being decided.
    Error,

    /// Finished successfully and notified its successors.
    Completed,

    /// Gave up, either after exhausting retries or because a data predecessor failed.
    Failed,
}

impl ActionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ActionState::Completed | ActionState::Failed)
    }
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The closed set of things an action can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActionKind {
    /// Executes one task on a worker.
    Task { task_id: TaskId, core_id: CoreId },

    /// Internal join point. Reserves nothing and completes as soon as it is launched, so it is
    /// used to wait for its data predecessors.
    Maintenance,
}

/// Expected timeline of an action, refreshed by planning and by optimization passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchedulingInfo {
    pub expected_start: i64,
    pub expected_end: i64,

    /// The last optimization pass could not place the action; its placement is provisional and
    /// donation tries it before the placed actions.
    pub to_reschedule: bool,

    /// Id of the optimization pass that last annotated the action, `0` if none did.
    pub last_update: u64,
}

impl Default for SchedulingInfo {
    fn default() -> Self {
        SchedulingInfo { expected_start: 0, expected_end: 0, to_reschedule: false, last_update: 0 }
    }
}

/// The unit of schedulable work.
///
/// Dependencies are stored as arena keys in both directions; the arena keeps the two sides
/// consistent. Data and resource dependencies are tracked separately because only the former
/// carry failures.
#[derive(Debug, Clone)]
pub struct AllocatableAction {
    /// Stable creation-ordered id, used for display and as final tie-breaker.
    pub id: u64,

    pub kind: ActionKind,

    /// Higher runs first.
    pub priority: i64,

    pub(super) state: ActionState,

    pub(super) data_predecessors: Vec<ActionKey>,
    pub(super) data_successors: Vec<ActionKey>,

    pub(super) resource_predecessors: Vec<ActionKey>,
    pub(super) resource_successors: Vec<ActionKey>,

    /// Worker the action is placed on, if any.
    pub(super) worker: Option<WorkerId>,

    /// Implementation chosen for that worker.
    pub(super) implementation: Option<Implementation>,

    /// Failed execution attempts so far.
    pub(super) retries: u32,

    /// Cancelled while running; its end is treated as a failure.
    pub(super) cancelled: bool,

    /// Time the current attempt started running.
    pub(super) started_at: Option<i64>,

    pub scheduling: SchedulingInfo,
}

impl AllocatableAction {
    pub(super) fn new(id: u64, kind: ActionKind, priority: i64) -> Self {
        AllocatableAction {
            id,
            kind,
            priority,
            state: ActionState::Pending,
            data_predecessors: Vec::new(),
            data_successors: Vec::new(),
            resource_predecessors: Vec::new(),
            resource_successors: Vec::new(),
            worker: None,
            implementation: None,
            retries: 0,
            cancelled: false,
            started_at: None,
            scheduling: SchedulingInfo::default(),
        }
    }

    pub fn state(&self) -> ActionState {
        self.state
    }

    pub fn task_id(&self) -> Option<TaskId> {
        match self.kind {
            ActionKind::Task { task_id, .. } => Some(task_id),
            ActionKind::Maintenance => None,
        }
    }

    pub fn core_id(&self) -> Option<CoreId> {
        match self.kind {
            ActionKind::Task { core_id, .. } => Some(core_id),
            ActionKind::Maintenance => None,
        }
    }

    pub fn is_maintenance(&self) -> bool {
        matches!(self.kind, ActionKind::Maintenance)
    }

    pub fn data_predecessors(&self) -> &[ActionKey] {
        &self.data_predecessors
    }

    pub fn data_successors(&self) -> &[ActionKey] {
        &self.data_successors
    }

    pub fn resource_predecessors(&self) -> &[ActionKey] {
        &self.resource_predecessors
    }

    pub fn resource_successors(&self) -> &[ActionKey] {
        &self.resource_successors
    }

    pub fn has_predecessors(&self) -> bool {
        !self.data_predecessors.is_empty() || !self.resource_predecessors.is_empty()
    }

    pub fn worker(&self) -> Option<WorkerId> {
        self.worker
    }

    pub fn implementation(&self) -> Option<&Implementation> {
        self.implementation.as_ref()
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn started_at(&self) -> Option<i64> {
        self.started_at
    }

    /// Neither completed nor failed, so successors must still wait for it.
    pub fn is_live(&self) -> bool {
        !self.state.is_terminal()
    }
}

impl fmt::Display for AllocatableAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ActionKind::Task { task_id, .. } => write!(f, "Action {} (task {}, {})", self.id, task_id, self.state),
            ActionKind::Maintenance => write!(f, "Action {} (maintenance, {})", self.id, self.state),
        }
    }
}
