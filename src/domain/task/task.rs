use serde::Serialize;

use crate::domain::data::access::{AccessMode, DataAccessId, DataReference};
use crate::domain::graph::dot::DotNode;
use crate::domain::utils::id::{AppId, CoreId, TaskId};

/// Lifecycle of a task as seen by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TaskState {
    /// Accepted, dependencies not yet built.
    ToAnalyse,
    /// Dependencies built, its action is somewhere in the scheduler.
    ToExecute,
    Finished,
    Failed,
}

/// One task parameter and the datum it touches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Parameter {
    pub direction: AccessMode,
    pub data: DataReference,
}

impl Parameter {
    pub fn new(direction: AccessMode, data: DataReference) -> Self {
        Parameter { direction, data }
    }
}

/// Immutable description of a task call.
#[derive(Debug, Clone, Serialize)]
pub struct TaskDescription {
    pub core_id: CoreId,
    pub signature: String,
    pub priority: bool,
    pub has_target: bool,
    pub has_return: bool,
    pub replicated: bool,
    pub distributed: bool,
    pub num_nodes: u32,
    pub parameters: Vec<Parameter>,
}

impl TaskDescription {
    pub fn new(core_id: CoreId, signature: impl Into<String>, parameters: Vec<Parameter>) -> Self {
        TaskDescription {
            core_id,
            signature: signature.into(),
            priority: false,
            has_target: false,
            has_return: false,
            replicated: false,
            distributed: false,
            num_nodes: 1,
            parameters,
        }
    }

    pub fn with_priority(mut self, priority: bool) -> Self {
        self.priority = priority;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub app_id: AppId,
    pub description: TaskDescription,
    pub state: TaskState,

    /// Resolved accesses, parallel to `description.parameters` once analysed.
    pub accesses: Vec<DataAccessId>,
}

impl Task {
    pub fn new(id: TaskId, app_id: AppId, description: TaskDescription) -> Self {
        Task { id, app_id, description, state: TaskState::ToAnalyse, accesses: Vec::new() }
    }
}

impl DotNode for Task {
    fn dot_label(&self) -> String {
        format!("{} [{}]", self.description.signature, self.id)
    }

    fn dot_attributes(&self) -> Option<String> {
        let color = match self.state {
            TaskState::ToAnalyse => "gray",
            TaskState::ToExecute if self.description.priority => "orange",
            TaskState::ToExecute => "blue",
            TaskState::Finished => "green",
            TaskState::Failed => "red",
        };
        Some(format!("color={}", color))
    }
}
