use std::collections::{BTreeSet, HashMap};

use crate::domain::data::access::{AccessParams, DataAccessId};
use crate::domain::data::data_registry::DataRegistry;
use crate::domain::graph::dot::to_dot;
use crate::domain::graph::graph::Graph;
use crate::domain::task::task::{Task, TaskDescription, TaskState};
use crate::domain::utils::id::{AppId, DataId, IdGenerator, TaskId, TaskTag};
use crate::error::{Error, Result};

/// Dependencies of a freshly analysed task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Analysis {
    pub accesses: Vec<DataAccessId>,

    /// Live tasks writing a version this task reads, in id order.
    pub predecessors: Vec<TaskId>,
}

/// What ending a task changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEnd {
    pub app_id: AppId,
    pub accesses: Vec<DataAccessId>,

    /// The application has no pending task left.
    pub app_drained: bool,
}

/// Turns task calls into a dependency graph over live tasks.
///
/// Only read-after-write dependencies exist: renaming gives every write its own version, so
/// writers never wait for earlier readers or writers.
#[derive(Debug, Default)]
pub struct TaskAnalyser {
    graph: Graph<TaskId, Task>,

    /// Last live writer of every datum.
    writers: HashMap<DataId, TaskId>,

    /// Tasks submitted and not yet ended, per application.
    app_tasks: HashMap<AppId, u32>,

    task_ids: IdGenerator<TaskTag>,

    finished: u64,
    failed: u64,
}

impl TaskAnalyser {
    pub fn new() -> Self {
        TaskAnalyser::default()
    }

    /// Resolves every access of the task and links it after the last writers of what it reads.
    ///
    /// All reads are validated before any access is registered, so a rejected task leaves no
    /// trace in the registry or the graph.
    ///
    /// # Errors
    /// `Error::Resolution` if a parameter reads a datum that was never written.
    pub fn analyse(&mut self, app_id: AppId, description: TaskDescription, registry: &mut DataRegistry) -> Result<(TaskId, Analysis)> {
        let mut written_here = BTreeSet::new();
        for parameter in &description.parameters {
            if parameter.direction.is_read() && registry.current_instance(&parameter.data).is_none() && !written_here.contains(&parameter.data) {
                return Err(Error::Resolution(parameter.data.to_string()));
            }
            if parameter.direction.is_write() {
                written_here.insert(parameter.data.clone());
            }
        }

        let task_id = self.task_ids.next_id();
        let mut accesses = Vec::with_capacity(description.parameters.len());
        let mut predecessors = BTreeSet::new();

        for parameter in &description.parameters {
            let access = registry.register_access(&AccessParams::new(parameter.direction, parameter.data.clone()))?;
            let data_id = access.data_id();

            if access.read_instance().is_some() {
                if let Some(&writer) = self.writers.get(&data_id) {
                    if writer != task_id && self.graph.contains(&writer) {
                        predecessors.insert(writer);
                    }
                }
            }
            if access.written_instance().is_some() {
                self.writers.insert(data_id, task_id);
            }
            accesses.push(access);
        }

        let mut task = Task::new(task_id, app_id, description);
        task.state = TaskState::ToExecute;
        task.accesses = accesses.clone();
        self.graph.add_node(task_id, task);

        for predecessor in &predecessors {
            self.graph.add_edge(*predecessor, task_id)?;
        }
        *self.app_tasks.entry(app_id).or_insert(0) += 1;

        log::debug!("Task {} analysed: {} accesses, predecessors {:?}", task_id, accesses.len(), predecessors);
        Ok((task_id, Analysis { accesses, predecessors: predecessors.into_iter().collect() }))
    }

    /// Removes an ended task from the graph and releases its bookkeeping.
    pub fn task_ended(&mut self, task_id: TaskId, success: bool) -> Result<TaskEnd> {
        let mut task = self.graph.remove_node(&task_id).ok_or(Error::TaskNotFound(task_id.id))?;
        task.state = if success { TaskState::Finished } else { TaskState::Failed };

        if success {
            self.finished += 1;
        } else {
            self.failed += 1;
        }

        self.writers.retain(|_, writer| *writer != task_id);

        let remaining = self.app_tasks.entry(task.app_id).or_insert(0);
        *remaining = remaining.saturating_sub(1);
        let app_drained = *remaining == 0;

        log::debug!("Task {} ended ({:?}), {} tasks left in app {}", task_id, task.state, remaining, task.app_id);
        Ok(TaskEnd { app_id: task.app_id, accesses: task.accesses, app_drained })
    }

    pub fn last_writer(&self, data_id: DataId) -> Option<TaskId> {
        self.writers.get(&data_id).copied()
    }

    /// The main program wrote the datum itself; later readers need not wait for any task.
    pub fn forget_writer(&mut self, data_id: DataId) {
        self.writers.remove(&data_id);
    }

    /// Drops the bookkeeping of an application with no pending task.
    ///
    /// # Returns
    /// `false` if tasks of the application are still pending.
    pub fn forget_app(&mut self, app_id: AppId) -> bool {
        if self.pending_tasks(app_id) > 0 {
            return false;
        }
        self.app_tasks.remove(&app_id);
        true
    }

    pub fn get(&self, task_id: TaskId) -> Option<&Task> {
        self.graph.get(&task_id)
    }

    pub fn pending_tasks(&self, app_id: AppId) -> u32 {
        self.app_tasks.get(&app_id).copied().unwrap_or(0)
    }

    pub fn pending_per_app(&self) -> impl Iterator<Item = (AppId, u32)> + '_ {
        self.app_tasks.iter().map(|(a, n)| (*a, *n))
    }

    pub fn live_tasks(&self) -> usize {
        self.graph.len()
    }

    pub fn finished_tasks(&self) -> u64 {
        self.finished
    }

    pub fn failed_tasks(&self) -> u64 {
        self.failed
    }

    pub fn graph(&self) -> &Graph<TaskId, Task> {
        &self.graph
    }

    pub fn to_dot(&self) -> String {
        to_dot(&self.graph, "TaskGraph")
    }
}
