use actix::prelude::Message;
use bytes::Bytes;
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::oneshot;

use crate::api::application_dto::{DataDto, DirectionDto, TaskCallDto};
use crate::domain::data::access::{AccessMode, AccessParams, DataAccessId, DataInstanceId, DataReference};
use crate::domain::data::data_registry::FileInfo;
use crate::domain::scheduler::action::ActionKey;
use crate::domain::scheduler::task_scheduler::SchedulerSnapshot;
use crate::domain::task::task::Parameter;
use crate::domain::utils::id::{AppId, DataId, TaskId};
use crate::error::Result;

/// Single-use reply slot of a request.
pub type Reply<T> = oneshot::Sender<Result<T>>;

/// How an execution attempt ended, as reported by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobOutcome {
    Success,
    /// The attempt failed; the action may be retried.
    Error,
    /// The attempt failed in a way no retry can fix.
    Failure,
}

/// A task call as issued by the application, before its core element is resolved.
#[derive(Debug, Clone)]
pub struct TaskCall {
    pub signature: String,
    pub priority: bool,
    pub parameters: Vec<Parameter>,
    pub has_target: bool,
    pub has_return: bool,
}

impl TaskCall {
    pub fn new(signature: impl Into<String>, parameters: Vec<Parameter>) -> Self {
        TaskCall { signature: signature.into(), priority: false, parameters, has_target: false, has_return: false }
    }

    pub fn with_priority(mut self, priority: bool) -> Self {
        self.priority = priority;
        self
    }

    pub fn from_dto(dto: &TaskCallDto) -> Self {
        let parameters = dto.parameters.iter().map(|p| Parameter::new(AccessMode::from_dto(p.direction), DataReference::from_dto(&p.data))).collect();
        TaskCall { signature: dto.signature.clone(), priority: dto.priority, parameters, has_target: dto.has_target, has_return: dto.has_return }
    }
}

impl AccessMode {
    pub fn from_dto(direction: DirectionDto) -> Self {
        match direction {
            DirectionDto::In => AccessMode::R,
            DirectionDto::Out => AccessMode::W,
            DirectionDto::InOut => AccessMode::RW,
        }
    }
}

impl DataReference {
    pub fn from_dto(dto: &DataDto) -> Self {
        match dto {
            DataDto::File { location } => DataReference::File(location.clone()),
            DataDto::Object { code } => DataReference::Object(*code),
        }
    }
}

/// State of the runtime as reported to monitoring callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TasksStateSnapshot {
    pub scheduler: SchedulerSnapshot,
    pub pending_per_app: BTreeMap<AppId, u32>,
    pub live_tasks: usize,
    pub finished_tasks: u64,
    pub failed_tasks: u64,
    pub live_data: usize,
    pub obsolete_versions: u64,
    pub shutting_down: bool,
}

/// Every request the access processor serves, processed one at a time in arrival order.
///
/// Requests that produce a value carry a [`Reply`] slot, answered exactly once.
#[derive(Message)]
#[rtype(result = "()")]
pub enum ApRequest {
    TaskAnalysis { app_id: AppId, call: TaskCall, reply: Reply<TaskId> },
    /// Access from the main program.
    RegisterDataAccess { params: AccessParams, reply: Reply<DataAccessId> },
    FinishAccess { mode: AccessMode, data: DataReference, reply: Reply<()> },
    AlreadyAccessed { location: String, reply: Reply<bool> },
    IsObjectHere { renaming: String, reply: Reply<bool> },
    GetLastRenaming { data: DataReference, reply: Reply<String> },
    SetObjectVersionValue { renaming: String, value: Bytes },
    GetObjectVersionValue { renaming: String, reply: Reply<Option<Bytes>> },
    NewVersionSameValue { read_renaming: String, write_renaming: String },
    /// Answered once the application has no pending task.
    Barrier { app_id: AppId, reply: Reply<()> },
    /// Like `Barrier`, then the application's bookkeeping is dropped.
    EndOfApp { app_id: AppId, reply: Reply<()> },
    /// Answered with the awaited version once its writer completed.
    WaitForData { data: DataReference, reply: Reply<DataInstanceId> },
    DeleteFile { data: DataReference, reply: Reply<Option<FileInfo>> },
    /// Pins every version of a datum, even past its deletion.
    BlockDeletions { data_id: DataId },
    UnblockDeletions { data_id: DataId },
    CancelTask { task_id: TaskId, reply: Reply<()> },
    /// Executor notification, never rejected.
    JobEnd { action: ActionKey, outcome: JobOutcome },
    Optimize,
    GraphDot { reply: Reply<String> },
    TasksState { reply: Reply<TasksStateSnapshot> },
    /// Stops accepting work, waits for every task to end, then stops the processor.
    Shutdown { reply: Reply<()> },
}

impl ApRequest {
    pub fn name(&self) -> &'static str {
        match self {
            ApRequest::TaskAnalysis { .. } => "TaskAnalysis",
            ApRequest::RegisterDataAccess { .. } => "RegisterDataAccess",
            ApRequest::FinishAccess { .. } => "FinishAccess",
            ApRequest::AlreadyAccessed { .. } => "AlreadyAccessed",
            ApRequest::IsObjectHere { .. } => "IsObjectHere",
            ApRequest::GetLastRenaming { .. } => "GetLastRenaming",
            ApRequest::SetObjectVersionValue { .. } => "SetObjectVersionValue",
            ApRequest::GetObjectVersionValue { .. } => "GetObjectVersionValue",
            ApRequest::NewVersionSameValue { .. } => "NewVersionSameValue",
            ApRequest::Barrier { .. } => "Barrier",
            ApRequest::EndOfApp { .. } => "EndOfApp",
            ApRequest::WaitForData { .. } => "WaitForData",
            ApRequest::DeleteFile { .. } => "DeleteFile",
            ApRequest::BlockDeletions { .. } => "BlockDeletions",
            ApRequest::UnblockDeletions { .. } => "UnblockDeletions",
            ApRequest::CancelTask { .. } => "CancelTask",
            ApRequest::JobEnd { .. } => "JobEnd",
            ApRequest::Optimize => "Optimize",
            ApRequest::GraphDot { .. } => "GraphDot",
            ApRequest::TasksState { .. } => "TasksState",
            ApRequest::Shutdown { .. } => "Shutdown",
        }
    }

    /// Requests still served once shutdown started: executor notifications and read-only queries.
    pub fn allowed_during_shutdown(&self) -> bool {
        matches!(
            self,
            ApRequest::JobEnd { .. } | ApRequest::Optimize | ApRequest::GraphDot { .. } | ApRequest::TasksState { .. } | ApRequest::Shutdown { .. }
        )
    }
}
