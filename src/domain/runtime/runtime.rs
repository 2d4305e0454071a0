use actix::prelude::{Actor, Addr};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::api::runtime_config_dto::RuntimeConfigDto;
use crate::domain::clock::clock::SharedClock;
use crate::domain::data::access::{AccessMode, AccessParams, DataAccessId, DataInstanceId, DataReference};
use crate::domain::data::data_registry::FileInfo;
use crate::domain::runtime::access_processor::AccessProcessor;
use crate::domain::runtime::executor::JobExecutor;
use crate::domain::runtime::requests::{ApRequest, Reply, TaskCall, TasksStateSnapshot};
use crate::domain::scheduler::task_scheduler::TaskScheduler;
use crate::domain::utils::id::{AppId, DataId, TaskId};
use crate::error::{Error, Result};

/// Cloneable handle through which applications talk to the access processor.
///
/// Every call enqueues one request and awaits its reply. Once the processor stopped, calls fail
/// with `Error::ChannelClosed`.
#[derive(Clone)]
pub struct Runtime {
    addr: Addr<AccessProcessor>,
}

impl Runtime {
    /// Starts the access processor. Must be called from within a running actix system.
    pub fn start(config: &RuntimeConfigDto, executor: Arc<dyn JobExecutor>, clock: SharedClock) -> Result<Self> {
        let scheduler = TaskScheduler::from_config(config)?;
        Ok(Runtime::with_scheduler(scheduler, executor, clock, config.scheduler.optimization_interval_ms))
    }

    pub fn with_scheduler(scheduler: TaskScheduler, executor: Arc<dyn JobExecutor>, clock: SharedClock, optimization_interval_ms: u64) -> Self {
        let addr = AccessProcessor::new(scheduler, executor, clock, optimization_interval_ms).start();
        Runtime { addr }
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> ApRequest) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.addr.do_send(build(reply));
        response.await.map_err(|_| Error::ChannelClosed)?
    }

    /// Submits a task call and returns its id once its dependencies are built.
    pub async fn execute_task(&self, app_id: AppId, call: TaskCall) -> Result<TaskId> {
        self.request(|reply| ApRequest::TaskAnalysis { app_id, call, reply }).await
    }

    /// Access from the main program. A read returns once the version it binds to was produced.
    pub async fn register_data_access(&self, params: AccessParams) -> Result<DataAccessId> {
        self.request(|reply| ApRequest::RegisterDataAccess { params, reply }).await
    }

    pub async fn finish_access(&self, mode: AccessMode, data: DataReference) -> Result<()> {
        self.request(|reply| ApRequest::FinishAccess { mode, data, reply }).await
    }

    pub async fn already_accessed(&self, location: impl Into<String>) -> Result<bool> {
        let location = location.into();
        self.request(|reply| ApRequest::AlreadyAccessed { location, reply }).await
    }

    pub async fn is_object_here(&self, renaming: impl Into<String>) -> Result<bool> {
        let renaming = renaming.into();
        self.request(|reply| ApRequest::IsObjectHere { renaming, reply }).await
    }

    pub async fn get_last_renaming(&self, data: DataReference) -> Result<String> {
        self.request(|reply| ApRequest::GetLastRenaming { data, reply }).await
    }

    pub fn set_object_version_value(&self, renaming: impl Into<String>, value: Bytes) {
        self.addr.do_send(ApRequest::SetObjectVersionValue { renaming: renaming.into(), value });
    }

    pub async fn get_object_version_value(&self, renaming: impl Into<String>) -> Result<Option<Bytes>> {
        let renaming = renaming.into();
        self.request(|reply| ApRequest::GetObjectVersionValue { renaming, reply }).await
    }

    pub fn new_version_same_value(&self, read_renaming: impl Into<String>, write_renaming: impl Into<String>) {
        self.addr.do_send(ApRequest::NewVersionSameValue { read_renaming: read_renaming.into(), write_renaming: write_renaming.into() });
    }

    /// Returns once every task of the application submitted so far has ended.
    pub async fn barrier(&self, app_id: AppId) -> Result<()> {
        self.request(|reply| ApRequest::Barrier { app_id, reply }).await
    }

    pub async fn end_of_app(&self, app_id: AppId) -> Result<()> {
        self.request(|reply| ApRequest::EndOfApp { app_id, reply }).await
    }

    pub async fn wait_for_data(&self, data: DataReference) -> Result<DataInstanceId> {
        self.request(|reply| ApRequest::WaitForData { data, reply }).await
    }

    pub async fn delete_file(&self, data: DataReference) -> Result<Option<FileInfo>> {
        self.request(|reply| ApRequest::DeleteFile { data, reply }).await
    }

    pub fn block_deletions(&self, data_id: DataId) {
        self.addr.do_send(ApRequest::BlockDeletions { data_id });
    }

    pub fn unblock_deletions(&self, data_id: DataId) {
        self.addr.do_send(ApRequest::UnblockDeletions { data_id });
    }

    pub async fn cancel_task(&self, task_id: TaskId) -> Result<()> {
        self.request(|reply| ApRequest::CancelTask { task_id, reply }).await
    }

    /// Triggers a global optimization without waiting for it.
    pub fn optimize(&self) {
        self.addr.do_send(ApRequest::Optimize);
    }

    pub async fn graph_dot(&self) -> Result<String> {
        self.request(|reply| ApRequest::GraphDot { reply }).await
    }

    pub async fn tasks_state(&self) -> Result<TasksStateSnapshot> {
        self.request(|reply| ApRequest::TasksState { reply }).await
    }

    /// Rejects new work, waits for every live task to end, then stops the processor.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| ApRequest::Shutdown { reply }).await
    }

    pub fn connected(&self) -> bool {
        self.addr.connected()
    }
}
