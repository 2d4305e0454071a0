use actix::prelude::{Actor, ActorContext, AsyncContext, Context, Handler};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::clock::clock::SharedClock;
use crate::domain::data::access::{AccessParams, DataAccessId, DataInstanceId, DataReference};
use crate::domain::data::data_registry::DataRegistry;
use crate::domain::runtime::executor::JobExecutor;
use crate::domain::runtime::requests::{ApRequest, JobOutcome, Reply, TaskCall, TasksStateSnapshot};
use crate::domain::scheduler::action::{ActionKey, ActionState};
use crate::domain::scheduler::task_scheduler::{SchedulerEvents, TaskScheduler};
use crate::domain::task::task::TaskDescription;
use crate::domain::task::task_analyser::TaskAnalyser;
use crate::domain::utils::id::{AppId, TaskId};
use crate::error::{Error, Result};

fn respond<T>(reply: Reply<T>, result: Result<T>) {
    if reply.send(result).is_err() {
        log::debug!("Requester went away before its reply was delivered");
    }
}

/// Someone parked until a data version is produced.
enum Waiter {
    Data { instance: DataInstanceId, reply: Reply<DataInstanceId> },
    Access { access: DataAccessId, reply: Reply<DataAccessId> },
}

impl Waiter {
    fn succeed(self) {
        match self {
            Waiter::Data { instance, reply } => respond(reply, Ok(instance)),
            Waiter::Access { access, reply } => respond(reply, Ok(access)),
        }
    }

    fn fail(self, error: Error) {
        match self {
            Waiter::Data { reply, .. } => respond(reply, Err(error)),
            Waiter::Access { reply, .. } => respond(reply, Err(error)),
        }
    }
}

/// Single owner of the data registry, the task graph and the scheduler.
///
/// Requests are served one at a time in arrival order, so none of the state it owns is locked.
pub struct AccessProcessor {
    registry: DataRegistry,
    analyser: TaskAnalyser,
    scheduler: TaskScheduler,
    executor: Arc<dyn JobExecutor>,
    clock: SharedClock,
    optimization_interval: Option<Duration>,

    task_actions: HashMap<TaskId, ActionKey>,
    action_tasks: HashMap<ActionKey, TaskId>,

    barriers: HashMap<AppId, Vec<Reply<()>>>,
    app_ends: HashMap<AppId, Vec<Reply<()>>>,

    /// Tasks that failed terminally since the last barrier of their application.
    failures: HashMap<AppId, Vec<TaskId>>,

    /// Waiters keyed by the maintenance action that wakes them up.
    waiters: HashMap<ActionKey, Waiter>,

    shutdown_replies: Vec<Reply<()>>,
    shutting_down: bool,
    obsolete_versions: u64,
}

impl AccessProcessor {
    /// `optimization_interval_ms == 0` disables the periodic optimization.
    pub fn new(scheduler: TaskScheduler, executor: Arc<dyn JobExecutor>, clock: SharedClock, optimization_interval_ms: u64) -> Self {
        AccessProcessor {
            registry: DataRegistry::new(),
            analyser: TaskAnalyser::new(),
            scheduler,
            executor,
            clock,
            optimization_interval: (optimization_interval_ms > 0).then(|| Duration::from_millis(optimization_interval_ms)),
            task_actions: HashMap::new(),
            action_tasks: HashMap::new(),
            barriers: HashMap::new(),
            app_ends: HashMap::new(),
            failures: HashMap::new(),
            waiters: HashMap::new(),
            shutdown_replies: Vec::new(),
            shutting_down: false,
            obsolete_versions: 0,
        }
    }

    fn now(&self) -> i64 {
        self.clock.get_current_time_in_ms()
    }

    fn task_analysis(&mut self, app_id: AppId, call: TaskCall, ctx: &mut Context<Self>) -> Result<TaskId> {
        let core_id = self
            .scheduler
            .cores()
            .core_id(&call.signature)
            .ok_or_else(|| Error::Configuration(format!("Unknown core element '{}'", call.signature)))?;

        let mut description = TaskDescription::new(core_id, call.signature, call.parameters).with_priority(call.priority);
        description.has_target = call.has_target;
        description.has_return = call.has_return;

        let (task_id, analysis) = self.analyser.analyse(app_id, description, &mut self.registry)?;
        let predecessors: Vec<ActionKey> = analysis.predecessors.iter().filter_map(|t| self.task_actions.get(t).copied()).collect();

        let now = self.now();
        match self.scheduler.new_task_action(task_id, core_id, call.priority, &predecessors, now) {
            Ok((key, events)) => {
                self.task_actions.insert(task_id, key);
                self.action_tasks.insert(key, task_id);
                self.dispatch(events, ctx);
                Ok(task_id)
            }
            Err(e) => {
                log::error!("Task {} of app {} cannot be scheduled: {}", task_id, app_id, e);
                self.end_task(task_id, false);
                // Reported by this reply instead of the next barrier.
                if let Some(failed) = self.failures.get_mut(&app_id) {
                    failed.retain(|t| *t != task_id);
                }
                Err(e)
            }
        }
    }

    fn register_data_access(&mut self, params: AccessParams, reply: Reply<DataAccessId>, ctx: &mut Context<Self>) {
        let writer = self.registry.data_id(&params.data).and_then(|d| self.analyser.last_writer(d));
        let access = match self.registry.register_main_access(&params) {
            Ok(access) => access,
            Err(e) => return respond(reply, Err(e)),
        };
        if access.written_instance().is_some() {
            self.analyser.forget_writer(access.data_id());
        }

        match access.read_instance() {
            Some(read) if !self.registry.is_available(read) => self.wait_on_writer(read, writer, Waiter::Access { access, reply }, ctx),
            _ => respond(reply, Ok(access)),
        }
    }

    fn wait_for_data(&mut self, data: DataReference, reply: Reply<DataInstanceId>, ctx: &mut Context<Self>) {
        let Some(instance) = self.registry.current_instance(&data) else {
            return respond(reply, Err(Error::Resolution(data.to_string())));
        };
        if self.registry.is_available(instance) {
            return respond(reply, Ok(instance));
        }
        let writer = self.analyser.last_writer(instance.data_id);
        self.wait_on_writer(instance, writer, Waiter::Data { instance, reply }, ctx);
    }

    /// Parks `waiter` behind a maintenance action that completes with the writer of `instance`.
    fn wait_on_writer(&mut self, instance: DataInstanceId, writer: Option<TaskId>, waiter: Waiter, ctx: &mut Context<Self>) {
        let Some(writer_action) = writer.and_then(|t| self.task_actions.get(&t).copied()) else {
            return waiter.fail(Error::ActionFailure { action_id: 0, reason: format!("version {} was never produced", instance) });
        };

        let now = self.now();
        match self.scheduler.new_maintenance_action(&[writer_action], now) {
            Ok((key, events)) => {
                log::debug!("Waiting for {} behind {:?}", instance, key);
                self.waiters.insert(key, waiter);
                self.dispatch(events, ctx);
            }
            Err(e) => waiter.fail(e),
        }
    }

    fn barrier(&mut self, app_id: AppId, reply: Reply<()>) {
        if self.analyser.pending_tasks(app_id) == 0 {
            let failed = self.take_failures(app_id);
            return respond(reply, Self::barrier_result(app_id, &failed));
        }
        log::debug!("Barrier of app {} waits for {} tasks", app_id, self.analyser.pending_tasks(app_id));
        self.barriers.entry(app_id).or_default().push(reply);
    }

    fn end_of_app(&mut self, app_id: AppId, reply: Reply<()>) {
        if self.analyser.forget_app(app_id) {
            log::info!("Application {} ended", app_id);
            let failed = self.take_failures(app_id);
            return respond(reply, Self::barrier_result(app_id, &failed));
        }
        self.app_ends.entry(app_id).or_default().push(reply);
    }

    fn cancel_task(&mut self, task_id: TaskId, ctx: &mut Context<Self>) -> Result<()> {
        let key = self.task_actions.get(&task_id).copied().ok_or(Error::TaskNotFound(task_id.id))?;
        let events = self.scheduler.cancel(key, self.now())?;
        log::info!("Cancelled task {}", task_id);
        self.dispatch(events, ctx);
        Ok(())
    }

    fn job_end(&mut self, key: ActionKey, outcome: JobOutcome, ctx: &mut Context<Self>) {
        let Some(task_id) = self.action_tasks.get(&key).copied() else {
            log::warn!("End of unknown action {:?} ignored", key);
            return;
        };

        let now = self.now();
        let result = match outcome {
            JobOutcome::Success => self.scheduler.action_completed(key, now),
            JobOutcome::Error => self.scheduler.action_error(key, now),
            JobOutcome::Failure => self.scheduler.action_failed(key, now),
        };

        match result {
            Ok(events) => {
                if self.scheduler.arena().state(key) == Some(ActionState::Completed) {
                    self.forget_action(key);
                    self.end_task(task_id, true);
                }
                self.dispatch(events, ctx);
            }
            Err(e) => log::error!("Could not process the end of task {}: {}", task_id, e),
        }
    }

    fn optimize(&mut self, ctx: &mut Context<Self>) {
        let now = self.now();
        match self.scheduler.optimize(now) {
            Ok((report, events)) => {
                log::debug!("Optimization {} released {} actions", report.update_id, report.released.len());
                self.dispatch(events, ctx);
            }
            Err(e) => log::error!("Schedule optimization failed: {}", e),
        }
    }

    fn tasks_state(&self) -> TasksStateSnapshot {
        TasksStateSnapshot {
            scheduler: self.scheduler.snapshot(),
            pending_per_app: self.analyser.pending_per_app().collect::<BTreeMap<_, _>>(),
            live_tasks: self.analyser.live_tasks(),
            finished_tasks: self.analyser.finished_tasks(),
            failed_tasks: self.analyser.failed_tasks(),
            live_data: self.registry.live_data_count(),
            obsolete_versions: self.obsolete_versions,
            shutting_down: self.shutting_down,
        }
    }

    fn shutdown(&mut self, reply: Reply<()>, ctx: &mut Context<Self>) {
        if !self.shutting_down {
            log::info!("Shutdown requested, {} tasks still live", self.analyser.live_tasks());
        }
        self.shutting_down = true;
        self.shutdown_replies.push(reply);
        self.check_shutdown(ctx);
    }

    /// Hands launched jobs to the executor and settles whoever waited on ended actions.
    fn dispatch(&mut self, events: SchedulerEvents, ctx: &mut Context<Self>) {
        if !events.launched.is_empty() {
            let listener = ctx.address().recipient();
            for job in events.launched {
                self.executor.submit(job, listener.clone());
            }
        }

        for key in events.completed_maintenance {
            if let Some(waiter) = self.waiters.remove(&key) {
                waiter.succeed();
            }
            self.scheduler.remove_terminal(key);
        }

        for key in events.failed {
            let action_id = self.scheduler.arena().get(key).map_or(0, |a| a.id);
            if let Some(task_id) = self.action_tasks.get(&key).copied() {
                self.forget_action(key);
                self.end_task(task_id, false);
            }
            if let Some(waiter) = self.waiters.remove(&key) {
                waiter.fail(Error::ActionFailure { action_id, reason: "the writer of the awaited data failed".to_string() });
            }
            self.scheduler.remove_terminal(key);
        }

        self.check_shutdown(ctx);
    }

    fn forget_action(&mut self, key: ActionKey) {
        if let Some(task_id) = self.action_tasks.remove(&key) {
            self.task_actions.remove(&task_id);
        }
        self.scheduler.remove_terminal(key);
    }

    /// Commits the accesses of an ended task and wakes the barriers of its application.
    fn end_task(&mut self, task_id: TaskId, success: bool) {
        let end = match self.analyser.task_ended(task_id, success) {
            Ok(end) => end,
            Err(e) => {
                log::error!("Ending task {} failed: {}", task_id, e);
                return;
            }
        };

        for access in &end.accesses {
            self.registry.data_has_been_accessed(access, success);
        }
        self.sweep_obsolete();

        if success {
            log::info!("Task {} finished", task_id);
        } else {
            log::warn!("Task {} failed", task_id);
            self.failures.entry(end.app_id).or_default().push(task_id);
        }

        if end.app_drained {
            let barriers = self.barriers.remove(&end.app_id).unwrap_or_default();
            let ends = self.app_ends.remove(&end.app_id).unwrap_or_default();
            if barriers.is_empty() && ends.is_empty() {
                return;
            }

            let failed = self.take_failures(end.app_id);
            for reply in barriers {
                respond(reply, Self::barrier_result(end.app_id, &failed));
            }
            if !ends.is_empty() && self.analyser.forget_app(end.app_id) {
                log::info!("Application {} ended", end.app_id);
            }
            for reply in ends {
                respond(reply, Self::barrier_result(end.app_id, &failed));
            }
        }
    }

    /// Failures of `app_id` since its last barrier, reported by the barrier that takes them.
    fn take_failures(&mut self, app_id: AppId) -> Vec<TaskId> {
        self.failures.remove(&app_id).unwrap_or_default()
    }

    fn barrier_result(app_id: AppId, failed: &[TaskId]) -> Result<()> {
        if failed.is_empty() {
            return Ok(());
        }
        Err(Error::TasksFailed { app_id: app_id.id, tasks: failed.iter().map(|t| t.id).collect() })
    }

    fn sweep_obsolete(&mut self) {
        let obsolete = self.registry.take_obsolete_renamings();
        if !obsolete.is_empty() {
            self.obsolete_versions += obsolete.len() as u64;
            log::debug!("Versions no longer needed: {:?}", obsolete);
        }
    }

    fn check_shutdown(&mut self, ctx: &mut Context<Self>) {
        if !self.shutting_down || self.analyser.live_tasks() > 0 {
            return;
        }
        for reply in self.shutdown_replies.drain(..) {
            respond(reply, Ok(()));
        }
        ctx.stop();
    }

    fn reject(request: ApRequest) {
        match request {
            ApRequest::TaskAnalysis { reply, .. } => respond(reply, Err(Error::ShutdownInProgress)),
            ApRequest::RegisterDataAccess { reply, .. } => respond(reply, Err(Error::ShutdownInProgress)),
            ApRequest::FinishAccess { reply, .. } => respond(reply, Err(Error::ShutdownInProgress)),
            ApRequest::AlreadyAccessed { reply, .. } => respond(reply, Err(Error::ShutdownInProgress)),
            ApRequest::IsObjectHere { reply, .. } => respond(reply, Err(Error::ShutdownInProgress)),
            ApRequest::GetLastRenaming { reply, .. } => respond(reply, Err(Error::ShutdownInProgress)),
            ApRequest::GetObjectVersionValue { reply, .. } => respond(reply, Err(Error::ShutdownInProgress)),
            ApRequest::Barrier { reply, .. } => respond(reply, Err(Error::ShutdownInProgress)),
            ApRequest::EndOfApp { reply, .. } => respond(reply, Err(Error::ShutdownInProgress)),
            ApRequest::WaitForData { reply, .. } => respond(reply, Err(Error::ShutdownInProgress)),
            ApRequest::DeleteFile { reply, .. } => respond(reply, Err(Error::ShutdownInProgress)),
            ApRequest::CancelTask { reply, .. } => respond(reply, Err(Error::ShutdownInProgress)),
            other => log::warn!("{} dropped: shutdown in progress", other.name()),
        }
    }
}

impl Actor for AccessProcessor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        log::info!("Access processor started with {} workers", self.scheduler.workers().len());
        if let Some(interval) = self.optimization_interval {
            ctx.run_interval(interval, |processor, ctx| processor.optimize(ctx));
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        log::info!(
            "Access processor stopped: {} tasks finished, {} failed, {} versions discarded",
            self.analyser.finished_tasks(),
            self.analyser.failed_tasks(),
            self.obsolete_versions
        );
    }
}

impl Handler<ApRequest> for AccessProcessor {
    type Result = ();

    fn handle(&mut self, msg: ApRequest, ctx: &mut Self::Context) {
        if self.shutting_down && !msg.allowed_during_shutdown() {
            return Self::reject(msg);
        }

        match msg {
            ApRequest::TaskAnalysis { app_id, call, reply } => {
                let result = self.task_analysis(app_id, call, ctx);
                respond(reply, result);
            }
            ApRequest::RegisterDataAccess { params, reply } => self.register_data_access(params, reply, ctx),
            ApRequest::FinishAccess { mode, data, reply } => {
                let result = self.registry.finish_access(mode, &data);
                self.sweep_obsolete();
                respond(reply, result);
            }
            ApRequest::AlreadyAccessed { location, reply } => respond(reply, Ok(self.registry.already_accessed(&location))),
            ApRequest::IsObjectHere { renaming, reply } => respond(reply, Ok(self.registry.is_here(&renaming))),
            ApRequest::GetLastRenaming { data, reply } => respond(reply, self.registry.get_last_renaming(&data)),
            ApRequest::SetObjectVersionValue { renaming, value } => self.registry.set_object_version_value(&renaming, value),
            ApRequest::GetObjectVersionValue { renaming, reply } => respond(reply, Ok(self.registry.get_object_version_value(&renaming))),
            ApRequest::NewVersionSameValue { read_renaming, write_renaming } => self.registry.new_version_same_value(&read_renaming, &write_renaming),
            ApRequest::Barrier { app_id, reply } => self.barrier(app_id, reply),
            ApRequest::EndOfApp { app_id, reply } => self.end_of_app(app_id, reply),
            ApRequest::WaitForData { data, reply } => self.wait_for_data(data, reply, ctx),
            ApRequest::DeleteFile { data, reply } => {
                let info = self.registry.delete_data(&data);
                self.sweep_obsolete();
                respond(reply, Ok(info));
            }
            ApRequest::BlockDeletions { data_id } => self.registry.block_deletions(data_id),
            ApRequest::UnblockDeletions { data_id } => {
                self.registry.unblock_deletions(data_id);
                self.sweep_obsolete();
            }
            ApRequest::CancelTask { task_id, reply } => {
                let result = self.cancel_task(task_id, ctx);
                respond(reply, result);
            }
            ApRequest::JobEnd { action, outcome } => self.job_end(action, outcome, ctx),
            ApRequest::Optimize => self.optimize(ctx),
            ApRequest::GraphDot { reply } => respond(reply, Ok(self.analyser.to_dot())),
            ApRequest::TasksState { reply } => respond(reply, Ok(self.tasks_state())),
            ApRequest::Shutdown { reply } => self.shutdown(reply, ctx),
        }
    }
}
