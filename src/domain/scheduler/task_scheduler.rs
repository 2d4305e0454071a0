use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use crate::api::runtime_config_dto::{RuntimeConfigDto, SchedulerConfigDto};
use crate::domain::resource::core_element::{CoreRegistry, Implementation};
use crate::domain::resource::resource_description::ResourceDescription;
use crate::domain::resource::worker::Worker;
use crate::domain::scheduler::action::{ActionKey, ActionKind, ActionState};
use crate::domain::scheduler::action_arena::{ActionArena, ErrorOutcome, FailureCascade};
use crate::domain::scheduler::optimization::schedule_optimizer::{OptimizationReport, ScheduleOptimizer};
use crate::domain::scheduler::resource_scheduler::ResourceScheduler;
use crate::domain::scheduler::score::Score;
use crate::domain::utils::id::{CoreId, IdGenerator, TaskId, WorkerId, WorkerTag};
use crate::error::{Error, Result};

/// A task action handed to the execution collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaunchedJob {
    #[serde(skip)]
    pub action: ActionKey,
    pub action_id: u64,
    pub task_id: TaskId,
    pub worker: WorkerId,
    pub worker_name: String,
    pub implementation: Implementation,
    pub expected_duration: i64,
}

/// Everything a scheduler operation set in motion.
#[derive(Debug, Clone, Default)]
pub struct SchedulerEvents {
    pub launched: Vec<LaunchedJob>,

    /// Maintenance actions that completed; their waiters can be woken up.
    pub completed_maintenance: Vec<ActionKey>,

    /// Actions that failed terminally, including the whole data cascade.
    pub failed: Vec<ActionKey>,
}

impl SchedulerEvents {
    pub fn merge(&mut self, other: SchedulerEvents) {
        self.launched.extend(other.launched);
        self.completed_maintenance.extend(other.completed_maintenance);
        self.failed.extend(other.failed);
    }

    pub fn is_empty(&self) -> bool {
        self.launched.is_empty() && self.completed_maintenance.is_empty() && self.failed.is_empty()
    }
}

/// Load of one worker in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerLoad {
    pub worker: String,
    pub running: usize,
    pub planned: usize,
    pub blocked: usize,
    pub available: ResourceDescription,
    pub last_gap_start: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerSnapshot {
    pub actions: BTreeMap<ActionState, usize>,
    pub workers: Vec<WorkerLoad>,
    pub last_optimization: u64,
}

/// Owns every action and worker and decides where and when actions run.
#[derive(Debug)]
pub struct TaskScheduler {
    arena: ActionArena,
    workers: Vec<ResourceScheduler>,
    cores: CoreRegistry,
    optimizer: ScheduleOptimizer,
    worker_ids: IdGenerator<WorkerTag>,

    /// Failed attempts an action may have before failing terminally.
    max_retries: u32,
}

impl TaskScheduler {
    pub fn new(cores: CoreRegistry, config: &SchedulerConfigDto) -> Self {
        TaskScheduler {
            arena: ActionArena::new(),
            workers: Vec::new(),
            cores,
            optimizer: ScheduleOptimizer::new(config.optimization_horizon_ms, config.max_donation_rounds),
            worker_ids: IdGenerator::new(),
            max_retries: config.max_retries,
        }
    }

    /// Builds the scheduler with its core elements and workers.
    ///
    /// # Errors
    /// `Error::Configuration` for duplicate worker names, workers without capacity, or
    /// implementations no worker can host.
    pub fn from_config(dto: &RuntimeConfigDto) -> Result<Self> {
        let cores = CoreRegistry::from_dto(&dto.core_elements)?;
        let mut scheduler = TaskScheduler::new(cores, &dto.scheduler);

        let mut names = HashSet::new();
        for worker_dto in &dto.workers {
            if !names.insert(worker_dto.name.as_str()) {
                return Err(Error::Configuration(format!("Worker '{}' declared twice", worker_dto.name)));
            }
            let worker = Worker::from_dto(scheduler.worker_ids.next_id(), worker_dto)?;
            scheduler.push_worker(worker);
        }

        for core in scheduler.cores.iter() {
            for implementation in &core.implementations {
                if !scheduler.workers.iter().any(|w| w.worker().can_run(implementation)) {
                    return Err(Error::Configuration(format!(
                        "Implementation {} of '{}' needs {}, which no worker offers",
                        implementation.key.impl_id, core.signature, implementation.requirements
                    )));
                }
            }
        }

        log::info!("Scheduler ready with {} workers and {} core elements", scheduler.workers.len(), scheduler.cores.len());
        Ok(scheduler)
    }

    pub fn add_worker(&mut self, name: impl Into<String>, capacity: ResourceDescription) -> WorkerId {
        let worker = Worker::new(self.worker_ids.next_id(), name, capacity);
        let id = worker.id;
        self.push_worker(worker);
        id
    }

    pub fn arena(&self) -> &ActionArena {
        &self.arena
    }

    pub fn cores(&self) -> &CoreRegistry {
        &self.cores
    }

    pub fn workers(&self) -> &[ResourceScheduler] {
        &self.workers
    }

    pub fn worker(&self, id: WorkerId) -> Option<&ResourceScheduler> {
        self.workers.iter().find(|w| w.id() == id)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Creates the action of an analysed task, places it and launches it if it is ready.
    ///
    /// # Errors
    /// `Error::NoCompatibleWorker` if no worker can run any implementation of the core element.
    pub fn new_task_action(&mut self, task_id: TaskId, core_id: CoreId, priority: bool, data_predecessors: &[ActionKey], now: i64) -> Result<(ActionKey, SchedulerEvents)> {
        let compatible = self.cores.implementations(core_id).iter().any(|i| self.workers.iter().any(|w| w.worker().can_run(i)));
        if !compatible {
            return Err(Error::NoCompatibleWorker(core_id.id));
        }

        let key = self.arena.create(ActionKind::Task { task_id, core_id }, i64::from(priority), data_predecessors);
        if self.arena.state(key) == Some(ActionState::Failed) {
            return Ok((key, SchedulerEvents { failed: vec![key], ..SchedulerEvents::default() }));
        }

        self.place(key, now)?;
        let events = self.launch_all(vec![key], BTreeSet::new(), now)?;
        Ok((key, events))
    }

    /// Creates a maintenance action completing once every data predecessor completed.
    pub fn new_maintenance_action(&mut self, data_predecessors: &[ActionKey], now: i64) -> Result<(ActionKey, SchedulerEvents)> {
        let key = self.arena.create(ActionKind::Maintenance, 0, data_predecessors);
        if self.arena.state(key) == Some(ActionState::Failed) {
            return Ok((key, SchedulerEvents { failed: vec![key], ..SchedulerEvents::default() }));
        }
        let events = self.launch_all(vec![key], BTreeSet::new(), now)?;
        Ok((key, events))
    }

    /// Plans a task action on the worker with the best score.
    pub fn place(&mut self, key: ActionKey, now: i64) -> Result<WorkerId> {
        let core_id = self.arena.get(key).and_then(|a| a.core_id()).ok_or(Error::ActionNotFound)?;
        let implementations = self.cores.implementations(core_id);

        let mut best: Option<(usize, Implementation, Score)> = None;
        for (index, scheduler) in self.workers.iter().enumerate() {
            let Some((implementation, score)) = scheduler.best_implementation(&self.arena, key, implementations, now) else {
                continue;
            };
            if best.as_ref().is_none_or(|(_, _, b)| score.is_better(b)) {
                best = Some((index, implementation, score));
            }
        }

        let (index, implementation, score) = best.ok_or(Error::NoCompatibleWorker(core_id.id))?;
        self.workers[index].plan(&mut self.arena, key, implementation, now)?;

        log::debug!("Placed {:?} on worker '{}' with {:?}", key, self.workers[index].name(), score);
        Ok(self.workers[index].id())
    }

    /// Successful end of a running action.
    ///
    /// A cancelled action is failed instead.
    pub fn action_completed(&mut self, key: ActionKey, now: i64) -> Result<SchedulerEvents> {
        let action = self.arena.get(key).ok_or(Error::ActionNotFound)?;
        if action.is_cancelled() {
            return self.action_error(key, now);
        }

        let worker = action.worker().and_then(|w| self.index_of(w));
        let started_at = action.started_at();
        let implementation = action.implementation().cloned();

        let freed = self.arena.completed(key)?;

        let mut touched = BTreeSet::new();
        if let Some(index) = worker {
            if let (Some(started_at), Some(implementation)) = (started_at, implementation) {
                self.workers[index].worker_mut().update_profile(&implementation, now.saturating_sub(started_at).max(0));
            }
            self.workers[index].release(key, now);
            touched.insert(index);
        }

        self.launch_all(freed, touched, now)
    }

    /// Failed execution attempt. Retries on the best worker until the retry budget is exhausted.
    pub fn action_error(&mut self, key: ActionKey, now: i64) -> Result<SchedulerEvents> {
        let worker = self.arena.get(key).ok_or(Error::ActionNotFound)?.worker().and_then(|w| self.index_of(w));
        let outcome = self.arena.error(key, self.max_retries)?;

        let mut touched = BTreeSet::new();
        if let Some(index) = worker {
            self.workers[index].release(key, now);
            touched.insert(index);
        }

        match outcome {
            ErrorOutcome::Retry { attempt } => {
                let mut queue = self.arena.unlink_resource_chain(key);
                self.arena.clear_assignment(key);
                let target = self.place(key, now)?;
                log::info!("Retrying {:?} (attempt {}) on worker {}", key, attempt + 1, target);
                queue.push(key);
                self.launch_all(queue, touched, now)
            }
            ErrorOutcome::Failed(cascade) => self.handle_cascade(cascade, touched, now),
        }
    }

    /// Unrecoverable failure reported by the executor: no retry, the data cascade fails at once.
    pub fn action_failed(&mut self, key: ActionKey, now: i64) -> Result<SchedulerEvents> {
        let worker = self.arena.get(key).ok_or(Error::ActionNotFound)?.worker().and_then(|w| self.index_of(w));

        let mut touched = BTreeSet::new();
        if let Some(index) = worker {
            self.workers[index].release(key, now);
            touched.insert(index);
        }

        let cascade = self.arena.failed(key)?;
        self.handle_cascade(cascade, touched, now)
    }

    /// Cancels an action. One that has not started fails with its data cascade; a running one is
    /// flagged and fails when it ends.
    pub fn cancel(&mut self, key: ActionKey, now: i64) -> Result<SchedulerEvents> {
        match self.arena.state(key) {
            None => Err(Error::ActionNotFound),
            Some(ActionState::Running) => {
                self.arena.mark_cancelled(key);
                log::info!("{:?} is running, it will be failed when it ends", key);
                Ok(SchedulerEvents::default())
            }
            Some(state) if state.is_terminal() => Ok(SchedulerEvents::default()),
            Some(_) => {
                let cascade = self.arena.failed(key)?;
                self.handle_cascade(cascade, BTreeSet::new(), now)
            }
        }
    }

    /// Runs a global optimization and launches what it released.
    pub fn optimize(&mut self, now: i64) -> Result<(OptimizationReport, SchedulerEvents)> {
        let report = self.optimizer.optimize(&mut self.arena, &mut self.workers, &self.cores, now)?;
        let touched = (0..self.workers.len()).collect();
        let events = self.launch_all(report.released.clone(), touched, now)?;
        Ok((report, events))
    }

    /// Forgets a terminal action.
    pub fn remove_terminal(&mut self, key: ActionKey) -> bool {
        self.arena.remove(key).is_some()
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        let workers = self
            .workers
            .iter()
            .map(|w| WorkerLoad {
                worker: w.name().to_string(),
                running: w.hosted().len(),
                planned: w.planned().len(),
                blocked: w.blocked().count(),
                available: w.worker().available(),
                last_gap_start: w.last_gap_start(),
            })
            .collect();
        SchedulerSnapshot { actions: self.arena.count_by_state(), workers, last_optimization: self.optimizer.last_update_id() }
    }

    fn push_worker(&mut self, worker: Worker) {
        log::info!("Added worker '{}' with capacity {}", worker.name, worker.capacity);
        self.workers.push(ResourceScheduler::new(worker));
    }

    fn index_of(&self, id: WorkerId) -> Option<usize> {
        self.workers.iter().position(|w| w.id() == id)
    }

    fn handle_cascade(&mut self, cascade: FailureCascade, mut touched: BTreeSet<usize>, now: i64) -> Result<SchedulerEvents> {
        for &failed in &cascade.failed {
            let worker = self.arena.get(failed).and_then(|a| a.worker()).and_then(|w| self.index_of(w));
            if let Some(index) = worker {
                self.workers[index].forget(failed);
                touched.insert(index);
            }
        }

        let mut events = self.launch_all(cascade.freed, touched, now)?;
        events.failed.extend(cascade.failed);
        Ok(events)
    }

    /// Launches the given executable actions in order, then whatever the blocked queues of the
    /// touched workers can now host.
    fn launch_all(&mut self, keys: Vec<ActionKey>, mut touched: BTreeSet<usize>, now: i64) -> Result<SchedulerEvents> {
        let mut events = SchedulerEvents::default();
        let mut queue: VecDeque<ActionKey> = keys.into();

        loop {
            while let Some(key) = queue.pop_front() {
                if self.arena.state(key) != Some(ActionState::Executable) {
                    continue;
                }
                match self.arena.get(key).map(|a| a.kind) {
                    Some(ActionKind::Maintenance) => {
                        self.arena.mark_scheduled(key)?;
                        self.arena.mark_running(key, now)?;
                        queue.extend(self.arena.completed(key)?);
                        events.completed_maintenance.push(key);
                    }
                    Some(ActionKind::Task { task_id, .. }) => {
                        if let Some(job) = self.launch_task(key, task_id, now, &mut touched)? {
                            events.launched.push(job);
                        }
                    }
                    None => {}
                }
            }

            let mut progressed = false;
            for &index in &touched {
                while let Some(key) = self.workers[index].pop_launchable() {
                    queue.push_back(key);
                    progressed = true;
                    if self.arena.state(key) == Some(ActionState::Executable) {
                        break;
                    }
                }
            }
            if !progressed {
                return Ok(events);
            }
        }
    }

    /// Reserves capacity and hands the action to the executor, or parks it in the blocked queue.
    fn launch_task(&mut self, key: ActionKey, task_id: TaskId, now: i64, touched: &mut BTreeSet<usize>) -> Result<Option<LaunchedJob>> {
        let index = match self.arena.get(key).and_then(|a| a.worker()).and_then(|w| self.index_of(w)) {
            Some(index) => index,
            None => {
                let worker = self.place(key, now)?;
                self.index_of(worker).ok_or(Error::ActionNotFound)?
            }
        };
        touched.insert(index);

        match self.workers[index].schedule(&mut self.arena, key) {
            Ok(()) => {}
            Err(Error::InsufficientResources { .. }) => {
                self.workers[index].enqueue_blocked(key);
                return Ok(None);
            }
            Err(e) => return Err(e),
        }
        self.arena.mark_running(key, now)?;

        let scheduler = &self.workers[index];
        let action = self.arena.get(key).ok_or(Error::ActionNotFound)?;
        let implementation = action.implementation().cloned().ok_or(Error::ActionNotFound)?;
        let job = LaunchedJob {
            action: key,
            action_id: action.id,
            task_id,
            worker: scheduler.id(),
            worker_name: scheduler.name().to_string(),
            expected_duration: scheduler.worker().expected_duration(&implementation),
            implementation,
        };

        log::info!("Launched action {} (task {}) on worker '{}'", job.action_id, task_id, job.worker_name);
        Ok(Some(job))
    }
}
