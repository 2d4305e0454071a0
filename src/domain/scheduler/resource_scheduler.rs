use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::domain::resource::core_element::Implementation;
use crate::domain::resource::resource_description::ResourceDescription;
use crate::domain::resource::worker::Worker;
use crate::domain::scheduler::action::{ActionKey, ActionState};
use crate::domain::scheduler::action_arena::ActionArena;
use crate::domain::scheduler::gap::{Gap, UNBOUNDED};
use crate::domain::scheduler::optimization::optimization_worker::LocalOptimizationResult;
use crate::domain::scheduler::score::Score;
use crate::domain::utils::id::WorkerId;
use crate::error::{Error, Result};

/// Expected slot of an action on this worker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Placement {
    pub start: i64,
    pub end: i64,
    pub implementation: Implementation,
}

impl Placement {
    pub fn requirements(&self) -> &ResourceDescription {
        &self.implementation.requirements
    }

    pub fn covers(&self, instant: i64) -> bool {
        self.start <= instant && instant < self.end
    }
}

/// Per-worker view of the scheduler.
///
/// Owns the worker's capacity, the actions placed on it and a timeline of free capacity as a list
/// of gaps. At every future instant the gaps covering it plus the placements covering it add up to
/// the worker capacity.
#[derive(Debug)]
pub struct ResourceScheduler {
    worker: Worker,
    gaps: Vec<Gap>,

    /// Actions holding a reservation, `Scheduled` or `Running`.
    hosted: Vec<ActionKey>,

    /// Actions placed here that hold no reservation yet.
    planned: Vec<ActionKey>,

    /// Executable actions rejected for lack of capacity, retried in FIFO order on every release.
    blocked: VecDeque<ActionKey>,

    placements: HashMap<ActionKey, Placement>,
}

impl ResourceScheduler {
    pub fn new(worker: Worker) -> Self {
        let gaps = vec![Gap::new(0, UNBOUNDED, None, worker.capacity)];
        ResourceScheduler { worker, gaps, hosted: Vec::new(), planned: Vec::new(), blocked: VecDeque::new(), placements: HashMap::new() }
    }

    pub fn id(&self) -> WorkerId {
        self.worker.id
    }

    pub fn name(&self) -> &str {
        &self.worker.name
    }

    pub fn worker(&self) -> &Worker {
        &self.worker
    }

    pub fn worker_mut(&mut self) -> &mut Worker {
        &mut self.worker
    }

    pub fn gaps(&self) -> &[Gap] {
        &self.gaps
    }

    pub fn hosted(&self) -> &[ActionKey] {
        &self.hosted
    }

    pub fn planned(&self) -> &[ActionKey] {
        &self.planned
    }

    pub fn blocked(&self) -> impl Iterator<Item = ActionKey> + '_ {
        self.blocked.iter().copied()
    }

    pub fn placement(&self, key: ActionKey) -> Option<&Placement> {
        self.placements.get(&key)
    }

    pub fn hosts(&self, key: ActionKey) -> bool {
        self.placements.contains_key(&key)
    }

    /// Time from which the whole worker is expected to be free.
    pub fn last_gap_start(&self) -> i64 {
        self.gaps.iter().filter(|g| g.is_unbounded()).map(|g| g.start).max().unwrap_or(0)
    }

    /// Earliest time every live data predecessor of `key` is expected to have produced its output.
    pub fn data_ready_time(arena: &ActionArena, key: ActionKey, now: i64) -> i64 {
        let Some(action) = arena.get(key) else {
            return now;
        };
        action
            .data_predecessors()
            .iter()
            .filter_map(|p| arena.get(*p))
            .filter(|p| p.is_live())
            .map(|p| p.scheduling.expected_end)
            .fold(now, i64::max)
    }

    /// Earliest time the open-ended part of the timeline can host `requirements`, not before
    /// `data_ready`. `None` if the worker is too small.
    pub fn resource_free_time(&self, requirements: &ResourceDescription, data_ready: i64) -> Option<i64> {
        if !self.worker.capacity.can_host(requirements) {
            return None;
        }

        let mut pending = *requirements;
        let mut start = data_ready;
        for index in self.unbounded_order(data_ready) {
            if pending.is_useless() {
                break;
            }
            let mut offered = self.gaps[index].resources;
            if !offered.reduce_common(&mut pending).is_useless() {
                start = start.max(self.gaps[index].start);
            }
        }
        Some(start)
    }

    pub fn score(&self, arena: &ActionArena, key: ActionKey, implementation: &Implementation, now: i64) -> Option<Score> {
        if !self.worker.can_run(implementation) {
            return None;
        }
        let priority = arena.get(key)?.priority;
        let data_ready = Self::data_ready_time(arena, key, now);
        let resource_free = self.resource_free_time(&implementation.requirements, data_ready)?;
        Some(Score::new(priority, data_ready, resource_free, self.worker.expected_duration(implementation)))
    }

    /// Best implementation of `implementations` for `key` on this worker, first one on ties.
    pub fn best_implementation(&self, arena: &ActionArena, key: ActionKey, implementations: &[Implementation], now: i64) -> Option<(Implementation, Score)> {
        let mut best: Option<(Implementation, Score)> = None;
        for implementation in implementations {
            let Some(score) = self.score(arena, key, implementation, now) else {
                continue;
            };
            if best.as_ref().is_none_or(|(_, b)| score.is_better(b)) {
                best = Some((implementation.clone(), score));
            }
        }
        best
    }

    /// Places an action on this worker's timeline without reserving anything.
    ///
    /// Capacity is taken from the open-ended gaps, preferring those already free when the data is
    /// ready. Actions whose end freed the consumed capacity become resource predecessors of a
    /// `Pending` action; the capacity left unused before the start stays available for backfilling.
    ///
    /// # Errors
    /// `Error::InsufficientResources` if the worker can never host the implementation.
    pub fn plan(&mut self, arena: &mut ActionArena, key: ActionKey, implementation: Implementation, now: i64) -> Result<()> {
        let requirements = implementation.requirements;
        if !self.worker.capacity.can_host(&requirements) {
            return Err(self.insufficient(&requirements));
        }
        let state = arena.expect_state(key, &[ActionState::Pending, ActionState::Executable], "plan")?;

        let data_ready = Self::data_ready_time(arena, key, now);
        let duration = self.worker.expected_duration(&implementation);

        let mut pending = requirements;
        let mut start = data_ready;
        let mut consumed = Vec::new();
        for index in self.unbounded_order(data_ready) {
            if pending.is_useless() {
                break;
            }
            let gap = &mut self.gaps[index];
            let taken = gap.resources.reduce_common(&mut pending);
            if taken.is_useless() {
                continue;
            }
            start = start.max(gap.start);
            consumed.push((gap.start, gap.origin, taken));
        }

        let end = start.saturating_add(duration);
        let mut predecessors = Vec::new();
        for (gap_start, origin, taken) in consumed {
            if let Some(origin) = origin {
                predecessors.push(origin);
            }
            if gap_start < start {
                self.gaps.push(Gap::new(gap_start, start, origin, taken));
            }
        }
        self.gaps.retain(|g| !g.is_empty());
        self.gaps.push(Gap::new(end, UNBOUNDED, Some(key), requirements));

        arena.assign_resources(key, self.worker.id, implementation.clone())?;
        if state == ActionState::Pending {
            for predecessor in predecessors {
                arena.add_resource_predecessor(key, predecessor)?;
            }
        }
        if let Some(action) = arena.get_mut(key) {
            action.scheduling.expected_start = start;
            action.scheduling.expected_end = end;
            action.scheduling.to_reschedule = false;
        }

        self.planned.push(key);
        self.placements.insert(key, Placement { start, end, implementation });

        log::debug!("Planned {:?} on worker '{}' at [{}, {})", key, self.worker.name, start, end);
        Ok(())
    }

    /// Reserves the planned requirement of an executable action and marks it `Scheduled`.
    ///
    /// # Errors
    /// `Error::InsufficientResources` if the worker cannot host it right now; the caller keeps
    /// the action queued.
    pub fn schedule(&mut self, arena: &mut ActionArena, key: ActionKey) -> Result<()> {
        let requirements = *self.placements.get(&key).ok_or(Error::ActionNotFound)?.requirements();
        arena.expect_state(key, &[ActionState::Executable], "schedule")?;
        if !self.worker.reserve(&requirements) {
            return Err(self.insufficient(&requirements));
        }

        arena.mark_scheduled(key)?;
        self.planned.retain(|k| *k != key);
        self.blocked.retain(|k| *k != key);
        self.hosted.push(key);
        Ok(())
    }

    /// Returns the reservation of an action that stopped running.
    ///
    /// Capacity freed by the action is available from `now` on, even if it ended before its
    /// expected end: gaps opened by its expected end are moved forward, and whatever later
    /// placements already took from them is covered by a bounded gap up to that end.
    pub fn release(&mut self, key: ActionKey, now: i64) {
        let Some(placement) = self.placements.remove(&key) else {
            return;
        };
        if self.hosted.contains(&key) {
            self.worker.release(placement.requirements());
        }
        self.hosted.retain(|k| *k != key);
        self.planned.retain(|k| *k != key);
        self.blocked.retain(|k| *k != key);

        let early_from = placement.start.max(now);
        let mut uncovered = *placement.requirements();
        for gap in self.gaps.iter_mut().filter(|g| g.origin == Some(key)) {
            gap.origin = None;
            if gap.start == placement.end && early_from < placement.end {
                uncovered.reduce(&gap.resources);
                gap.start = early_from;
            }
        }
        if early_from < placement.end && !uncovered.is_useless() {
            self.gaps.push(Gap::new(early_from, placement.end, None, uncovered));
        }
        self.gaps.retain(|g| !g.is_empty() && (g.is_unbounded() || g.end > now));
    }

    /// Drops an action that will not run here, returning whatever it held.
    pub fn forget(&mut self, key: ActionKey) {
        let Some(placement) = self.placements.remove(&key) else {
            return;
        };
        if self.hosted.contains(&key) {
            self.worker.release(placement.requirements());
        }
        self.hosted.retain(|k| *k != key);
        self.planned.retain(|k| *k != key);
        self.blocked.retain(|k| *k != key);

        self.gaps.push(Gap::new(placement.start, placement.end, None, *placement.requirements()));
        for gap in self.gaps.iter_mut().filter(|g| g.origin == Some(key)) {
            gap.origin = None;
        }
        self.gaps.retain(|g| !g.is_empty());
    }

    /// Removes an action from this worker, keeping its resource chain connected.
    ///
    /// # Returns
    /// Resource successors left without any predecessor.
    pub fn unschedule_action(&mut self, arena: &mut ActionArena, key: ActionKey) -> Vec<ActionKey> {
        let freed = arena.unlink_resource_chain(key);
        self.forget(key);
        freed
    }

    pub fn enqueue_blocked(&mut self, key: ActionKey) {
        if !self.blocked.contains(&key) {
            log::debug!("{:?} waits for capacity on worker '{}'", key, self.worker.name);
            self.blocked.push_back(key);
        }
    }

    /// Pops the head of the blocked queue if the worker can host it now.
    pub fn pop_launchable(&mut self) -> Option<ActionKey> {
        let head = *self.blocked.front()?;
        let fits = self.placements.get(&head).is_none_or(|p| self.worker.can_host_now(p.requirements()));
        if fits { self.blocked.pop_front() } else { None }
    }

    /// Capacity the gap list reports as free at `instant`.
    pub fn free_capacity_at(&self, instant: i64) -> ResourceDescription {
        let mut free = ResourceDescription::default();
        for gap in self.gaps.iter().filter(|g| g.covers(instant)) {
            free.increase(&gap.resources);
        }
        free
    }

    /// Capacity placed actions are expected to use at `instant`.
    pub fn reserved_capacity_at(&self, instant: i64) -> ResourceDescription {
        let mut reserved = ResourceDescription::default();
        for placement in self.placements.values().filter(|p| p.covers(instant)) {
            reserved.increase(placement.requirements());
        }
        reserved
    }

    /// Installs the timeline computed by a local optimization pass.
    ///
    /// # Returns
    /// Actions the new resource ordering left executable.
    pub fn apply_optimization(&mut self, arena: &mut ActionArena, result: LocalOptimizationResult, now: i64) -> Result<Vec<ActionKey>> {
        self.gaps = result.gaps;

        for (key, start, end) in result.placements {
            if let Some(placement) = self.placements.get_mut(&key) {
                placement.start = start;
                placement.end = end;
            }
            if let Some(action) = arena.get_mut(key) {
                action.scheduling.expected_start = start;
                action.scheduling.expected_end = end;
                action.scheduling.to_reschedule = false;
                action.scheduling.last_update = result.update_id;
            }
        }

        let mut released = Vec::new();
        for (key, predecessors) in result.resource_predecessors {
            if !matches!(arena.state(key), Some(ActionState::Pending | ActionState::Executable)) {
                continue;
            }
            arena.set_resource_predecessors(key, &predecessors)?;
            if arena.release_if_ready(key) {
                released.push(key);
            }
        }

        for key in result.unplaced {
            let Some(placement) = self.placements.remove(&key) else {
                continue;
            };
            self.planned.retain(|k| *k != key);
            let blocked = self.blocked.contains(&key);
            self.blocked.retain(|k| *k != key);

            released.extend(arena.unlink_resource_chain(key));
            self.plan(arena, key, placement.implementation, now)?;
            if arena.release_if_ready(key) {
                released.push(key);
            }
            if blocked {
                self.blocked.push_back(key);
            }
            if let Some(action) = arena.get_mut(key) {
                action.scheduling.to_reschedule = true;
                action.scheduling.last_update = result.update_id;
            }
        }

        let mut seen = HashSet::new();
        released.retain(|k| seen.insert(*k) && arena.state(*k) == Some(ActionState::Executable));
        Ok(released)
    }

    /// Open-ended gaps in consumption order: those already open at `data_ready`, latest first,
    /// then the later ones in chronological order.
    fn unbounded_order(&self, data_ready: i64) -> Vec<usize> {
        let mut early: Vec<usize> = Vec::new();
        let mut late: Vec<usize> = Vec::new();
        for (index, gap) in self.gaps.iter().enumerate().filter(|(_, g)| g.is_unbounded()) {
            if gap.start <= data_ready { early.push(index) } else { late.push(index) }
        }
        early.sort_by_key(|i| std::cmp::Reverse(self.gaps[*i].start));
        late.sort_by_key(|i| self.gaps[*i].start);
        early.extend(late);
        early
    }

    fn insufficient(&self, requirements: &ResourceDescription) -> Error {
        Error::InsufficientResources { worker: self.worker.name.clone(), requirement: requirements.to_string() }
    }
}
