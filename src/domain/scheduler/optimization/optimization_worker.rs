use std::collections::HashSet;

use crate::domain::scheduler::action::{ActionKey, ActionState};
use crate::domain::scheduler::action_arena::ActionArena;
use crate::domain::scheduler::gap::Gap;
use crate::domain::scheduler::optimization::local_optimization_state::{LocalOptimizationState, SimAction};
use crate::domain::scheduler::optimization::scheduling_event::EventKind;
use crate::domain::scheduler::resource_scheduler::ResourceScheduler;
use crate::domain::utils::id::WorkerId;

/// Timeline computed for one worker by a local optimization pass.
#[derive(Debug, Clone)]
pub struct LocalOptimizationResult {
    pub worker: WorkerId,
    pub update_id: u64,

    /// New `(action, expected start, expected end)` of every placed action.
    pub placements: Vec<(ActionKey, i64, i64)>,

    /// New resource predecessors of every placed action that has not started.
    pub resource_predecessors: Vec<(ActionKey, Vec<ActionKey>)>,

    /// Actions the pass could not place before the horizon.
    pub unplaced: Vec<ActionKey>,

    pub gaps: Vec<Gap>,

    /// Start of the latest open-ended gap: when the worker is expected to run dry.
    pub last_gap_start: i64,

    /// Actions that could move to another worker, latest expected end first.
    pub donors: Vec<ActionKey>,
}

/// Runs the local optimization pass of one worker over a read-only view of the scheduler.
#[derive(Debug)]
pub struct OptimizationWorker<'a> {
    arena: &'a ActionArena,
    scheduler: &'a ResourceScheduler,
}

impl<'a> OptimizationWorker<'a> {
    pub fn new(arena: &'a ActionArena, scheduler: &'a ResourceScheduler) -> Self {
        OptimizationWorker { arena, scheduler }
    }

    pub fn optimize(&self, now: i64, horizon: i64, update_id: u64) -> LocalOptimizationResult {
        let worker = self.scheduler.worker();
        let mut state = LocalOptimizationState::new(now, worker.capacity);

        let local: HashSet<ActionKey> = self.scheduler.hosted().iter().chain(self.scheduler.planned()).copied().collect();

        for &key in self.scheduler.hosted() {
            let Some(mut sim) = self.sim_action(key, &local, now) else {
                continue;
            };
            let started_at = self.arena.get(key).and_then(|a| a.started_at()).unwrap_or(now);
            let end = now.max(started_at.saturating_add(sim.duration));
            sim.pending_predecessors = 0;
            state.add_running(sim, started_at, end);
        }
        for &key in self.scheduler.planned() {
            if let Some(sim) = self.sim_action(key, &local, now) {
                state.add_planned(sim);
            }
        }
        state.release_roots();

        state.dispatch(now);
        loop {
            if !state.has_events() && !state.force_progress() {
                break;
            }
            let Some(event) = state.pop_event() else {
                break;
            };
            if event.time > horizon {
                state.push_event(event);
                break;
            }

            state.time = state.time.max(event.time);
            state.promote_ready(state.time);
            match event.kind {
                EventKind::End => state.end(event.action, event.time),
                EventKind::Start => state.start(event.action, event.time),
            }
            state.dispatch(state.time);
        }
        state.flush();

        if !state.dropped().is_empty() {
            log::warn!("Worker '{}' cannot host {} planned actions", worker.name, state.dropped().len());
        }

        let hosted: HashSet<ActionKey> = self.scheduler.hosted().iter().copied().collect();
        let (placements, mut resource_predecessors, unplaced, gaps) = state.into_parts();

        let mut donors: Vec<(i64, u64, ActionKey)> = placements
            .iter()
            .filter(|(key, _)| !hosted.contains(*key))
            .filter_map(|(key, (_, end))| self.arena.get(*key).map(|a| (*end, a.id, *key)))
            .collect();
        donors.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        let mut sorted_placements: Vec<(ActionKey, i64, i64)> = placements.iter().map(|(k, (s, e))| (*k, *s, *e)).collect();
        sorted_placements.sort_by_key(|(k, s, _)| (*s, self.arena.get(*k).map_or(0, |a| a.id)));

        let mut predecessors: Vec<(ActionKey, Vec<ActionKey>)> = resource_predecessors.drain().filter(|(k, _)| !hosted.contains(k)).collect();
        predecessors.sort_by_key(|(k, _)| self.arena.get(*k).map_or(0, |a| a.id));

        let last_gap_start = gaps.iter().filter(|g| g.is_unbounded()).map(|g| g.start).max().unwrap_or(now);

        log::debug!(
            "Optimization {} of worker '{}': {} placed, {} unplaced, idle from {}",
            update_id,
            worker.name,
            sorted_placements.len(),
            unplaced.len(),
            last_gap_start
        );

        LocalOptimizationResult {
            worker: worker.id,
            update_id,
            placements: sorted_placements,
            resource_predecessors: predecessors,
            unplaced,
            gaps,
            last_gap_start,
            donors: donors.into_iter().map(|(_, _, k)| k).collect(),
        }
    }

    fn sim_action(&self, key: ActionKey, local: &HashSet<ActionKey>, now: i64) -> Option<SimAction> {
        let action = self.arena.get(key)?;
        let placement = self.scheduler.placement(key)?;

        let mut ready_at = now;
        let mut pending_predecessors = 0;
        for pred in action.data_predecessors() {
            let Some(p) = self.arena.get(*pred) else {
                continue;
            };
            if !p.is_live() {
                continue;
            }
            if local.contains(pred) {
                pending_predecessors += 1;
            } else {
                ready_at = ready_at.max(p.scheduling.expected_end);
            }
        }

        let successors = action.data_successors().iter().filter(|s| local.contains(*s)).copied().collect();
        let duration = self.scheduler.worker().expected_duration(&placement.implementation);

        Some(SimAction {
            key,
            id: action.id,
            priority: action.priority,
            requirements: placement.implementation.requirements,
            duration,
            ready_at,
            pending_predecessors,
            successors,
        })
    }
}

/// Actions of `arena` whose state lets them change worker.
pub fn is_movable(arena: &ActionArena, key: ActionKey) -> bool {
    matches!(arena.state(key), Some(ActionState::Pending | ActionState::Executable))
}
