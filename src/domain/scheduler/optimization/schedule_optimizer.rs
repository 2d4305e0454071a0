use std::cmp::Reverse;
use std::collections::HashSet;

use crate::domain::resource::core_element::CoreRegistry;
use crate::domain::scheduler::action::{ActionKey, ActionState};
use crate::domain::scheduler::action_arena::ActionArena;
use crate::domain::scheduler::gap::UNBOUNDED;
use crate::domain::scheduler::optimization::optimization_worker::{LocalOptimizationResult, OptimizationWorker, is_movable};
use crate::domain::scheduler::resource_scheduler::ResourceScheduler;
use crate::error::{Error, Result};

/// Outcome of a global optimization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimizationReport {
    /// Id of the last local pass that annotated actions.
    pub update_id: u64,

    pub donations: u32,

    /// Actions left executable by the new timelines, to be launched by the caller.
    pub released: Vec<ActionKey>,
}

#[derive(Debug, Clone)]
struct WorkerSummary {
    index: usize,
    last_gap_start: i64,
    donors: Vec<ActionKey>,
}

/// Rebuilds every worker timeline and moves work from the most loaded worker to idle ones.
#[derive(Debug, Clone)]
pub struct ScheduleOptimizer {
    update_id: u64,

    /// How far ahead of `now` passes simulate, `None` for no limit.
    horizon_ms: Option<i64>,

    max_donation_rounds: u32,
}

impl ScheduleOptimizer {
    pub fn new(horizon_ms: Option<i64>, max_donation_rounds: u32) -> Self {
        ScheduleOptimizer { update_id: 0, horizon_ms, max_donation_rounds }
    }

    pub fn last_update_id(&self) -> u64 {
        self.update_id
    }

    /// Runs local passes on all workers in parallel, installs their timelines, then donates one
    /// action. Repeats until no donation happens or the round limit is reached.
    pub fn optimize(&mut self, arena: &mut ActionArena, workers: &mut [ResourceScheduler], cores: &CoreRegistry, now: i64) -> Result<OptimizationReport> {
        let horizon = self.horizon_ms.map_or(UNBOUNDED, |h| now.saturating_add(h.max(0)));
        let mut report = OptimizationReport::default();

        for round in 0..=self.max_donation_rounds {
            self.update_id += 1;
            report.update_id = self.update_id;

            let results = Self::local_passes(arena, workers, now, horizon, self.update_id);
            let mut summaries = Vec::with_capacity(results.len());
            for (index, result) in results {
                summaries.push(WorkerSummary { index, last_gap_start: result.last_gap_start, donors: result.donors.clone() });
                report.released.extend(workers[index].apply_optimization(arena, result, now)?);
            }

            if round == self.max_donation_rounds || !Self::donate(arena, workers, cores, &summaries, now, &mut report.released)? {
                break;
            }
            report.donations += 1;
        }

        let mut seen = HashSet::new();
        report.released.retain(|k| seen.insert(*k) && arena.state(*k) == Some(ActionState::Executable));
        log::info!("Optimization {} done: {} donations, {} actions released", report.update_id, report.donations, report.released.len());
        Ok(report)
    }

    /// One pass per worker, each on its own thread over a shared read-only arena.
    fn local_passes(arena: &ActionArena, workers: &[ResourceScheduler], now: i64, horizon: i64, update_id: u64) -> Vec<(usize, LocalOptimizationResult)> {
        std::thread::scope(|scope| {
            let handles: Vec<_> = workers
                .iter()
                .enumerate()
                .map(|(index, scheduler)| scope.spawn(move || (index, OptimizationWorker::new(arena, scheduler).optimize(now, horizon, update_id))))
                .collect();

            handles
                .into_iter()
                .filter_map(|handle| match handle.join() {
                    Ok(result) => Some(result),
                    Err(_) => {
                        log::error!("A local optimization pass panicked, its worker keeps its previous timeline");
                        None
                    }
                })
                .collect()
        })
    }

    /// Moves the first donor candidate of the most loaded worker that would finish earlier on
    /// another worker. Actions its last pass left to reschedule are tried before the placed ones.
    ///
    /// # Returns
    /// `true` if an action moved.
    fn donate(
        arena: &mut ActionArena,
        workers: &mut [ResourceScheduler],
        cores: &CoreRegistry,
        summaries: &[WorkerSummary],
        now: i64,
        released: &mut Vec<ActionKey>,
    ) -> Result<bool> {
        let Some(donor) = summaries.iter().max_by_key(|s| (s.last_gap_start, Reverse(s.index))) else {
            return Ok(false);
        };
        let mut receivers: Vec<&WorkerSummary> = summaries.iter().filter(|s| s.index != donor.index).collect();
        receivers.sort_by_key(|s| (s.last_gap_start, s.index));

        let flagged: Vec<ActionKey> = workers[donor.index]
            .planned()
            .iter()
            .copied()
            .filter(|k| arena.get(*k).is_some_and(|a| a.scheduling.to_reschedule))
            .collect();
        let candidates: Vec<ActionKey> = flagged.iter().copied().chain(donor.donors.iter().copied().filter(|k| !flagged.contains(k))).collect();

        for &candidate in &candidates {
            if !is_movable(arena, candidate) {
                continue;
            }
            let Some(action) = arena.get(candidate) else {
                continue;
            };
            let Some(core_id) = action.core_id() else {
                continue;
            };
            let expected_end = action.scheduling.expected_end;
            let implementations = cores.implementations(core_id);

            for receiver in &receivers {
                let target = &workers[receiver.index];
                let best_duration = implementations.iter().filter(|i| target.worker().can_run(i)).map(|i| target.worker().expected_duration(i)).min();
                let Some(best_duration) = best_duration else {
                    continue;
                };
                if expected_end <= receiver.last_gap_start.saturating_add(best_duration) {
                    continue;
                }

                released.extend(workers[donor.index].unschedule_action(arena, candidate));
                arena.clear_assignment(candidate);

                let target = &workers[receiver.index];
                let (implementation, _) =
                    target.best_implementation(arena, candidate, implementations, now).ok_or(Error::NoCompatibleWorker(core_id.id))?;
                workers[receiver.index].plan(arena, candidate, implementation, now)?;
                if arena.release_if_ready(candidate) || arena.state(candidate) == Some(ActionState::Executable) {
                    released.push(candidate);
                }

                log::info!(
                    "Donated {:?} from worker '{}' to '{}' (expected end {} on donor)",
                    candidate,
                    workers[donor.index].name(),
                    workers[receiver.index].name(),
                    expected_end
                );
                return Ok(true);
            }
        }
        Ok(false)
    }
}
