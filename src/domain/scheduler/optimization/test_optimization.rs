use std::collections::HashMap;

use crate::domain::resource::core_element::{CoreRegistry, Implementation};
use crate::domain::resource::resource_description::ResourceDescription;
use crate::domain::resource::worker::Worker;
use crate::domain::scheduler::action::{ActionKey, ActionKind};
use crate::domain::scheduler::action_arena::ActionArena;
use crate::domain::scheduler::gap::UNBOUNDED;
use crate::domain::scheduler::optimization::optimization_worker::{LocalOptimizationResult, OptimizationWorker};
use crate::domain::scheduler::optimization::schedule_optimizer::ScheduleOptimizer;
use crate::domain::scheduler::optimization::scheduling_event::SchedulingEvent;
use crate::domain::scheduler::resource_scheduler::ResourceScheduler;
use crate::domain::utils::id::{CoreId, TaskId, WorkerId};

// --- HELPER FUNCTIONS ---

struct Fixture {
    cores: CoreRegistry,
    arena: ActionArena,
}

impl Fixture {
    /// Core element 0 runs on one unit for `duration` ms.
    fn new(duration: i64) -> Self {
        let mut cores = CoreRegistry::new();
        cores.register("work", vec![(ResourceDescription::units(1), Some(duration))]).unwrap();
        cores.register("wide", vec![(ResourceDescription::units(2), Some(duration))]).unwrap();
        Fixture { cores, arena: ActionArena::new() }
    }

    fn implementation(&self, core: u64, duration: Option<i64>) -> Implementation {
        let mut implementation = self.cores.implementations(CoreId::new(core))[0].clone();
        if duration.is_some() {
            implementation.expected_duration_ms = duration;
        }
        implementation
    }

    fn action(&mut self, core: u64, priority: i64, preds: &[ActionKey]) -> ActionKey {
        let id = self.arena.len() as u64 + 1;
        self.arena.create(ActionKind::Task { task_id: TaskId::new(id), core_id: CoreId::new(core) }, priority, preds)
    }
}

fn placement_index(result: &LocalOptimizationResult) -> HashMap<ActionKey, (i64, i64)> {
    result.placements.iter().map(|(k, s, e)| (*k, (*s, *e))).collect()
}

fn scheduler(id: u64, units: i64) -> ResourceScheduler {
    ResourceScheduler::new(Worker::new(WorkerId::new(id), format!("w{}", id), ResourceDescription::units(units)))
}

// --- TESTS ---

#[test]
fn test_end_events_sort_before_starts_at_same_instant() {
    let mut fixture = Fixture::new(1);
    let a = fixture.action(0, 0, &[]);
    let b = fixture.action(0, 0, &[]);

    let start = SchedulingEvent::start(10, 1, a);
    let end = SchedulingEvent::end(10, 2, b);
    assert!(end < start);
    assert!(SchedulingEvent::start(9, 1, a) < end);
}

#[test]
fn test_high_priority_action_runs_first_on_single_slot() {
    let mut fixture = Fixture::new(0);
    let mut rs = scheduler(1, 1);

    let low = fixture.action(0, 0, &[]);
    let high = fixture.action(0, 1, &[]);
    let implementation = fixture.implementation(0, Some(4));
    rs.plan(&mut fixture.arena, low, implementation, 0).unwrap();
    let implementation = fixture.implementation(0, Some(10));
    rs.plan(&mut fixture.arena, high, implementation, 0).unwrap();
    assert_eq!(rs.placement(low).map(|p| p.start), Some(0));

    let result = OptimizationWorker::new(&fixture.arena, &rs).optimize(0, UNBOUNDED, 1);
    let placements = placement_index(&result);

    assert_eq!(placements[&high], (0, 10));
    assert_eq!(placements[&low], (10, 14));
    assert!(result.unplaced.is_empty());
    assert_eq!(result.last_gap_start, 14);

    rs.apply_optimization(&mut fixture.arena, result, 0).unwrap();
    let scheduling = fixture.arena.get(low).unwrap().scheduling;
    assert_eq!((scheduling.expected_start, scheduling.expected_end, scheduling.last_update), (10, 14, 1));
    assert_eq!(rs.placement(high).map(|p| (p.start, p.end)), Some((0, 10)));
}

#[test]
fn test_short_action_backfills_gap_before_wide_action() {
    let mut fixture = Fixture::new(10);
    let mut rs = scheduler(1, 2);

    let running = fixture.action(0, 0, &[]);
    let implementation = fixture.implementation(0, Some(5));
    rs.plan(&mut fixture.arena, running, implementation, 0).unwrap();
    rs.schedule(&mut fixture.arena, running).unwrap();
    fixture.arena.mark_running(running, 0).unwrap();

    let wide = fixture.action(1, 1, &[]);
    let short = fixture.action(0, 0, &[]);
    let implementation = fixture.implementation(1, None);
    rs.plan(&mut fixture.arena, wide, implementation, 0).unwrap();
    let implementation = fixture.implementation(0, Some(4));
    rs.plan(&mut fixture.arena, short, implementation, 0).unwrap();
    assert_eq!(rs.placement(short).map(|p| p.start), Some(15));

    let result = OptimizationWorker::new(&fixture.arena, &rs).optimize(0, UNBOUNDED, 7);
    let placements = placement_index(&result);

    assert_eq!(placements[&wide], (5, 15));
    assert_eq!(placements[&short], (0, 4));
    let wide_predecessors = result.resource_predecessors.iter().find(|(k, _)| *k == wide).map(|(_, p)| p.clone()).unwrap();
    assert!(wide_predecessors.contains(&running));
    assert!(wide_predecessors.contains(&short));
    assert!(result.gaps.iter().any(|g| (g.start, g.end, g.capacity) == (4, 5, 1)));

    rs.apply_optimization(&mut fixture.arena, result, 0).unwrap();
    assert_eq!(rs.placement(short).map(|p| (p.start, p.end)), Some((0, 4)));
    for instant in 0..30 {
        let mut total = rs.free_capacity_at(instant);
        total.increase(&rs.reserved_capacity_at(instant));
        assert_eq!(total, ResourceDescription::units(2), "capacity mismatch at {}", instant);
    }
}

#[test]
fn test_two_short_actions_share_one_vacated_gap() {
    let mut fixture = Fixture::new(10);
    let mut rs = scheduler(1, 2);

    let running = fixture.action(0, 0, &[]);
    let implementation = fixture.implementation(0, None);
    rs.plan(&mut fixture.arena, running, implementation, 0).unwrap();
    rs.schedule(&mut fixture.arena, running).unwrap();
    fixture.arena.mark_running(running, 0).unwrap();

    let wide = fixture.action(1, 1, &[]);
    let first = fixture.action(0, 0, &[]);
    let second = fixture.action(0, 0, &[]);
    let implementation = fixture.implementation(1, None);
    rs.plan(&mut fixture.arena, wide, implementation, 0).unwrap();
    for key in [first, second] {
        let implementation = fixture.implementation(0, Some(4));
        rs.plan(&mut fixture.arena, key, implementation, 0).unwrap();
    }

    let result = OptimizationWorker::new(&fixture.arena, &rs).optimize(0, UNBOUNDED, 1);
    let placements = placement_index(&result);

    assert_eq!(placements[&wide], (10, 20));
    assert_eq!(placements[&first], (0, 4));
    assert_eq!(placements[&second], (4, 8));

    let leftover = result.gaps.iter().find(|g| !g.is_unbounded()).unwrap();
    assert_eq!((leftover.start, leftover.end, leftover.origin, leftover.capacity), (8, 10, Some(second), 2));
    assert!(result.gaps.iter().filter(|g| g.is_unbounded()).all(|g| g.capacity == 0));
}

#[test]
fn test_local_data_successor_starts_after_its_predecessor() {
    let mut fixture = Fixture::new(5);
    let mut rs = scheduler(1, 2);

    let producer = fixture.action(0, 0, &[]);
    let consumer = fixture.action(0, 1, &[producer]);
    let implementation = fixture.implementation(0, None);
    rs.plan(&mut fixture.arena, producer, implementation, 0).unwrap();
    let implementation = fixture.implementation(0, Some(3));
    rs.plan(&mut fixture.arena, consumer, implementation, 0).unwrap();

    let result = OptimizationWorker::new(&fixture.arena, &rs).optimize(0, UNBOUNDED, 1);
    let placements = placement_index(&result);

    assert_eq!(placements[&producer], (0, 5));
    assert_eq!(placements[&consumer], (5, 8));
}

#[test]
fn test_actions_beyond_horizon_are_left_to_reschedule() {
    let mut fixture = Fixture::new(10);
    let mut rs = scheduler(1, 1);

    let keys: Vec<ActionKey> = (0..3).map(|_| fixture.action(0, 0, &[])).collect();
    for key in &keys {
        let implementation = fixture.implementation(0, None);
        rs.plan(&mut fixture.arena, *key, implementation, 0).unwrap();
    }

    let result = OptimizationWorker::new(&fixture.arena, &rs).optimize(0, 15, 3);
    assert_eq!(result.unplaced, vec![keys[2]]);
    assert_eq!(placement_index(&result)[&keys[1]], (10, 20));

    rs.apply_optimization(&mut fixture.arena, result, 0).unwrap();
    let scheduling = fixture.arena.get(keys[2]).unwrap().scheduling;
    assert!(scheduling.to_reschedule);
    assert_eq!(scheduling.expected_start, 20);
    assert!(rs.hosts(keys[2]));
}

#[test]
fn test_overloaded_worker_donates_to_idle_worker() {
    let mut fixture = Fixture::new(10);
    let mut workers = vec![scheduler(1, 1), scheduler(2, 1)];

    let keys: Vec<ActionKey> = (0..3).map(|_| fixture.action(0, 0, &[])).collect();
    for key in &keys {
        let implementation = fixture.implementation(0, None);
        workers[0].plan(&mut fixture.arena, *key, implementation, 0).unwrap();
    }
    assert_eq!(workers[0].last_gap_start(), 30);

    let mut optimizer = ScheduleOptimizer::new(None, 16);
    let report = optimizer.optimize(&mut fixture.arena, &mut workers, &fixture.cores, 0).unwrap();

    assert_eq!(report.donations, 1);
    assert_eq!(fixture.arena.get(keys[2]).unwrap().worker(), Some(WorkerId::new(2)));
    assert!(workers[1].hosts(keys[2]));
    assert!(!workers[0].hosts(keys[2]));
    assert_eq!(workers[0].last_gap_start(), 20);
    assert_eq!(workers[1].last_gap_start(), 10);
    assert!(report.released.contains(&keys[2]));
    assert_eq!(optimizer.last_update_id(), report.update_id);
}

#[test]
fn test_action_left_beyond_horizon_is_donated_first() {
    let mut fixture = Fixture::new(10);
    let mut workers = vec![scheduler(1, 1), scheduler(2, 1)];

    let keys: Vec<ActionKey> = (0..3).map(|_| fixture.action(0, 0, &[])).collect();
    for key in &keys {
        let implementation = fixture.implementation(0, None);
        workers[0].plan(&mut fixture.arena, *key, implementation, 0).unwrap();
    }

    let report = ScheduleOptimizer::new(Some(15), 1).optimize(&mut fixture.arena, &mut workers, &fixture.cores, 0).unwrap();

    assert_eq!(report.donations, 1);
    assert!(workers[1].hosts(keys[2]));
    assert!(workers[0].hosts(keys[1]));
    assert!(!fixture.arena.get(keys[2]).unwrap().scheduling.to_reschedule);
}

#[test]
fn test_donation_stops_at_round_limit() {
    let mut fixture = Fixture::new(10);
    let mut workers = vec![scheduler(1, 1), scheduler(2, 1), scheduler(3, 1)];

    let keys: Vec<ActionKey> = (0..6).map(|_| fixture.action(0, 0, &[])).collect();
    for key in &keys {
        let implementation = fixture.implementation(0, None);
        workers[0].plan(&mut fixture.arena, *key, implementation, 0).unwrap();
    }

    let report = ScheduleOptimizer::new(None, 1).optimize(&mut fixture.arena, &mut workers, &fixture.cores, 0).unwrap();

    assert_eq!(report.donations, 1);
    assert_eq!(workers[0].planned().len(), 5);
}
