use crate::domain::resource::core_element::{CoreRegistry, Implementation};
use crate::domain::resource::resource_description::ResourceDescription;
use crate::domain::resource::worker::Worker;
use crate::domain::scheduler::action::{ActionKey, ActionKind};
use crate::domain::scheduler::action_arena::ActionArena;
use crate::domain::scheduler::resource_scheduler::ResourceScheduler;
use crate::domain::utils::id::{CoreId, TaskId, WorkerId};
use crate::error::Error;

// --- HELPER FUNCTIONS ---

fn implementation(units: i64, duration: i64) -> Implementation {
    let mut cores = CoreRegistry::new();
    let core = cores.register("work", vec![(ResourceDescription::units(units), Some(duration))]).unwrap();
    cores.implementations(core)[0].clone()
}

fn scheduler(units: i64) -> ResourceScheduler {
    ResourceScheduler::new(Worker::new(WorkerId::new(1), "w1", ResourceDescription::units(units)))
}

fn action(arena: &mut ActionArena, preds: &[ActionKey]) -> ActionKey {
    let id = arena.len() as u64 + 1;
    arena.create(ActionKind::Task { task_id: TaskId::new(id), core_id: CoreId::new(0) }, 0, preds)
}

fn assert_accounting(scheduler: &ResourceScheduler, from: i64, to: i64) {
    for instant in from..to {
        let mut total = scheduler.free_capacity_at(instant);
        total.increase(&scheduler.reserved_capacity_at(instant));
        assert_eq!(total, scheduler.worker().capacity, "capacity mismatch at {}", instant);
    }
}

// --- TESTS ---

#[test]
fn test_gap_accounting_holds_while_planning() {
    let mut arena = ActionArena::new();
    let mut rs = scheduler(2);

    let a = action(&mut arena, &[]);
    let b = action(&mut arena, &[]);
    let c = action(&mut arena, &[]);
    rs.plan(&mut arena, a, implementation(1, 10), 0).unwrap();
    rs.plan(&mut arena, b, implementation(2, 5), 0).unwrap();
    rs.plan(&mut arena, c, implementation(1, 3), 0).unwrap();

    assert_eq!(rs.placement(a).map(|p| (p.start, p.end)), Some((0, 10)));
    assert_eq!(rs.placement(b).map(|p| (p.start, p.end)), Some((10, 15)));
    assert_eq!(rs.placement(c).map(|p| (p.start, p.end)), Some((15, 18)));
    assert_eq!(arena.get(b).unwrap().scheduling.expected_end, 15);
    assert_eq!(rs.last_gap_start(), 18);

    // The unit left idle next to `a` stays available as a bounded gap.
    assert_eq!(rs.free_capacity_at(5), ResourceDescription::units(1));
    assert_accounting(&rs, 0, 40);
}

#[test]
fn test_pending_action_waits_for_the_action_freeing_its_capacity() {
    let mut arena = ActionArena::new();
    let mut rs = scheduler(1);
    let root = action(&mut arena, &[]);

    let a = action(&mut arena, &[]);
    let d = action(&mut arena, &[root]);
    rs.plan(&mut arena, a, implementation(1, 10), 0).unwrap();
    rs.plan(&mut arena, d, implementation(1, 4), 0).unwrap();

    assert_eq!(arena.get(d).unwrap().resource_predecessors(), &[a]);
    assert_eq!(rs.placement(d).map(|p| p.start), Some(10));

    // Executable actions keep no resource edge; the reservation guards them.
    let e = action(&mut arena, &[]);
    rs.plan(&mut arena, e, implementation(1, 1), 0).unwrap();
    assert!(arena.get(e).unwrap().resource_predecessors().is_empty());
}

#[test]
fn test_insufficient_resources_parks_action_until_release() {
    let mut arena = ActionArena::new();
    let mut rs = scheduler(1);
    let a = action(&mut arena, &[]);
    let b = action(&mut arena, &[]);
    rs.plan(&mut arena, a, implementation(1, 10), 0).unwrap();
    rs.plan(&mut arena, b, implementation(1, 10), 0).unwrap();

    rs.schedule(&mut arena, a).unwrap();
    let rejected = rs.schedule(&mut arena, b);
    assert!(matches!(rejected, Err(Error::InsufficientResources { .. })));

    rs.enqueue_blocked(b);
    assert_eq!(rs.pop_launchable(), None);

    arena.mark_running(a, 0).unwrap();
    arena.completed(a).unwrap();
    rs.release(a, 6);
    assert_eq!(rs.pop_launchable(), Some(b));
    rs.schedule(&mut arena, b).unwrap();
    assert_eq!(rs.hosted(), &[b]);
}

#[test]
fn test_early_release_frees_capacity_from_now() {
    let mut arena = ActionArena::new();
    let mut rs = scheduler(1);
    let a = action(&mut arena, &[]);
    rs.plan(&mut arena, a, implementation(1, 10), 0).unwrap();
    rs.schedule(&mut arena, a).unwrap();

    rs.release(a, 4);

    assert_eq!(rs.free_capacity_at(4), ResourceDescription::units(1));
    assert_eq!(rs.worker().available(), ResourceDescription::units(1));
    assert_eq!(rs.last_gap_start(), 4);
    assert_accounting(&rs, 4, 30);
}

#[test]
fn test_early_release_under_later_placement_keeps_accounting() {
    let mut arena = ActionArena::new();
    let mut rs = scheduler(1);
    let a = action(&mut arena, &[]);
    let b = action(&mut arena, &[]);
    rs.plan(&mut arena, a, implementation(1, 10), 0).unwrap();
    rs.plan(&mut arena, b, implementation(1, 5), 0).unwrap();
    rs.schedule(&mut arena, a).unwrap();

    rs.release(a, 4);

    assert_eq!(rs.free_capacity_at(6), ResourceDescription::units(1));
    assert_eq!(rs.reserved_capacity_at(12), ResourceDescription::units(1));
    assert_accounting(&rs, 4, 30);
}

#[test]
fn test_unschedule_relinks_resource_chain() {
    let mut arena = ActionArena::new();
    let mut rs = scheduler(1);
    let root = action(&mut arena, &[]);
    let a = action(&mut arena, &[]);
    let b = action(&mut arena, &[root]);
    let c = action(&mut arena, &[root]);
    rs.plan(&mut arena, a, implementation(1, 10), 0).unwrap();
    rs.plan(&mut arena, b, implementation(1, 10), 0).unwrap();
    rs.plan(&mut arena, c, implementation(1, 10), 0).unwrap();
    assert_eq!(arena.get(c).unwrap().resource_predecessors(), &[b]);

    let freed = rs.unschedule_action(&mut arena, b);

    assert!(freed.is_empty());
    assert_eq!(arena.get(c).unwrap().resource_predecessors(), &[a]);
    assert!(!rs.hosts(b));
    assert_accounting(&rs, 0, 50);
}

#[test]
fn test_unschedule_frees_successor_without_other_predecessor() {
    let mut arena = ActionArena::new();
    let mut rs = scheduler(1);
    let a = action(&mut arena, &[]);
    let root = action(&mut arena, &[]);
    let b = action(&mut arena, &[root]);
    rs.plan(&mut arena, a, implementation(1, 10), 0).unwrap();
    rs.plan(&mut arena, b, implementation(1, 10), 0).unwrap();

    arena.mark_scheduled(root).unwrap();
    arena.mark_running(root, 0).unwrap();
    assert!(arena.completed(root).unwrap().is_empty());

    assert_eq!(rs.unschedule_action(&mut arena, a), vec![b]);
}

#[test]
fn test_best_implementation_prefers_earliest_completion() {
    let mut cores = CoreRegistry::new();
    let core = cores
        .register("work", vec![(ResourceDescription::units(1), Some(50)), (ResourceDescription::units(2), Some(10))])
        .unwrap();
    let mut arena = ActionArena::new();
    let rs = scheduler(2);
    let a = action(&mut arena, &[]);

    let (chosen, score) = rs.best_implementation(&arena, a, cores.implementations(core), 0).unwrap();
    assert_eq!(chosen.key.impl_id, 1);
    assert_eq!(score.expected_end(), 10);

    let small = scheduler(1);
    let (chosen, _) = small.best_implementation(&arena, a, cores.implementations(core), 0).unwrap();
    assert_eq!(chosen.key.impl_id, 0);
}

#[test]
fn test_plan_rejects_implementation_larger_than_worker() {
    let mut arena = ActionArena::new();
    let mut rs = scheduler(1);
    let a = action(&mut arena, &[]);

    let result = rs.plan(&mut arena, a, implementation(4, 1), 0);
    assert!(matches!(result, Err(Error::InsufficientResources { .. })));
    assert!(arena.get(a).unwrap().worker().is_none());
}
