use crate::domain::scheduler::action::{ActionKey, ActionKind, ActionState};
use crate::domain::scheduler::action_arena::{ActionArena, ErrorOutcome};
use crate::domain::utils::id::{CoreId, TaskId};
use crate::error::Error;

// --- HELPER FUNCTIONS ---

fn task(arena: &mut ActionArena, id: u64, preds: &[ActionKey]) -> ActionKey {
    arena.create(ActionKind::Task { task_id: TaskId::new(id), core_id: CoreId::new(0) }, 0, preds)
}

fn run(arena: &mut ActionArena, key: ActionKey) {
    arena.mark_scheduled(key).unwrap();
    arena.mark_running(key, 0).unwrap();
}

// --- TESTS ---

#[test]
fn test_action_without_predecessors_is_executable_at_creation() {
    let mut arena = ActionArena::new();
    let a = task(&mut arena, 1, &[]);
    assert_eq!(arena.state(a), Some(ActionState::Executable));
    assert_eq!(arena.get(a).unwrap().id, 1);
}

#[test]
fn test_chain_releases_one_successor_at_a_time() {
    let mut arena = ActionArena::new();
    let t1 = task(&mut arena, 1, &[]);
    let t2 = task(&mut arena, 2, &[t1]);
    let t3 = task(&mut arena, 3, &[t2]);

    assert_eq!(arena.get(t2).unwrap().data_predecessors(), &[t1]);
    assert_eq!(arena.get(t3).unwrap().data_predecessors(), &[t2]);
    assert_eq!(arena.state(t2), Some(ActionState::Pending));

    run(&mut arena, t1);
    assert_eq!(arena.completed(t1).unwrap(), vec![t2]);
    assert_eq!(arena.state(t2), Some(ActionState::Executable));
    assert_eq!(arena.state(t3), Some(ActionState::Pending));

    run(&mut arena, t2);
    assert_eq!(arena.completed(t2).unwrap(), vec![t3]);
    assert_eq!(arena.state(t3), Some(ActionState::Executable));
}

#[test]
fn test_terminal_failure_cascades_through_data_edges() {
    let mut arena = ActionArena::new();
    let t1 = task(&mut arena, 1, &[]);
    let t2 = task(&mut arena, 2, &[t1]);
    let t3 = task(&mut arena, 3, &[t2]);

    run(&mut arena, t1);
    let outcome = arena.error(t1, 0).unwrap();

    let cascade = match outcome {
        ErrorOutcome::Failed(cascade) => cascade,
        other => panic!("expected a terminal failure, got {:?}", other),
    };
    assert_eq!(cascade.failed, vec![t1, t2, t3]);
    assert!(cascade.freed.is_empty());
    for key in [t1, t2, t3] {
        assert_eq!(arena.state(key), Some(ActionState::Failed));
    }
    assert!(arena.get(t2).unwrap().started_at().is_none());
}

#[test]
fn test_resource_only_successor_is_freed_not_failed() {
    let mut arena = ActionArena::new();
    let a = task(&mut arena, 1, &[]);
    let blocker = task(&mut arena, 2, &[]);
    let b = task(&mut arena, 3, &[blocker]);
    assert!(arena.add_resource_predecessor(b, a).unwrap());

    run(&mut arena, blocker);
    assert!(arena.completed(blocker).unwrap().is_empty());

    let cascade = arena.failed(a).unwrap();
    assert_eq!(cascade.failed, vec![a]);
    assert_eq!(cascade.freed, vec![b]);
    assert_eq!(arena.state(b), Some(ActionState::Executable));
}

#[test]
fn test_no_successor_is_released_twice() {
    let mut arena = ActionArena::new();
    let a = task(&mut arena, 1, &[]);
    let b = task(&mut arena, 2, &[]);
    let join = task(&mut arena, 3, &[a, b]);
    assert!(arena.add_resource_predecessor(join, a).unwrap());

    run(&mut arena, a);
    run(&mut arena, b);
    assert!(arena.completed(a).unwrap().is_empty());
    assert_eq!(arena.completed(b).unwrap(), vec![join]);

    assert!(arena.completed(b).is_err());
    assert!(!arena.release_if_ready(join));
}

#[test]
fn test_retries_until_budget_is_exhausted() {
    let mut arena = ActionArena::new();
    let a = task(&mut arena, 1, &[]);

    for attempt in 1..=2 {
        run(&mut arena, a);
        assert_eq!(arena.error(a, 2).unwrap(), ErrorOutcome::Retry { attempt });
        assert_eq!(arena.state(a), Some(ActionState::Executable));
    }

    run(&mut arena, a);
    assert!(matches!(arena.error(a, 2).unwrap(), ErrorOutcome::Failed(_)));
    assert_eq!(arena.get(a).unwrap().retries(), 3);
}

#[test]
fn test_cancelled_running_action_fails_on_error() {
    let mut arena = ActionArena::new();
    let a = task(&mut arena, 1, &[]);
    assert!(!arena.mark_cancelled(a));

    run(&mut arena, a);
    assert!(arena.mark_cancelled(a));
    assert!(matches!(arena.error(a, 5).unwrap(), ErrorOutcome::Failed(_)));
}

#[test]
fn test_new_action_after_failed_predecessor_fails() {
    let mut arena = ActionArena::new();
    let a = task(&mut arena, 1, &[]);
    arena.failed(a).unwrap();

    let b = task(&mut arena, 2, &[a]);
    assert_eq!(arena.state(b), Some(ActionState::Failed));
}

#[test]
fn test_completed_predecessor_is_ignored() {
    let mut arena = ActionArena::new();
    let a = task(&mut arena, 1, &[]);
    run(&mut arena, a);
    arena.completed(a).unwrap();

    let b = task(&mut arena, 2, &[a]);
    assert_eq!(arena.state(b), Some(ActionState::Executable));
    assert!(arena.get(b).unwrap().data_predecessors().is_empty());
}

#[test]
fn test_predecessors_only_added_while_pending() {
    let mut arena = ActionArena::new();
    let a = task(&mut arena, 1, &[]);
    let b = task(&mut arena, 2, &[]);

    let result = arena.add_data_predecessor(b, a);
    assert!(matches!(result, Err(Error::InvalidTransition { operation: "add data predecessor", .. })));
}

#[test]
fn test_resource_edges_only_point_to_newer_actions() {
    let mut arena = ActionArena::new();
    let root = task(&mut arena, 1, &[]);
    let older = task(&mut arena, 2, &[root]);
    let newer = task(&mut arena, 3, &[]);

    assert!(!arena.add_resource_predecessor(older, newer).unwrap());
    assert!(arena.get(older).unwrap().resource_predecessors().is_empty());
}

#[test]
fn test_unlinking_keeps_resource_chain_connected() {
    let mut arena = ActionArena::new();
    let root = task(&mut arena, 1, &[]);
    let a = task(&mut arena, 2, &[]);
    let b = task(&mut arena, 3, &[root]);
    let c = task(&mut arena, 4, &[root]);
    arena.add_resource_predecessor(b, a).unwrap();
    arena.add_resource_predecessor(c, b).unwrap();

    assert!(arena.unlink_resource_chain(b).is_empty());
    assert_eq!(arena.get(c).unwrap().resource_predecessors(), &[a]);
    assert!(arena.get(a).unwrap().resource_successors().contains(&c));
    assert!(arena.get(b).unwrap().resource_predecessors().is_empty());
}

#[test]
fn test_remove_only_drops_terminal_actions() {
    let mut arena = ActionArena::new();
    let a = task(&mut arena, 1, &[]);
    assert!(arena.remove(a).is_none());

    run(&mut arena, a);
    arena.completed(a).unwrap();
    assert!(arena.remove(a).is_some());
    assert!(arena.is_empty());
}
