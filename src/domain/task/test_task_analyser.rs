use crate::domain::data::access::{AccessMode, DataReference};
use crate::domain::data::data_registry::DataRegistry;
use crate::domain::task::task::{Parameter, TaskDescription, TaskState};
use crate::domain::task::task_analyser::TaskAnalyser;
use crate::domain::utils::id::{AppId, CoreId};
use crate::error::Error;

const APP: AppId = AppId::new(1);

fn file(direction: AccessMode, name: &str) -> Parameter {
    Parameter::new(direction, DataReference::File(name.to_string()))
}

fn task(signature: &str, parameters: Vec<Parameter>) -> TaskDescription {
    TaskDescription::new(CoreId::new(0), signature, parameters)
}

#[test]
fn test_chain_builds_read_after_write_edges() {
    let mut registry = DataRegistry::new();
    let mut analyser = TaskAnalyser::new();

    let (t1, a1) = analyser.analyse(APP, task("produce", vec![file(AccessMode::W, "x")]), &mut registry).unwrap();
    let (t2, a2) = analyser.analyse(APP, task("transform", vec![file(AccessMode::R, "x"), file(AccessMode::W, "y")]), &mut registry).unwrap();
    let (t3, a3) = analyser.analyse(APP, task("consume", vec![file(AccessMode::R, "y")]), &mut registry).unwrap();

    assert!(a1.predecessors.is_empty());
    assert_eq!(a2.predecessors, vec![t1]);
    assert_eq!(a3.predecessors, vec![t2]);
    assert_eq!(analyser.pending_tasks(APP), 3);
    assert_eq!(analyser.graph().edges().collect::<Vec<_>>(), vec![(t1, t2), (t2, t3)]);
}

#[test]
fn test_write_after_write_has_no_dependency() {
    let mut registry = DataRegistry::new();
    let mut analyser = TaskAnalyser::new();

    analyser.analyse(APP, task("a", vec![file(AccessMode::W, "x")]), &mut registry).unwrap();
    let (_, second) = analyser.analyse(APP, task("b", vec![file(AccessMode::W, "x")]), &mut registry).unwrap();

    assert!(second.predecessors.is_empty());
}

#[test]
fn test_inout_depends_on_previous_writer_but_not_on_itself() {
    let mut registry = DataRegistry::new();
    let mut analyser = TaskAnalyser::new();

    let (t1, _) = analyser.analyse(APP, task("init", vec![file(AccessMode::W, "acc")]), &mut registry).unwrap();
    let (t2, a2) = analyser.analyse(APP, task("update", vec![file(AccessMode::RW, "acc")]), &mut registry).unwrap();
    let (_, a3) = analyser.analyse(APP, task("update", vec![file(AccessMode::RW, "acc")]), &mut registry).unwrap();

    assert_eq!(a2.predecessors, vec![t1]);
    assert_eq!(a3.predecessors, vec![t2]);

    let (_, own) = analyser.analyse(APP, task("self", vec![file(AccessMode::W, "s"), file(AccessMode::R, "s")]), &mut registry).unwrap();
    assert!(own.predecessors.is_empty());
}

#[test]
fn test_unknown_read_rejects_task_without_side_effects() {
    let mut registry = DataRegistry::new();
    let mut analyser = TaskAnalyser::new();

    let result = analyser.analyse(APP, task("bad", vec![file(AccessMode::W, "out"), file(AccessMode::R, "nope")]), &mut registry);

    assert!(matches!(result, Err(Error::Resolution(_))));
    assert_eq!(analyser.live_tasks(), 0);
    assert_eq!(analyser.pending_tasks(APP), 0);
    assert!(!registry.already_accessed("out"));
}

#[test]
fn test_reader_of_ended_writer_has_no_predecessor() {
    let mut registry = DataRegistry::new();
    let mut analyser = TaskAnalyser::new();

    let (t1, _) = analyser.analyse(APP, task("produce", vec![file(AccessMode::W, "x")]), &mut registry).unwrap();
    let end = analyser.task_ended(t1, true).unwrap();
    assert!(end.app_drained);
    assert!(analyser.last_writer(end.accesses[0].data_id()).is_none());

    let (_, analysis) = analyser.analyse(APP, task("consume", vec![file(AccessMode::R, "x")]), &mut registry).unwrap();
    assert!(analysis.predecessors.is_empty());
    assert_eq!(analyser.finished_tasks(), 1);
}

#[test]
fn test_dot_marks_states() {
    let mut registry = DataRegistry::new();
    let mut analyser = TaskAnalyser::new();

    let (t1, _) = analyser.analyse(APP, task("produce", vec![file(AccessMode::W, "x")]), &mut registry).unwrap();
    let (t2, _) = analyser.analyse(APP, task("consume", vec![file(AccessMode::R, "x")]), &mut registry).unwrap();

    assert_eq!(analyser.get(t1).unwrap().state, TaskState::ToExecute);
    let dot = analyser.to_dot();
    assert!(dot.contains(&format!("{} -> {};", t1, t2)));
    assert!(dot.contains("produce [1]"));
}

#[test]
fn test_app_bookkeeping_is_only_dropped_when_drained() {
    let mut registry = DataRegistry::new();
    let mut analyser = TaskAnalyser::new();

    let (t1, analysis) = analyser.analyse(APP, task("produce", vec![file(AccessMode::W, "x")]), &mut registry).unwrap();
    assert!(!analyser.forget_app(APP));

    analyser.forget_writer(analysis.accesses[0].data_id());
    let (_, reader) = analyser.analyse(APP, task("consume", vec![file(AccessMode::R, "x")]), &mut registry).unwrap();
    assert!(reader.predecessors.is_empty());

    analyser.task_ended(t1, true).unwrap();
    assert_eq!(analyser.pending_tasks(APP), 1);
}
