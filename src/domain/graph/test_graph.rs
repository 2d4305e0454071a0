use crate::domain::graph::dot::{DotNode, to_dot};
use crate::domain::graph::graph::Graph;
use crate::error::Error;

struct Label(&'static str);

impl DotNode for Label {
    fn dot_label(&self) -> String {
        self.0.to_string()
    }
}

fn chain() -> Graph<u64, Label> {
    let mut graph = Graph::new();
    graph.add_node(1, Label("t1"));
    graph.add_node(2, Label("t2"));
    graph.add_node(3, Label("t3"));
    graph.add_edge(1, 2).unwrap();
    graph.add_edge(2, 3).unwrap();
    graph
}

#[test]
fn test_edges_are_bidirectional() {
    let graph = chain();

    assert_eq!(graph.successors(&1).copied().collect::<Vec<_>>(), vec![2]);
    assert_eq!(graph.predecessors(&3).copied().collect::<Vec<_>>(), vec![2]);
    assert!(!graph.has_predecessors(&1));
    assert!(graph.has_successors(&2));
}

#[test]
fn test_edge_to_missing_node_fails() {
    let mut graph = chain();
    assert!(matches!(graph.add_edge(1, 9), Err(Error::NodeNotFound(_))));
    assert!(matches!(graph.add_edge(9, 1), Err(Error::NodeNotFound(_))));
    assert_eq!(graph.edges().count(), 2);
}

#[test]
fn test_remove_node_detaches_edges() {
    let mut graph = chain();
    assert!(graph.remove_node(&2).is_some());

    assert!(!graph.has_successors(&1));
    assert!(!graph.has_predecessors(&3));
    assert_eq!(graph.len(), 2);
    assert!(graph.remove_node(&2).is_none());
}

#[test]
fn test_dot_output_lists_nodes_and_edges() {
    let dot = to_dot(&chain(), "G");

    assert!(dot.starts_with("digraph G {"));
    assert!(dot.contains("1 [label=\"t1\"];"));
    assert!(dot.contains("1 -> 2;"));
    assert!(dot.contains("2 -> 3;"));
    assert!(dot.trim_end().ends_with('}'));
}
