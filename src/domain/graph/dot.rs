use std::fmt::{Debug, Display, Write};

use crate::domain::graph::graph::Graph;

/// Node descriptor used when rendering a graph.
pub trait DotNode {
    /// Human readable label line of the node.
    fn dot_label(&self) -> String;

    /// Extra node attributes, e.g. `color=red`.
    fn dot_attributes(&self) -> Option<String> {
        None
    }
}

/// Renders the graph in dot format: one node per element and one edge per dependency.
pub fn to_dot<K, T>(graph: &Graph<K, T>, name: &str) -> String
where
    K: Ord + Copy + Debug + Display,
    T: DotNode,
{
    let mut out = String::new();
    let _ = writeln!(out, "digraph {} {{", name);
    let _ = writeln!(out, "  rankdir=TB;");

    for (key, element) in graph.iter() {
        let label = element.dot_label().replace('"', "\\\"");
        match element.dot_attributes() {
            Some(attributes) => {
                let _ = writeln!(out, "  {} [label=\"{}\", {}];", key, label, attributes);
            }
            None => {
                let _ = writeln!(out, "  {} [label=\"{}\"];", key, label);
            }
        }
    }

    for (source, target) in graph.edges() {
        let _ = writeln!(out, "  {} -> {};", source, target);
    }

    out.push('}');
    out.push('\n');
    out
}
