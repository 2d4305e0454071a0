use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct Node<K: Ord, T> {
    pub element: T,
    pub predecessors: BTreeSet<K>,
    pub successors: BTreeSet<K>,
}

/// Directed graph keyed by an ordered key. Iteration follows key order, which keeps
/// introspection output stable.
#[derive(Debug, Clone)]
pub struct Graph<K: Ord, T> {
    nodes: BTreeMap<K, Node<K, T>>,
}

impl<K: Ord + Copy + Debug, T> Graph<K, T> {
    pub fn new() -> Self {
        Graph { nodes: BTreeMap::new() }
    }

    /// Inserts a node. An existing node under the same key keeps its edges and gets the new element.
    pub fn add_node(&mut self, key: K, element: T) {
        match self.nodes.get_mut(&key) {
            Some(node) => node.element = element,
            None => {
                self.nodes.insert(key, Node { element, predecessors: BTreeSet::new(), successors: BTreeSet::new() });
            }
        }
    }

    pub fn get(&self, key: &K) -> Option<&T> {
        self.nodes.get(key).map(|n| &n.element)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut T> {
        self.nodes.get_mut(key).map(|n| &mut n.element)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.nodes.contains_key(key)
    }

    /// Adds the edge `source -> target`.
    ///
    /// # Errors
    /// `Error::NodeNotFound` if either end is missing.
    pub fn add_edge(&mut self, source: K, target: K) -> Result<()> {
        if !self.nodes.contains_key(&target) {
            return Err(Error::NodeNotFound(format!("{:?}", target)));
        }
        let source_node = self.nodes.get_mut(&source).ok_or_else(|| Error::NodeNotFound(format!("{:?}", source)))?;
        source_node.successors.insert(target);

        if let Some(target_node) = self.nodes.get_mut(&target) {
            target_node.predecessors.insert(source);
        }
        Ok(())
    }

    pub fn remove_edge(&mut self, source: K, target: K) -> Result<()> {
        let source_node = self.nodes.get_mut(&source).ok_or_else(|| Error::NodeNotFound(format!("{:?}", source)))?;
        source_node.successors.remove(&target);

        let target_node = self.nodes.get_mut(&target).ok_or_else(|| Error::NodeNotFound(format!("{:?}", target)))?;
        target_node.predecessors.remove(&source);
        Ok(())
    }

    /// Removes a node and every edge touching it.
    pub fn remove_node(&mut self, key: &K) -> Option<T> {
        let node = self.nodes.remove(key)?;

        for pred in &node.predecessors {
            if let Some(p) = self.nodes.get_mut(pred) {
                p.successors.remove(key);
            }
        }
        for succ in &node.successors {
            if let Some(s) = self.nodes.get_mut(succ) {
                s.predecessors.remove(key);
            }
        }
        Some(node.element)
    }

    pub fn predecessors(&self, key: &K) -> impl Iterator<Item = &K> {
        self.nodes.get(key).into_iter().flat_map(|n| n.predecessors.iter())
    }

    pub fn successors(&self, key: &K) -> impl Iterator<Item = &K> {
        self.nodes.get(key).into_iter().flat_map(|n| n.successors.iter())
    }

    pub fn has_predecessors(&self, key: &K) -> bool {
        self.nodes.get(key).is_some_and(|n| !n.predecessors.is_empty())
    }

    pub fn has_successors(&self, key: &K) -> bool {
        self.nodes.get(key).is_some_and(|n| !n.successors.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &T)> {
        self.nodes.iter().map(|(k, n)| (k, &n.element))
    }

    pub fn edges(&self) -> impl Iterator<Item = (K, K)> + '_ {
        self.nodes.iter().flat_map(|(k, n)| n.successors.iter().map(move |s| (*k, *s)))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl<K: Ord + Copy + Debug, T> Default for Graph<K, T> {
    fn default() -> Self {
        Graph::new()
    }
}
