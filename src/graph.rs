// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use crate::{earth_distance, Edge, Node};
use std::collections::btree_map::{BTreeMap, Entry};

/// Represents a road network as a set of [Nodes](Node)
/// and one-way [Edges](Edge) between them.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Graph(BTreeMap<i64, (Node, Vec<Edge>)>);

impl Graph {
    /// Returns the number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns an iterator over all [Nodes](Node) in the graph.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.0.values().map(|(node, _)| node)
    }

    /// Retrieves a [Node] with the provided id.
    pub fn get_node(&self, id: i64) -> Option<Node> {
        self.0.get(&id).map(|&(node, _)| node)
    }

    /// Creates or updates a [Node] with `node.id`.
    ///
    /// All outgoing and incoming edges are preserved. Moving an existing node
    /// might violate the [Edge] cost invariant.
    pub fn set_node(&mut self, node: Node) {
        match self.0.entry(node.id) {
            Entry::Vacant(e) => {
                e.insert((node, Vec::default()));
            }
            Entry::Occupied(mut e) => {
                e.get_mut().0 = node;
            }
        }
    }

    /// Gets all outgoing [Edges](Edge) from a node with a given id.
    pub fn get_edges(&self, from_id: i64) -> &[Edge] {
        self.0
            .get(&from_id)
            .map(|(_, e)| e.as_slice())
            .unwrap_or_default()
    }

    /// Gets the cost of an [Edge] from one node to another.
    /// If such an edge doesn't exist, returns [f32::INFINITY].
    pub fn get_edge(&self, from_id: i64, to_id: i64) -> f32 {
        self.get_edges(from_id)
            .iter()
            .find(|edge| edge.to == to_id)
            .map(|edge| edge.cost)
            .unwrap_or(f32::INFINITY)
    }

    /// Creates or updates an [Edge] from a node with a given id.
    /// Does nothing if the `from_id` node doesn't exist.
    pub fn set_edge(&mut self, from_id: i64, edge: Edge) {
        if let Some((_, edges)) = self.0.get_mut(&from_id) {
            if let Some(existing) = edges.iter_mut().find(|e| e.to == edge.to) {
                *existing = edge;
            } else {
                edges.push(edge);
            }
        }
    }

    /// Creates an [Edge] between two existing nodes with the crow-flies distance as its cost.
    /// Returns false if either node is missing.
    pub fn connect(&mut self, from_id: i64, to_id: i64) -> bool {
        match (self.get_node(from_id), self.get_node(to_id)) {
            (Some(from), Some(to)) => {
                let cost = earth_distance(from.lat, from.lon, to.lat, to.lon);
                self.set_edge(from_id, Edge { to: to_id, cost });
                true
            }
            _ => false,
        }
    }

    /// Measures the geographical length of a path of node ids, in meters.
    ///
    /// Unlike the sum of edge costs, the result is not affected by any penalties
    /// and is directly comparable with great-circle distances between positions.
    /// Returns [None] if any of the nodes doesn't exist.
    pub fn path_length(&self, path: &[i64]) -> Option<f64> {
        let mut length = 0.0;
        let mut previous: Option<Node> = None;

        for &id in path {
            let node = self.get_node(id)?;
            if let Some(prev) = previous {
                length += prev.position().distance_to(&node.position());
            }
            previous = Some(node);
        }

        Some(length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_graph() -> Graph {
        let mut g = Graph::default();
        g.set_node(Node::new(1, 0.0, 0.0));
        g.set_node(Node::new(2, 0.0, 0.001));
        g.set_node(Node::new(3, 0.0, 0.002));
        g.connect(1, 2);
        g.connect(2, 3);
        g
    }

    #[test]
    fn edges() {
        let mut g = simple_graph();
        assert_eq!(g.len(), 3);
        assert!(g.get_edge(1, 2).is_finite());
        assert!(g.get_edge(2, 1).is_infinite());
        assert!(!g.connect(1, 42));

        g.set_edge(1, Edge { to: 2, cost: 5.0 });
        assert_eq!(g.get_edge(1, 2), 5.0);
        assert_eq!(g.get_edges(1).len(), 1);
    }

    #[test]
    fn path_length() {
        let g = simple_graph();
        let length = g.path_length(&[1, 2, 3]).unwrap();
        assert!((length - 222.39).abs() < 0.1, "{}", length);
        assert_eq!(g.path_length(&[2]), Some(0.0));
        assert_eq!(g.path_length(&[]), Some(0.0));
        assert_eq!(g.path_length(&[1, 7]), None);
    }
}
