// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use log::debug;

use crate::matching::{Candidate, CandidateProvider, DistanceOracle, MatchError};
use crate::{AStar, Graph, KDTree, Node, Position, DEFAULT_STEP_LIMIT};

/// Default maximum distance between an observation and its candidates, in meters.
pub const DEFAULT_SEARCH_RADIUS: f64 = 50.0;

/// Default maximum number of candidates per observation.
pub const DEFAULT_MAX_CANDIDATES: usize = 8;

/// Controls how [GraphNetwork] looks up candidates and network distances.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateOptions {
    /// Only nodes within this distance from an observation, in meters, become its candidates.
    pub search_radius: f64,

    /// Only this many closest nodes become candidates of an observation.
    pub max_candidates: usize,

    /// Step limit of every A* search between two candidates.
    /// Exceeding it makes the candidates unreachable from one another.
    pub step_limit: usize,
}

impl Default for CandidateOptions {
    fn default() -> Self {
        Self {
            search_radius: DEFAULT_SEARCH_RADIUS,
            max_candidates: DEFAULT_MAX_CANDIDATES,
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }
}

/// Map-matching view of a [Graph]: candidates are nodes found with a [KDTree],
/// and network distances are lengths of A* routes between them.
///
/// Holds its own A* search state, so every thread matching traces needs its own
/// [GraphNetwork]. The [Graph] and [KDTree] may be shared.
#[derive(Debug)]
pub struct GraphNetwork<'a> {
    graph: &'a Graph,
    tree: &'a KDTree,
    options: CandidateOptions,
    search: AStar,
}

impl CandidateOptions {
    fn validate(&self) -> Result<(), MatchError> {
        if self.search_radius.is_nan() || self.search_radius < 0.0 {
            return Err(MatchError::InvalidOption("search_radius must not be negative"));
        }
        Ok(())
    }
}

impl<'a> GraphNetwork<'a> {
    /// Creates a network over a graph and a [KDTree] built from the same graph.
    ///
    /// Fails with [MatchError::InvalidOption] if the search radius is negative or NaN.
    pub fn new(
        graph: &'a Graph,
        tree: &'a KDTree,
        options: CandidateOptions,
    ) -> Result<Self, MatchError> {
        options.validate()?;
        Ok(Self {
            graph,
            tree,
            options,
            search: AStar::new(),
        })
    }

    pub fn graph(&self) -> &'a Graph {
        self.graph
    }

    pub fn options(&self) -> &CandidateOptions {
        &self.options
    }
}

impl CandidateProvider for GraphNetwork<'_> {
    type Location = Node;

    fn candidates(&self, position: Position) -> Vec<Candidate<Node>> {
        self.tree
            .find_nearest_nodes(
                position.lat,
                position.lon,
                (self.options.search_radius / 1000.0) as f32,
                self.options.max_candidates,
            )
            .into_iter()
            .map(|(node, _)| Candidate::new(node, position.distance_to(&node.position())))
            .collect()
    }
}

impl DistanceOracle<Node> for GraphNetwork<'_> {
    fn network_distance(&mut self, from: &Node, to: &Node) -> Option<f64> {
        match self
            .search
            .find_route(self.graph, from.id, to.id, self.options.step_limit)
        {
            Ok(route) if route.is_empty() => None,
            Ok(route) => self.graph.path_length(&route),
            Err(e) => {
                debug!("no network distance from {} to {}: {}", from.id, to.id, e);
                None
            }
        }
    }
}
