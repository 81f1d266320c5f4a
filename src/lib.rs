// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Map-matching of GPS traces onto road networks.
//!
//! Noisy, sparsely-sampled positions are matched onto a [Graph] with a
//! [Hidden Markov Model](https://en.wikipedia.org/wiki/Hidden_Markov_model):
//! every observed position gets a set of nearby candidate nodes, and the
//! [Viterbi algorithm](https://en.wikipedia.org/wiki/Viterbi_algorithm) picks the
//! sequence of candidates which best balances closeness to the observations
//! against how plausible the travel between consecutive candidates is.
//! Gaps in the trace (tunnels, signal loss) are skipped over instead of failing the match.
//!
//! The decoder itself ([match_trace]) is independent of the graph: any [CandidateProvider]
//! and [DistanceOracle] can be plugged in. [GraphNetwork] implements both over a [Graph]
//! with a [KDTree] and A* searches.
//!
//! # Example
//!
//! ```no_run
//! let mut g = routex_match::Graph::default();
//! routex_match::reader::add_graph_from_file(
//!     &mut g,
//!     routex_match::reader::FileFormat::Unknown,
//!     "path/to/network.txt.gz",
//! ).expect("failed to load the network");
//! let trace = routex_match::reader::read_trace_from_file(
//!     routex_match::reader::FileFormat::Unknown,
//!     "path/to/trace.txt",
//! ).expect("failed to load the trace");
//!
//! let tree = routex_match::KDTree::from_iter(g.iter().cloned()).expect("empty network");
//! let mut network = routex_match::GraphNetwork::new(&g, &tree, Default::default())
//!     .expect("invalid candidate options");
//! let matched = routex_match::match_positions(&mut network, &Default::default(), &trace)
//!     .expect("failed to match the trace");
//!
//! for point in &matched.points {
//!     println!("{}: {:?}", point.cell.timestamp, point.candidate.location);
//! }
//! ```

mod astar;
mod distance;
mod graph;
mod kd;
pub mod matching;
mod network;
pub mod reader;

pub use astar::{find_route, AStar, AStarError, DEFAULT_STEP_LIMIT};
pub use distance::earth_distance;
pub use graph::Graph;
pub use kd::KDTree;
pub use matching::{
    match_positions, match_trace, Candidate, CandidateProvider, Cell, DistanceOracle,
    MatchError, MatchOptions, MatchTrace, MatchedPoint,
};
pub use network::{
    CandidateOptions, GraphNetwork, DEFAULT_MAX_CANDIDATES, DEFAULT_SEARCH_RADIUS,
};

/// Represents an element of the [Graph].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Node {
    pub id: i64,
    pub lat: f32,
    pub lon: f32,
}

impl Node {
    pub fn new(id: i64, lat: f32, lon: f32) -> Self {
        Self { id, lat, lon }
    }

    /// Returns the geographical position of the node.
    pub fn position(&self) -> Position {
        Position::new(self.lat, self.lon)
    }
}

/// Represents an outgoing (one-way) connection from a specific [Node].
///
/// `cost` must not be smaller than the crow-flies distance between the two nodes,
/// in kilometers, otherwise the A* heuristic is no longer admissible.
///
/// Due to implementation details, `to` might not exist in the [Graph].
/// Users must silently ignore such edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub to: i64,
    pub cost: f32,
}

/// A single observed position of a trace, in degrees.
///
/// The position's index in the trace acts as its timestamp; only the ordering
/// of observations matters for matching.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub lat: f32,
    pub lon: f32,
}

impl Position {
    pub fn new(lat: f32, lon: f32) -> Self {
        Self { lat, lon }
    }
}
