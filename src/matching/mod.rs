// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Hidden Markov Model map matching.

pub mod probability;
mod trace;
mod viterbi;

pub use trace::{Diagnostics, MatchTrace, MatchedPoint, StateRecord, TransitionRecord};
pub use viterbi::match_trace;

use crate::Position;

/// Default standard deviation of GPS positional noise, in meters.
pub const DEFAULT_SIGMA_Z: f64 = 4.07;

/// Default scale of the route-vs-beeline mismatch distribution, in meters.
pub const DEFAULT_BETA: f64 = 10.0;

/// Default maximum route-vs-beeline mismatch of a transition, in meters.
/// Transitions with a larger mismatch are considered impossible.
pub const DEFAULT_MAX_DISTANCE_DELTA: f64 = 500.0;

/// A network location proposed as the true position of an observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate<L> {
    pub location: L,

    /// Distance between the observation and `location`, in meters.
    pub distance: f64,
}

impl<L> Candidate<L> {
    pub fn new(location: L, distance: f64) -> Self {
        Self { location, distance }
    }
}

/// Identifies a single candidate of a single observation:
/// the `index`-th candidate of the `timestamp`-th position in a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cell {
    pub timestamp: usize,
    pub index: usize,
}

impl Cell {
    pub fn new(timestamp: usize, index: usize) -> Self {
        Self { timestamp, index }
    }
}

/// Source of map-matching candidates.
pub trait CandidateProvider {
    type Location;

    /// Returns network locations near the provided position. The list may be empty,
    /// which marks the position as unmatchable.
    fn candidates(&self, position: Position) -> Vec<Candidate<Self::Location>>;
}

/// Source of shortest-path distances over the network.
///
/// Results must be deterministic for the duration of a match.
/// Any `FnMut(&L, &L) -> Option<f64>` closure is a valid oracle.
pub trait DistanceOracle<L> {
    /// Returns the length of the shortest path between two locations, in meters,
    /// or [None] if `to` is unreachable from `from`.
    fn network_distance(&mut self, from: &L, to: &L) -> Option<f64>;
}

impl<L, F: FnMut(&L, &L) -> Option<f64>> DistanceOracle<L> for F {
    fn network_distance(&mut self, from: &L, to: &L) -> Option<f64> {
        self(from, to)
    }
}

/// Tunable parameters of the map-matching model.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOptions {
    /// Standard deviation of GPS noise, in meters. Must be positive.
    pub sigma_z: f64,

    /// Expected route-vs-beeline mismatch between consecutive observations, in meters.
    /// Grows with the sampling interval. Must be positive.
    pub beta: f64,

    /// Transitions whose route-vs-beeline mismatch exceeds this value, in meters,
    /// are rejected outright.
    pub max_distance_delta: f64,

    /// Collect per-candidate and per-transition [Diagnostics] in the [MatchTrace].
    pub record_diagnostics: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            sigma_z: DEFAULT_SIGMA_Z,
            beta: DEFAULT_BETA,
            max_distance_delta: DEFAULT_MAX_DISTANCE_DELTA,
            record_diagnostics: false,
        }
    }
}

impl MatchOptions {
    fn validate(&self) -> Result<(), MatchError> {
        if !(self.sigma_z.is_finite() && self.sigma_z > 0.0) {
            return Err(MatchError::InvalidOption("sigma_z must be positive and finite"));
        }
        if !(self.beta.is_finite() && self.beta > 0.0) {
            return Err(MatchError::InvalidOption("beta must be positive and finite"));
        }
        if self.max_distance_delta.is_nan() || self.max_distance_delta < 0.0 {
            return Err(MatchError::InvalidOption("max_distance_delta must not be negative"));
        }
        Ok(())
    }
}

/// Error conditions which may occur during [match_trace] or [match_positions].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    /// The trace has no observations.
    #[error("empty trace")]
    EmptyTrace,

    /// The number of candidate lists doesn't match the number of observations.
    #[error("got {candidates} candidate lists for {positions} positions")]
    LengthMismatch { candidates: usize, positions: usize },

    /// A [MatchOptions] field is out of its domain.
    #[error("invalid option: {0}")]
    InvalidOption(&'static str),

    /// No observation has any viable candidate, so there is nothing to start matching from.
    #[error("no observation has a viable candidate")]
    NoViableStart,
}

impl MatchError {
    /// Returns true for errors caused by malformed input,
    /// which are detected before any matching work is done.
    pub fn is_invalid_input(&self) -> bool {
        !matches!(self, Self::NoViableStart)
    }
}

/// Generates candidates for every position with the provided `network`,
/// and matches them with [match_trace].
pub fn match_positions<N>(
    network: &mut N,
    options: &MatchOptions,
    positions: &[Position],
) -> Result<MatchTrace<N::Location>, MatchError>
where
    N: CandidateProvider + DistanceOracle<<N as CandidateProvider>::Location>,
    N::Location: Clone,
{
    if positions.is_empty() {
        return Err(MatchError::EmptyTrace);
    }

    let candidates = positions
        .iter()
        .map(|&p| network.candidates(p))
        .collect::<Vec<_>>();

    match_trace(network, options, &candidates, positions)
}
