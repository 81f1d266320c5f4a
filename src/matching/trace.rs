// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use super::{Candidate, Cell};

/// A single observation matched onto the network.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedPoint<L> {
    /// Which candidate of which observation was chosen.
    pub cell: Cell,
    pub candidate: Candidate<L>,
}

/// Result of matching a trace.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchTrace<L> {
    /// Chosen candidates, one per matched observation, in trace order.
    /// Broken observations (see `breakage`) are absent.
    pub points: Vec<MatchedPoint<L>>,

    /// For every observation of the trace: true if no candidate of that observation
    /// was viable. Broken observations were skipped over by the decoder.
    pub breakage: Vec<bool>,

    /// Per-candidate and per-transition records, only present if
    /// [MatchOptions::record_diagnostics](super::MatchOptions::record_diagnostics) was set.
    pub diagnostics: Option<Diagnostics>,
}

impl<L> MatchTrace<L> {
    /// Returns the chosen network locations, in trace order.
    pub fn locations(&self) -> impl Iterator<Item = &L> {
        self.points.iter().map(|p| &p.candidate.location)
    }

    /// Returns the number of observations the decoder had to skip.
    pub fn broken_count(&self) -> usize {
        self.breakage.iter().filter(|&&b| b).count()
    }

    /// Returns true if every observation was matched.
    pub fn is_complete(&self) -> bool {
        self.points.len() == self.breakage.len()
    }
}

/// Final state of a single lattice cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateRecord {
    /// Best log-probability of any path ending in this cell,
    /// clamped with [json_safe](super::probability::json_safe).
    pub score: f64,

    /// True if no viable path reaches this cell.
    pub pruned: bool,

    /// True if this cell is part of the matched path.
    pub chosen: bool,
}

/// A transition which was considered plausible by the decoder.
/// All numbers are clamped with [json_safe](super::probability::json_safe).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionRecord {
    pub from: Cell,
    pub to: Cell,

    /// Score of the `from` cell at the time of the transition.
    pub previous_score: f64,
    pub emission: f64,
    pub transition: f64,

    /// Shortest-path distance between the two candidates, in meters.
    pub network_distance: f64,

    /// Great-circle distance between the two observations, in meters.
    pub great_circle_distance: f64,
}

/// Observational mirror of the decoding lattice.
///
/// States are addressed by [Cell]: `states[timestamp][index]`. Transitions are kept in
/// a flat list in the order they were evaluated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    pub states: Vec<Vec<StateRecord>>,
    pub transitions: Vec<TransitionRecord>,
}

impl Diagnostics {
    /// Returns the record of a specific cell, if it exists.
    pub fn state(&self, cell: Cell) -> Option<&StateRecord> {
        self.states.get(cell.timestamp)?.get(cell.index)
    }

    /// Returns all recorded transitions leaving the provided cell.
    pub fn transitions_from(&self, cell: Cell) -> impl Iterator<Item = &TransitionRecord> {
        self.transitions.iter().filter(move |t| t.from == cell)
    }

    /// Returns all recorded transitions entering the provided cell.
    pub fn transitions_to(&self, cell: Cell) -> impl Iterator<Item = &TransitionRecord> {
        self.transitions.iter().filter(move |t| t.to == cell)
    }
}
