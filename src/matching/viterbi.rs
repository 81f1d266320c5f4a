// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use log::{debug, trace};

use super::probability::{emission_log_probability, json_safe, transition_log_probability};
use super::{
    Candidate, Cell, Diagnostics, DistanceOracle, MatchError, MatchOptions, MatchTrace,
    MatchedPoint, StateRecord, TransitionRecord,
};
use crate::Position;

/// Dynamic-programming table of the Viterbi algorithm, addressed by `[timestamp][index]`.
///
/// `parents[t][s]` is an index into the candidates of the closest non-broken
/// timestamp before `t`.
struct Lattice {
    scores: Vec<Vec<f64>>,
    parents: Vec<Vec<usize>>,
    pruned: Vec<Vec<bool>>,
    breakage: Vec<bool>,
    transitions: Option<Vec<TransitionRecord>>,
}

impl Lattice {
    fn new<L>(candidates: &[Vec<Candidate<L>>], record_diagnostics: bool) -> Self {
        Self {
            scores: candidates
                .iter()
                .map(|l| vec![f64::NEG_INFINITY; l.len()])
                .collect(),
            parents: candidates.iter().map(|l| (0..l.len()).collect()).collect(),
            pruned: candidates.iter().map(|l| vec![true; l.len()]).collect(),
            breakage: vec![true; candidates.len()],
            transitions: record_diagnostics.then(Vec::new),
        }
    }

    /// Scores candidates by their emission probability alone, until the first
    /// timestamp with at least one viable candidate. Returns that timestamp.
    fn initialize<L>(&mut self, candidates: &[Vec<Candidate<L>>], sigma_z: f64) -> Option<usize> {
        for (t, list) in candidates.iter().enumerate() {
            for (s, candidate) in list.iter().enumerate() {
                let score = emission_log_probability(candidate.distance, sigma_z);
                self.scores[t][s] = score;
                self.parents[t][s] = s;
                self.pruned[t][s] = score == f64::NEG_INFINITY;
                self.breakage[t] = self.breakage[t] && self.pruned[t][s];
            }

            if !self.breakage[t] {
                return Some(t);
            }
        }

        None
    }

    /// Extends the best paths ending at timestamp `prev` onto the candidates of timestamp `t`.
    /// Leaves `t` broken if none of its candidates can be reached.
    fn propagate<L, O: DistanceOracle<L> + ?Sized>(
        &mut self,
        oracle: &mut O,
        options: &MatchOptions,
        candidates: &[Vec<Candidate<L>>],
        positions: &[Position],
        prev: usize,
        t: usize,
    ) {
        let great_circle_distance = positions[prev].distance_to(&positions[t]);
        let emissions = candidates[t]
            .iter()
            .map(|c| emission_log_probability(c.distance, options.sigma_z))
            .collect::<Vec<_>>();

        for (s, from) in candidates[prev].iter().enumerate() {
            if self.pruned[prev][s] {
                continue;
            }
            let previous_score = self.scores[prev][s];

            for (s_prime, to) in candidates[t].iter().enumerate() {
                let emission = emissions[s_prime];
                let mut score = previous_score + emission;

                // Network distances are expensive - don't bother unless the incumbent can be beaten
                if score <= self.scores[t][s_prime] {
                    continue;
                }

                let Some(network_distance) = oracle.network_distance(&from.location, &to.location)
                else {
                    trace!(
                        "transition ({}, {}) -> ({}, {}): unreachable",
                        prev,
                        s,
                        t,
                        s_prime
                    );
                    continue;
                };

                let delta = (network_distance - great_circle_distance).abs();
                if !(delta <= options.max_distance_delta) {
                    trace!(
                        "transition ({}, {}) -> ({}, {}): implausible, delta {:.1} m",
                        prev,
                        s,
                        t,
                        s_prime,
                        delta
                    );
                    continue;
                }

                let transition = transition_log_probability(delta, options.beta);
                score += transition;

                if let Some(records) = self.transitions.as_mut() {
                    records.push(TransitionRecord {
                        from: Cell::new(prev, s),
                        to: Cell::new(t, s_prime),
                        previous_score: json_safe(previous_score),
                        emission: json_safe(emission),
                        transition: json_safe(transition),
                        network_distance: json_safe(network_distance),
                        great_circle_distance: json_safe(great_circle_distance),
                    });
                }

                if score > self.scores[t][s_prime] {
                    self.scores[t][s_prime] = score;
                    self.parents[t][s_prime] = s;
                    self.pruned[t][s_prime] = false;
                    self.breakage[t] = false;
                }
            }
        }
    }

    /// Walks parent links from the best cell at `last` back to `initial`.
    /// Returns visited cells in chronological order.
    fn backtrack(&self, initial: usize, last: usize) -> Vec<Cell> {
        // On ties, the first candidate wins
        let scores = &self.scores[last];
        let mut index = 0;
        for (s, &score) in scores.iter().enumerate() {
            if score > scores[index] {
                index = s;
            }
        }

        let mut path = Vec::with_capacity(last - initial + 1);
        for t in (initial + 1..=last).rev() {
            if self.breakage[t] {
                continue;
            }
            path.push(Cell::new(t, index));
            index = self.parents[t][index];
        }
        path.push(Cell::new(initial, index));

        path.reverse();
        path
    }

    fn diagnostics(&mut self, path: &[Cell]) -> Option<Diagnostics> {
        let transitions = self.transitions.take()?;
        let mut states = self
            .scores
            .iter()
            .zip(&self.pruned)
            .map(|(scores, pruned)| {
                scores
                    .iter()
                    .zip(pruned)
                    .map(|(&score, &pruned)| StateRecord {
                        score: json_safe(score),
                        pruned,
                        chosen: false,
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();

        for cell in path {
            states[cell.timestamp][cell.index].chosen = true;
        }

        Some(Diagnostics {
            states,
            transitions,
        })
    }
}

/// Matches a trace onto the network with the
/// [Viterbi algorithm](https://en.wikipedia.org/wiki/Viterbi_algorithm), picking one
/// candidate per observation so that the joint probability of the observations
/// (how close candidates are to their positions) and of the transitions between
/// them (how close network distances are to great-circle distances) is maximized.
///
/// `candidates[t]` lists the candidates of `positions[t]` and may be empty.
/// Observations without any viable candidate, or without any plausible transition
/// from the last matched observation, are skipped and marked in [MatchTrace::breakage] -
/// the match continues after such gaps.
///
/// Fails with [MatchError::NoViableStart] if no observation has a candidate with
/// a finite emission probability.
pub fn match_trace<L, O>(
    oracle: &mut O,
    options: &MatchOptions,
    candidates: &[Vec<Candidate<L>>],
    positions: &[Position],
) -> Result<MatchTrace<L>, MatchError>
where
    L: Clone,
    O: DistanceOracle<L> + ?Sized,
{
    if positions.is_empty() {
        return Err(MatchError::EmptyTrace);
    }
    if candidates.len() != positions.len() {
        return Err(MatchError::LengthMismatch {
            candidates: candidates.len(),
            positions: positions.len(),
        });
    }
    options.validate()?;

    let mut lattice = Lattice::new(candidates, options.record_diagnostics);

    let initial = lattice
        .initialize(candidates, options.sigma_z)
        .ok_or(MatchError::NoViableStart)?;
    if initial > 0 {
        debug!(
            "skipped {} leading observations without viable candidates",
            initial
        );
    }

    let mut prev = initial;
    for t in initial + 1..candidates.len() {
        lattice.propagate(oracle, options, candidates, positions, prev, t);

        if lattice.breakage[t] {
            debug!("observation {} is broken: no plausible transition from {}", t, prev);
        } else {
            prev = t;
        }
    }

    let path = lattice.backtrack(initial, prev);
    debug!(
        "matched {} of {} observations",
        path.len(),
        candidates.len()
    );

    let diagnostics = lattice.diagnostics(&path);
    let points = path
        .into_iter()
        .map(|cell| MatchedPoint {
            cell,
            candidate: candidates[cell.timestamp][cell.index].clone(),
        })
        .collect();

    Ok(MatchTrace {
        points,
        breakage: lattice.breakage,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    type Loc = (usize, usize);

    /// Creates candidate lists, where the location of every candidate is its own cell.
    fn lists(distances: &[&[f64]]) -> Vec<Vec<Candidate<Loc>>> {
        distances
            .iter()
            .enumerate()
            .map(|(t, list)| {
                list.iter()
                    .enumerate()
                    .map(|(s, &d)| Candidate::new((t, s), d))
                    .collect()
            })
            .collect()
    }

    /// All observations at the same spot, so that great-circle distances are zero.
    fn stationary(n: usize) -> Vec<Position> {
        vec![Position::new(52.23, 21.01); n]
    }

    fn cells(trace: &MatchTrace<Loc>) -> Vec<Loc> {
        trace
            .points
            .iter()
            .map(|p| (p.cell.timestamp, p.cell.index))
            .collect()
    }

    fn with_diagnostics() -> MatchOptions {
        MatchOptions {
            record_diagnostics: true,
            ..Default::default()
        }
    }

    fn exact(_: &Loc, _: &Loc) -> Option<f64> {
        Some(0.0)
    }

    #[test]
    fn single_observation() {
        let candidates = lists(&[&[5.0, 1.0, 3.0]]);
        let trace = match_trace(
            &mut exact,
            &MatchOptions::default(),
            &candidates,
            &stationary(1),
        )
        .unwrap();

        assert_eq!(cells(&trace), vec![(0, 1)]);
        assert_eq!(trace.points[0].candidate.distance, 1.0);
        assert_eq!(trace.breakage, vec![false]);
        assert!(trace.diagnostics.is_none());
    }

    #[test]
    fn implausible_transition_rejected() {
        let candidates = lists(&[&[1.0], &[2.0, 50.0], &[1.5]]);
        let mut queried = Vec::new();
        let mut oracle = |a: &Loc, b: &Loc| {
            queried.push((*a, *b));
            if *a == (0, 0) && *b == (1, 1) {
                Some(1e6)
            } else {
                Some(0.0)
            }
        };

        let trace =
            match_trace(&mut oracle, &with_diagnostics(), &candidates, &stationary(3)).unwrap();

        assert_eq!(cells(&trace), vec![(0, 0), (1, 0), (2, 0)]);
        assert!(queried.contains(&((0, 0), (1, 1))));

        let d = trace.diagnostics.unwrap();
        assert_eq!(d.transitions_to(Cell::new(1, 1)).count(), 0);
        assert!(d.state(Cell::new(1, 1)).unwrap().pruned);
        assert!(!d.state(Cell::new(1, 0)).unwrap().pruned);
    }

    #[test]
    fn ties_keep_first_candidate() {
        let candidates = lists(&[&[1.0, 1.0], &[1.0, 1.0]]);
        let trace = match_trace(
            &mut exact,
            &MatchOptions::default(),
            &candidates,
            &stationary(2),
        )
        .unwrap();

        assert_eq!(cells(&trace), vec![(0, 0), (1, 0)]);
    }

    #[test]
    fn signal_loss() {
        let candidates = lists(&[&[1.0], &[], &[1.5]]);
        let trace =
            match_trace(&mut exact, &with_diagnostics(), &candidates, &stationary(3)).unwrap();

        assert_eq!(trace.breakage, vec![false, true, false]);
        assert_eq!(cells(&trace), vec![(0, 0), (2, 0)]);

        let d = trace.diagnostics.unwrap();
        let parents = d
            .transitions_to(Cell::new(2, 0))
            .map(|t| t.from)
            .collect::<Vec<_>>();
        assert_eq!(parents, vec![Cell::new(0, 0)]);
    }

    #[test]
    fn no_viable_start() {
        let options = MatchOptions::default();

        let empty = lists(&[&[], &[]]);
        assert_eq!(
            match_trace(&mut exact, &options, &empty, &stationary(2)),
            Err(MatchError::NoViableStart)
        );

        let underflowing = lists(&[&[f64::INFINITY], &[1e200, f64::NAN]]);
        let err = match_trace(&mut exact, &options, &underflowing, &stationary(2)).unwrap_err();
        assert_eq!(err, MatchError::NoViableStart);
        assert!(!err.is_invalid_input());
    }

    #[test]
    fn invalid_input() {
        let options = MatchOptions::default();

        let err = match_trace(&mut exact, &options, &lists(&[]), &[]).unwrap_err();
        assert_eq!(err, MatchError::EmptyTrace);
        assert!(err.is_invalid_input());

        assert_eq!(
            match_trace(&mut exact, &options, &lists(&[&[1.0]]), &stationary(2)),
            Err(MatchError::LengthMismatch {
                candidates: 1,
                positions: 2
            })
        );

        let bad_sigma = MatchOptions {
            sigma_z: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            match_trace(&mut exact, &bad_sigma, &lists(&[&[1.0]]), &stationary(1)),
            Err(MatchError::InvalidOption(_))
        ));
    }

    #[test]
    fn leading_observations_skipped() {
        let candidates = lists(&[&[f64::INFINITY], &[], &[1.0], &[1.0]]);
        let trace = match_trace(
            &mut exact,
            &MatchOptions::default(),
            &candidates,
            &stationary(4),
        )
        .unwrap();

        assert_eq!(trace.breakage, vec![true, true, false, false]);
        assert_eq!(cells(&trace), vec![(2, 0), (3, 0)]);
    }

    #[test]
    fn trailing_unreachable_observation() {
        let candidates = lists(&[&[1.0], &[1.0], &[1.0, 2.0]]);
        let mut oracle = |_: &Loc, b: &Loc| -> Option<f64> {
            if b.0 == 2 {
                None
            } else {
                Some(0.0)
            }
        };
        let trace = match_trace(
            &mut oracle,
            &MatchOptions::default(),
            &candidates,
            &stationary(3),
        )
        .unwrap();

        assert_eq!(trace.breakage, vec![false, false, true]);
        assert_eq!(cells(&trace), vec![(0, 0), (1, 0)]);
        assert_eq!(trace.broken_count(), 1);
    }

    #[test]
    fn fully_broken_after_start() {
        let candidates = lists(&[&[1.0], &[1.0], &[1.0]]);
        let mut oracle = |_: &Loc, _: &Loc| -> Option<f64> { None };
        let trace = match_trace(
            &mut oracle,
            &MatchOptions::default(),
            &candidates,
            &stationary(3),
        )
        .unwrap();

        assert_eq!(trace.breakage, vec![false, true, true]);
        assert_eq!(cells(&trace), vec![(0, 0)]);
    }

    #[test]
    fn pruned_cell_is_never_a_parent() {
        let candidates = lists(&[&[f64::INFINITY, 1.0], &[1.0, 2.0], &[1.0]]);
        let mut queried_from = Vec::new();
        let mut oracle = |a: &Loc, _: &Loc| {
            queried_from.push(*a);
            Some(0.0)
        };
        let trace =
            match_trace(&mut oracle, &with_diagnostics(), &candidates, &stationary(3)).unwrap();

        assert_eq!(cells(&trace), vec![(0, 1), (1, 0), (2, 0)]);
        assert!(!queried_from.contains(&(0, 0)));

        let d = trace.diagnostics.unwrap();
        let pruned = d.state(Cell::new(0, 0)).unwrap();
        assert!(pruned.pruned);
        assert_eq!(pruned.score, -f64::MAX);
        assert_eq!(d.transitions_from(Cell::new(0, 0)).count(), 0);
    }

    #[test]
    fn incumbent_skips_network_distance() {
        let candidates = lists(&[&[0.0, 30.0], &[0.0]]);
        let mut calls = 0;
        let mut oracle = |_: &Loc, _: &Loc| {
            calls += 1;
            Some(0.0)
        };
        let trace = match_trace(
            &mut oracle,
            &MatchOptions::default(),
            &candidates,
            &stationary(2),
        )
        .unwrap();

        assert_eq!(cells(&trace), vec![(0, 0), (1, 0)]);
        assert_eq!(calls, 1);
    }

    #[test]
    fn underflowing_observation_is_never_queried() {
        let candidates = lists(&[&[1.0, 2.0], &[1e200, f64::INFINITY], &[1.0]]);
        let mut queried_to = Vec::new();
        let mut oracle = |_: &Loc, b: &Loc| {
            queried_to.push(*b);
            Some(0.0)
        };
        let trace =
            match_trace(&mut oracle, &with_diagnostics(), &candidates, &stationary(3)).unwrap();

        assert_eq!(trace.breakage, vec![false, true, false]);
        assert_eq!(cells(&trace), vec![(0, 0), (2, 0)]);
        assert!(queried_to.iter().all(|&(t, _)| t != 1));

        let d = trace.diagnostics.unwrap();
        assert_eq!(d.transitions_to(Cell::new(1, 0)).count(), 0);
        assert_eq!(d.transitions_to(Cell::new(1, 1)).count(), 0);
        assert!(d.state(Cell::new(1, 0)).unwrap().pruned);
        assert!(d.state(Cell::new(1, 1)).unwrap().pruned);
    }

    #[test]
    fn distance_delta_threshold() {
        let candidates = lists(&[&[1.0], &[1.0]]);
        let options = MatchOptions::default();

        let mut at_limit = |_: &Loc, _: &Loc| Some(500.0);
        let trace = match_trace(&mut at_limit, &options, &candidates, &stationary(2)).unwrap();
        assert_eq!(trace.breakage, vec![false, false]);

        let mut over_limit = |_: &Loc, _: &Loc| Some(500.5);
        let trace = match_trace(&mut over_limit, &options, &candidates, &stationary(2)).unwrap();
        assert_eq!(trace.breakage, vec![false, true]);
        assert_eq!(cells(&trace), vec![(0, 0)]);

        let mut nan = |_: &Loc, _: &Loc| Some(f64::NAN);
        let trace = match_trace(&mut nan, &options, &candidates, &stationary(2)).unwrap();
        assert_eq!(trace.breakage, vec![false, true]);
    }

    #[test]
    fn transition_outweighs_emission() {
        // Candidate (1, 0) is closer to its observation, but reaching it
        // requires a 200 m detour.
        let candidates = lists(&[&[1.0], &[1.0, 3.0], &[1.0]]);
        let mut oracle = |_: &Loc, b: &Loc| if *b == (1, 0) { Some(200.0) } else { Some(0.0) };
        let trace = match_trace(
            &mut oracle,
            &MatchOptions::default(),
            &candidates,
            &stationary(3),
        )
        .unwrap();

        assert_eq!(cells(&trace), vec![(0, 0), (1, 1), (2, 0)]);
    }

    #[test]
    fn great_circle_distance_is_compared() {
        // Observations ~111 m apart; candidate (1, 0) has a matching network distance.
        let positions = [Position::new(0.0, 0.0), Position::new(0.0, 0.001)];
        let candidates = lists(&[&[1.0], &[5.0, 1.0]]);
        let mut oracle = |_: &Loc, b: &Loc| if *b == (1, 0) { Some(111.2) } else { Some(0.0) };
        let trace = match_trace(
            &mut oracle,
            &with_diagnostics(),
            &candidates,
            &positions,
        )
        .unwrap();

        assert_eq!(cells(&trace), vec![(0, 0), (1, 0)]);

        let d = trace.diagnostics.unwrap();
        let chosen = d.transitions_to(Cell::new(1, 0)).next().unwrap();
        assert!((chosen.great_circle_distance - 111.195).abs() < 0.01);
        assert_eq!(chosen.network_distance, 111.2);
    }

    #[test]
    fn diagnostics_mirror_lattice() {
        let candidates = lists(&[&[1.0, 2.0], &[], &[3.0, 1.0, 8.0]]);
        let trace =
            match_trace(&mut exact, &with_diagnostics(), &candidates, &stationary(3)).unwrap();
        let d = trace.diagnostics.as_ref().unwrap();

        assert_eq!(
            d.states.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![2, 0, 3]
        );
        assert_eq!(d.transitions.len(), 6);

        let chosen = d
            .states
            .iter()
            .enumerate()
            .flat_map(|(t, l)| {
                l.iter()
                    .enumerate()
                    .filter(|(_, s)| s.chosen)
                    .map(move |(s, _)| (t, s))
            })
            .collect::<Vec<_>>();
        assert_eq!(chosen, cells(&trace));
        assert!(d.states.iter().flatten().all(|s| s.score.is_finite()));

        for t in &d.transitions {
            let expected = emission_log_probability(3.0, MatchOptions::default().sigma_z);
            if t.to == Cell::new(2, 0) {
                assert_eq!(t.emission, expected);
            }
        }
    }

    #[test]
    fn repeated_match_is_identical() {
        let positions = [
            Position::new(0.0, 0.0),
            Position::new(0.0, 0.001),
            Position::new(0.0, 0.002),
        ];
        let candidates = lists(&[&[2.0, 4.0], &[3.0, 1.0], &[5.0, 2.5]]);
        let mut oracle = |a: &Loc, b: &Loc| Some(100.0 + (a.1 * 7 + b.1 * 3) as f64);

        let first = match_trace(&mut oracle, &with_diagnostics(), &candidates, &positions);
        let second = match_trace(&mut oracle, &with_diagnostics(), &candidates, &positions);
        assert_eq!(first, second);
    }

    #[test]
    fn trait_object_oracle() {
        let candidates = lists(&[&[1.0], &[1.0]]);
        let mut closure = exact;
        let oracle: &mut dyn DistanceOracle<Loc> = &mut closure;
        let trace = match_trace(
            oracle,
            &MatchOptions::default(),
            &candidates,
            &stationary(2),
        )
        .unwrap();
        assert_eq!(trace.points.len(), 2);
    }
}
