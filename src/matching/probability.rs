// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Emission and transition log-probabilities of the map-matching model, after
//! Newson & Krumm, "Hidden Markov Map Matching Through Noise and Sparseness" (2009).

use std::f64::consts::PI;

/// Log-density of a zero-mean normal distribution with standard deviation `sigma_z`,
/// evaluated at `distance` between an observation and a candidate.
///
/// Returns [f64::NEG_INFINITY] (the "impossible" sentinel) if the distance is not finite,
/// or so large that squaring it overflows. Never returns NaN.
pub fn emission_log_probability(distance: f64, sigma_z: f64) -> f64 {
    let normed_distance = distance / sigma_z;
    let result = -0.5 * ((2.0 * PI).ln() + normed_distance * normed_distance) - sigma_z.ln();
    if result.is_nan() {
        f64::NEG_INFINITY
    } else {
        result
    }
}

/// Log-density of an exponential distribution with rate `1/beta`, evaluated at `delta` -
/// the absolute difference between the network distance and the great-circle distance
/// of two consecutive observations.
pub fn transition_log_probability(delta: f64, beta: f64) -> f64 {
    -beta.ln() - delta / beta
}

/// Clamps non-finite values to the largest finite magnitude of the same sign,
/// with NaN mapped to [f64::MAX].
///
/// Used for values reported in [Diagnostics](super::Diagnostics) only, so that
/// consumers serializing them never see NaN or infinities.
pub fn json_safe(value: f64) -> f64 {
    if value.is_nan() || value == f64::INFINITY {
        f64::MAX
    } else if value == f64::NEG_INFINITY {
        -f64::MAX
    } else {
        value
    }
}
