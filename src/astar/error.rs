// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

/// Recommended number of allowed node expansions in [AStar::find_route](crate::AStar::find_route)
/// before [AStarError::StepLimitExceeded] is returned.
///
/// Searches between consecutive trace candidates are short, so this limit
/// is much lower than what point-to-point routing over a whole country would need.
pub const DEFAULT_STEP_LIMIT: usize = 100_000;

/// Error conditions which may occur during [AStar::find_route](crate::AStar::find_route).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AStarError {
    /// The start or end nodes don't exist in a graph.
    InvalidReference(i64),

    /// Route search has exceeded its limit of steps.
    /// Either the nodes are really far apart, or no route exists.
    StepLimitExceeded,
}

impl std::fmt::Display for AStarError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidReference(node_id) => write!(f, "invalid node: {}", node_id),
            Self::StepLimitExceeded => write!(f, "step limit exceeded"),
        }
    }
}

impl std::error::Error for AStarError {}
