// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::{BinaryHeap, HashMap};

use crate::{earth_distance, AStarError, Edge, Graph};

#[derive(Debug, Clone, Copy)]
struct QueueItem {
    at: i64,
    cost: f32,
    score: f32,
}

impl PartialEq for QueueItem {
    fn eq(&self, other: &Self) -> bool {
        self.score.eq(&other.score)
    }
}

impl PartialOrd for QueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Eq for QueueItem {}

impl Ord for QueueItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // NOTE: We revert the order of comparison,
        // as lower scores are considered better ("higher"),
        // and Rust's BinaryHeap is a max-heap.
        other.score.total_cmp(&self.score)
    }
}

/// Reusable state of the [A* algorithm](https://en.wikipedia.org/wiki/A*_search_algorithm).
///
/// Map matching runs many short searches in a row, one per pair of candidates.
/// Keeping the queue and lookup tables around between searches avoids re-allocating
/// them every time. An [AStar] instance is meant to be owned by a single caller;
/// concurrent matching requires one instance per thread.
#[derive(Debug, Default)]
pub struct AStar {
    queue: BinaryHeap<QueueItem>,
    came_from: HashMap<i64, i64>,
    known_costs: HashMap<i64, f32>,
}

impl AStar {
    pub fn new() -> Self {
        Self::default()
    }

    fn clear(&mut self) {
        self.queue.clear();
        self.came_from.clear();
        self.known_costs.clear();
    }

    fn reconstruct_path(&self, mut last: i64) -> Vec<i64> {
        let mut path = vec![last];

        while let Some(&nd) = self.came_from.get(&last) {
            path.push(nd);
            last = nd;
        }

        path.reverse();
        path
    }

    /// Finds the shortest route between two nodes in the provided graph.
    ///
    /// Returns an empty vector if there is no route between the two nodes,
    /// and a single-element vector if `from_id == to_id`.
    ///
    /// `step_limit` limits how many nodes may be expanded during the search
    /// before returning [AStarError::StepLimitExceeded]. Concluding that no route exists requires
    /// expanding all nodes accessible from the start, which is usually very time-consuming
    /// on large datasets. The recommended value is [DEFAULT_STEP_LIMIT](crate::DEFAULT_STEP_LIMIT).
    pub fn find_route(
        &mut self,
        g: &Graph,
        from_id: i64,
        to_id: i64,
        step_limit: usize,
    ) -> Result<Vec<i64>, AStarError> {
        self.clear();
        let mut steps: usize = 0;

        let to_node = g
            .get_node(to_id)
            .ok_or(AStarError::InvalidReference(to_id))?;

        {
            let from_node = g
                .get_node(from_id)
                .ok_or(AStarError::InvalidReference(from_id))?;

            let initial_distance =
                earth_distance(from_node.lat, from_node.lon, to_node.lat, to_node.lon);

            self.queue.push(QueueItem {
                at: from_id,
                cost: 0.0,
                score: initial_distance,
            });
            self.known_costs.insert(from_id, 0.0);
        }

        while let Some(item) = self.queue.pop() {
            if item.at == to_id {
                return Ok(self.reconstruct_path(to_id));
            }

            // Stale queue entries are skipped instead of being removed on update
            if item.cost
                > self
                    .known_costs
                    .get(&item.at)
                    .cloned()
                    .unwrap_or(f32::INFINITY)
            {
                continue;
            }

            steps += 1;
            if steps > step_limit {
                return Err(AStarError::StepLimitExceeded);
            }

            for &Edge {
                to: neighbor_id,
                cost: edge_cost,
            } in g.get_edges(item.at)
            {
                // Edges to missing nodes are silently ignored
                let Some(neighbor) = g.get_node(neighbor_id) else {
                    continue;
                };

                let neighbor_cost = item.cost + edge_cost;
                if neighbor_cost
                    >= self
                        .known_costs
                        .get(&neighbor_id)
                        .cloned()
                        .unwrap_or(f32::INFINITY)
                {
                    continue;
                }

                self.came_from.insert(neighbor_id, item.at);
                self.known_costs.insert(neighbor_id, neighbor_cost);
                self.queue.push(QueueItem {
                    at: neighbor_id,
                    cost: neighbor_cost,
                    score: neighbor_cost
                        + earth_distance(neighbor.lat, neighbor.lon, to_node.lat, to_node.lon),
                });
            }
        }

        Ok(vec![])
    }
}

/// Uses the [A* algorithm](https://en.wikipedia.org/wiki/A*_search_algorithm)
/// to find the shortest route between two nodes in the provided graph.
///
/// Convenience wrapper over [AStar::find_route] for one-off searches.
pub fn find_route(
    g: &Graph,
    from_id: i64,
    to_id: i64,
    step_limit: usize,
) -> Result<Vec<i64>, AStarError> {
    AStar::new().find_route(g, from_id, to_id, step_limit)
}
