// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use crate::{earth_distance, Node};

/// KDTree implements the [k-d tree data structure](https://en.wikipedia.org/wiki/K-d_tree),
/// used to look up map-matching candidates: the nodes closest to every observed position
/// of a trace.
///
/// This implementation assumes euclidean geometry, even though the distance function
/// used is [earth_distance]. This results in undefined behavior when points
/// are close to the ante meridian (180°/-180° longitude) or poles (90°/-90° latitude),
/// or when the data spans multiple continents.
#[derive(Debug, Clone)]
pub struct KDTree {
    pivot: Node,
    left: Option<Box<KDTree>>,
    right: Option<Box<KDTree>>,
}

/// Bounded list of the closest nodes found so far, sorted by distance.
struct Nearest {
    found: Vec<(Node, f32)>,
    limit: usize,
    max_distance: f32,
}

impl Nearest {
    /// Distance a node must beat to be accepted.
    fn bound(&self) -> f32 {
        if self.found.len() < self.limit {
            self.max_distance
        } else {
            self.found.last().map(|&(_, d)| d).unwrap_or(self.max_distance)
        }
    }

    fn offer(&mut self, node: Node, distance: f32) {
        if self.limit == 0 || distance > self.bound() {
            return;
        }

        // Insert after nodes at equal distance to keep the order stable
        let idx = self.found.partition_point(|&(_, d)| d <= distance);
        self.found.insert(idx, (node, distance));
        self.found.truncate(self.limit);
    }
}

impl KDTree {
    /// Finds the closest [Node] to the given position.
    pub fn find_nearest_node(&self, lat: f32, lon: f32) -> Node {
        let mut nearest = Nearest {
            found: Vec::with_capacity(1),
            limit: 1,
            max_distance: f32::INFINITY,
        };
        self.search(lat, lon, false, &mut nearest);
        nearest.found.first().map(|&(nd, _)| nd).unwrap_or(self.pivot)
    }

    /// Finds up to `limit` [Nodes](Node) within `max_distance` kilometers
    /// from the given position, closest first. Returned tuples also contain
    /// the distance to the node, in kilometers.
    ///
    /// Nothing is found if `max_distance` is negative or NaN.
    pub fn find_nearest_nodes(
        &self,
        lat: f32,
        lon: f32,
        max_distance: f32,
        limit: usize,
    ) -> Vec<(Node, f32)> {
        let mut nearest = Nearest {
            found: Vec::with_capacity(limit.min(16)),
            limit,
            max_distance,
        };
        if limit > 0 && max_distance >= 0.0 {
            self.search(lat, lon, false, &mut nearest);
        }
        nearest.found
    }

    fn search(&self, lat: f32, lon: f32, lon_divides: bool, nearest: &mut Nearest) {
        nearest.offer(
            self.pivot,
            earth_distance(lat, lon, self.pivot.lat, self.pivot.lon),
        );

        // Select which branch to recurse into first
        let first_left = if lon_divides {
            lon < self.pivot.lon
        } else {
            lat < self.pivot.lat
        };
        let (first, second) = if first_left {
            (&self.left, &self.right)
        } else {
            (&self.right, &self.left)
        };

        if let Some(ref branch) = first {
            branch.search(lat, lon, !lon_divides, nearest);
        }

        if let Some(ref branch) = second {
            // A closer node is possible in the second branch if and only if
            // the splitting axis is within the current acceptance bound.
            let (axis_lat, axis_lon) = if lon_divides {
                (lat, self.pivot.lon)
            } else {
                (self.pivot.lat, lon)
            };
            let dist_to_axis = earth_distance(lat, lon, axis_lat, axis_lon);

            if dist_to_axis <= nearest.bound() {
                branch.search(lat, lon, !lon_divides, nearest);
            }
        }
    }

    /// Builds a k-d tree from an iterable of [Nodes](Node).
    pub fn from_iter<I: IntoIterator<Item = Node>>(nodes: I) -> Option<Self> {
        let mut nodes = nodes.into_iter().collect::<Vec<_>>();
        Self::build(nodes.as_mut_slice())
    }

    /// Builds a k-d tree from a mutable slice of [Nodes](Node). Nodes will be reordered
    /// in the slice to facilitate building the tree.
    pub fn build(nodes: &mut [Node]) -> Option<Self> {
        Self::build_impl(nodes, false)
    }

    fn build_impl(nodes: &mut [Node], lon_divides: bool) -> Option<Self> {
        match nodes.len() {
            0 => None,
            1 => Some(Self {
                pivot: nodes[0],
                left: None,
                right: None,
            }),
            _ => {
                if lon_divides {
                    nodes.sort_by(|a, b| a.lon.total_cmp(&b.lon));
                } else {
                    nodes.sort_by(|a, b| a.lat.total_cmp(&b.lat));
                }
                let median = nodes.len() / 2;
                let pivot = nodes[median];
                let (left, right_and_pivot) = nodes.split_at_mut(median);
                let right = &mut right_and_pivot[1..];
                Some(Self {
                    pivot,
                    left: Self::build_impl(left, !lon_divides).map(Box::new),
                    right: Self::build_impl(right, !lon_divides).map(Box::new),
                })
            }
        }
    }
}
