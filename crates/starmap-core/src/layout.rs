//! Neighbor layout engine
//!
//! Converts a ranked neighbor list into positions on a shell around the
//! center (rank 0 closest) and rank into opacity. All functions are pure:
//! identical inputs always produce identical placements.

use crate::hash::direction_from_title;
use crate::types::{NeighborSet, Vec3};
use crate::{MAX_NEIGHBORS, MIN_OPACITY, R_MAX, R_MIN, SEGMENT_DISTANCE};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Geometry parameters for cluster layout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutParams {
    pub r_min: f32,
    pub r_max: f32,
    /// Distance from one center to the next when traveling.
    pub segment_distance: f32,
    /// Neighbors laid out per cluster; extras are dropped.
    pub max_neighbors: usize,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            r_min: R_MIN,
            r_max: R_MAX,
            segment_distance: SEGMENT_DISTANCE,
            max_neighbors: MAX_NEIGHBORS,
        }
    }
}

/// Normalized rank in `[0, 1]`; zero when there is at most one item.
fn rank_fraction(rank: usize, total: usize) -> f32 {
    if total <= 1 {
        0.0
    } else {
        (rank as f32 / (total - 1) as f32).clamp(0.0, 1.0)
    }
}

impl LayoutParams {
    pub fn radius_for_rank(&self, rank: usize, total: usize) -> f32 {
        self.r_min + rank_fraction(rank, total) * (self.r_max - self.r_min)
    }

    /// Position of a neighbor relative to its center, using the title hash
    /// for direction.
    pub fn position_for_neighbor(&self, title: &str, rank: usize, total: usize) -> Vec3 {
        self.position_with_hint(title, rank, total, None)
    }

    /// Like [`position_for_neighbor`](Self::position_for_neighbor), but
    /// prefers `hint` (any non-zero direction) over the title hash.
    pub fn position_with_hint(
        &self,
        title: &str,
        rank: usize,
        total: usize,
        hint: Option<Vec3>,
    ) -> Vec3 {
        let dir = hint
            .and_then(Vec3::normalized)
            .unwrap_or_else(|| direction_from_title(title));
        dir * self.radius_for_rank(rank, total)
    }
}

/// [`LayoutParams::position_for_neighbor`] with default radii.
pub fn position_for_neighbor(title: &str, rank: usize, total: usize) -> Vec3 {
    LayoutParams::default().position_for_neighbor(title, rank, total)
}

/// Linear opacity from 1.0 (best rank) down to 0.25 (worst rank).
pub fn opacity_from_rank(rank: usize, total: usize) -> f32 {
    MIN_OPACITY + (1.0 - rank_fraction(rank, total)) * (1.0 - MIN_OPACITY)
}

// =============================================================================
// CLUSTER LAYOUT
// =============================================================================

/// Role of a node within a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Center,
    Neighbor,
    /// Synthetic path back to the previous center.
    Return,
}

/// One placed node, in cluster-local coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePlacement {
    pub title: String,
    pub kind: NodeKind,
    pub position: Vec3,
    pub opacity: f32,
    /// Rank within the laid-out list (0 for the center).
    pub rank: usize,
    /// Whether the title had been visited when the layout was built.
    pub visited: bool,
}

/// The previous center to inject as a return neighbor.
#[derive(Debug, Clone, Copy)]
pub struct ReturnNeighbor<'a> {
    pub title: &'a str,
    /// Previous center's position relative to the new one, when known.
    pub offset: Option<Vec3>,
}

/// Placed nodes of one cluster; the center always comes first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterLayout {
    pub center: String,
    pub nodes: Vec<NodePlacement>,
}

impl ClusterLayout {
    pub fn node(&self, title: &str) -> Option<&NodePlacement> {
        self.nodes.iter().find(|n| n.title == title)
    }

    /// Real neighbors in rank order (excludes the center and return node).
    pub fn neighbors(&self) -> impl Iterator<Item = &NodePlacement> {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Neighbor)
    }

    pub fn neighbor_titles(&self) -> Vec<String> {
        self.neighbors().map(|n| n.title.clone()).collect()
    }

    pub fn return_node(&self) -> Option<&NodePlacement> {
        self.nodes.iter().find(|n| n.kind == NodeKind::Return)
    }
}

/// Lay out a fetched neighbor set.
///
/// The list is truncated to `max_neighbors`, the return title (and the
/// center itself) are filtered out, and the remaining neighbors are ranked
/// among themselves. The return node is appended afterwards at the next slot
/// (`rank = len`, `total = len + 1`) or at its known offset, so real neighbor
/// positions never depend on whether a return node exists.
pub fn build_cluster_layout(
    params: &LayoutParams,
    set: &NeighborSet,
    return_to: Option<ReturnNeighbor<'_>>,
    visited: &HashSet<String>,
) -> ClusterLayout {
    let center = set.center.title.as_str();
    let return_title = return_to.map(|r| r.title).filter(|t| *t != center);

    let filtered: Vec<&str> = set
        .neighbors
        .iter()
        .take(params.max_neighbors)
        .map(String::as_str)
        .filter(|t| *t != center && Some(*t) != return_title)
        .collect();
    let total = filtered.len();

    let mut nodes = Vec::with_capacity(total + 2);
    nodes.push(NodePlacement {
        title: center.to_string(),
        kind: NodeKind::Center,
        position: Vec3::ZERO,
        opacity: 1.0,
        rank: 0,
        visited: visited.contains(center),
    });

    for (rank, title) in filtered.iter().enumerate() {
        nodes.push(NodePlacement {
            title: (*title).to_string(),
            kind: NodeKind::Neighbor,
            position: params.position_with_hint(title, rank, total, set.direction_hint(title)),
            opacity: opacity_from_rank(rank, total),
            rank,
            visited: visited.contains(*title),
        });
    }

    if let (Some(title), Some(ret)) = (return_title, return_to) {
        let position = ret
            .offset
            .filter(|o| o.normalized().is_some())
            .unwrap_or_else(|| params.position_for_neighbor(title, total, total + 1));
        nodes.push(NodePlacement {
            title: title.to_string(),
            kind: NodeKind::Return,
            position,
            opacity: 1.0,
            rank: total,
            visited: visited.contains(title),
        });
    }

    ClusterLayout {
        center: center.to_string(),
        nodes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CenterInfo, LinkMode};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn set(center: &str, neighbors: &[&str]) -> NeighborSet {
        NeighborSet::new(
            CenterInfo::titled(center),
            neighbors.iter().map(|s| s.to_string()).collect(),
            LinkMode::Outlinks,
        )
    }

    #[test]
    fn single_neighbor_sits_at_r_min() {
        let p = position_for_neighbor("Solo", 0, 1);
        assert!((p.length() - R_MIN).abs() < 1e-3);
    }

    #[test]
    fn last_rank_sits_at_r_max() {
        let p = position_for_neighbor("Last", 9, 10);
        assert!((p.length() - R_MAX).abs() < 1e-3);
    }

    #[test]
    fn opacity_endpoints() {
        assert_eq!(opacity_from_rank(0, 10), 1.0);
        assert!((opacity_from_rank(9, 10) - 0.25).abs() < 1e-6);
        assert_eq!(opacity_from_rank(0, 1), 1.0);
    }

    #[test]
    fn return_node_does_not_perturb_neighbors() {
        let data = set("B", &["C", "A", "D", "E"]);
        let visited = HashSet::new();
        let params = LayoutParams::default();

        let with_return = build_cluster_layout(
            &params,
            &data,
            Some(ReturnNeighbor {
                title: "A",
                offset: None,
            }),
            &visited,
        );
        let filtered_only = build_cluster_layout(&params, &set("B", &["C", "D", "E"]), None, &visited);

        let real: Vec<_> = with_return.neighbors().cloned().collect();
        let expected: Vec<_> = filtered_only.neighbors().cloned().collect();
        assert_eq!(real, expected);

        let ret = with_return.return_node().unwrap();
        assert_eq!(ret.title, "A");
        assert_eq!(ret.rank, 3);
        assert_eq!(ret.position, params.position_for_neighbor("A", 3, 4));
    }

    #[test]
    fn return_node_is_added_when_absent_from_neighbors() {
        let layout = build_cluster_layout(
            &LayoutParams::default(),
            &set("B", &["C"]),
            Some(ReturnNeighbor {
                title: "A",
                offset: Some(Vec3::new(-40.0, 0.0, 0.0)),
            }),
            &HashSet::new(),
        );
        let ret = layout.return_node().unwrap();
        assert_eq!(ret.kind, NodeKind::Return);
        assert_eq!(ret.position, Vec3::new(-40.0, 0.0, 0.0));
        assert_eq!(layout.nodes.len(), 3);
    }

    #[test]
    fn truncates_and_drops_center() {
        let many: Vec<String> = (0..30).map(|i| format!("N{i}")).collect();
        let refs: Vec<&str> = std::iter::once("Hub")
            .chain(many.iter().map(String::as_str))
            .collect();
        let layout = build_cluster_layout(
            &LayoutParams::default(),
            &set("Hub", &refs),
            None,
            &HashSet::new(),
        );
        // "Hub" takes one of the 20 slots before being filtered.
        assert_eq!(layout.neighbors().count(), MAX_NEIGHBORS - 1);
        assert!(layout.neighbors().all(|n| n.title != "Hub"));
    }

    #[test]
    fn coordinate_hint_wins_over_hash() {
        let mut data = set("king", &["queen"]);
        data.coordinates.insert("king".into(), Vec3::ZERO);
        data.coordinates.insert("queen".into(), Vec3::new(0.0, 0.0, 5.0));
        let layout = build_cluster_layout(&LayoutParams::default(), &data, None, &HashSet::new());
        assert_eq!(layout.node("queen").unwrap().position, Vec3::new(0.0, 0.0, R_MIN));
    }

    #[test]
    fn marks_visited_nodes() {
        let visited: HashSet<String> = ["C".to_string()].into_iter().collect();
        let layout = build_cluster_layout(&LayoutParams::default(), &set("B", &["C", "D"]), None, &visited);
        assert!(layout.node("C").unwrap().visited);
        assert!(!layout.node("D").unwrap().visited);
    }

    proptest! {
        #[test]
        fn radius_within_shell_and_monotonic(total in 1usize..64, title in "[A-Za-z ]{0,24}") {
            let mut last = 0.0f32;
            for rank in 0..total {
                let r = position_for_neighbor(&title, rank, total).length();
                prop_assert!(r >= R_MIN - 1e-3 && r <= R_MAX + 1e-3);
                prop_assert!(r + 1e-3 >= last);
                last = r;
            }
        }

        #[test]
        fn opacity_within_bounds(total in 1usize..64, rank_seed in 0usize..64) {
            let rank = rank_seed % total;
            let o = opacity_from_rank(rank, total);
            prop_assert!((MIN_OPACITY..=1.0).contains(&o));
        }
    }
}
