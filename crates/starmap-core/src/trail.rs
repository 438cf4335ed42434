//! Placed clusters and the ghost trail.
//!
//! In trail mode the outgoing cluster is dimmed and kept in a FIFO queue of
//! at most `max_ghosts` entries; when the queue overflows the oldest ghost is
//! removed and its position forgotten.

use crate::layout::ClusterLayout;
use crate::types::Vec3;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

/// Opacity multiplier applied to ghosted star sprites.
pub const GHOST_STAR_OPACITY: f32 = 0.25;

/// Opacity multiplier applied to ghosted rays.
pub const GHOST_EDGE_OPACITY: f32 = 0.15;

/// A rendered center and its laid-out neighbors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterPlacement {
    pub title: String,
    pub world_position: Vec3,
    pub layout: ClusterLayout,
    pub ghosted: bool,
}

impl ClusterPlacement {
    pub fn new(world_position: Vec3, layout: ClusterLayout) -> Self {
        Self {
            title: layout.center.clone(),
            world_position,
            layout,
            ghosted: false,
        }
    }

    /// World position of a node in this cluster.
    pub fn world_position_of(&self, title: &str) -> Option<Vec3> {
        self.layout
            .node(title)
            .map(|n| self.world_position + n.position)
    }
}

/// Every cluster currently in the scene, keyed by center title.
#[derive(Debug, Clone)]
pub struct ClusterRegistry {
    clusters: HashMap<String, ClusterPlacement>,
    ghosts: VecDeque<String>,
    max_ghosts: usize,
}

impl ClusterRegistry {
    pub fn new(max_ghosts: usize) -> Self {
        Self {
            clusters: HashMap::new(),
            ghosts: VecDeque::new(),
            max_ghosts,
        }
    }

    pub fn get(&self, title: &str) -> Option<&ClusterPlacement> {
        self.clusters.get(title)
    }

    pub fn contains(&self, title: &str) -> bool {
        self.clusters.contains_key(title)
    }

    pub fn position_of(&self, title: &str) -> Option<Vec3> {
        self.clusters.get(title).map(|c| c.world_position)
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Ghost titles, oldest first.
    pub fn ghosts(&self) -> impl Iterator<Item = &str> {
        self.ghosts.iter().map(String::as_str)
    }

    pub fn insert(&mut self, placement: ClusterPlacement) {
        self.clusters.insert(placement.title.clone(), placement);
    }

    /// Remove a cluster entirely, including from the ghost queue.
    pub fn retire(&mut self, title: &str) -> Option<ClusterPlacement> {
        self.ghosts.retain(|g| g != title);
        self.clusters.remove(title)
    }

    /// Dim `title` and enqueue it as a ghost. Returns the titles evicted to
    /// respect the ghost bound, oldest first.
    pub fn ghost(&mut self, title: &str) -> Vec<String> {
        let Some(cluster) = self.clusters.get_mut(title) else {
            return Vec::new();
        };
        cluster.ghosted = true;
        self.ghosts.retain(|g| g != title);
        self.ghosts.push_back(title.to_string());

        let mut evicted = Vec::new();
        while self.ghosts.len() > self.max_ghosts {
            if let Some(old) = self.ghosts.pop_front() {
                self.clusters.remove(&old);
                evicted.push(old);
            }
        }
        evicted
    }

    /// Drop every cluster not named in `keep`. Returns the removed titles.
    pub fn retain_only(&mut self, keep: &[&str]) -> Vec<String> {
        let mut removed: Vec<String> = self
            .clusters
            .keys()
            .filter(|t| !keep.contains(&t.as_str()))
            .cloned()
            .collect();
        removed.sort();
        for title in &removed {
            self.clusters.remove(title);
        }
        self.ghosts.clear();
        removed
    }

    pub fn clear(&mut self) {
        self.clusters.clear();
        self.ghosts.clear();
    }

    /// World positions of the history entries that are still placed, in
    /// history order. Drawn as the trail polyline when it has two or more
    /// points.
    pub fn trail_points<'a>(&self, history: impl IntoIterator<Item = &'a String>) -> Vec<Vec3> {
        let points: Vec<Vec3> = history
            .into_iter()
            .filter_map(|t| self.position_of(t))
            .collect();
        if points.len() < 2 {
            Vec::new()
        } else {
            points
        }
    }
}
