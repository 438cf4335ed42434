//! Shared value types: vectors, link modes and fetched neighbor sets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

// =============================================================================
// VEC3
// =============================================================================

/// 3D vector in world or cluster-local space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn from_array(a: [f32; 3]) -> Self {
        Self::new(a[0], a[1], a[2])
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Unit vector in the same direction, or `None` for a (near) zero or
    /// non-finite vector.
    pub fn normalized(self) -> Option<Vec3> {
        let len = self.length();
        if !len.is_finite() || len < f32::EPSILON {
            return None;
        }
        Some(self * (1.0 / len))
    }

    /// Linear interpolation toward `other`; `t = 0` is `self`, `t = 1` is `other`.
    pub fn lerp(self, other: Vec3, t: f32) -> Vec3 {
        self + (other - self) * t
    }

    pub fn distance(self, other: Vec3) -> f32 {
        (other - self).length()
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;
    fn mul(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Vec3 {
    type Output = Vec3;
    fn neg(self) -> Vec3 {
        Vec3::new(-self.x, -self.y, -self.z)
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

// =============================================================================
// LINK MODE
// =============================================================================

/// Which side of the link graph a neighbor set was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkMode {
    /// Pages the center links to.
    #[default]
    Outlinks,
    /// Pages linking to the center.
    Backlinks,
}

impl LinkMode {
    pub fn from_backlinks(show_backlinks: bool) -> Self {
        if show_backlinks {
            LinkMode::Backlinks
        } else {
            LinkMode::Outlinks
        }
    }

    /// Short prefix used in cache keys.
    pub fn key_prefix(self) -> &'static str {
        match self {
            LinkMode::Outlinks => "out",
            LinkMode::Backlinks => "back",
        }
    }
}

impl fmt::Display for LinkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LinkMode::Outlinks => "outlinks",
            LinkMode::Backlinks => "backlinks",
        })
    }
}

// =============================================================================
// NEIGHBOR SET
// =============================================================================

/// Optional page metadata. Every field is a hint and may be absent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PageMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wikidata_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
}

/// The entity at the focal point of a neighbor set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CenterInfo {
    /// Canonical title.
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub meta: PageMeta,
}

impl CenterInfo {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// A center and its ranked neighbors, as returned by a provider.
///
/// Immutable once fetched; providers key it by `(mode, canonical title)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborSet {
    pub center: CenterInfo,
    /// Neighbor titles, strongest first.
    pub neighbors: Vec<String>,
    pub mode: LinkMode,
    /// Known embedding coordinates, keyed by title. Used as a geometric
    /// hint by the layout engine when both endpoints are present.
    #[serde(default)]
    pub coordinates: HashMap<String, Vec3>,
    #[serde(default)]
    pub meta_by_title: HashMap<String, PageMeta>,
    pub fetched_at: DateTime<Utc>,
}

impl NeighborSet {
    pub fn new(center: CenterInfo, neighbors: Vec<String>, mode: LinkMode) -> Self {
        Self {
            center,
            neighbors,
            mode,
            coordinates: HashMap::new(),
            meta_by_title: HashMap::new(),
            fetched_at: Utc::now(),
        }
    }

    pub fn title(&self) -> &str {
        &self.center.title
    }

    /// Direction hint from the center toward `neighbor`, when both have
    /// known coordinates.
    pub fn direction_hint(&self, neighbor: &str) -> Option<Vec3> {
        let center = self.coordinates.get(&self.center.title)?;
        let other = self.coordinates.get(neighbor)?;
        (*other - *center).normalized()
    }
}
