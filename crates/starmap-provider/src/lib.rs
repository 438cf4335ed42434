//! Neighbor-set providers for StarMap.
//!
//! The navigator only needs `fetch_neighbor_set(title, mode)`; this crate
//! defines that seam as the [`NeighborProvider`] trait and ships two
//! implementations:
//!
//! - [`WikipediaProvider`]: live MediaWiki Action/REST APIs, globally rate
//!   limited, with redirect canonicalization, relevance ranking and
//!   best-effort page metadata.
//! - [`LocalDatasetProvider`]: a precomputed JSON neighbor dataset (for
//!   example word-embedding nearest neighbors).

pub mod error;
pub mod inflight;
pub mod limiter;
pub mod local;
pub mod rank;
pub mod wikipedia;

pub use error::ProviderError;
pub use inflight::InFlight;
pub use limiter::RateLimiter;
pub use local::{LocalDataset, LocalDatasetProvider};
pub use rank::{dedupe_candidates, rank_neighbors, Relevance};
pub use wikipedia::{WikipediaConfig, WikipediaProvider};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use starmap_core::{LinkMode, NeighborSet};

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Short description of a page for previews and the sidebar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub title: String,
    pub extract: String,
    pub thumbnail: Option<String>,
}

impl Summary {
    /// Placeholder returned when a summary cannot be loaded.
    pub fn empty(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Capacities of the provider-side caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSizes {
    pub neighbor_sets: usize,
    pub summaries: usize,
    pub relevance: usize,
    pub metadata: usize,
}

impl Default for CacheSizes {
    fn default() -> Self {
        Self {
            neighbor_sets: 64,
            summaries: 512,
            relevance: 128,
            metadata: 1024,
        }
    }
}

/// Source of neighbor sets.
///
/// Implementations canonicalize titles before keying their caches,
/// deduplicate concurrent requests for the same set, and apply their own
/// rate limiting.
#[async_trait]
pub trait NeighborProvider: Send + Sync {
    /// Load the center and its ranked neighbors. The returned set's center
    /// title is canonical.
    async fn fetch_neighbor_set(&self, title: &str, mode: LinkMode) -> Result<NeighborSet>;

    /// Best-effort summary; never fails, falling back to empty fields.
    async fn fetch_summary(&self, title: &str) -> Summary;

    /// Title completions for a search prefix; empty on failure.
    async fn suggest(&self, prefix: &str, limit: usize) -> Vec<String>;

    /// Drop every cached entry.
    fn clear_caches(&self);

    fn name(&self) -> &'static str;
}
