//! Local neighbor dataset.
//!
//! A JSON object mapping each word or title to its nearest neighbors,
//! strongest first. Entries are either a bare list or an object carrying an
//! embedding position and a summary:
//!
//! ```json
//! {
//!   "king":  ["queen", "prince", "monarch"],
//!   "queen": { "neighbors": ["king", "princess"], "position": [0.1, 0.7, -0.2],
//!              "summary": "Female monarch." }
//! }
//! ```
//!
//! Backlinks are answered from the reversed adjacency: every entry listing
//! the center, ordered by where the center appears in that entry's list.

use crate::error::ProviderError;
use crate::rank::{dedupe_candidates, rank_neighbors, Relevance};
use crate::{NeighborProvider, Result, Summary};
use async_trait::async_trait;
use serde::Deserialize;
use starmap_core::{BoundedCache, CenterInfo, LinkMode, NeighborSet, Vec3, MAX_NEIGHBORS};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEntry {
    List(Vec<String>),
    Detailed {
        neighbors: Vec<String>,
        #[serde(default)]
        position: Option<[f32; 3]>,
        #[serde(default)]
        summary: Option<String>,
    },
}

#[derive(Debug, Clone, Default)]
struct Entry {
    neighbors: Vec<String>,
    position: Option<Vec3>,
    summary: Option<String>,
}

impl From<RawEntry> for Entry {
    fn from(raw: RawEntry) -> Self {
        match raw {
            RawEntry::List(neighbors) => Entry {
                neighbors,
                ..Entry::default()
            },
            RawEntry::Detailed {
                neighbors,
                position,
                summary,
            } => Entry {
                neighbors,
                position: position.map(Vec3::from_array),
                summary,
            },
        }
    }
}

/// Parsed dataset with case-insensitive lookup and reverse adjacency.
#[derive(Debug, Default)]
pub struct LocalDataset {
    entries: HashMap<String, Entry>,
    by_lowercase: HashMap<String, String>,
    /// title -> (source, position of title in source's list)
    incoming: HashMap<String, Vec<(String, usize)>>,
}

impl LocalDataset {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let parsed: HashMap<String, RawEntry> =
            serde_json::from_str(raw).map_err(|e| ProviderError::Dataset(e.to_string()))?;

        let mut entries = HashMap::with_capacity(parsed.len());
        let mut by_lowercase = HashMap::with_capacity(parsed.len());
        let mut incoming: HashMap<String, Vec<(String, usize)>> = HashMap::new();

        for (title, raw) in parsed {
            let entry = Entry::from(raw);
            for (pos, neighbor) in entry.neighbors.iter().enumerate() {
                incoming
                    .entry(neighbor.clone())
                    .or_default()
                    .push((title.clone(), pos));
            }
            // Titles differing only in case resolve to the smallest one.
            let folded = by_lowercase
                .entry(title.to_lowercase())
                .or_insert_with(|| title.clone());
            if title < *folded {
                *folded = title.clone();
            }
            entries.insert(title, entry);
        }
        // Stable order regardless of map iteration; a source listing a title
        // twice keeps its nearest position.
        for sources in incoming.values_mut() {
            sources.sort();
            sources.dedup_by(|later, first| later.0 == first.0);
        }

        Ok(Self {
            entries,
            by_lowercase,
            incoming,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ProviderError::Io(format!("{}: {e}", path.display())))?;
        let dataset = Self::from_json_str(&raw)?;
        info!(path = %path.display(), entries = dataset.len(), "Loaded neighbor dataset");
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact match first, then case-insensitive.
    pub fn canonicalize(&self, title: &str) -> Option<&str> {
        let title = title.trim();
        if let Some((key, _)) = self.entries.get_key_value(title) {
            return Some(key.as_str());
        }
        self.by_lowercase
            .get(&title.to_lowercase())
            .map(String::as_str)
    }

    fn entry(&self, canonical: &str) -> Option<&Entry> {
        self.entries.get(canonical)
    }

    /// Sources linking to `canonical`, nearest first.
    fn backlinks(&self, canonical: &str, limit: usize) -> Vec<String> {
        let Some(sources) = self.incoming.get(canonical) else {
            return Vec::new();
        };
        let sources: Vec<&(String, usize)> =
            sources.iter().filter(|(s, _)| s != canonical).collect();
        let candidates: Vec<String> = sources.iter().map(|(s, _)| s.clone()).collect();
        let relevance: HashMap<String, Relevance> = sources
            .iter()
            .map(|(s, pos)| (s.clone(), Relevance { rank: *pos, score: 0.0 }))
            .collect();
        rank_neighbors(&candidates, &relevance, limit)
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Neighbor sets served from a [`LocalDataset`].
pub struct LocalDatasetProvider {
    dataset: LocalDataset,
    max_neighbors: usize,
    sets: Mutex<BoundedCache<(LinkMode, String), NeighborSet>>,
}

impl LocalDatasetProvider {
    pub fn new(dataset: LocalDataset, cache_capacity: usize) -> Self {
        Self {
            dataset,
            max_neighbors: MAX_NEIGHBORS,
            sets: Mutex::new(BoundedCache::new(cache_capacity)),
        }
    }

    pub fn from_file(path: impl AsRef<Path>, cache_capacity: usize) -> Result<Self> {
        Ok(Self::new(LocalDataset::from_file(path)?, cache_capacity))
    }

    pub fn with_max_neighbors(mut self, max_neighbors: usize) -> Self {
        self.max_neighbors = max_neighbors;
        self
    }

    pub fn dataset(&self) -> &LocalDataset {
        &self.dataset
    }

    fn build(&self, canonical: &str, mode: LinkMode) -> Result<NeighborSet> {
        let entry = self
            .dataset
            .entry(canonical)
            .ok_or_else(|| ProviderError::NotFound(canonical.to_string()))?;

        let neighbors: Vec<String> = match mode {
            LinkMode::Outlinks => {
                let mut neighbors = dedupe_candidates(canonical, entry.neighbors.iter().cloned());
                neighbors.truncate(self.max_neighbors);
                neighbors
            }
            LinkMode::Backlinks => self.dataset.backlinks(canonical, self.max_neighbors),
        };

        let mut center = CenterInfo::titled(canonical);
        center.summary = entry.summary.clone();
        let mut set = NeighborSet::new(center, neighbors, mode);

        if let Some(origin) = entry.position {
            set.coordinates.insert(canonical.to_string(), origin);
            for n in &set.neighbors {
                if let Some(p) = self.dataset.entry(n).and_then(|e| e.position) {
                    set.coordinates.insert(n.clone(), p);
                }
            }
        }
        Ok(set)
    }
}

#[async_trait]
impl NeighborProvider for LocalDatasetProvider {
    async fn fetch_neighbor_set(&self, title: &str, mode: LinkMode) -> Result<NeighborSet> {
        let canonical = self
            .dataset
            .canonicalize(title)
            .ok_or_else(|| ProviderError::NotFound(title.trim().to_string()))?
            .to_string();

        let key = (mode, canonical.clone());
        if let Some(hit) = lock(&self.sets).get(&key) {
            return Ok(hit.clone());
        }

        let set = self.build(&canonical, mode)?;
        debug!(center = %canonical, mode = %mode, neighbors = set.neighbors.len(), "Built local neighbor set");
        lock(&self.sets).set(key, set.clone());
        Ok(set)
    }

    async fn fetch_summary(&self, title: &str) -> Summary {
        match self.dataset.canonicalize(title) {
            Some(canonical) => Summary {
                title: canonical.to_string(),
                extract: self
                    .dataset
                    .entry(canonical)
                    .and_then(|e| e.summary.clone())
                    .unwrap_or_default(),
                thumbnail: None,
            },
            None => Summary::empty(title.trim()),
        }
    }

    async fn suggest(&self, prefix: &str, limit: usize) -> Vec<String> {
        let prefix = prefix.trim().to_lowercase();
        if prefix.is_empty() {
            return Vec::new();
        }
        let mut hits: Vec<&String> = self
            .dataset
            .entries
            .keys()
            .filter(|t| t.to_lowercase().starts_with(&prefix))
            .collect();
        hits.sort();
        hits.into_iter().take(limit).cloned().collect()
    }

    fn clear_caches(&self) {
        lock(&self.sets).clear();
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
