//! Wikipedia neighbor provider
//!
//! Rate-limited client for the MediaWiki Action API and the REST summary
//! endpoint. A neighbor set for a page is built from:
//!
//! 1. the REST summary of the canonical page (failure fails the whole set)
//! 2. its outgoing links or backlinks, following continuation
//! 3. a `morelike:` search used as the relevance signal for ranking
//! 4. best-effort page metadata (categories, Wikidata id, length)
//!
//! Steps 2-4 degrade to empty results on error.

use crate::error::ProviderError;
use crate::inflight::InFlight;
use crate::limiter::RateLimiter;
use crate::rank::{dedupe_candidates, rank_neighbors, Relevance};
use crate::{CacheSizes, NeighborProvider, Result, Summary};
use async_trait::async_trait;
use futures::FutureExt;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use starmap_core::{BoundedCache, CenterInfo, LinkMode, NeighborSet, PageMeta, MAX_NEIGHBORS};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const DEFAULT_API_BASE: &str = "https://en.wikipedia.org/w/api.php";
const DEFAULT_REST_BASE: &str = "https://en.wikipedia.org/api/rest_v1";
const DEFAULT_USER_AGENT: &str = concat!("StarMap/", env!("CARGO_PKG_VERSION"));

/// Titles per metadata request (MediaWiki limit for anonymous clients).
const META_BATCH: usize = 50;

/// Results requested from the `morelike:` relevance search.
const RELEVANCE_LIMIT: &str = "500";

#[derive(Debug, Clone)]
pub struct WikipediaConfig {
    pub api_base: String,
    pub rest_base: String,
    pub user_agent: String,
    /// Minimum gap between any two outbound requests.
    pub request_spacing: Duration,
    pub request_timeout: Duration,
    pub max_neighbors: usize,
    pub caches: CacheSizes,
}

impl Default for WikipediaConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            rest_base: DEFAULT_REST_BASE.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_spacing: Duration::from_millis(250),
            request_timeout: Duration::from_secs(15),
            max_neighbors: MAX_NEIGHBORS,
            caches: CacheSizes::default(),
        }
    }
}

// =============================================================================
// RESPONSE TYPES (formatversion=2)
// =============================================================================

#[derive(Debug, Deserialize)]
struct ApiResponse<Q> {
    query: Option<Q>,
    #[serde(rename = "continue")]
    cont: Option<Continue>,
}

#[derive(Debug, Default, Deserialize)]
struct Continue {
    plcontinue: Option<String>,
    blcontinue: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TitleRef {
    title: String,
}

#[derive(Debug, Default, Deserialize)]
struct PagesQuery {
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    title: String,
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    invalid: bool,
    #[serde(default)]
    links: Vec<TitleRef>,
    categories: Option<Vec<TitleRef>>,
    pageprops: Option<PageProps>,
    length: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct PageProps {
    wikibase_item: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BacklinksQuery {
    #[serde(default)]
    backlinks: Vec<TitleRef>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
    score: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RestSummary {
    title: Option<String>,
    extract: Option<String>,
    thumbnail: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    source: String,
}

fn page_meta(page: &Page) -> PageMeta {
    PageMeta {
        categories: page.categories.as_ref().map(|cats| {
            cats.iter()
                .map(|c| {
                    c.title
                        .strip_prefix("Category:")
                        .unwrap_or(&c.title)
                        .to_string()
                })
                .collect()
        }),
        wikidata_id: page.pageprops.as_ref().and_then(|p| p.wikibase_item.clone()),
        length: page.length,
    }
}

fn cache_key(mode: LinkMode, title: &str) -> String {
    format!("{}|{}", mode.key_prefix(), title)
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// =============================================================================
// PROVIDER
// =============================================================================

struct Inner {
    client: Client,
    config: WikipediaConfig,
    limiter: RateLimiter,
    sets: Mutex<BoundedCache<String, NeighborSet>>,
    summaries: Mutex<BoundedCache<String, Summary>>,
    relevance: Mutex<BoundedCache<String, HashMap<String, Relevance>>>,
    meta: Mutex<BoundedCache<String, PageMeta>>,
    inflight: InFlight<String, NeighborSet>,
}

/// Neighbor sets from the live Wikipedia API.
#[derive(Clone)]
pub struct WikipediaProvider {
    inner: Arc<Inner>,
}

impl WikipediaProvider {
    pub fn new(config: WikipediaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        let caches = config.caches;
        let sets = BoundedCache::new(caches.neighbor_sets).with_eviction_callback(
            |key: &String, _: &NeighborSet| debug!(key = %key, "Evicted neighbor set"),
        );

        info!(
            api = %config.api_base,
            spacing_ms = config.request_spacing.as_millis() as u64,
            "Wikipedia provider ready"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                limiter: RateLimiter::new(config.request_spacing),
                sets: Mutex::new(sets),
                summaries: Mutex::new(BoundedCache::new(caches.summaries)),
                relevance: Mutex::new(BoundedCache::new(caches.relevance)),
                meta: Mutex::new(BoundedCache::new(caches.metadata)),
                inflight: InFlight::new(),
                config,
            }),
        })
    }

    pub fn config(&self) -> &WikipediaConfig {
        &self.inner.config
    }

    /// Number of cached neighbor sets.
    pub fn cached_sets(&self) -> usize {
        lock(&self.inner.sets).len()
    }
}

impl Inner {
    fn api_url(&self, params: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(&self.config.api_base)?;
        url.query_pairs_mut()
            .extend_pairs(params)
            .append_pair("format", "json")
            .append_pair("formatversion", "2");
        Ok(url)
    }

    fn rest_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.config.rest_base)?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::Parse(format!("not a base url: {}", self.config.rest_base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        self.limiter.acquire().await;
        debug!(url = %url, "GET");

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.json::<T>().await?)
    }

    fn cached_set(&self, key: &str) -> Option<NeighborSet> {
        lock(&self.sets).get(&key.to_string()).cloned()
    }

    /// Resolve redirects. Falls back to the input on any error.
    async fn normalize_title(&self, title: &str) -> String {
        let resolved = async {
            let url = self.api_url(&[("action", "query"), ("redirects", "1"), ("titles", title)])?;
            let data: ApiResponse<PagesQuery> = self.get_json(url).await?;
            Ok::<_, ProviderError>(
                data.query
                    .and_then(|q| q.pages.into_iter().next())
                    .map(|p| p.title),
            )
        }
        .await;

        match resolved {
            Ok(Some(canonical)) => canonical,
            Ok(None) => title.to_string(),
            Err(e) => {
                debug!(title = %title, error = %e, "Title normalization failed, using input");
                title.to_string()
            }
        }
    }

    async fn fetch_rest_summary(&self, title: &str) -> Result<RestSummary> {
        let url = self.rest_url(&["page", "summary", title])?;
        self.get_json(url).await
    }

    /// Link titles in discovery order, following continuation. Errors end
    /// the walk with whatever was collected.
    async fn collect_links(&self, canonical: &str, mode: LinkMode) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();
        let mut cont: Option<String> = None;

        loop {
            let page = match mode {
                LinkMode::Outlinks => self.links_page(canonical, cont.as_deref()).await,
                LinkMode::Backlinks => self.backlinks_page(canonical, cont.as_deref()).await,
            };
            match page {
                Ok((titles, next)) => {
                    found.extend(titles);
                    match next {
                        Some(c) => cont = Some(c),
                        None => break,
                    }
                }
                Err(e) => {
                    warn!(title = %canonical, mode = %mode, error = %e, "Link listing failed");
                    break;
                }
            }
        }
        dedupe_candidates(canonical, found)
    }

    async fn links_page(
        &self,
        canonical: &str,
        cont: Option<&str>,
    ) -> Result<(Vec<String>, Option<String>)> {
        let mut params = vec![
            ("action", "query"),
            ("titles", canonical),
            ("prop", "links"),
            ("plnamespace", "0"),
            ("pllimit", "max"),
        ];
        if let Some(c) = cont {
            params.push(("plcontinue", c));
        }
        let data: ApiResponse<PagesQuery> = self.get_json(self.api_url(&params)?).await?;
        let titles = data
            .query
            .and_then(|q| q.pages.into_iter().next())
            .map(|p| p.links.into_iter().map(|l| l.title).collect())
            .unwrap_or_default();
        Ok((titles, data.cont.and_then(|c| c.plcontinue)))
    }

    async fn backlinks_page(
        &self,
        canonical: &str,
        cont: Option<&str>,
    ) -> Result<(Vec<String>, Option<String>)> {
        let mut params = vec![
            ("action", "query"),
            ("list", "backlinks"),
            ("bltitle", canonical),
            ("blnamespace", "0"),
            ("bllimit", "max"),
        ];
        if let Some(c) = cont {
            params.push(("blcontinue", c));
        }
        let data: ApiResponse<BacklinksQuery> = self.get_json(self.api_url(&params)?).await?;
        let titles = data
            .query
            .map(|q| q.backlinks.into_iter().map(|l| l.title).collect())
            .unwrap_or_default();
        Ok((titles, data.cont.and_then(|c| c.blcontinue)))
    }

    /// `morelike:` search results as rank/score by title.
    async fn relevance(&self, canonical: &str) -> HashMap<String, Relevance> {
        if let Some(hit) = lock(&self.relevance).get(&canonical.to_string()) {
            return hit.clone();
        }

        let search = format!("morelike:{canonical}");
        let fetched = async {
            let url = self.api_url(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", search.as_str()),
                ("srlimit", RELEVANCE_LIMIT),
                ("srprop", "score"),
            ])?;
            self.get_json::<ApiResponse<SearchQuery>>(url).await
        }
        .await;

        match fetched {
            Ok(data) => {
                let map: HashMap<String, Relevance> = data
                    .query
                    .map(|q| q.search)
                    .unwrap_or_default()
                    .into_iter()
                    .enumerate()
                    .map(|(rank, hit)| {
                        (
                            hit.title,
                            Relevance {
                                rank,
                                score: hit.score.unwrap_or(0.0),
                            },
                        )
                    })
                    .collect();
                lock(&self.relevance).set(canonical.to_string(), map.clone());
                map
            }
            Err(e) => {
                warn!(title = %canonical, error = %e, "Relevance search failed");
                HashMap::new()
            }
        }
    }

    /// Metadata for `titles`, served from cache where possible and fetched in
    /// batches otherwise. Failed batches are skipped.
    async fn meta_batch(&self, titles: &[String]) -> HashMap<String, PageMeta> {
        let mut result = HashMap::new();
        let mut missing = Vec::new();
        {
            let mut cache = lock(&self.meta);
            for t in titles {
                match cache.get(t) {
                    Some(m) => {
                        result.insert(t.clone(), m.clone());
                    }
                    None => missing.push(t.clone()),
                }
            }
        }

        for chunk in missing.chunks(META_BATCH) {
            let joined = chunk.join("|");
            let fetched = async {
                let url = self.api_url(&[
                    ("action", "query"),
                    ("prop", "categories|pageprops|info"),
                    ("clshow", "!hidden"),
                    ("cllimit", "max"),
                    ("titles", joined.as_str()),
                ])?;
                self.get_json::<ApiResponse<PagesQuery>>(url).await
            }
            .await;

            let pages = match fetched {
                Ok(data) => data.query.map(|q| q.pages).unwrap_or_default(),
                Err(e) => {
                    debug!(batch = chunk.len(), error = %e, "Metadata batch failed");
                    continue;
                }
            };
            let mut cache = lock(&self.meta);
            for page in pages.iter().filter(|p| !p.missing && !p.invalid) {
                let meta = page_meta(page);
                cache.set(page.title.clone(), meta.clone());
                result.insert(page.title.clone(), meta);
            }
        }
        result
    }

    async fn build_set(&self, canonical: String, mode: LinkMode) -> Result<NeighborSet> {
        let summary = self.fetch_rest_summary(&canonical).await?;
        let candidates = self.collect_links(&canonical, mode).await;
        let relevance = self.relevance(&canonical).await;
        let neighbors = rank_neighbors(&candidates, &relevance, self.config.max_neighbors);

        let mut titles = Vec::with_capacity(neighbors.len() + 1);
        titles.push(canonical.clone());
        titles.extend(neighbors.iter().cloned());
        let meta_by_title = self.meta_batch(&titles).await;

        let extract = summary.extract.unwrap_or_default();
        let thumbnail_url = summary.thumbnail.map(|t| t.source);
        lock(&self.summaries).set(
            canonical.clone(),
            Summary {
                title: canonical.clone(),
                extract: extract.clone(),
                thumbnail: thumbnail_url.clone(),
            },
        );

        let center = CenterInfo {
            meta: meta_by_title.get(&canonical).cloned().unwrap_or_default(),
            title: canonical,
            summary: (!extract.is_empty()).then_some(extract),
            thumbnail_url,
        };
        let mut set = NeighborSet::new(center, neighbors, mode);
        set.meta_by_title = meta_by_title;
        Ok(set)
    }
}

#[async_trait]
impl NeighborProvider for WikipediaProvider {
    async fn fetch_neighbor_set(&self, title: &str, mode: LinkMode) -> Result<NeighborSet> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ProviderError::NotFound(String::new()));
        }

        let pre_key = cache_key(mode, title);
        if let Some(set) = self.inner.cached_set(&pre_key) {
            debug!(title = %title, mode = %mode, "Neighbor set cache hit");
            return Ok(set);
        }

        let canonical = self.inner.normalize_title(title).await;
        let key = cache_key(mode, &canonical);
        if let Some(set) = self.inner.cached_set(&key) {
            debug!(title = %title, canonical = %canonical, "Neighbor set cache hit after normalization");
            return Ok(set);
        }

        let inner = Arc::clone(&self.inner);
        let store_key = key.clone();
        self.inner
            .inflight
            .run(key, move || {
                async move {
                    let set = inner.build_set(canonical, mode).await?;
                    info!(
                        center = %set.center.title,
                        mode = %mode,
                        neighbors = set.neighbors.len(),
                        "Neighbor set loaded"
                    );
                    lock(&inner.sets).set(store_key, set.clone());
                    Ok::<_, ProviderError>(set)
                }
                .boxed()
            })
            .await
    }

    async fn fetch_summary(&self, title: &str) -> Summary {
        let title = title.trim();
        if let Some(hit) = lock(&self.inner.summaries).get(&title.to_string()) {
            return hit.clone();
        }

        let summary = match self.inner.fetch_rest_summary(title).await {
            Ok(data) => Summary {
                title: data.title.unwrap_or_else(|| title.to_string()),
                extract: data.extract.unwrap_or_default(),
                thumbnail: data.thumbnail.map(|t| t.source),
            },
            Err(e) => {
                debug!(title = %title, error = %e, "Summary unavailable");
                Summary::empty(title)
            }
        };
        lock(&self.inner.summaries).set(title.to_string(), summary.clone());
        summary
    }

    async fn suggest(&self, prefix: &str, limit: usize) -> Vec<String> {
        let prefix = prefix.trim();
        if prefix.is_empty() || limit == 0 {
            return Vec::new();
        }
        let limit = limit.to_string();
        let fetched = async {
            let url = self.inner.api_url(&[
                ("action", "opensearch"),
                ("namespace", "0"),
                ("limit", limit.as_str()),
                ("search", prefix),
            ])?;
            self.inner.get_json::<serde_json::Value>(url).await
        }
        .await;

        match fetched {
            Ok(value) => opensearch_titles(&value),
            Err(e) => {
                debug!(prefix = %prefix, error = %e, "Suggestion lookup failed");
                Vec::new()
            }
        }
    }

    fn clear_caches(&self) {
        lock(&self.inner.sets).clear();
        lock(&self.inner.summaries).clear();
        lock(&self.inner.relevance).clear();
        lock(&self.inner.meta).clear();
        debug!("Wikipedia caches cleared");
    }

    fn name(&self) -> &'static str {
        "wikipedia"
    }
}

/// Opensearch replies `[query, [titles...], [descriptions...], [urls...]]`.
fn opensearch_titles(value: &serde_json::Value) -> Vec<String> {
    value
        .get(1)
        .and_then(|v| v.as_array())
        .map(|titles| {
            titles
                .iter()
                .filter_map(|t| t.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
