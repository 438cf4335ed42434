//! StarMap configuration.
//!
//! Loaded from YAML (`config/starmap.yaml` unless `STARMAP_CONFIG` points
//! elsewhere). Every field has a default, so a partial file or no file at
//! all is valid.
//!
//! ```yaml
//! layout:
//!   r_min: 8.0
//!   r_max: 40.0
//! trail:
//!   enabled: true
//!   max_ghosts: 5
//! provider:
//!   kind: local
//!   dataset_path: data/words.json
//! return_policy: trail_only
//! ```

use serde::{Deserialize, Serialize};
use starmap_core::{
    LayoutParams, NavigatorConfig, ReturnPolicy, TransitionParams, DEFAULT_FADE_START,
    DEFAULT_TRANSITION_MS, MAX_GHOSTS,
};
use starmap_provider::{
    CacheSizes, LocalDatasetProvider, NeighborProvider, ProviderError, WikipediaConfig,
    WikipediaProvider,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default configuration path
pub const DEFAULT_CONFIG_PATH: &str = "config/starmap.yaml";

/// Environment variable overriding [`DEFAULT_CONFIG_PATH`].
pub const CONFIG_ENV: &str = "STARMAP_CONFIG";

/// Environment variable selecting a local dataset regardless of the file.
pub const DATASET_ENV: &str = "STARMAP_DATASET";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Provider setup failed: {0}")]
    Provider(#[from] ProviderError),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrailConfig {
    pub enabled: bool,
    pub max_ghosts: usize,
}

impl Default for TrailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_ghosts: MAX_GHOSTS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionConfig {
    pub duration_ms: u64,
    pub fade_start: f32,
    /// Frames per second while a transition is running.
    pub frame_rate: u32,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            duration_ms: DEFAULT_TRANSITION_MS,
            fade_start: DEFAULT_FADE_START,
            frame_rate: 60,
        }
    }
}

impl TransitionConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.frame_rate.max(1)))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Wikipedia,
    Local,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub api_base: String,
    pub rest_base: String,
    pub user_agent: String,
    pub request_spacing_ms: u64,
    pub request_timeout_ms: u64,
    /// Required when `kind` is `local`.
    pub dataset_path: Option<PathBuf>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        let wiki = WikipediaConfig::default();
        Self {
            kind: ProviderKind::default(),
            api_base: wiki.api_base,
            rest_base: wiki.rest_base,
            user_agent: wiki.user_agent,
            request_spacing_ms: wiki.request_spacing.as_millis() as u64,
            request_timeout_ms: wiki.request_timeout.as_millis() as u64,
            dataset_path: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StarmapConfig {
    pub layout: LayoutParams,
    pub trail: TrailConfig,
    pub transition: TransitionConfig,
    pub provider: ProviderConfig,
    pub cache: CacheSizes,
    pub return_policy: ReturnPolicy,
}

impl StarmapConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes to unit, not to a map.
        let config: StarmapConfig = if content.trim().is_empty() {
            StarmapConfig::default()
        } else {
            serde_yaml::from_str(content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from `$STARMAP_CONFIG` or the default path, falling back to
    /// defaults when the file does not exist. `$STARMAP_DATASET` switches
    /// the provider to a local dataset.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = if Path::new(&path).exists() {
            tracing::info!(path = %path, "Loading configuration");
            Self::from_file(&path)?
        } else {
            tracing::debug!(path = %path, "No configuration file, using defaults");
            Self::default()
        };
        if let Ok(dataset) = std::env::var(DATASET_ENV) {
            config.provider.kind = ProviderKind::Local;
            config.provider.dataset_path = Some(PathBuf::from(dataset));
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let l = &self.layout;
        if !(l.r_min > 0.0 && l.r_min <= l.r_max) {
            return Err(ConfigError::Invalid(format!(
                "layout radii must satisfy 0 < r_min <= r_max (got {} / {})",
                l.r_min, l.r_max
            )));
        }
        if l.max_neighbors == 0 {
            return Err(ConfigError::Invalid("layout.max_neighbors must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.transition.fade_start) {
            return Err(ConfigError::Invalid(format!(
                "transition.fade_start must be in [0, 1) (got {})",
                self.transition.fade_start
            )));
        }
        if self.transition.frame_rate == 0 {
            return Err(ConfigError::Invalid("transition.frame_rate must be positive".into()));
        }
        if self.provider.kind == ProviderKind::Local && self.provider.dataset_path.is_none() {
            return Err(ConfigError::Invalid(
                "provider.dataset_path is required for the local provider".into(),
            ));
        }
        Ok(())
    }

    pub fn navigator_config(&self) -> NavigatorConfig {
        NavigatorConfig {
            layout: self.layout,
            transition: TransitionParams {
                duration_ms: self.transition.duration_ms,
                fade_start: self.transition.fade_start,
            },
            max_ghosts: self.trail.max_ghosts,
            trail_enabled: self.trail.enabled,
            return_policy: self.return_policy,
        }
    }

    pub fn wikipedia_config(&self) -> WikipediaConfig {
        let p = &self.provider;
        WikipediaConfig {
            api_base: p.api_base.clone(),
            rest_base: p.rest_base.clone(),
            user_agent: p.user_agent.clone(),
            request_spacing: Duration::from_millis(p.request_spacing_ms),
            request_timeout: Duration::from_millis(p.request_timeout_ms),
            max_neighbors: self.layout.max_neighbors,
            caches: self.cache,
        }
    }

    pub fn build_provider(&self) -> Result<Arc<dyn NeighborProvider>, ConfigError> {
        match self.provider.kind {
            ProviderKind::Wikipedia => Ok(Arc::new(WikipediaProvider::new(self.wikipedia_config())?)),
            ProviderKind::Local => {
                let path = self.provider.dataset_path.as_ref().ok_or_else(|| {
                    ConfigError::Invalid("provider.dataset_path is not set".into())
                })?;
                let provider = LocalDatasetProvider::from_file(path, self.cache.neighbor_sets)?
                    .with_max_neighbors(self.layout.max_neighbors);
                Ok(Arc::new(provider))
            }
        }
    }
}
