//! Configuration service implementation.
//!
//! Loads [`AppConfig`] from `~/.config/prism/config.toml`, creating the file
//! with defaults when it does not exist, and applies environment overrides.

use crate::paths::PrismPaths;
use prism_core::config::AppConfig;
use prism_core::error::{PrismError, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Overrides `api.base_url`.
pub const ENV_API_BASE_URL: &str = "PRISM_API_BASE_URL";
/// Overrides `storage.root`.
pub const ENV_STORAGE_ROOT: &str = "PRISM_STORAGE_ROOT";

/// Configuration service that loads and caches the application configuration.
#[derive(Debug, Clone)]
pub struct ConfigService {
    path: PathBuf,
    /// Cached configuration. Loaded lazily on first access.
    config: Arc<RwLock<Option<AppConfig>>>,
}

impl ConfigService {
    /// Creates a service reading the default config file location.
    pub fn new() -> Result<Self> {
        Ok(Self::with_path(PrismPaths::config_file()?))
    }

    /// Creates a service reading `path`.
    pub fn with_path(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            config: Arc::new(RwLock::new(None)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Gets the configuration, loading from file if not cached.
    ///
    /// A missing or unreadable file falls back to defaults; the failure is logged.
    pub fn get_config(&self) -> AppConfig {
        {
            let read_lock = self.config.read().unwrap_or_else(|e| e.into_inner());
            if let Some(ref cached) = *read_lock {
                return cached.clone();
            }
        }

        let mut loaded = match self.load_or_create() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "Failed to load config, using defaults: {}", e);
                AppConfig::default()
            }
        };
        apply_env_overrides(&mut loaded, |key| std::env::var(key).ok());

        let mut write_lock = self.config.write().unwrap_or_else(|e| e.into_inner());
        *write_lock = Some(loaded.clone());
        loaded
    }

    /// Invalidates the cache, forcing a reload on next access.
    pub fn invalidate_cache(&self) {
        let mut write_lock = self.config.write().unwrap_or_else(|e| e.into_inner());
        *write_lock = None;
    }

    fn load_or_create(&self) -> Result<AppConfig> {
        if !self.path.exists() {
            let default_config = AppConfig::default();
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&self.path, toml::to_string_pretty(&default_config)?)?;
            tracing::info!(path = %self.path.display(), "Created default config file");
            return Ok(default_config);
        }

        let content = std::fs::read_to_string(&self.path)?;
        toml::from_str(&content)
            .map_err(|e| PrismError::config(format!("{}: {}", self.path.display(), e)))
    }
}

/// Applies `PRISM_*` overrides read through `lookup`.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup(ENV_API_BASE_URL).filter(|v| !v.trim().is_empty()) {
        config.api.base_url = url;
    }
    if let Some(root) = lookup(ENV_STORAGE_ROOT).filter(|v| !v.trim().is_empty()) {
        config.storage.root = Some(PathBuf::from(root));
    }
}
