//! Unified path management for prism.
//!
//! ```text
//! ~/.config/prism/             # Config directory
//! ├── config.toml              # Application configuration
//! └── logs/                    # Application logs
//!     └── prism.log.YYYY-MM-DD
//!
//! ~/.local/share/prism/        # Data directory
//! └── store/                   # Object store root (preferences, conversations)
//! ```

use prism_core::error::{PrismError, Result};
use std::path::PathBuf;

const APP_DIR: &str = "prism";

pub struct PrismPaths;

impl PrismPaths {
    /// Returns the prism configuration directory (e.g. `~/.config/prism/`).
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or_else(|| PrismError::config("Cannot determine config directory"))
    }

    /// Returns the prism data directory (e.g. `~/.local/share/prism/`).
    pub fn data_dir() -> Result<PathBuf> {
        dirs::data_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or_else(|| PrismError::config("Cannot determine data directory"))
    }

    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Default root of the object store.
    pub fn store_root() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join("store"))
    }

    pub fn logs_dir() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("logs"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file() {
        let config_file = PrismPaths::config_file().unwrap();
        assert!(config_file.ends_with("prism/config.toml"));
        assert!(config_file.starts_with(PrismPaths::config_dir().unwrap()));
    }

    #[test]
    fn test_store_root_is_under_data_dir() {
        let root = PrismPaths::store_root().unwrap();
        assert!(root.ends_with("store"));
        assert!(root.starts_with(PrismPaths::data_dir().unwrap()));
    }

    #[test]
    fn test_logs_dir() {
        let logs_dir = PrismPaths::logs_dir().unwrap();
        assert!(logs_dir.ends_with("logs"));
        assert!(logs_dir.starts_with(PrismPaths::config_dir().unwrap()));
    }
}
