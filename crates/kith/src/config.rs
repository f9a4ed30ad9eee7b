//! Configuration file management
//!
//! One JSON file, `~/.config/kith/config.json`, holding the identity the
//! user shares credentials under. There are no defaults worth running with:
//! a missing file means `kith init` has not happened yet, and that is an
//! error pointing the user there rather than a silent fallback.

use anyhow::{bail, Context, Result};
use kith_core::paths::config_home;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory under the config home that belongs to kith.
pub fn app_config_dir(xdg_config_home: Option<&str>) -> PathBuf {
    config_home(xdg_config_home).join("kith")
}

/// Full path of the configuration file.
pub fn config_file(xdg_config_home: Option<&str>) -> PathBuf {
    app_config_dir(xdg_config_home).join("config.json")
}

/// User configuration written by `kith init`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// The username credentials are stored and looked up under.
    pub username: String,
}

impl Config {
    /// Load config from file. A missing file is an error telling the user
    /// to run `kith init`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!("No configuration at {} - run 'kith init' first", path.display());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Save config to file, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_config_dir_default() {
        assert!(app_config_dir(None).ends_with(".config/kith"));
    }

    #[test]
    fn test_config_file_under_xdg_override() {
        let path = config_file(Some("~/.xdg"));
        assert!(path.ends_with(".xdg/kith/config.json"));
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kith").join("config.json");

        let config = Config {
            username: "will.dearborn".to_string(),
        };
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.username, "will.dearborn");
    }

    #[test]
    fn test_load_missing_file_points_at_init() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("config.json")).unwrap_err();
        assert!(err.to_string().contains("kith init"));
    }
}
