//! Configuration resolution for the wayfinder core.
//!
//! Resolution order, lowest to highest priority:
//! 1. Built-in defaults.
//! 2. `wayfinder.json` in the resolved data directory.
//! 3. `WAYFINDER_*` environment variables.
//! 4. Values passed explicitly by the caller (CLI flags).

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::CacheConfig;
use crate::error::{Error, Result};
use crate::fetch::{Fetch, HttpFetcher, LocalFetcher};
use crate::routing::RouterConfig;

pub const CONFIG_FILENAME: &str = "wayfinder.json";
const DATABASE_FILENAME: &str = "wayfinder.db";
const ASSETS_DIRNAME: &str = "assets";

pub const DATA_DIR_ENV: &str = "WAYFINDER_DATA_DIR";
pub const DATASET_SOURCE_ENV: &str = "WAYFINDER_DATASET_SOURCE";
pub const FLOOR_WEIGHT_ENV: &str = "WAYFINDER_FLOOR_WEIGHT";

/// Remote locations of the node and edge collections, relative to the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetEndpoints {
    pub nodes: String,
    pub edges: String,
}

impl Default for DatasetEndpoints {
    fn default() -> Self {
        Self {
            nodes: "nodes/".to_string(),
            edges: "edges/".to_string(),
        }
    }
}

/// Where dataset and assets are fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetSource {
    Http(String),
    Local(PathBuf),
}

impl DatasetSource {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            DatasetSource::Http(trimmed.to_string())
        } else {
            DatasetSource::Local(PathBuf::from(trimmed.strip_prefix("file://").unwrap_or(trimmed)))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WayfinderConfig {
    /// Directory holding the key-value database and cached assets.
    pub data_dir: Option<PathBuf>,
    /// HTTP base URL or local directory of the campus dataset.
    pub source: Option<String>,
    pub endpoints: DatasetEndpoints,
    pub router: RouterConfig,
    pub cache: CacheConfig,
    pub http_timeout_secs: u64,
}

impl Default for WayfinderConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            source: None,
            endpoints: DatasetEndpoints::default(),
            router: RouterConfig::default(),
            cache: CacheConfig::default(),
            http_timeout_secs: 30,
        }
    }
}

/// Resolve the default data location using platform-specific project directories.
pub fn default_data_dir() -> Result<PathBuf> {
    let dirs =
        ProjectDirs::from("edu", "wayfinder", "wayfinder").ok_or(Error::ProjectDirsUnavailable)?;
    Ok(dirs.data_dir().to_path_buf())
}

impl WayfinderConfig {
    /// Resolve configuration for `data_dir` (or the default location) using
    /// the process environment.
    pub fn load(data_dir: Option<&Path>) -> Result<Self> {
        Self::load_with(data_dir, |key| env::var(key).ok())
    }

    /// Same as [`WayfinderConfig::load`] with an injectable environment, so
    /// tests don't have to mutate process-global state.
    pub fn load_with<F>(data_dir: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let dir = match data_dir {
            Some(explicit) => explicit.to_path_buf(),
            None => match lookup(DATA_DIR_ENV) {
                Some(from_env) if !from_env.trim().is_empty() => PathBuf::from(from_env),
                _ => default_data_dir()?,
            },
        };

        let file = dir.join(CONFIG_FILENAME);
        let mut config = if file.exists() {
            debug!(path = %file.display(), "loading configuration file");
            let contents = fs::read_to_string(&file)?;
            serde_json::from_str::<WayfinderConfig>(&contents).map_err(|err| Error::Config {
                message: format!("{}: {err}", file.display()),
            })?
        } else {
            WayfinderConfig::default()
        };

        config.apply_env(&lookup)?;
        config.data_dir = Some(dir);
        Ok(config)
    }

    fn apply_env<F>(&mut self, lookup: &F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(source) = lookup(DATASET_SOURCE_ENV).filter(|s| !s.trim().is_empty()) {
            self.source = Some(source);
        }
        if let Some(raw) = lookup(FLOOR_WEIGHT_ENV) {
            let weight: f64 = raw.trim().parse().map_err(|_| Error::Config {
                message: format!("{FLOOR_WEIGHT_ENV} must be a number, got {raw:?}"),
            })?;
            if !weight.is_finite() || weight < 0.0 {
                return Err(Error::Config {
                    message: format!("{FLOOR_WEIGHT_ENV} must be non-negative, got {weight}"),
                });
            }
            self.router.floor_weight = weight;
        }
        Ok(())
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_data_dir(),
        }
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(DATABASE_FILENAME))
    }

    pub fn assets_dir(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(ASSETS_DIRNAME))
    }

    pub fn dataset_source(&self) -> Option<DatasetSource> {
        self.source.as_deref().map(DatasetSource::parse)
    }

    /// Build the fetcher for the configured source.
    pub fn build_fetcher(&self) -> Result<Arc<dyn Fetch>> {
        match self.dataset_source() {
            Some(DatasetSource::Http(base)) => Ok(Arc::new(HttpFetcher::new(
                base,
                Duration::from_secs(self.http_timeout_secs),
            )?)),
            Some(DatasetSource::Local(root)) => Ok(Arc::new(LocalFetcher::new(root))),
            None => Err(Error::Config {
                message: format!("no dataset source configured; set {DATASET_SOURCE_ENV}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn file_then_env_layering() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join(CONFIG_FILENAME),
            r#"{"source": "https://campus.example.edu/api", "router": {"floor_weight": 3.0}}"#,
        )
        .expect("write config");

        let config = WayfinderConfig::load_with(Some(dir.path()), env_of(&[])).expect("load");
        assert_eq!(config.router.floor_weight, 3.0);
        assert_eq!(
            config.dataset_source(),
            Some(DatasetSource::Http("https://campus.example.edu/api".to_string()))
        );

        let config = WayfinderConfig::load_with(
            Some(dir.path()),
            env_of(&[(DATASET_SOURCE_ENV, "/srv/export"), (FLOOR_WEIGHT_ENV, "0")]),
        )
        .expect("load with env");
        assert_eq!(config.router.floor_weight, 0.0);
        assert_eq!(
            config.dataset_source(),
            Some(DatasetSource::Local(PathBuf::from("/srv/export")))
        );
        assert_eq!(
            config.database_path().expect("db path"),
            dir.path().join("wayfinder.db")
        );
    }

    #[test]
    fn rejects_negative_floor_weight() {
        let dir = tempfile::tempdir().expect("tempdir");
        let error =
            WayfinderConfig::load_with(Some(dir.path()), env_of(&[(FLOOR_WEIGHT_ENV, "-1")]))
                .expect_err("negative weight");
        assert!(error.to_string().contains("non-negative"));
    }
}
