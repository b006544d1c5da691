//! Configuration for the crawl store.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    env,
    path::{Path, PathBuf},
};

/// Crawl store configuration.
///
/// The config is usually loaded from a TOML file with [`Self::load`]. The
/// [`Default`] impl resolves everything against the platform data directory
/// and is suitable for local development and testing.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Path to the crawl database file.
    ///
    /// If unset, `crawls.db` inside the data directory is used.
    pub store_path: Option<PathBuf>,
}

impl Config {
    /// Load the config from a file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Config> {
        let s = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("failed to read {}", path.as_ref().to_string_lossy()))?;
        let config: Config = toml::from_str(&s)?;
        Ok(config)
    }

    /// Get the data directory.
    pub fn data_dir() -> Result<PathBuf> {
        let dir = if let Some(val) = env::var_os("CRAWL_STORE_DATA_DIR") {
            PathBuf::from(val)
        } else {
            let path = dirs_next::data_dir().ok_or_else(|| {
                anyhow!("operating environment provides no directory for application data")
            })?;
            path.join("crawl-store")
        };
        Ok(dir)
    }

    /// Get the path to the crawl database file.
    pub fn store_path(&self) -> Result<PathBuf> {
        match &self.store_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::data_dir()?.join("crawls.db")),
        }
    }
}
