#![forbid(unsafe_code)]

use crate::StoreError;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_DB_FILE: &str = "records.db";
pub const DEFAULT_FETCH_SIZE: usize = 255;
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub const ENV_STORAGE_DIR: &str = "RR_STORAGE_DIR";
pub const ENV_DB_FILE: &str = "RR_DB_FILE";
pub const ENV_FETCH_SIZE: &str = "RR_FETCH_SIZE";
pub const ENV_BUSY_TIMEOUT_MS: &str = "RR_BUSY_TIMEOUT_MS";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    storage_dir: Option<PathBuf>,
    db_file_name: String,
    busy_timeout: Duration,
    fetch_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            storage_dir: None,
            db_file_name: DEFAULT_DB_FILE.to_string(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            fetch_size: DEFAULT_FETCH_SIZE,
        }
    }
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn on_disk(storage_dir: impl AsRef<Path>) -> Self {
        Self {
            storage_dir: Some(storage_dir.as_ref().to_path_buf()),
            ..Self::default()
        }
    }

    /// Reads `RR_STORAGE_DIR`, `RR_DB_FILE`, `RR_FETCH_SIZE` and
    /// `RR_BUSY_TIMEOUT_MS`. Unset or blank variables keep the defaults.
    pub fn from_env() -> Result<Self, StoreError> {
        let mut config = Self::default();
        if let Some(dir) = env_var(ENV_STORAGE_DIR) {
            config.storage_dir = Some(PathBuf::from(dir));
        }
        if let Some(file) = env_var(ENV_DB_FILE) {
            config.db_file_name = file;
        }
        if let Some(raw) = env_var(ENV_FETCH_SIZE) {
            let fetch_size = raw
                .parse::<usize>()
                .map_err(|_| StoreError::InvalidInput("RR_FETCH_SIZE must be a positive integer"))?;
            config = config.with_fetch_size(fetch_size)?;
        }
        if let Some(raw) = env_var(ENV_BUSY_TIMEOUT_MS) {
            let ms = raw
                .parse::<u64>()
                .map_err(|_| StoreError::InvalidInput("RR_BUSY_TIMEOUT_MS must be an integer"))?;
            config.busy_timeout = Duration::from_millis(ms);
        }
        Ok(config)
    }

    pub fn with_db_file_name(mut self, name: impl Into<String>) -> Self {
        self.db_file_name = name.into();
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn with_fetch_size(mut self, fetch_size: usize) -> Result<Self, StoreError> {
        if fetch_size == 0 {
            return Err(StoreError::InvalidInput("fetch size must be positive"));
        }
        self.fetch_size = fetch_size;
        Ok(self)
    }

    pub fn storage_dir(&self) -> Option<&Path> {
        self.storage_dir.as_deref()
    }

    pub fn db_path(&self) -> Option<PathBuf> {
        self.storage_dir
            .as_ref()
            .map(|dir| dir.join(&self.db_file_name))
    }

    pub fn busy_timeout(&self) -> Duration {
        self.busy_timeout
    }

    pub fn fetch_size(&self) -> usize {
        self.fetch_size
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_in_memory() {
        let config = StoreConfig::default();
        assert_eq!(config.db_path(), None);
        assert_eq!(config.fetch_size(), DEFAULT_FETCH_SIZE);
    }

    #[test]
    fn on_disk_joins_file_name() {
        let config = StoreConfig::on_disk("/tmp/rr").with_db_file_name("notes.db");
        assert_eq!(config.db_path(), Some(PathBuf::from("/tmp/rr/notes.db")));
    }

    #[test]
    fn zero_fetch_size_is_rejected() {
        assert!(matches!(
            StoreConfig::default().with_fetch_size(0),
            Err(StoreError::InvalidInput(_))
        ));
    }
}
