//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. Services never read process-wide environment variables
//! themselves; binaries read them and hand the raw values to the helpers below.

use crate::constants::DEFAULT_STORAGE_DIR;
use crate::{BoardError, BoardResult};
use fleischchan_files::{StorageScope, STAGING_DIR_NAME};
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    storage_dir: PathBuf,
    staging_dir: PathBuf,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// When `staging_dir` is `None` it defaults to `<storage_dir>/.staging`.
    pub fn new(storage_dir: PathBuf, staging_dir: Option<PathBuf>) -> BoardResult<Self> {
        if storage_dir.as_os_str().is_empty() {
            return Err(BoardError::InvalidInput(
                "storage_dir cannot be empty".into(),
            ));
        }

        let staging_dir = staging_dir.unwrap_or_else(|| storage_dir.join(STAGING_DIR_NAME));
        if staging_dir.as_os_str().is_empty() {
            return Err(BoardError::InvalidInput(
                "staging_dir cannot be empty".into(),
            ));
        }

        Ok(Self {
            storage_dir,
            staging_dir,
        })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn scope_dir(&self, scope: StorageScope) -> PathBuf {
        self.storage_dir.join(scope.dir_name())
    }
}

/// Resolve the storage root from an optional environment value.
///
/// `None` or blank values fall back to [`DEFAULT_STORAGE_DIR`].
pub fn storage_dir_from_env_value(value: Option<String>) -> PathBuf {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR), PathBuf::from)
}

/// Resolve an explicit staging directory from an optional environment value.
///
/// `None` or blank values mean "use the default below the storage root".
pub fn staging_dir_from_env_value(value: Option<String>) -> Option<PathBuf> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
