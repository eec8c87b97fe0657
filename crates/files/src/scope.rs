//! Storage scopes and the directories that back them.

use crate::constants::IMAGES_DIR_NAME;
use crate::key::ContentKey;
use crate::{io_error, FilesError};
use std::fs;
use std::path::{Path, PathBuf};
use std::{fmt, str::FromStr};

/// A named namespace inside the storage root.
///
/// Each scope maps to exactly one directory, `<storage_root>/<dir_name>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageScope {
    /// Images attached to letters.
    Images,
}

impl StorageScope {
    /// Every scope, in a stable order.
    pub const ALL: [StorageScope; 1] = [StorageScope::Images];

    /// Name of this scope's directory under the storage root.
    pub fn dir_name(self) -> &'static str {
        match self {
            StorageScope::Images => IMAGES_DIR_NAME,
        }
    }
}

impl fmt::Display for StorageScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for StorageScope {
    type Err = FilesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StorageScope::ALL
            .into_iter()
            .find(|scope| scope.dir_name() == s)
            .ok_or_else(|| FilesError::InvalidInput(format!("unknown storage scope: {}", s)))
    }
}

/// Maps `(scope, content key)` pairs to canonical paths under a storage root.
///
/// Construction creates every scope directory. [`ScopeStore::resolve`] re-creates a scope
/// directory if it has gone missing since; `create_dir_all` is idempotent and tolerates
/// concurrent callers.
#[derive(Debug, Clone)]
pub struct ScopeStore {
    root: PathBuf,
}

impl ScopeStore {
    /// Creates a store rooted at `root`, creating the root and every scope directory.
    ///
    /// # Errors
    ///
    /// Returns `FilesError::Io` if a directory cannot be created.
    pub fn new(root: &Path) -> Result<Self, FilesError> {
        let store = Self {
            root: root.to_path_buf(),
        };
        for scope in StorageScope::ALL {
            store.ensure_scope_dir(scope)?;
        }
        Ok(store)
    }

    /// Returns the storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the directory of `scope` without touching the filesystem.
    #[must_use]
    pub fn scope_dir(&self, scope: StorageScope) -> PathBuf {
        self.root.join(scope.dir_name())
    }

    /// Returns the directory of `scope`, creating it if absent.
    pub fn ensure_scope_dir(&self, scope: StorageScope) -> Result<PathBuf, FilesError> {
        let dir = self.scope_dir(scope);
        fs::create_dir_all(&dir).map_err(|e| {
            io_error(
                e,
                format!("Failed to create scope directory {}", dir.display()),
            )
        })?;
        Ok(dir)
    }

    /// Resolves the canonical path `<scope_dir>/<key>`.
    ///
    /// # Errors
    ///
    /// Returns `FilesError::InvalidKey` if the key could escape the scope directory
    /// (path separators, `.`/`..`, NUL), and `FilesError::Io` if the scope directory
    /// cannot be created.
    pub fn resolve(&self, scope: StorageScope, key: &ContentKey) -> Result<PathBuf, FilesError> {
        ensure_single_component(key)?;
        Ok(self.ensure_scope_dir(scope)?.join(key.as_str()))
    }
}

/// Rejects keys that would not name a single file directly inside a scope directory.
fn ensure_single_component(key: &ContentKey) -> Result<(), FilesError> {
    let raw = key.as_str();
    let unsafe_key = raw.is_empty()
        || raw == "."
        || raw == ".."
        || raw.contains(['/', '\\', '\0'])
        || Path::new(raw).components().count() != 1;

    if unsafe_key {
        tracing::error!("refusing unsafe content key {:?}", raw);
        return Err(FilesError::InvalidKey(format!(
            "{:?} is not a single path component",
            raw
        )));
    }
    Ok(())
}
