//! Scope-aware file storage service
//!
//! This module ties the storage stages together behind [`FilesService`], the only type most
//! callers need.
//!
//! # Architecture
//!
//! - **Staging**: uploads are streamed into `<root>/.staging/` by a [`DigestWriter`]
//! - **Publishing**: the staged file is moved to `<root>/<scope>/<content_key>` by [`publish`]
//! - **Retrieval**: stored files are opened read-only by content key
//!
//! The staging directory sits beside the scope directories on the same volume, so the final
//! move is a plain atomic rename.
//!
//! # Concurrency
//!
//! The service holds no mutable state. Any number of threads, or processes sharing the same
//! storage root, may store and read concurrently. Identical uploads race on the final rename
//! and exactly one of them creates the stored file.
//!
//! # Implementation Notes
//!
//! - No retries: a failed read, write or rename is reported to the caller immediately
//! - Stored files are never modified or deleted here
//! - The service implements `Debug` but not `Clone`; share it behind an `Arc`

use crate::constants::STAGING_DIR_NAME;
use crate::key::ContentKey;
use crate::publish::{publish, PublishOutcome, StoredFile};
use crate::scope::{ScopeStore, StorageScope};
use crate::staging::DigestWriter;
use crate::{io_error, FilesError};
use fleischchan_types::NonEmptyText;
use std::fs;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

/// What a successful [`FilesService::store`] produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreReceipt {
    /// Key of the stored content
    pub content_key: ContentKey,

    /// Filename the uploader supplied, trimmed
    pub original_name: NonEmptyText,

    /// Size of the uploaded content in bytes
    pub size_bytes: u64,

    /// Whether the bytes were newly stored or already present
    pub outcome: PublishOutcome,
}

impl StoreReceipt {
    pub fn stored_file(&self) -> &StoredFile {
        self.outcome.stored_file()
    }
}

/// Service for storing and retrieving content-addressed files
///
/// # Design
///
/// - Content-addressed: files are identified by their [`ContentKey`]
/// - Deduplicating: identical content occupies one file per scope
/// - Immutable: files are never modified after creation
/// - Path-safe: keys are checked before they are used as filenames
#[derive(Debug)]
pub struct FilesService {
    scopes: ScopeStore,
    writer: DigestWriter,
}

impl FilesService {
    /// Creates a service rooted at `root` with staging in `<root>/.staging`.
    ///
    /// # Errors
    ///
    /// Returns `FilesError::Io` if the root or a scope directory cannot be created.
    pub fn new(root: &Path) -> Result<Self, FilesError> {
        Self::with_staging_dir(root, &root.join(STAGING_DIR_NAME))
    }

    /// Creates a service with an explicit staging directory.
    ///
    /// The staging directory must not be inside a scope directory. If it is on a different
    /// volume from `root`, publishing falls back to copy-then-rename.
    ///
    /// # Errors
    ///
    /// - `FilesError::InvalidInput` if `staging_dir` lies inside a scope directory.
    /// - `FilesError::Io` if a directory cannot be created.
    pub fn with_staging_dir(root: &Path, staging_dir: &Path) -> Result<Self, FilesError> {
        let scopes = ScopeStore::new(root)?;
        if let Some(scope) = StorageScope::ALL
            .into_iter()
            .find(|scope| staging_dir.starts_with(scopes.scope_dir(*scope)))
        {
            return Err(staging_inside_scope(staging_dir, scope));
        }

        fs::create_dir_all(staging_dir).map_err(|e| {
            io_error(
                e,
                format!(
                    "Failed to create staging directory {}",
                    staging_dir.display()
                ),
            )
        })?;

        // `..` and symlinks only resolve once the directory exists.
        let resolved = canonical(staging_dir)?;
        for scope in StorageScope::ALL {
            let scope_dir = canonical(&scopes.scope_dir(scope))?;
            if resolved.starts_with(&scope_dir) {
                return Err(staging_inside_scope(staging_dir, scope));
            }
        }

        Ok(Self {
            scopes,
            writer: DigestWriter::new(staging_dir),
        })
    }

    /// Overrides the read buffer size used while staging.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_size` is zero.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.writer = self.writer.with_chunk_size(chunk_size);
        self
    }

    /// Stores an uploaded stream in `scope`.
    ///
    /// # Arguments
    ///
    /// * `scope` - Namespace to store into
    /// * `original_name` - Filename supplied by the uploader; must be present and non-blank
    /// * `reader` - The uploaded bytes
    ///
    /// # Returns
    ///
    /// A [`StoreReceipt`] whose outcome is `Stored` for new content and `Deduplicated` when
    /// identical content was already present. Both are successes.
    ///
    /// # Errors
    ///
    /// Returns `FilesError` if:
    /// - the original filename is missing (`InvalidInput`, nothing touched on disk)
    /// - reading the stream, writing the staging file or moving it fails (`Io`)
    ///
    /// On every error path the staging file has been removed.
    pub fn store<R: Read>(
        &self,
        scope: StorageScope,
        original_name: Option<&str>,
        reader: R,
    ) -> Result<StoreReceipt, FilesError> {
        let staged = self.writer.write(original_name, reader)?;
        let size_bytes = staged.file.size_bytes();

        let outcome = publish(staged.file, &self.scopes, scope, &staged.content_key)?;

        match &outcome {
            PublishOutcome::Stored(_) => tracing::info!(
                "stored {} ({} bytes) in {}",
                staged.content_key,
                size_bytes,
                scope
            ),
            PublishOutcome::Deduplicated(_) => tracing::info!(
                "{} already present in {}, discarded duplicate upload",
                staged.content_key,
                scope
            ),
        }

        Ok(StoreReceipt {
            content_key: staged.content_key,
            original_name: staged.original_name,
            size_bytes,
            outcome,
        })
    }

    /// Opens a stored file for reading.
    ///
    /// # Errors
    ///
    /// - `FilesError::NotFound` if nothing is stored under `key`.
    /// - `FilesError::InvalidKey` if `key` is not a safe filename.
    /// - `FilesError::Io` for any other failure.
    pub fn open(&self, scope: StorageScope, key: &ContentKey) -> Result<fs::File, FilesError> {
        let path = self.scopes.resolve(scope, key)?;

        match fs::File::open(&path) {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(FilesError::NotFound(format!(
                "no file for {} in {}",
                key, scope
            ))),
            Err(e) => Err(io_error(
                e,
                format!("Failed to open stored file {}", path.display()),
            )),
        }
    }

    /// Reads a stored file completely.
    ///
    /// # Errors
    ///
    /// As [`FilesService::open`], plus `FilesError::Io` if reading fails.
    pub fn read(&self, scope: StorageScope, key: &ContentKey) -> Result<Vec<u8>, FilesError> {
        let mut file = self.open(scope, key)?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer).map_err(|e| {
            io_error(e, format!("Failed to read stored file for {}", key))
        })?;
        Ok(buffer)
    }

    /// Returns true if content is stored under `key`.
    pub fn exists(&self, scope: StorageScope, key: &ContentKey) -> Result<bool, FilesError> {
        Ok(self.scopes.resolve(scope, key)?.is_file())
    }

    /// Returns the storage root directory.
    #[must_use]
    pub fn root_directory(&self) -> &Path {
        self.scopes.root()
    }

    /// Returns the staging directory.
    #[must_use]
    pub fn staging_directory(&self) -> &Path {
        self.writer.staging_dir()
    }
}

fn staging_inside_scope(staging_dir: &Path, scope: StorageScope) -> FilesError {
    FilesError::InvalidInput(format!(
        "staging directory {} is inside the {} scope",
        staging_dir.display(),
        scope
    ))
}

fn canonical(path: &Path) -> Result<PathBuf, FilesError> {
    fs::canonicalize(path)
        .map_err(|e| io_error(e, format!("Failed to resolve {}", path.display())))
}
