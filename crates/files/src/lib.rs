//! Fleischchan File Storage
//!
//! This crate provides the content-addressed file store behind the letter board.
//!
//! ## Design Principles
//!
//! - Files are identified by a [`ContentKey`] derived only from their bytes
//! - Identical content is stored exactly once, however many times it is uploaded
//! - Stored files are immutable and never deleted by this crate
//! - The filesystem is the only coordination point between concurrent uploads
//!
//! ## Storage Model
//!
//! ```text
//! <storage_root>/
//! ├── .staging/                 # in-flight uploads, one temp file each
//! │   └── fleischchan-XXXXXX.tmp
//! └── images/                   # one directory per StorageScope
//!     └── SHA-256$uU0nuZNNPgilLlLX2n2r-sSE7-N6U4DukIj3rOLvzek=
//! ```
//!
//! An upload flows through four stages:
//!
//! 1. [`DigestWriter`] streams the bytes into a staging temp file while hashing them.
//! 2. [`ContentKey::encode`] renders the SHA-256 digest as `SHA-256$<base64url>`.
//! 3. [`ScopeStore::resolve`] maps `(scope, key)` to `<scope_dir>/<key>`.
//! 4. [`publish`] moves the temp file into place without clobbering. If the destination
//!    already exists the upload is a [`PublishOutcome::Deduplicated`] no-op.
//!
//! ## Example Usage
//!
//! ```no_run
//! use fleischchan_files::{FilesService, StorageScope};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let service = FilesService::new(Path::new("storage"))?;
//! let receipt = service.store(
//!     StorageScope::Images,
//!     Some("greeting.txt"),
//!     &b"hello world"[..],
//! )?;
//! let bytes = service.read(StorageScope::Images, &receipt.content_key)?;
//! assert_eq!(bytes, b"hello world");
//! # Ok(())
//! # }
//! ```

mod constants;
mod files;
mod key;
mod publish;
mod scope;
mod staging;

pub use constants::{
    DEFAULT_CHUNK_SIZE, IMAGES_DIR_NAME, KEY_DELIMITER, SHA256_ALGORITHM, STAGING_DIR_NAME,
    STAGING_FILE_PREFIX, STAGING_FILE_SUFFIX,
};
pub use files::{FilesService, StoreReceipt};
pub use key::ContentKey;
pub use publish::{publish, PublishOutcome, StoredFile};
pub use scope::{ScopeStore, StorageScope};
pub use staging::{DigestWriter, Staged, StagedFile};

/// Errors that can occur during file operations
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// The caller supplied unusable input, such as a missing original filename
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A content key was malformed or unsafe to use as a filename
    #[error("Invalid content key: {0}")]
    InvalidKey(String),

    /// No stored file exists for the requested key
    #[error("File not found: {0}")]
    NotFound(String),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wraps an I/O error with a description of the operation that failed, keeping its kind.
pub(crate) fn io_error(error: std::io::Error, context: impl std::fmt::Display) -> FilesError {
    FilesError::Io(std::io::Error::new(
        error.kind(),
        format!("{}: {}", context, error),
    ))
}
