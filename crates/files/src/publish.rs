//! Publishing staged files into their scope without clobbering.
//!
//! The only synchronisation between concurrent uploads is the filesystem's
//! "rename unless the destination exists" primitive (`persist_noclobber`). Whoever links
//! the file into place first wins; everybody else sees `AlreadyExists`, which is the
//! deduplication path rather than an error.

use crate::constants::{STAGING_FILE_PREFIX, STAGING_FILE_SUFFIX};
use crate::key::ContentKey;
use crate::scope::{ScopeStore, StorageScope};
use crate::staging::StagedFile;
use crate::{io_error, FilesError};
use std::io::{self, ErrorKind, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, PersistError};

/// A file at its canonical location, `<scope_dir>/<content_key>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub scope: StorageScope,
    pub content_key: ContentKey,
    pub path: PathBuf,
}

/// What [`publish`] did with a staged file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The staged file became the stored file.
    Stored(StoredFile),
    /// Identical content was already stored; the staged file was discarded.
    Deduplicated(StoredFile),
}

impl PublishOutcome {
    pub fn stored_file(&self) -> &StoredFile {
        match self {
            PublishOutcome::Stored(file) | PublishOutcome::Deduplicated(file) => file,
        }
    }

    pub fn is_deduplicated(&self) -> bool {
        matches!(self, PublishOutcome::Deduplicated(_))
    }
}

/// Moves `staged` to the canonical path of `(scope, key)`.
///
/// Readers resolving the key never observe a partial file: the bytes are complete before
/// the name appears. If the staging directory lives on another device the file is first
/// copied to a temp file inside the scope directory and that copy is moved into place.
///
/// # Errors
///
/// - `FilesError::InvalidKey` if the key is not a safe filename.
/// - `FilesError::Io` for any failure other than "destination exists". The staged file is
///   removed when it is dropped along with the error.
pub fn publish(
    staged: StagedFile,
    scopes: &ScopeStore,
    scope: StorageScope,
    key: &ContentKey,
) -> Result<PublishOutcome, FilesError> {
    let destination = scopes.resolve(scope, key)?;
    let stored = StoredFile {
        scope,
        content_key: key.clone(),
        path: destination.clone(),
    };

    match staged.into_temp().persist_noclobber(&destination) {
        Ok(_) => Ok(PublishOutcome::Stored(stored)),
        Err(PersistError { error, file }) if error.kind() == ErrorKind::AlreadyExists => {
            drop(file);
            Ok(PublishOutcome::Deduplicated(stored))
        }
        Err(PersistError { error, file }) if error.kind() == ErrorKind::CrossesDevices => {
            tracing::debug!(
                "staging file {} is on another device, copying into {}",
                file.path().display(),
                scope
            );
            publish_via_scope_copy(file, &scopes.scope_dir(scope), stored)
        }
        Err(PersistError { error, file }) => Err(io_error(
            error,
            format!(
                "Failed to move {} to {}",
                file.path().display(),
                destination.display()
            ),
        )),
    }
}

fn publish_via_scope_copy(
    mut source: NamedTempFile,
    scope_dir: &Path,
    stored: StoredFile,
) -> Result<PublishOutcome, FilesError> {
    let mut local = tempfile::Builder::new()
        .prefix(&format!(".{}", STAGING_FILE_PREFIX))
        .suffix(STAGING_FILE_SUFFIX)
        .tempfile_in(scope_dir)
        .map_err(|e| {
            io_error(
                e,
                format!("Failed to create temp file in {}", scope_dir.display()),
            )
        })?;

    source
        .as_file_mut()
        .seek(SeekFrom::Start(0))
        .and_then(|_| io::copy(source.as_file_mut(), local.as_file_mut()))
        .and_then(|_| local.as_file().sync_all())
        .map_err(|e| {
            io_error(
                e,
                format!("Failed to copy staged file into {}", scope_dir.display()),
            )
        })?;
    drop(source);

    match local.persist_noclobber(&stored.path) {
        Ok(_) => Ok(PublishOutcome::Stored(stored)),
        Err(PersistError { error, .. }) if error.kind() == ErrorKind::AlreadyExists => {
            Ok(PublishOutcome::Deduplicated(stored))
        }
        Err(PersistError { error, .. }) => Err(io_error(
            error,
            format!("Failed to move copy to {}", stored.path.display()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::DigestWriter;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, ScopeStore, DigestWriter) {
        let temp = TempDir::new().unwrap();
        let scopes = ScopeStore::new(&temp.path().join("storage")).unwrap();
        let writer = DigestWriter::new(temp.path().join("storage").join(".staging"));
        (temp, scopes, writer)
    }

    fn count_files(dir: &Path) -> usize {
        fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
    }

    #[test]
    fn test_publish_stores_new_content() {
        let (_temp, scopes, writer) = setup();
        let staged = writer.write(Some("greeting.txt"), &b"hello world"[..]).unwrap();
        let staged_path = staged.file.path().to_path_buf();

        let outcome = publish(staged.file, &scopes, StorageScope::Images, &staged.content_key)
            .unwrap();

        assert!(!outcome.is_deduplicated());
        let stored = outcome.stored_file();
        assert_eq!(
            stored.path,
            scopes
                .scope_dir(StorageScope::Images)
                .join(staged.content_key.as_str())
        );
        assert_eq!(fs::read(&stored.path).unwrap(), b"hello world");
        assert!(!staged_path.exists());
    }

    #[test]
    fn test_publish_existing_content_is_deduplicated() {
        let (_temp, scopes, writer) = setup();

        let first = writer.write(Some("a.txt"), &b"same"[..]).unwrap();
        publish(first.file, &scopes, StorageScope::Images, &first.content_key).unwrap();

        let second = writer.write(Some("b.txt"), &b"same"[..]).unwrap();
        let second_path = second.file.path().to_path_buf();
        let outcome =
            publish(second.file, &scopes, StorageScope::Images, &second.content_key).unwrap();

        assert!(outcome.is_deduplicated());
        assert!(!second_path.exists(), "duplicate staging file must be removed");
        assert_eq!(count_files(&scopes.scope_dir(StorageScope::Images)), 1);
        assert_eq!(count_files(writer.staging_dir()), 0);
    }

    #[test]
    fn test_publish_never_overwrites_existing_file() {
        let (_temp, scopes, writer) = setup();
        let staged = writer.write(Some("a.txt"), &b"original"[..]).unwrap();
        let destination = scopes
            .resolve(StorageScope::Images, &staged.content_key)
            .unwrap();
        fs::write(&destination, b"already here").unwrap();

        let outcome =
            publish(staged.file, &scopes, StorageScope::Images, &staged.content_key).unwrap();

        assert!(outcome.is_deduplicated());
        assert_eq!(fs::read(&destination).unwrap(), b"already here");
    }

    #[test]
    fn test_publish_rejects_unsafe_key() {
        let (_temp, scopes, writer) = setup();
        let staged = writer.write(Some("a.txt"), &b"data"[..]).unwrap();
        let staged_path = staged.file.path().to_path_buf();

        let result = publish(
            staged.file,
            &scopes,
            StorageScope::Images,
            &ContentKey::from_raw_unchecked("../escape"),
        );

        assert!(matches!(result, Err(FilesError::InvalidKey(_))));
        assert!(!staged_path.exists());
        assert!(!scopes.root().join("escape").exists());
    }

    #[test]
    fn test_publish_failure_is_io_and_removes_staged_file() {
        let (_temp, scopes, writer) = setup();
        let scope_dir = scopes.scope_dir(StorageScope::Images);
        fs::remove_dir(&scope_dir).unwrap();
        fs::write(&scope_dir, b"not a directory").unwrap();

        let staged = writer.write(Some("a.txt"), &b"stranded"[..]).unwrap();
        let staged_path = staged.file.path().to_path_buf();

        let result = publish(staged.file, &scopes, StorageScope::Images, &staged.content_key);

        assert!(matches!(result, Err(FilesError::Io(_))));
        assert!(!staged_path.exists());
        assert_eq!(count_files(writer.staging_dir()), 0);
        assert_eq!(fs::read(&scope_dir).unwrap(), b"not a directory");
    }

    #[test]
    fn test_scope_copy_fallback_stores_and_deduplicates() {
        let (_temp, scopes, writer) = setup();
        let scope_dir = scopes.scope_dir(StorageScope::Images);

        let staged = writer.write(Some("a.txt"), &b"copied"[..]).unwrap();
        let stored = StoredFile {
            scope: StorageScope::Images,
            content_key: staged.content_key.clone(),
            path: scope_dir.join(staged.content_key.as_str()),
        };
        let outcome =
            publish_via_scope_copy(staged.file.into_temp(), &scope_dir, stored.clone()).unwrap();
        assert_eq!(outcome, PublishOutcome::Stored(stored.clone()));
        assert_eq!(fs::read(&stored.path).unwrap(), b"copied");

        let again = writer.write(Some("b.txt"), &b"copied"[..]).unwrap();
        let outcome =
            publish_via_scope_copy(again.file.into_temp(), &scope_dir, stored.clone()).unwrap();
        assert_eq!(outcome, PublishOutcome::Deduplicated(stored));

        assert_eq!(count_files(&scope_dir), 1);
        assert_eq!(count_files(writer.staging_dir()), 0);
    }
}
