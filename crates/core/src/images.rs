//! Image uploads: content-addressed storage plus a metadata record per upload.

use crate::config::CoreConfig;
use crate::constants::MAX_ORIGINAL_NAME_LEN;
use crate::records::{FileRecord, FileRepository};
use crate::{BoardError, BoardResult};
use fleischchan_files::{ContentKey, FilesService, StorageScope};
use fleischchan_types::ensure_max_chars;
use std::fs::File;
use std::io::Read;
use std::sync::Arc;

const SCOPE: StorageScope = StorageScope::Images;

/// Stores uploaded images and resolves their records back to bytes.
pub struct ImageStorageService {
    files: FilesService,
    records: Arc<dyn FileRepository>,
}

impl ImageStorageService {
    /// Creates the service, preparing the storage and staging directories.
    pub fn new(cfg: &CoreConfig, records: Arc<dyn FileRepository>) -> BoardResult<Self> {
        let files = FilesService::with_staging_dir(cfg.storage_dir(), cfg.staging_dir())?;
        Ok(Self { files, records })
    }

    /// Stores an upload and records it.
    ///
    /// Every call creates a new record, even when the bytes were already stored; the stored
    /// file itself is shared.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if the original name is missing, blank or too long. Checked before
    ///   any bytes are read.
    /// - `Files(Io)` if staging or publishing fails.
    pub fn store<R: Read>(&self, original_name: Option<&str>, reader: R) -> BoardResult<FileRecord> {
        if let Some(name) = original_name {
            ensure_max_chars(name, MAX_ORIGINAL_NAME_LEN)
                .map_err(|e| BoardError::InvalidInput(format!("original filename: {}", e)))?;
        }

        let receipt = self.files.store(SCOPE, original_name, reader)?;
        let record = self
            .records
            .create(receipt.content_key, receipt.original_name)?;

        tracing::info!(
            "recorded upload {} as {} ({})",
            record.id,
            record.content_key,
            if receipt.outcome.is_deduplicated() {
                "deduplicated"
            } else {
                "new content"
            }
        );
        Ok(record)
    }

    pub fn get_by_id(&self, id: i32) -> BoardResult<FileRecord> {
        self.records
            .find_by_id(id)?
            .ok_or_else(|| BoardError::FileRecordNotFound(format!("id {}", id)))
    }

    /// Looks up the first record for a content key string.
    ///
    /// A string that is not a well-formed key cannot name any record and is reported as
    /// not found.
    pub fn get_by_content_key(&self, content_key: &str) -> BoardResult<FileRecord> {
        let not_found = || BoardError::FileRecordNotFound(format!("key {}", content_key));

        let key = match ContentKey::parse(content_key) {
            Ok(key) => key,
            Err(e) => {
                tracing::debug!("lookup with malformed content key: {}", e);
                return Err(not_found());
            }
        };

        self.records
            .find_first_by_content_key(&key)?
            .ok_or_else(not_found)
    }

    /// Opens the stored bytes of a record.
    pub fn open(&self, record: &FileRecord) -> BoardResult<File> {
        Ok(self.files.open(SCOPE, &record.content_key)?)
    }

    /// Reads the stored bytes of a record.
    pub fn read(&self, record: &FileRecord) -> BoardResult<Vec<u8>> {
        Ok(self.files.read(SCOPE, &record.content_key)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::InMemoryFileRepository;
    use fleischchan_files::FilesError;
    use std::fs;
    use tempfile::TempDir;

    fn create_service(temp: &TempDir) -> ImageStorageService {
        let cfg = CoreConfig::new(temp.path().join("storage"), None).unwrap();
        ImageStorageService::new(&cfg, Arc::new(InMemoryFileRepository::new())).unwrap()
    }

    #[test]
    fn test_store_and_read_back() {
        let temp = TempDir::new().unwrap();
        let service = create_service(&temp);

        let record = service.store(Some("greeting.txt"), &b"hello world"[..]).unwrap();

        assert_eq!(record.id, 1);
        assert_eq!(record.original_name, "greeting.txt");
        assert_eq!(
            record.content_key.as_str(),
            "SHA-256$uU0nuZNNPgilLlLX2n2r-sSE7-N6U4DukIj3rOLvzek="
        );
        assert_eq!(service.read(&record).unwrap(), b"hello world");
        assert!(temp
            .path()
            .join("storage/images")
            .join(record.content_key.as_str())
            .is_file());
    }

    #[test]
    fn test_duplicate_uploads_two_records_one_file() {
        let temp = TempDir::new().unwrap();
        let service = create_service(&temp);
        let data = vec![0x5au8; 1024 * 1024];

        let first = service.store(Some("one.bin"), data.as_slice()).unwrap();
        let second = service.store(Some("two.bin"), data.as_slice()).unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(first.content_key, second.content_key);
        assert_eq!(
            fs::read_dir(temp.path().join("storage/images"))
                .unwrap()
                .count(),
            1
        );

        let by_key = service
            .get_by_content_key(second.content_key.as_str())
            .unwrap();
        assert_eq!(by_key, first);
        assert_eq!(service.get_by_id(second.id).unwrap(), second);
    }

    #[test]
    fn test_missing_or_long_name_rejected() {
        let temp = TempDir::new().unwrap();
        let service = create_service(&temp);

        let missing = service.store(None, &b"data"[..]).unwrap_err();
        assert!(missing.is_invalid_input());

        let long_name = format!("{}.png", "x".repeat(MAX_ORIGINAL_NAME_LEN));
        let long = service.store(Some(long_name.as_str()), &b"data"[..]).unwrap_err();
        assert!(matches!(long, BoardError::InvalidInput(_)));

        assert_eq!(
            fs::read_dir(temp.path().join("storage/.staging"))
                .unwrap()
                .count(),
            0
        );
    }

    #[test]
    fn test_original_name_kept_as_uploaded() {
        let temp = TempDir::new().unwrap();
        let service = create_service(&temp);

        let record = service.store(Some(" scan 01.png"), &b"pixels"[..]).unwrap();
        assert_eq!(record.original_name, " scan 01.png");

        let padded = format!("{} ", "x".repeat(MAX_ORIGINAL_NAME_LEN));
        let err = service.store(Some(padded.as_str()), &b"pixels"[..]).unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_lookups_not_found() {
        let temp = TempDir::new().unwrap();
        let service = create_service(&temp);

        assert!(service.get_by_id(1).unwrap_err().is_not_found());
        assert!(service
            .get_by_content_key("SHA-256$uU0nuZNNPgilLlLX2n2r-sSE7-N6U4DukIj3rOLvzek=")
            .unwrap_err()
            .is_not_found());
        assert!(service
            .get_by_content_key("../../etc/passwd")
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_record_without_artifact_is_not_found() {
        let temp = TempDir::new().unwrap();
        let service = create_service(&temp);
        let record = service.store(Some("a.txt"), &b"vanishing"[..]).unwrap();

        fs::remove_file(
            temp.path()
                .join("storage/images")
                .join(record.content_key.as_str()),
        )
        .unwrap();

        let err = service.open(&record).unwrap_err();
        assert!(matches!(err, BoardError::Files(FilesError::NotFound(_))));
        assert!(err.is_not_found());
    }
}
