//! Metadata records binding an upload to its content key.
//!
//! A [`FileRecord`] is created for every upload, including duplicates, so two uploads of
//! the same bytes yield two records pointing at one stored file.

use crate::BoardResult;
use fleischchan_files::ContentKey;
use fleischchan_types::NonEmptyText;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// An uploaded file as the board knows it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    /// Identifier assigned by the repository
    pub id: i32,

    /// Name under which the bytes are stored
    #[serde(rename = "hashOfContents")]
    pub content_key: ContentKey,

    /// Name the uploader gave the file
    pub original_name: String,
}

/// Persistence boundary for file records.
pub trait FileRepository: Send + Sync {
    /// Persists a new record and returns it with its assigned id.
    fn create(&self, content_key: ContentKey, original_name: NonEmptyText)
        -> BoardResult<FileRecord>;

    fn find_by_id(&self, id: i32) -> BoardResult<Option<FileRecord>>;

    /// Returns the earliest record created for `content_key`.
    fn find_first_by_content_key(&self, content_key: &ContentKey)
        -> BoardResult<Option<FileRecord>>;
}

/// Process-local [`FileRepository`]. Ids start at 1 and increase by one per record.
#[derive(Debug, Default)]
pub struct InMemoryFileRepository {
    records: Mutex<Vec<FileRecord>>,
}

impl InMemoryFileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, Vec<FileRecord>> {
        // Records are only ever appended, so a poisoned guard still holds a consistent list.
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FileRepository for InMemoryFileRepository {
    fn create(
        &self,
        content_key: ContentKey,
        original_name: NonEmptyText,
    ) -> BoardResult<FileRecord> {
        let mut records = self.records();
        let record = FileRecord {
            id: records.len() as i32 + 1,
            content_key,
            original_name: original_name.into_string(),
        };
        records.push(record.clone());
        Ok(record)
    }

    fn find_by_id(&self, id: i32) -> BoardResult<Option<FileRecord>> {
        Ok(self.records().iter().find(|r| r.id == id).cloned())
    }

    fn find_first_by_content_key(
        &self,
        content_key: &ContentKey,
    ) -> BoardResult<Option<FileRecord>> {
        Ok(self
            .records()
            .iter()
            .find(|r| &r.content_key == content_key)
            .cloned())
    }
}
