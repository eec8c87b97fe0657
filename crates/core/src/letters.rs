//! Letters posted to the board.

use crate::constants::{MAX_AUTHOR_LEN, MAX_CONTENT_LEN, MAX_TITLE_LEN};
use crate::records::{FileRecord, FileRepository};
use crate::{BoardError, BoardResult};
use chrono::{DateTime, Utc};
use fleischchan_types::ensure_max_chars;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A letter with its optional attached image.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Letter {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub attached_image: Option<FileRecord>,
}

impl Letter {
    pub fn has_attached_image(&self) -> bool {
        self.attached_image.is_some()
    }
}

/// The user-editable part of a letter.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LetterDraft {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub content: String,
}

impl LetterDraft {
    /// Checks every field against its column width.
    ///
    /// # Errors
    ///
    /// Returns `BoardError::InvalidInput` naming the first field that is too long.
    pub fn validate(&self) -> BoardResult<()> {
        for (field, value, max) in [
            ("title", &self.title, MAX_TITLE_LEN),
            ("author", &self.author, MAX_AUTHOR_LEN),
            ("content", &self.content, MAX_CONTENT_LEN),
        ] {
            ensure_max_chars(value, max)
                .map_err(|e| BoardError::InvalidInput(format!("{}: {}", field, e)))?;
        }
        Ok(())
    }
}

/// Persistence boundary for letters.
pub trait LetterRepository: Send + Sync {
    /// Persists a new letter and returns it with its assigned id.
    fn insert(&self, draft: LetterDraft, timestamp: DateTime<Utc>) -> BoardResult<Letter>;

    fn find_by_id(&self, id: i32) -> BoardResult<Option<Letter>>;

    /// All letters, newest first.
    fn find_all_newest_first(&self) -> BoardResult<Vec<Letter>>;

    /// Replaces the stored letter with the same id.
    ///
    /// # Errors
    ///
    /// Returns `BoardError::LetterNotFound` if no such letter exists.
    fn save(&self, letter: Letter) -> BoardResult<Letter>;

    /// Removes a letter, returning it if it existed.
    fn delete(&self, id: i32) -> BoardResult<Option<Letter>>;

    /// Attaches `image` unless the letter already has one, as a single atomic step.
    ///
    /// Returns the letter as stored afterwards, or `None` if it does not exist.
    fn attach_image_if_absent(&self, id: i32, image: FileRecord) -> BoardResult<Option<Letter>>;
}

#[derive(Debug, Default)]
struct LetterTable {
    last_id: i32,
    letters: BTreeMap<i32, Letter>,
}

/// Process-local [`LetterRepository`].
#[derive(Debug, Default)]
pub struct InMemoryLetterRepository {
    table: Mutex<LetterTable>,
}

impl InMemoryLetterRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, LetterTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LetterRepository for InMemoryLetterRepository {
    fn insert(&self, draft: LetterDraft, timestamp: DateTime<Utc>) -> BoardResult<Letter> {
        let mut table = self.table();
        table.last_id += 1;
        let letter = Letter {
            id: table.last_id,
            title: draft.title,
            author: draft.author,
            content: draft.content,
            timestamp,
            attached_image: None,
        };
        table.letters.insert(letter.id, letter.clone());
        Ok(letter)
    }

    fn find_by_id(&self, id: i32) -> BoardResult<Option<Letter>> {
        Ok(self.table().letters.get(&id).cloned())
    }

    fn find_all_newest_first(&self) -> BoardResult<Vec<Letter>> {
        let mut letters: Vec<Letter> = self.table().letters.values().cloned().collect();
        letters.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(letters)
    }

    fn save(&self, letter: Letter) -> BoardResult<Letter> {
        let mut table = self.table();
        match table.letters.get_mut(&letter.id) {
            Some(slot) => {
                *slot = letter.clone();
                Ok(letter)
            }
            None => Err(BoardError::LetterNotFound(letter.id)),
        }
    }

    fn delete(&self, id: i32) -> BoardResult<Option<Letter>> {
        Ok(self.table().letters.remove(&id))
    }

    fn attach_image_if_absent(&self, id: i32, image: FileRecord) -> BoardResult<Option<Letter>> {
        let mut table = self.table();
        Ok(table.letters.get_mut(&id).map(|letter| {
            if letter.attached_image.is_none() {
                letter.attached_image = Some(image);
            }
            letter.clone()
        }))
    }
}

/// Letter operations on top of the letter and file repositories.
#[derive(Clone)]
pub struct LetterService {
    letters: Arc<dyn LetterRepository>,
    files: Arc<dyn FileRepository>,
}

impl LetterService {
    pub fn new(letters: Arc<dyn LetterRepository>, files: Arc<dyn FileRepository>) -> Self {
        Self { letters, files }
    }

    /// All letters, newest first.
    pub fn list_letters(&self) -> BoardResult<Vec<Letter>> {
        self.letters.find_all_newest_first()
    }

    pub fn get_letter(&self, id: i32) -> BoardResult<Letter> {
        self.letters
            .find_by_id(id)?
            .ok_or(BoardError::LetterNotFound(id))
    }

    /// Validates and stores a new letter stamped with the current time.
    pub fn create(&self, draft: LetterDraft) -> BoardResult<Letter> {
        draft.validate()?;
        let letter = self.letters.insert(draft, Utc::now())?;
        tracing::info!("created letter {}", letter.id);
        Ok(letter)
    }

    /// Replaces a letter's title, author and content.
    ///
    /// The creation timestamp and any attached image are kept.
    pub fn update(&self, id: i32, draft: LetterDraft) -> BoardResult<Letter> {
        draft.validate()?;
        let mut letter = self.get_letter(id)?;
        letter.title = draft.title;
        letter.author = draft.author;
        letter.content = draft.content;
        self.letters.save(letter)
    }

    /// Removes a letter. Its attached image stays in storage.
    pub fn delete_letter(&self, id: i32) -> BoardResult<Letter> {
        let letter = self
            .letters
            .delete(id)?
            .ok_or(BoardError::LetterNotFound(id))?;
        tracing::info!("deleted letter {}", id);
        Ok(letter)
    }

    /// Attaches an uploaded file to a letter.
    ///
    /// An image can be attached once. If the letter already has one this is a no-op and
    /// the unchanged letter is returned.
    ///
    /// # Errors
    ///
    /// - `BoardError::LetterNotFound` if the letter does not exist.
    /// - `BoardError::FileRecordNotFound` if no file record has `file_id`.
    pub fn attach_image(&self, letter_id: i32, file_id: i32) -> BoardResult<Letter> {
        let existing = self.get_letter(letter_id)?;
        if existing.has_attached_image() {
            return Ok(existing);
        }

        let image = self
            .files
            .find_by_id(file_id)?
            .ok_or_else(|| BoardError::FileRecordNotFound(format!("id {}", file_id)))?;

        self.letters
            .attach_image_if_absent(letter_id, image)?
            .ok_or(BoardError::LetterNotFound(letter_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::InMemoryFileRepository;
    use chrono::Duration;
    use fleischchan_files::ContentKey;
    use fleischchan_types::NonEmptyText;

    const KEY: &str = "SHA-256$uU0nuZNNPgilLlLX2n2r-sSE7-N6U4DukIj3rOLvzek=";

    fn draft(title: &str) -> LetterDraft {
        LetterDraft {
            title: title.into(),
            author: "anon".into(),
            content: "Dear board,".into(),
        }
    }

    fn service() -> (LetterService, Arc<InMemoryFileRepository>) {
        let files = Arc::new(InMemoryFileRepository::new());
        let letters = Arc::new(InMemoryLetterRepository::new());
        (LetterService::new(letters, files.clone()), files)
    }

    fn upload(files: &InMemoryFileRepository, name: &str) -> FileRecord {
        files
            .create(
                ContentKey::parse(KEY).unwrap(),
                NonEmptyText::new(name).unwrap(),
            )
            .unwrap()
    }

    #[test]
    fn test_create_and_get() {
        let (service, _) = service();
        let created = service.create(draft("Hello")).unwrap();

        assert_eq!(created.id, 1);
        assert!(!created.has_attached_image());
        assert_eq!(service.get_letter(1).unwrap(), created);
        assert!(matches!(
            service.get_letter(99),
            Err(BoardError::LetterNotFound(99))
        ));
    }

    #[test]
    fn test_create_rejects_oversized_fields() {
        let (service, _) = service();
        let mut long = draft("x");
        long.content = "a".repeat(MAX_CONTENT_LEN + 1);

        let err = service.create(long).unwrap_err();
        assert!(err.is_invalid_input());
        assert!(err.to_string().contains("content"));
        assert!(service.list_letters().unwrap().is_empty());
    }

    #[test]
    fn test_list_newest_first() {
        let repo = InMemoryLetterRepository::new();
        let now = Utc::now();
        repo.insert(draft("old"), now - Duration::hours(2)).unwrap();
        repo.insert(draft("new"), now).unwrap();
        repo.insert(draft("middle"), now - Duration::hours(1)).unwrap();

        let titles: Vec<String> = repo
            .find_all_newest_first()
            .unwrap()
            .into_iter()
            .map(|l| l.title)
            .collect();

        assert_eq!(titles, vec!["new", "middle", "old"]);
    }

    #[test]
    fn test_update_keeps_timestamp_and_image() {
        let (service, files) = service();
        let created = service.create(draft("before")).unwrap();
        let image = upload(&files, "pic.png");
        service.attach_image(created.id, image.id).unwrap();

        let updated = service.update(created.id, draft("after")).unwrap();

        assert_eq!(updated.title, "after");
        assert_eq!(updated.timestamp, created.timestamp);
        assert_eq!(updated.attached_image, Some(image));
        assert!(matches!(
            service.update(42, draft("nope")),
            Err(BoardError::LetterNotFound(42))
        ));
    }

    #[test]
    fn test_delete_letter() {
        let (service, _) = service();
        let created = service.create(draft("bye")).unwrap();

        assert_eq!(service.delete_letter(created.id).unwrap(), created);
        assert!(matches!(
            service.delete_letter(created.id),
            Err(BoardError::LetterNotFound(_))
        ));
    }

    #[test]
    fn test_attach_image_first_write_wins() {
        let (service, files) = service();
        let letter = service.create(draft("with image")).unwrap();
        let first = upload(&files, "first.png");
        let second = upload(&files, "second.png");

        let attached = service.attach_image(letter.id, first.id).unwrap();
        assert_eq!(attached.attached_image, Some(first.clone()));

        let unchanged = service.attach_image(letter.id, second.id).unwrap();
        assert_eq!(unchanged.attached_image, Some(first));
        assert_eq!(service.get_letter(letter.id).unwrap(), unchanged);
    }

    #[test]
    fn test_attach_unknown_file_or_letter() {
        let (service, files) = service();
        let letter = service.create(draft("x")).unwrap();
        let image = upload(&files, "x.png");

        assert!(matches!(
            service.attach_image(letter.id, 1234),
            Err(BoardError::FileRecordNotFound(_))
        ));
        assert!(matches!(
            service.attach_image(999, image.id),
            Err(BoardError::LetterNotFound(999))
        ));
    }

    #[test]
    fn test_repository_attach_is_atomic_check_and_set() {
        let repo = InMemoryLetterRepository::new();
        let files = InMemoryFileRepository::new();
        let letter = repo.insert(draft("x"), Utc::now()).unwrap();
        let a = upload(&files, "a.png");
        let b = upload(&files, "b.png");

        repo.attach_image_if_absent(letter.id, a.clone()).unwrap();
        let after = repo.attach_image_if_absent(letter.id, b).unwrap().unwrap();

        assert_eq!(after.attached_image, Some(a));
        assert_eq!(repo.attach_image_if_absent(77, upload(&files, "c.png")).unwrap(), None);
    }
}
