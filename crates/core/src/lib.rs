//! # Fleischchan Core
//!
//! Business logic of the letter board:
//! - Letters, listed newest first, each with at most one attached image
//! - Image uploads stored through [`fleischchan_files`] and tracked as [`FileRecord`]s
//! - Startup configuration shared by the binaries
//!
//! **No API concerns**: HTTP routing, multipart parsing and response headers belong in
//! `api-rest`.
//!
//! Services are synchronous. Async callers should run storage calls on a blocking pool.

pub mod config;
pub mod constants;
mod error;
pub mod images;
pub mod letters;
pub mod records;

pub use config::CoreConfig;
pub use constants::DEFAULT_STORAGE_DIR;
pub use error::{BoardError, BoardResult};
pub use images::ImageStorageService;
pub use letters::{InMemoryLetterRepository, Letter, LetterDraft, LetterRepository, LetterService};
pub use records::{FileRecord, FileRepository, InMemoryFileRepository};

pub use fleischchan_files::{ContentKey, FilesError, StorageScope};

use std::sync::Arc;

/// The board's services wired to in-process repositories.
#[derive(Clone)]
pub struct Board {
    pub letters: LetterService,
    pub images: Arc<ImageStorageService>,
}

impl Board {
    /// Builds a board whose metadata lives in memory and whose files live under
    /// `cfg.storage_dir()`.
    pub fn in_memory(cfg: &CoreConfig) -> BoardResult<Self> {
        let files: Arc<dyn FileRepository> = Arc::new(InMemoryFileRepository::new());
        let letters: Arc<dyn LetterRepository> = Arc::new(InMemoryLetterRepository::new());

        Ok(Self {
            letters: LetterService::new(letters, files.clone()),
            images: Arc::new(ImageStorageService::new(cfg, files)?),
        })
    }
}
