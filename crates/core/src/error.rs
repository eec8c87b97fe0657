use fleischchan_files::FilesError;

#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("letter not found: {0}")]
    LetterNotFound(i32),
    #[error("file record not found: {0}")]
    FileRecordNotFound(String),
    #[error("file storage error: {0}")]
    Files(#[from] FilesError),
}

impl BoardError {
    /// True for errors that mean "nothing there" to a client.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            BoardError::LetterNotFound(_)
                | BoardError::FileRecordNotFound(_)
                | BoardError::Files(FilesError::NotFound(_))
        )
    }

    /// True for errors caused by the request rather than by the server.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            BoardError::InvalidInput(_) | BoardError::Files(FilesError::InvalidInput(_))
        )
    }
}

pub type BoardResult<T> = std::result::Result<T, BoardError>;
