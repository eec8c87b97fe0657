//! Request and response bodies of the REST API.
//!
//! Field names follow the board frontend (`hashOfContents`, `attachedImage`, ...).

use fleischchan_core::{FileRecord, Letter, LetterDraft};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// An uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileRecordRes {
    pub id: i32,
    /// Content key, `SHA-256$<base64url digest>`
    pub hash_of_contents: String,
    pub original_name: String,
}

impl From<FileRecord> for FileRecordRes {
    fn from(record: FileRecord) -> Self {
        Self {
            id: record.id,
            hash_of_contents: record.content_key.to_string(),
            original_name: record.original_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LetterRes {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub content: String,
    /// RFC 3339 creation time
    pub timestamp: String,
    pub attached_image: Option<FileRecordRes>,
}

impl From<Letter> for LetterRes {
    fn from(letter: Letter) -> Self {
        Self {
            id: letter.id,
            title: letter.title,
            author: letter.author,
            content: letter.content,
            timestamp: letter.timestamp.to_rfc3339(),
            attached_image: letter.attached_image.map(FileRecordRes::from),
        }
    }
}

/// Body of letter create and update requests. Missing fields are empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct LetterReq {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub content: String,
}

impl From<LetterReq> for LetterDraft {
    fn from(req: LetterReq) -> Self {
        Self {
            title: req.title,
            author: req.author,
            content: req.content,
        }
    }
}

/// A file reference posted to attach an image; only `id` is consulted.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AttachImageReq {
    pub id: i32,
}
