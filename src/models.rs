//! Core data models: the three-level content tree and its owned state.
//!
//! Sections contain subsections contain articles; every tree node carries a
//! lifecycle flag driven by the cascade operations in [`crate::lifecycle`].
//! Articles own attachments, append-only revisions, and derived chunks.
//! Timestamps are unix epoch seconds.

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct Section {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub created_at: i64,
    pub created_by: Option<String>,
    pub updated_at: i64,
    pub updated_by: Option<String>,
    pub is_deleted: bool,
    pub deleted_at: Option<i64>,
    pub deleted_by: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Subsection {
    pub id: i64,
    pub section_id: i64,
    pub title: String,
    pub description: String,
    pub created_at: i64,
    pub created_by: Option<String>,
    pub updated_at: i64,
    pub updated_by: Option<String>,
    pub is_deleted: bool,
    pub deleted_at: Option<i64>,
    pub deleted_by: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Article {
    pub id: i64,
    pub subsection_id: i64,
    pub title: String,
    pub content: String,
    pub created_at: i64,
    pub created_by: Option<String>,
    pub updated_at: i64,
    pub updated_by: Option<String>,
    pub is_deleted: bool,
    pub deleted_at: Option<i64>,
    pub deleted_by: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Attachment {
    pub id: i64,
    pub article_id: i64,
    pub filename: String,
    pub mime_type: Option<String>,
    pub uploaded_at: i64,
    pub uploaded_by: Option<String>,
}

/// Immutable snapshot of an article's prior state, taken before each edit.
#[derive(Debug, Clone)]
pub struct ArticleRevision {
    pub id: i64,
    pub article_id: i64,
    pub content: String,
    pub editor: Option<String>,
    pub created_at: i64,
    pub attachments_json: Option<String>,
}

/// One attachment as captured inside a revision's `attachments_json`.
///
/// Deliberately denormalized: the snapshot must outlive attachment row
/// deletion, so it stores values rather than foreign keys.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachmentSnapshot {
    pub filename: String,
    pub mime_type: Option<String>,
    pub uploaded_by: Option<String>,
    pub uploaded_at: Option<i64>,
}

/// Derived, disposable text segment. The full set for an article is
/// replaced on every content change; indices are always dense 0..N-1.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: i64,
    pub article_id: i64,
    pub chunk_index: i64,
    pub text: String,
    pub token_count: i64,
}

impl Section {
    pub fn from_row(row: &SqliteRow) -> Self {
        Self {
            id: row.get("id"),
            title: row.get("title"),
            description: row.get("description"),
            created_at: row.get("created_at"),
            created_by: row.get("created_by"),
            updated_at: row.get("updated_at"),
            updated_by: row.get("updated_by"),
            is_deleted: row.get::<i64, _>("is_deleted") != 0,
            deleted_at: row.get("deleted_at"),
            deleted_by: row.get("deleted_by"),
        }
    }
}

impl Subsection {
    pub fn from_row(row: &SqliteRow) -> Self {
        Self {
            id: row.get("id"),
            section_id: row.get("section_id"),
            title: row.get("title"),
            description: row.get("description"),
            created_at: row.get("created_at"),
            created_by: row.get("created_by"),
            updated_at: row.get("updated_at"),
            updated_by: row.get("updated_by"),
            is_deleted: row.get::<i64, _>("is_deleted") != 0,
            deleted_at: row.get("deleted_at"),
            deleted_by: row.get("deleted_by"),
        }
    }
}

impl Article {
    pub fn from_row(row: &SqliteRow) -> Self {
        Self {
            id: row.get("id"),
            subsection_id: row.get("subsection_id"),
            title: row.get("title"),
            content: row.get("content"),
            created_at: row.get("created_at"),
            created_by: row.get("created_by"),
            updated_at: row.get("updated_at"),
            updated_by: row.get("updated_by"),
            is_deleted: row.get::<i64, _>("is_deleted") != 0,
            deleted_at: row.get("deleted_at"),
            deleted_by: row.get("deleted_by"),
        }
    }
}

impl Attachment {
    pub fn from_row(row: &SqliteRow) -> Self {
        Self {
            id: row.get("id"),
            article_id: row.get("article_id"),
            filename: row.get("filename"),
            mime_type: row.get("mime_type"),
            uploaded_at: row.get("uploaded_at"),
            uploaded_by: row.get("uploaded_by"),
        }
    }
}

impl ArticleRevision {
    pub fn from_row(row: &SqliteRow) -> Self {
        Self {
            id: row.get("id"),
            article_id: row.get("article_id"),
            content: row.get("content"),
            editor: row.get("editor"),
            created_at: row.get("created_at"),
            attachments_json: row.get("attachments_json"),
        }
    }
}

impl Chunk {
    pub fn from_row(row: &SqliteRow) -> Self {
        Self {
            id: row.get("id"),
            article_id: row.get("article_id"),
            chunk_index: row.get("chunk_index"),
            text: row.get("text"),
            token_count: row.get("token_count"),
        }
    }
}

pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}
