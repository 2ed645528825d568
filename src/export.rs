//! Export feeds for downstream indexing.
//!
//! Two shapes: per-chunk records (the retrieval corpus) and per-article
//! records (full content). Both cover only fully active rows — an article
//! under a deleted subsection or section is excluded even if its own flag
//! is clear. NDJSON streams one record per line; the JSON array form is
//! capped so a bulk pull cannot balloon without bound.

use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::io::Write;

use crate::error::WikiResult;
use crate::extract::html_to_text;

/// Record cap for the JSON-array form. NDJSON has no cap.
pub const JSON_EXPORT_CAP: usize = 5000;

#[derive(Debug, Serialize)]
pub struct ChunkRecord {
    pub chunk_id: i64,
    pub article_id: i64,
    pub article_title: String,
    pub section_id: i64,
    pub section_title: String,
    pub subsection_id: i64,
    pub subsection_title: String,
    pub chunk_index: i64,
    pub text: String,
    pub token_count: i64,
    pub last_editor: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct ArticleRecord {
    pub article_id: i64,
    pub title: String,
    pub section_id: i64,
    pub section_title: String,
    pub subsection_id: i64,
    pub subsection_title: String,
    pub html: String,
    pub text: String,
    pub author: Option<String>,
    pub last_editor: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub path: String,
}

fn rfc3339(ts: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

fn article_path(section_id: i64, subsection_id: i64, article_id: i64) -> String {
    format!(
        "/sections/{}/subsections/{}/articles/{}",
        section_id, subsection_id, article_id
    )
}

/// All chunks of fully active articles, in chunk id order.
pub async fn chunk_records(pool: &SqlitePool) -> WikiResult<Vec<ChunkRecord>> {
    let rows = sqlx::query(
        "SELECT c.id AS chunk_id, c.chunk_index, c.text, c.token_count, \
                a.id AS article_id, a.title AS article_title, \
                a.created_at, a.updated_at, a.updated_by, a.created_by, \
                ss.id AS subsection_id, ss.title AS subsection_title, \
                s.id AS section_id, s.title AS section_title \
         FROM chunks c \
         JOIN articles a ON a.id = c.article_id \
         JOIN subsections ss ON ss.id = a.subsection_id \
         JOIN sections s ON s.id = ss.section_id \
         WHERE a.is_deleted = 0 AND ss.is_deleted = 0 AND s.is_deleted = 0 \
         ORDER BY c.id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let updated_by: Option<String> = row.get("updated_by");
            let created_by: Option<String> = row.get("created_by");
            ChunkRecord {
                chunk_id: row.get("chunk_id"),
                article_id: row.get("article_id"),
                article_title: row.get("article_title"),
                section_id: row.get("section_id"),
                section_title: row.get("section_title"),
                subsection_id: row.get("subsection_id"),
                subsection_title: row.get("subsection_title"),
                chunk_index: row.get("chunk_index"),
                text: row.get("text"),
                token_count: row.get("token_count"),
                last_editor: updated_by.or(created_by),
                created_at: rfc3339(row.get("created_at")),
                updated_at: rfc3339(row.get("updated_at")),
                path: article_path(
                    row.get("section_id"),
                    row.get("subsection_id"),
                    row.get("article_id"),
                ),
            }
        })
        .collect())
}

/// All fully active articles with both HTML and extracted text.
pub async fn article_records(pool: &SqlitePool) -> WikiResult<Vec<ArticleRecord>> {
    let rows = sqlx::query(
        "SELECT a.id AS article_id, a.title, a.content, \
                a.created_at, a.updated_at, a.updated_by, a.created_by, \
                ss.id AS subsection_id, ss.title AS subsection_title, \
                s.id AS section_id, s.title AS section_title \
         FROM articles a \
         JOIN subsections ss ON ss.id = a.subsection_id \
         JOIN sections s ON s.id = ss.section_id \
         WHERE a.is_deleted = 0 AND ss.is_deleted = 0 AND s.is_deleted = 0 \
         ORDER BY a.id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let html: String = row.get("content");
            let updated_by: Option<String> = row.get("updated_by");
            let created_by: Option<String> = row.get("created_by");
            ArticleRecord {
                article_id: row.get("article_id"),
                title: row.get("title"),
                text: html_to_text(&html),
                html,
                section_id: row.get("section_id"),
                section_title: row.get("section_title"),
                subsection_id: row.get("subsection_id"),
                subsection_title: row.get("subsection_title"),
                author: created_by.clone(),
                last_editor: updated_by.or(created_by),
                created_at: rfc3339(row.get("created_at")),
                updated_at: rfc3339(row.get("updated_at")),
                path: article_path(
                    row.get("section_id"),
                    row.get("subsection_id"),
                    row.get("article_id"),
                ),
            }
        })
        .collect())
}

/// One JSON object per line.
pub fn write_ndjson<W: Write, T: Serialize>(mut out: W, records: &[T]) -> WikiResult<()> {
    for record in records {
        serde_json::to_writer(&mut out, record)?;
        out.write_all(b"\n")?;
    }
    Ok(())
}

/// A single pretty-printed JSON array, truncated at [`JSON_EXPORT_CAP`].
pub fn write_json_array<W: Write, T: Serialize>(mut out: W, records: &[T]) -> WikiResult<()> {
    let capped = &records[..records.len().min(JSON_EXPORT_CAP)];
    serde_json::to_writer_pretty(&mut out, capped)?;
    out.write_all(b"\n")?;
    Ok(())
}
