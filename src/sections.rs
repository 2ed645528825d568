//! Section and subsection management.
//!
//! The two container levels of the content tree. Titles are required;
//! descriptions are optional and stored as empty strings when absent.

use sqlx::SqlitePool;
use tracing::info;

use crate::error::{WikiError, WikiResult};
use crate::models::{now_ts, Article, Section, Subsection};

pub async fn create_section(
    pool: &SqlitePool,
    title: &str,
    description: &str,
    actor: Option<&str>,
) -> WikiResult<Section> {
    let title = title.trim();
    if title.is_empty() {
        return Err(WikiError::validation("section title is required"));
    }
    let now = now_ts();
    let id = sqlx::query(
        "INSERT INTO sections (title, description, created_at, created_by, updated_at, updated_by) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(title)
    .bind(description.trim())
    .bind(now)
    .bind(actor)
    .bind(now)
    .bind(actor)
    .execute(pool)
    .await?
    .last_insert_rowid();
    info!(id, title, "created section");
    get_section(pool, id).await
}

pub async fn edit_section(
    pool: &SqlitePool,
    id: i64,
    title: &str,
    description: &str,
    actor: Option<&str>,
) -> WikiResult<Section> {
    let title = title.trim();
    if title.is_empty() {
        return Err(WikiError::validation("section title is required"));
    }
    // Existence check first so a bad id is not reported as a no-op edit.
    get_section(pool, id).await?;
    sqlx::query(
        "UPDATE sections SET title = ?, description = ?, updated_at = ?, updated_by = ? WHERE id = ?",
    )
    .bind(title)
    .bind(description.trim())
    .bind(now_ts())
    .bind(actor)
    .bind(id)
    .execute(pool)
    .await?;
    get_section(pool, id).await
}

pub async fn get_section(pool: &SqlitePool, id: i64) -> WikiResult<Section> {
    let row = sqlx::query("SELECT * FROM sections WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| WikiError::not_found("section", id))?;
    Ok(Section::from_row(&row))
}

/// Active sections, alphabetical by title.
pub async fn list_sections(pool: &SqlitePool) -> WikiResult<Vec<Section>> {
    let rows = sqlx::query("SELECT * FROM sections WHERE is_deleted = 0 ORDER BY title")
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(Section::from_row).collect())
}

pub async fn create_subsection(
    pool: &SqlitePool,
    section_id: i64,
    title: &str,
    description: &str,
    actor: Option<&str>,
) -> WikiResult<Subsection> {
    let title = title.trim();
    if title.is_empty() {
        return Err(WikiError::validation("subsection title is required"));
    }
    let section = get_section(pool, section_id).await?;
    if section.is_deleted {
        return Err(WikiError::precondition(
            "cannot create a subsection under a deleted section",
        ));
    }
    let now = now_ts();
    let id = sqlx::query(
        "INSERT INTO subsections (section_id, title, description, created_at, created_by, updated_at, updated_by) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(section_id)
    .bind(title)
    .bind(description.trim())
    .bind(now)
    .bind(actor)
    .bind(now)
    .bind(actor)
    .execute(pool)
    .await?
    .last_insert_rowid();
    info!(id, section_id, title, "created subsection");
    get_subsection(pool, id).await
}

pub async fn edit_subsection(
    pool: &SqlitePool,
    id: i64,
    title: &str,
    description: &str,
    actor: Option<&str>,
) -> WikiResult<Subsection> {
    let title = title.trim();
    if title.is_empty() {
        return Err(WikiError::validation("subsection title is required"));
    }
    get_subsection(pool, id).await?;
    sqlx::query(
        "UPDATE subsections SET title = ?, description = ?, updated_at = ?, updated_by = ? WHERE id = ?",
    )
    .bind(title)
    .bind(description.trim())
    .bind(now_ts())
    .bind(actor)
    .bind(id)
    .execute(pool)
    .await?;
    get_subsection(pool, id).await
}

pub async fn get_subsection(pool: &SqlitePool, id: i64) -> WikiResult<Subsection> {
    let row = sqlx::query("SELECT * FROM subsections WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| WikiError::not_found("subsection", id))?;
    Ok(Subsection::from_row(&row))
}

/// Active subsections of a section, alphabetical by title.
pub async fn list_subsections(pool: &SqlitePool, section_id: i64) -> WikiResult<Vec<Subsection>> {
    let rows = sqlx::query(
        "SELECT * FROM subsections WHERE section_id = ? AND is_deleted = 0 ORDER BY title",
    )
    .bind(section_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(Subsection::from_row).collect())
}

/// Active articles of a subsection, most recently updated first.
pub async fn list_articles(pool: &SqlitePool, subsection_id: i64) -> WikiResult<Vec<Article>> {
    let rows = sqlx::query(
        "SELECT * FROM articles WHERE subsection_id = ? AND is_deleted = 0 ORDER BY updated_at DESC, id DESC",
    )
    .bind(subsection_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(Article::from_row).collect())
}

/// Everything currently soft-deleted, for the trash view.
#[derive(Debug, Default)]
pub struct TrashListing {
    pub sections: Vec<Section>,
    pub subsections: Vec<Subsection>,
    pub articles: Vec<Article>,
}

pub async fn list_trash(pool: &SqlitePool) -> WikiResult<TrashListing> {
    let sections = sqlx::query("SELECT * FROM sections WHERE is_deleted = 1 ORDER BY deleted_at DESC")
        .fetch_all(pool)
        .await?;
    let subsections =
        sqlx::query("SELECT * FROM subsections WHERE is_deleted = 1 ORDER BY deleted_at DESC")
            .fetch_all(pool)
            .await?;
    let articles = sqlx::query("SELECT * FROM articles WHERE is_deleted = 1 ORDER BY deleted_at DESC")
        .fetch_all(pool)
        .await?;
    Ok(TrashListing {
        sections: sections.iter().map(Section::from_row).collect(),
        subsections: subsections.iter().map(Subsection::from_row).collect(),
        articles: articles.iter().map(Article::from_row).collect(),
    })
}
