//! Lifecycle state machine: soft delete, restore, purge.
//!
//! Cascades are explicit — deleting a section walks its subsections and
//! articles inside a single transaction so the whole subtree flips with
//! one shared timestamp and actor. Soft-deleted rows keep their content;
//! only purge destroys data. Chunks are derived, so they are dropped when
//! an article leaves the active set and rebuilt when it returns.

use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::info;

use crate::chunk::rebuild_article_chunks;
use crate::config::ChunkingConfig;
use crate::error::{WikiError, WikiResult};
use crate::media::MediaStore;
use crate::models::now_ts;
use crate::{articles, sections};

#[derive(Debug)]
pub struct Purge {
    /// Media files actually removed from storage. Files already gone
    /// (or shared references already purged) do not count.
    pub removed_files: usize,
}

pub async fn soft_delete_article(pool: &SqlitePool, id: i64, actor: Option<&str>) -> WikiResult<()> {
    let article = articles::get_article(pool, id).await?;
    if article.is_deleted {
        return Err(WikiError::precondition("article is already deleted"));
    }
    let now = now_ts();
    let mut tx = pool.begin().await?;
    mark_articles_deleted(&mut tx, &[id], now, actor).await?;
    drop_chunks(&mut tx, &[id]).await?;
    tx.commit().await?;
    info!(id, "soft-deleted article");
    Ok(())
}

pub async fn restore_article(
    pool: &SqlitePool,
    chunking: &ChunkingConfig,
    id: i64,
    actor: Option<&str>,
) -> WikiResult<()> {
    let article = articles::get_article(pool, id).await?;
    if !article.is_deleted {
        return Err(WikiError::precondition("article is not deleted"));
    }
    // Parent state is not checked: a node restores on its own flag alone,
    // and the export joins keep it invisible until its ancestors return.
    let mut tx = pool.begin().await?;
    mark_articles_restored(&mut tx, &[id], actor).await?;
    tx.commit().await?;
    rebuild_article_chunks(pool, chunking, id).await?;
    info!(id, "restored article");
    Ok(())
}

pub async fn soft_delete_subsection(
    pool: &SqlitePool,
    id: i64,
    actor: Option<&str>,
) -> WikiResult<()> {
    let subsection = sections::get_subsection(pool, id).await?;
    if subsection.is_deleted {
        return Err(WikiError::precondition("subsection is already deleted"));
    }
    let now = now_ts();
    let mut tx = pool.begin().await?;
    let article_ids = active_article_ids(&mut tx, &[id]).await?;
    mark_articles_deleted(&mut tx, &article_ids, now, actor).await?;
    drop_chunks(&mut tx, &article_ids).await?;
    mark_subsections_deleted(&mut tx, &[id], now, actor).await?;
    tx.commit().await?;
    info!(id, articles = article_ids.len(), "soft-deleted subsection");
    Ok(())
}

pub async fn restore_subsection(
    pool: &SqlitePool,
    chunking: &ChunkingConfig,
    id: i64,
    actor: Option<&str>,
) -> WikiResult<()> {
    let subsection = sections::get_subsection(pool, id).await?;
    if !subsection.is_deleted {
        return Err(WikiError::precondition("subsection is not deleted"));
    }
    let mut tx = pool.begin().await?;
    let article_ids = deleted_article_ids(&mut tx, &[id]).await?;
    mark_articles_restored(&mut tx, &article_ids, actor).await?;
    mark_subsections_restored(&mut tx, &[id], actor).await?;
    tx.commit().await?;
    for article_id in &article_ids {
        rebuild_article_chunks(pool, chunking, *article_id).await?;
    }
    info!(id, articles = article_ids.len(), "restored subsection");
    Ok(())
}

pub async fn soft_delete_section(pool: &SqlitePool, id: i64, actor: Option<&str>) -> WikiResult<()> {
    let section = sections::get_section(pool, id).await?;
    if section.is_deleted {
        return Err(WikiError::precondition("section is already deleted"));
    }
    let now = now_ts();
    let mut tx = pool.begin().await?;
    let subsection_ids = subsection_ids_of(&mut tx, id, Some(false)).await?;
    let article_ids = active_article_ids(&mut tx, &subsection_ids).await?;
    mark_articles_deleted(&mut tx, &article_ids, now, actor).await?;
    drop_chunks(&mut tx, &article_ids).await?;
    mark_subsections_deleted(&mut tx, &subsection_ids, now, actor).await?;
    sqlx::query("UPDATE sections SET is_deleted = 1, deleted_at = ?, deleted_by = ? WHERE id = ?")
        .bind(now)
        .bind(actor)
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    info!(
        id,
        subsections = subsection_ids.len(),
        articles = article_ids.len(),
        "soft-deleted section"
    );
    Ok(())
}

pub async fn restore_section(
    pool: &SqlitePool,
    chunking: &ChunkingConfig,
    id: i64,
    actor: Option<&str>,
) -> WikiResult<()> {
    let section = sections::get_section(pool, id).await?;
    if !section.is_deleted {
        return Err(WikiError::precondition("section is not deleted"));
    }
    let mut tx = pool.begin().await?;
    let subsection_ids = subsection_ids_of(&mut tx, id, Some(true)).await?;
    let article_ids = deleted_article_ids(&mut tx, &subsection_ids).await?;
    mark_articles_restored(&mut tx, &article_ids, actor).await?;
    mark_subsections_restored(&mut tx, &subsection_ids, actor).await?;
    sqlx::query(
        "UPDATE sections SET is_deleted = 0, deleted_at = NULL, deleted_by = NULL, \
         updated_at = ?, updated_by = ? WHERE id = ?",
    )
    .bind(now_ts())
    .bind(actor)
    .bind(id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    for article_id in &article_ids {
        rebuild_article_chunks(pool, chunking, *article_id).await?;
    }
    info!(
        id,
        subsections = subsection_ids.len(),
        articles = article_ids.len(),
        "restored section"
    );
    Ok(())
}

/// Permanently destroy a soft-deleted article: favorites, chunks,
/// revisions, attachment rows, the row itself, and (best-effort) its
/// stored media files.
pub async fn purge_article(pool: &SqlitePool, store: &MediaStore, id: i64) -> WikiResult<Purge> {
    let article = articles::get_article(pool, id).await?;
    if !article.is_deleted {
        return Err(WikiError::precondition("only deleted articles can be purged"));
    }
    let mut tx = pool.begin().await?;
    let filenames = attachment_filenames(&mut tx, &[id]).await?;
    purge_article_rows(&mut tx, &[id]).await?;
    tx.commit().await?;
    let removed_files = remove_files(store, &filenames);
    info!(id, removed_files, "purged article");
    Ok(Purge { removed_files })
}

pub async fn purge_subsection(pool: &SqlitePool, store: &MediaStore, id: i64) -> WikiResult<Purge> {
    let subsection = sections::get_subsection(pool, id).await?;
    if !subsection.is_deleted {
        return Err(WikiError::precondition(
            "only deleted subsections can be purged",
        ));
    }
    let mut tx = pool.begin().await?;
    let article_ids = all_article_ids(&mut tx, &[id]).await?;
    let filenames = attachment_filenames(&mut tx, &article_ids).await?;
    purge_article_rows(&mut tx, &article_ids).await?;
    sqlx::query("DELETE FROM subsections WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    let removed_files = remove_files(store, &filenames);
    info!(id, articles = article_ids.len(), removed_files, "purged subsection");
    Ok(Purge { removed_files })
}

pub async fn purge_section(pool: &SqlitePool, store: &MediaStore, id: i64) -> WikiResult<Purge> {
    let section = sections::get_section(pool, id).await?;
    if !section.is_deleted {
        return Err(WikiError::precondition("only deleted sections can be purged"));
    }
    let mut tx = pool.begin().await?;
    let subsection_ids = subsection_ids_of(&mut tx, id, None).await?;
    let article_ids = all_article_ids(&mut tx, &subsection_ids).await?;
    let filenames = attachment_filenames(&mut tx, &article_ids).await?;
    purge_article_rows(&mut tx, &article_ids).await?;
    for subsection_id in &subsection_ids {
        sqlx::query("DELETE FROM subsections WHERE id = ?")
            .bind(subsection_id)
            .execute(&mut *tx)
            .await?;
    }
    sqlx::query("DELETE FROM sections WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    let removed_files = remove_files(store, &filenames);
    info!(
        id,
        subsections = subsection_ids.len(),
        articles = article_ids.len(),
        removed_files,
        "purged section"
    );
    Ok(Purge { removed_files })
}

async fn subsection_ids_of(
    tx: &mut Transaction<'_, Sqlite>,
    section_id: i64,
    deleted: Option<bool>,
) -> WikiResult<Vec<i64>> {
    let sql = match deleted {
        Some(false) => "SELECT id FROM subsections WHERE section_id = ? AND is_deleted = 0",
        Some(true) => "SELECT id FROM subsections WHERE section_id = ? AND is_deleted = 1",
        None => "SELECT id FROM subsections WHERE section_id = ?",
    };
    Ok(sqlx::query_scalar(sql)
        .bind(section_id)
        .fetch_all(&mut **tx)
        .await?)
}

async fn active_article_ids(
    tx: &mut Transaction<'_, Sqlite>,
    subsection_ids: &[i64],
) -> WikiResult<Vec<i64>> {
    article_ids_where(tx, subsection_ids, "is_deleted = 0").await
}

async fn deleted_article_ids(
    tx: &mut Transaction<'_, Sqlite>,
    subsection_ids: &[i64],
) -> WikiResult<Vec<i64>> {
    article_ids_where(tx, subsection_ids, "is_deleted = 1").await
}

async fn all_article_ids(
    tx: &mut Transaction<'_, Sqlite>,
    subsection_ids: &[i64],
) -> WikiResult<Vec<i64>> {
    article_ids_where(tx, subsection_ids, "1 = 1").await
}

async fn article_ids_where(
    tx: &mut Transaction<'_, Sqlite>,
    subsection_ids: &[i64],
    filter: &str,
) -> WikiResult<Vec<i64>> {
    let mut ids = Vec::new();
    for subsection_id in subsection_ids {
        let sql = format!(
            "SELECT id FROM articles WHERE subsection_id = ? AND {} ORDER BY id",
            filter
        );
        let batch: Vec<i64> = sqlx::query_scalar(&sql)
            .bind(subsection_id)
            .fetch_all(&mut **tx)
            .await?;
        ids.extend(batch);
    }
    Ok(ids)
}

async fn mark_articles_deleted(
    tx: &mut Transaction<'_, Sqlite>,
    ids: &[i64],
    now: i64,
    actor: Option<&str>,
) -> WikiResult<()> {
    for id in ids {
        sqlx::query("UPDATE articles SET is_deleted = 1, deleted_at = ?, deleted_by = ? WHERE id = ?")
            .bind(now)
            .bind(actor)
            .bind(id)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

async fn mark_articles_restored(
    tx: &mut Transaction<'_, Sqlite>,
    ids: &[i64],
    actor: Option<&str>,
) -> WikiResult<()> {
    let now = now_ts();
    for id in ids {
        sqlx::query(
            "UPDATE articles SET is_deleted = 0, deleted_at = NULL, deleted_by = NULL, \
             updated_at = ?, updated_by = ? WHERE id = ?",
        )
        .bind(now)
        .bind(actor)
        .bind(id)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn mark_subsections_deleted(
    tx: &mut Transaction<'_, Sqlite>,
    ids: &[i64],
    now: i64,
    actor: Option<&str>,
) -> WikiResult<()> {
    for id in ids {
        sqlx::query(
            "UPDATE subsections SET is_deleted = 1, deleted_at = ?, deleted_by = ? WHERE id = ?",
        )
        .bind(now)
        .bind(actor)
        .bind(id)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn mark_subsections_restored(
    tx: &mut Transaction<'_, Sqlite>,
    ids: &[i64],
    actor: Option<&str>,
) -> WikiResult<()> {
    let now = now_ts();
    for id in ids {
        sqlx::query(
            "UPDATE subsections SET is_deleted = 0, deleted_at = NULL, deleted_by = NULL, \
             updated_at = ?, updated_by = ? WHERE id = ?",
        )
        .bind(now)
        .bind(actor)
        .bind(id)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn drop_chunks(tx: &mut Transaction<'_, Sqlite>, article_ids: &[i64]) -> WikiResult<()> {
    for id in article_ids {
        sqlx::query("DELETE FROM chunks WHERE article_id = ?")
            .bind(id)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

async fn attachment_filenames(
    tx: &mut Transaction<'_, Sqlite>,
    article_ids: &[i64],
) -> WikiResult<Vec<String>> {
    let mut names = Vec::new();
    for id in article_ids {
        let batch: Vec<String> =
            sqlx::query_scalar("SELECT filename FROM attachments WHERE article_id = ?")
                .bind(id)
                .fetch_all(&mut **tx)
                .await?;
        names.extend(batch);
    }
    Ok(names)
}

async fn purge_article_rows(tx: &mut Transaction<'_, Sqlite>, article_ids: &[i64]) -> WikiResult<()> {
    for id in article_ids {
        for sql in [
            "DELETE FROM favorites WHERE article_id = ?",
            "DELETE FROM chunks WHERE article_id = ?",
            "DELETE FROM article_revisions WHERE article_id = ?",
            "DELETE FROM attachments WHERE article_id = ?",
            "DELETE FROM articles WHERE id = ?",
        ] {
            sqlx::query(sql).bind(id).execute(&mut **tx).await?;
        }
    }
    Ok(())
}

fn remove_files(store: &MediaStore, filenames: &[String]) -> usize {
    filenames.iter().filter(|name| store.remove(name)).count()
}
