//! Article save pipeline, revision history, rollback, search, favorites.
//!
//! Every content write goes through the same order: sanitize, localize
//! media, persist, reconcile attachments, snapshot a revision, rebuild
//! chunks. Sanitization and persistence are strict; media localization is
//! best-effort and never blocks the save.

use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::attach::{reconcile_attachments, snapshot_attachments};
use crate::chunk::rebuild_article_chunks;
use crate::config::ChunkingConfig;
use crate::error::{WikiError, WikiResult};
use crate::media::{localize_media, MediaFetcher, MediaStore};
use crate::models::{now_ts, Article, ArticleRevision, AttachmentSnapshot};
use crate::sanitize::sanitize;
use crate::sections::get_subsection;

/// Shared collaborators of the content-write pipeline.
pub struct Pipeline<'a> {
    pub pool: &'a SqlitePool,
    pub store: &'a MediaStore,
    pub fetcher: &'a MediaFetcher,
    pub chunking: &'a ChunkingConfig,
}

impl<'a> Pipeline<'a> {
    pub async fn create_article(
        &self,
        subsection_id: i64,
        title: &str,
        content: &str,
        actor: Option<&str>,
    ) -> WikiResult<Article> {
        let title = title.trim();
        if title.is_empty() {
            return Err(WikiError::validation("article title is required"));
        }
        let subsection = get_subsection(self.pool, subsection_id).await?;
        if subsection.is_deleted {
            return Err(WikiError::precondition(
                "cannot create an article under a deleted subsection",
            ));
        }

        let clean = sanitize(content);
        let localized = localize_media(&clean, self.store, self.fetcher).await;

        let now = now_ts();
        let id = sqlx::query(
            "INSERT INTO articles (subsection_id, title, content, created_at, created_by, updated_at, updated_by) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(subsection_id)
        .bind(title)
        .bind(&localized)
        .bind(now)
        .bind(actor)
        .bind(now)
        .bind(actor)
        .execute(self.pool)
        .await?
        .last_insert_rowid();

        reconcile_attachments(self.pool, self.store, id, &localized, actor).await?;
        // The initial revision records the article as created, so history
        // is never empty.
        self.record_revision(id, &localized, actor).await?;
        rebuild_article_chunks(self.pool, self.chunking, id).await?;

        info!(id, subsection_id, title, "created article");
        get_article(self.pool, id).await
    }

    pub async fn edit_article(
        &self,
        id: i64,
        title: &str,
        content: &str,
        actor: Option<&str>,
    ) -> WikiResult<Article> {
        let title = title.trim();
        if title.is_empty() {
            return Err(WikiError::validation("article title is required"));
        }
        let current = get_article(self.pool, id).await?;
        if current.is_deleted {
            return Err(WikiError::precondition("cannot edit a deleted article"));
        }

        // Snapshot the pre-edit state before anything changes.
        self.record_revision(id, &current.content, actor).await?;

        let clean = sanitize(content);
        let localized = localize_media(&clean, self.store, self.fetcher).await;

        sqlx::query(
            "UPDATE articles SET title = ?, content = ?, updated_at = ?, updated_by = ? WHERE id = ?",
        )
        .bind(title)
        .bind(&localized)
        .bind(now_ts())
        .bind(actor)
        .bind(id)
        .execute(self.pool)
        .await?;

        reconcile_attachments(self.pool, self.store, id, &localized, actor).await?;
        rebuild_article_chunks(self.pool, self.chunking, id).await?;

        info!(id, title, "edited article");
        get_article(self.pool, id).await
    }

    /// Restore an article to a prior revision.
    ///
    /// The current state is snapshotted first, so a rollback is itself
    /// undoable. Attachment rows are rebuilt from the revision's embedded
    /// snapshot; entries whose files have since been purged from storage
    /// are skipped and counted.
    pub async fn rollback_article(
        &self,
        id: i64,
        revision_id: i64,
        actor: Option<&str>,
    ) -> WikiResult<Rollback> {
        let current = get_article(self.pool, id).await?;
        if current.is_deleted {
            return Err(WikiError::precondition("cannot roll back a deleted article"));
        }
        let revision = get_revision(self.pool, id, revision_id).await?;

        self.record_revision(id, &current.content, actor).await?;

        sqlx::query("UPDATE articles SET content = ?, updated_at = ?, updated_by = ? WHERE id = ?")
            .bind(&revision.content)
            .bind(now_ts())
            .bind(actor)
            .bind(id)
            .execute(self.pool)
            .await?;

        let snapshots: Vec<AttachmentSnapshot> = match &revision.attachments_json {
            Some(json) => serde_json::from_str(json)?,
            None => Vec::new(),
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM attachments WHERE article_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let mut missing_files = 0usize;
        for snap in &snapshots {
            if !self.store.contains(&snap.filename) {
                warn!(article_id = id, filename = %snap.filename, "rollback references a purged file");
                missing_files += 1;
                continue;
            }
            sqlx::query(
                "INSERT INTO attachments (article_id, filename, mime_type, uploaded_at, uploaded_by) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(id)
            .bind(&snap.filename)
            .bind(&snap.mime_type)
            .bind(snap.uploaded_at.unwrap_or_else(now_ts))
            .bind(&snap.uploaded_by)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        rebuild_article_chunks(self.pool, self.chunking, id).await?;

        info!(id, revision_id, missing_files, "rolled back article");
        Ok(Rollback {
            article: get_article(self.pool, id).await?,
            missing_files,
        })
    }

    async fn record_revision(&self, article_id: i64, content: &str, actor: Option<&str>) -> WikiResult<()> {
        let snapshots = snapshot_attachments(self.pool, article_id).await?;
        let attachments_json = serde_json::to_string(&snapshots)?;
        sqlx::query(
            "INSERT INTO article_revisions (article_id, content, editor, created_at, attachments_json) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(article_id)
        .bind(content)
        .bind(actor)
        .bind(now_ts())
        .bind(attachments_json)
        .execute(self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct Rollback {
    pub article: Article,
    /// Snapshot entries skipped because their file no longer exists.
    pub missing_files: usize,
}

pub async fn get_article(pool: &SqlitePool, id: i64) -> WikiResult<Article> {
    let row = sqlx::query("SELECT * FROM articles WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| WikiError::not_found("article", id))?;
    Ok(Article::from_row(&row))
}

/// Revisions of an article, newest first.
pub async fn list_revisions(pool: &SqlitePool, article_id: i64) -> WikiResult<Vec<ArticleRevision>> {
    let rows = sqlx::query(
        "SELECT * FROM article_revisions WHERE article_id = ? ORDER BY created_at DESC, id DESC",
    )
    .bind(article_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(ArticleRevision::from_row).collect())
}

pub async fn get_revision(
    pool: &SqlitePool,
    article_id: i64,
    revision_id: i64,
) -> WikiResult<ArticleRevision> {
    let row = sqlx::query("SELECT * FROM article_revisions WHERE id = ? AND article_id = ?")
        .bind(revision_id)
        .bind(article_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| WikiError::not_found("revision", revision_id))?;
    Ok(ArticleRevision::from_row(&row))
}

/// Case-insensitive substring search over titles and content of active
/// articles, most recently updated first.
pub async fn search_articles(pool: &SqlitePool, query: &str) -> WikiResult<Vec<Article>> {
    let query = query.trim();
    if query.is_empty() {
        return Ok(Vec::new());
    }
    let rows = sqlx::query(
        "SELECT * FROM articles WHERE is_deleted = 0 \
         AND (title LIKE '%' || ? || '%' OR content LIKE '%' || ? || '%') \
         ORDER BY updated_at DESC, id DESC",
    )
    .bind(query)
    .bind(query)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(Article::from_row).collect())
}

/// Flip an article in or out of a user's favorites. Returns whether the
/// article is a favorite after the call.
pub async fn toggle_favorite(pool: &SqlitePool, login: &str, article_id: i64) -> WikiResult<bool> {
    get_article(pool, article_id).await?;
    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO favorites (user_login, article_id, created_at) VALUES (?, ?, ?)",
    )
    .bind(login)
    .bind(article_id)
    .bind(now_ts())
    .execute(pool)
    .await?
    .rows_affected();
    if inserted > 0 {
        return Ok(true);
    }
    sqlx::query("DELETE FROM favorites WHERE user_login = ? AND article_id = ?")
        .bind(login)
        .bind(article_id)
        .execute(pool)
        .await?;
    Ok(false)
}

/// A user's favorited articles that are still active, most recently
/// updated first. Favorites pointing at deleted articles are hidden, not
/// removed; restoring the article brings them back.
pub async fn list_favorites(pool: &SqlitePool, login: &str) -> WikiResult<Vec<Article>> {
    let rows = sqlx::query(
        "SELECT a.* FROM articles a \
         JOIN favorites f ON f.article_id = a.id \
         WHERE f.user_login = ? AND a.is_deleted = 0 \
         ORDER BY a.updated_at DESC, a.id DESC",
    )
    .bind(login)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(Article::from_row).collect())
}
