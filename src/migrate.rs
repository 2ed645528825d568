//! Idempotent schema creation for the content tree and its derived state.
//!
//! A lock file next to the database serializes first-time initialization
//! across processes; runtime content operations are never locked.

use anyhow::Result;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::db;

/// How long a second process waits for another initializer to finish.
const INIT_LOCK_WAIT: Duration = Duration::from_secs(30);

/// Exclusive-create lock file held for the duration of schema init.
struct InitLock {
    path: PathBuf,
}

impl InitLock {
    fn acquire(db_path: &Path) -> Result<Self> {
        let path = db_path.with_extension("init.lock");
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let deadline = Instant::now() + INIT_LOCK_WAIT;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if Instant::now() >= deadline {
                        // Stale lock from a crashed initializer; take it over.
                        std::fs::remove_file(&path).ok();
                    } else {
                        std::thread::sleep(Duration::from_millis(100));
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for InitLock {
    fn drop(&mut self) {
        std::fs::remove_file(&self.path).ok();
    }
}

pub async fn run_migrations(config: &Config) -> Result<()> {
    let _lock = InitLock::acquire(&config.db.path)?;
    let pool = db::connect(config).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sections (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL,
            created_by TEXT,
            updated_at INTEGER NOT NULL,
            updated_by TEXT,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            deleted_at INTEGER,
            deleted_by TEXT
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS subsections (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            section_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL,
            created_by TEXT,
            updated_at INTEGER NOT NULL,
            updated_by TEXT,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            deleted_at INTEGER,
            deleted_by TEXT,
            FOREIGN KEY (section_id) REFERENCES sections(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS articles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            subsection_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            content TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL,
            created_by TEXT,
            updated_at INTEGER NOT NULL,
            updated_by TEXT,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            deleted_at INTEGER,
            deleted_by TEXT,
            FOREIGN KEY (subsection_id) REFERENCES subsections(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS attachments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            article_id INTEGER NOT NULL,
            filename TEXT NOT NULL,
            mime_type TEXT,
            uploaded_at INTEGER NOT NULL,
            uploaded_by TEXT,
            FOREIGN KEY (article_id) REFERENCES articles(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS article_revisions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            article_id INTEGER NOT NULL,
            content TEXT NOT NULL DEFAULT '',
            editor TEXT,
            created_at INTEGER NOT NULL,
            attachments_json TEXT,
            FOREIGN KEY (article_id) REFERENCES articles(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            article_id INTEGER NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            token_count INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            UNIQUE(article_id, chunk_index),
            FOREIGN KEY (article_id) REFERENCES articles(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS favorites (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_login TEXT NOT NULL,
            article_id INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(user_login, article_id),
            FOREIGN KEY (article_id) REFERENCES articles(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_subsections_section ON subsections(section_id)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_articles_subsection ON articles(subsection_id)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_articles_updated_at ON articles(updated_at DESC)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_attachments_article ON attachments(article_id)")
        .execute(&pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_revisions_article ON article_revisions(article_id, created_at DESC)",
    )
    .execute(&pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_article ON chunks(article_id)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_favorites_user ON favorites(user_login)")
        .execute(&pool)
        .await?;

    pool.close().await;
    Ok(())
}
