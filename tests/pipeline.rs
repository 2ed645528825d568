//! End-to-end tests over a temporary database and media directory:
//! the article save pipeline, lifecycle cascades, rollback, favorites,
//! and export feeds.

use sqlx::SqlitePool;
use tempfile::TempDir;

use quillwiki::articles::{self, Pipeline};
use quillwiki::attach;
use quillwiki::config::{AuthConfig, ChunkingConfig, Config, DbConfig, FetchConfig, MediaConfig};
use quillwiki::error::WikiError;
use quillwiki::media::{MediaFetcher, MediaStore};
use quillwiki::models::{Section, Subsection};
use quillwiki::{db, export, lifecycle, migrate, sections};

struct TestWiki {
    _tmp: TempDir,
    cfg: Config,
    pool: SqlitePool,
    store: MediaStore,
    fetcher: MediaFetcher,
}

impl TestWiki {
    fn pipeline(&self) -> Pipeline<'_> {
        Pipeline {
            pool: &self.pool,
            store: &self.store,
            fetcher: &self.fetcher,
            chunking: &self.cfg.chunking,
        }
    }
}

async fn setup() -> TestWiki {
    let tmp = TempDir::new().unwrap();
    let cfg = Config {
        db: DbConfig {
            path: tmp.path().join("wiki.sqlite"),
        },
        media: MediaConfig {
            dir: tmp.path().join("media"),
            url_base: "/media".to_string(),
            max_bytes: 1024 * 1024,
        },
        chunking: ChunkingConfig {
            size_chars: 100,
            overlap_chars: 20,
        },
        fetch: FetchConfig::default(),
        auth: AuthConfig::default(),
    };
    migrate::run_migrations(&cfg).await.unwrap();
    let pool = db::connect(&cfg).await.unwrap();
    let store = MediaStore::new(&cfg.media).unwrap();
    let fetcher = MediaFetcher::new(&cfg.fetch, cfg.media.max_bytes).unwrap();
    TestWiki {
        _tmp: tmp,
        cfg,
        pool,
        store,
        fetcher,
    }
}

async fn tree(pool: &SqlitePool) -> (Section, Subsection) {
    let section = sections::create_section(pool, "Engineering", "", Some("Admin"))
        .await
        .unwrap();
    let subsection = sections::create_subsection(pool, section.id, "Runbooks", "", Some("Admin"))
        .await
        .unwrap();
    (section, subsection)
}

// 1x1 transparent PNG.
const PNG_B64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

#[tokio::test]
async fn create_sanitizes_and_snapshots_and_chunks() {
    let wiki = setup().await;
    let (_, subsection) = tree(&wiki.pool).await;

    let article = wiki
        .pipeline()
        .create_article(
            subsection.id,
            "Deploys",
            "<p>steps</p><script>alert(1)</script>",
            Some("bob"),
        )
        .await
        .unwrap();

    assert_eq!(article.content, "<p>steps</p>");
    assert_eq!(article.created_by.as_deref(), Some("bob"));

    let revisions = articles::list_revisions(&wiki.pool, article.id).await.unwrap();
    assert_eq!(revisions.len(), 1);
    assert_eq!(revisions[0].content, "<p>steps</p>");

    let indices: Vec<i64> =
        sqlx::query_scalar("SELECT chunk_index FROM chunks WHERE article_id = ? ORDER BY chunk_index")
            .bind(article.id)
            .fetch_all(&wiki.pool)
            .await
            .unwrap();
    assert_eq!(indices, vec![0]);
}

#[tokio::test]
async fn edit_snapshots_the_pre_edit_state() {
    let wiki = setup().await;
    let (_, subsection) = tree(&wiki.pool).await;
    let pipeline = wiki.pipeline();

    let article = pipeline
        .create_article(subsection.id, "Doc", "<p>first</p>", Some("alice"))
        .await
        .unwrap();
    let edited = pipeline
        .edit_article(article.id, "Doc", "<p>second</p>", Some("bob"))
        .await
        .unwrap();

    assert_eq!(edited.content, "<p>second</p>");
    assert_eq!(edited.updated_by.as_deref(), Some("bob"));

    let revisions = articles::list_revisions(&wiki.pool, article.id).await.unwrap();
    assert_eq!(revisions.len(), 2);
    // Newest first: the edit snapshot holds the pre-edit content.
    assert_eq!(revisions[0].content, "<p>first</p>");
    assert_eq!(revisions[0].editor.as_deref(), Some("bob"));
}

#[tokio::test]
async fn data_uri_is_localized_and_attachment_reconciled() {
    let wiki = setup().await;
    let (_, subsection) = tree(&wiki.pool).await;

    let html = format!(r#"<img src="data:image/png;base64,{}">"#, PNG_B64);
    let article = wiki
        .pipeline()
        .create_article(subsection.id, "Pic", &html, Some("alice"))
        .await
        .unwrap();

    assert!(article.content.contains(r#"src="/media/"#), "got: {}", article.content);
    assert!(!article.content.contains("data:"));

    let attachments = attach::list_attachments(&wiki.pool, article.id).await.unwrap();
    assert_eq!(attachments.len(), 1);
    assert!(wiki.store.contains(&attachments[0].filename));
    assert_eq!(attachments[0].mime_type.as_deref(), Some("image/png"));
}

#[tokio::test]
async fn section_delete_cascades_and_drops_chunks() {
    let wiki = setup().await;
    let (section, subsection) = tree(&wiki.pool).await;
    let article = wiki
        .pipeline()
        .create_article(subsection.id, "Doc", "<p>body</p>", None)
        .await
        .unwrap();

    lifecycle::soft_delete_section(&wiki.pool, section.id, Some("Admin"))
        .await
        .unwrap();

    let section = sections::get_section(&wiki.pool, section.id).await.unwrap();
    let subsection = sections::get_subsection(&wiki.pool, subsection.id).await.unwrap();
    let article = articles::get_article(&wiki.pool, article.id).await.unwrap();
    assert!(section.is_deleted && subsection.is_deleted && article.is_deleted);
    // The cascade shares one timestamp and actor.
    assert_eq!(section.deleted_at, article.deleted_at);
    assert_eq!(article.deleted_by.as_deref(), Some("Admin"));

    let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE article_id = ?")
        .bind(article.id)
        .fetch_one(&wiki.pool)
        .await
        .unwrap();
    assert_eq!(chunks, 0);

    let trash = sections::list_trash(&wiki.pool).await.unwrap();
    assert_eq!(trash.sections.len(), 1);
    assert_eq!(trash.subsections.len(), 1);
    assert_eq!(trash.articles.len(), 1);
}

#[tokio::test]
async fn restore_section_brings_back_the_subtree_and_chunks() {
    let wiki = setup().await;
    let (section, subsection) = tree(&wiki.pool).await;
    let article = wiki
        .pipeline()
        .create_article(subsection.id, "Doc", "<p>body</p>", None)
        .await
        .unwrap();

    lifecycle::soft_delete_section(&wiki.pool, section.id, None).await.unwrap();
    lifecycle::restore_section(&wiki.pool, &wiki.cfg.chunking, section.id, None)
        .await
        .unwrap();

    let article = articles::get_article(&wiki.pool, article.id).await.unwrap();
    assert!(!article.is_deleted);
    assert_eq!(article.deleted_at, None);

    let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE article_id = ?")
        .bind(article.id)
        .fetch_one(&wiki.pool)
        .await
        .unwrap();
    assert!(chunks > 0);
}

#[tokio::test]
async fn restore_acts_on_the_nodes_own_flag_alone() {
    let wiki = setup().await;
    let (_, subsection) = tree(&wiki.pool).await;
    let article = wiki
        .pipeline()
        .create_article(subsection.id, "Doc", "<p>body</p>", None)
        .await
        .unwrap();

    lifecycle::soft_delete_subsection(&wiki.pool, subsection.id, None).await.unwrap();

    // The parent is still deleted; the article restores regardless.
    lifecycle::restore_article(&wiki.pool, &wiki.cfg.chunking, article.id, None)
        .await
        .unwrap();
    let article = articles::get_article(&wiki.pool, article.id).await.unwrap();
    assert!(!article.is_deleted);

    // It stays out of the export feeds until its ancestors come back.
    assert!(export::chunk_records(&wiki.pool).await.unwrap().is_empty());

    // Restoring an already-active node is the actual precondition error.
    let err = lifecycle::restore_article(&wiki.pool, &wiki.cfg.chunking, article.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, WikiError::Precondition(_)), "got: {:?}", err);
}

#[tokio::test]
async fn purge_rejects_active_nodes() {
    let wiki = setup().await;
    let (section, subsection) = tree(&wiki.pool).await;
    let article = wiki
        .pipeline()
        .create_article(subsection.id, "Doc", "<p>body</p>", None)
        .await
        .unwrap();

    for err in [
        lifecycle::purge_article(&wiki.pool, &wiki.store, article.id).await.unwrap_err(),
        lifecycle::purge_subsection(&wiki.pool, &wiki.store, subsection.id).await.unwrap_err(),
        lifecycle::purge_section(&wiki.pool, &wiki.store, section.id).await.unwrap_err(),
    ] {
        assert!(matches!(err, WikiError::Precondition(_)), "got: {:?}", err);
    }
}

#[tokio::test]
async fn purge_removes_rows_and_files() {
    let wiki = setup().await;
    let (_, subsection) = tree(&wiki.pool).await;
    let article = wiki
        .pipeline()
        .create_article(subsection.id, "Doc", "<p>body</p>", None)
        .await
        .unwrap();
    let upload = attach::save_upload(
        &wiki.pool,
        &wiki.store,
        Some(article.id),
        b"fake png bytes",
        "image/png",
        "shot.png",
        Some("alice"),
    )
    .await
    .unwrap();
    assert!(wiki.store.contains(&upload.filename));

    lifecycle::soft_delete_article(&wiki.pool, article.id, None).await.unwrap();
    let purge = lifecycle::purge_article(&wiki.pool, &wiki.store, article.id).await.unwrap();

    assert_eq!(purge.removed_files, 1);
    assert!(!wiki.store.contains(&upload.filename));
    let err = articles::get_article(&wiki.pool, article.id).await.unwrap_err();
    assert!(matches!(err, WikiError::NotFound { .. }));
    for table in ["attachments", "article_revisions", "chunks", "favorites"] {
        let count: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {} WHERE article_id = ?", table))
                .bind(article.id)
                .fetch_one(&wiki.pool)
                .await
                .unwrap();
        assert_eq!(count, 0, "leftover rows in {}", table);
    }
}

#[tokio::test]
async fn rollback_restores_content_and_counts_missing_files() {
    let wiki = setup().await;
    let (_, subsection) = tree(&wiki.pool).await;
    let pipeline = wiki.pipeline();

    let article = pipeline
        .create_article(subsection.id, "Doc", "<p>v1</p>", Some("alice"))
        .await
        .unwrap();
    let kept = attach::save_upload(
        &wiki.pool,
        &wiki.store,
        Some(article.id),
        b"aaa",
        "image/png",
        "a.png",
        Some("alice"),
    )
    .await
    .unwrap();
    let lost = attach::save_upload(
        &wiki.pool,
        &wiki.store,
        Some(article.id),
        b"bbb",
        "image/png",
        "b.png",
        Some("alice"),
    )
    .await
    .unwrap();

    // The edit snapshot captures v1 with both attachments.
    pipeline
        .edit_article(article.id, "Doc", "<p>v2</p>", Some("bob"))
        .await
        .unwrap();
    let revisions = articles::list_revisions(&wiki.pool, article.id).await.unwrap();
    let snapshot_rev = &revisions[0];
    assert_eq!(snapshot_rev.content, "<p>v1</p>");

    // One of the snapshotted files disappears from storage.
    assert!(wiki.store.remove(&lost.filename));

    let rollback = pipeline
        .rollback_article(article.id, snapshot_rev.id, Some("carol"))
        .await
        .unwrap();

    assert_eq!(rollback.article.content, "<p>v1</p>");
    assert_eq!(rollback.missing_files, 1);

    let attachments = attach::list_attachments(&wiki.pool, article.id).await.unwrap();
    assert_eq!(attachments.len(), 1);
    assert_eq!(attachments[0].filename, kept.filename);
    // Original uploader attribution survives the rebuild.
    assert_eq!(attachments[0].uploaded_by.as_deref(), Some("alice"));
}

#[tokio::test]
async fn rollback_rejects_a_revision_of_another_article() {
    let wiki = setup().await;
    let (_, subsection) = tree(&wiki.pool).await;
    let pipeline = wiki.pipeline();

    let a = pipeline
        .create_article(subsection.id, "A", "<p>a</p>", None)
        .await
        .unwrap();
    let b = pipeline
        .create_article(subsection.id, "B", "<p>b</p>", None)
        .await
        .unwrap();
    let b_rev = articles::list_revisions(&wiki.pool, b.id).await.unwrap()[0].id;

    let err = pipeline.rollback_article(a.id, b_rev, None).await.unwrap_err();
    assert!(matches!(err, WikiError::NotFound { kind: "revision", .. }), "got: {:?}", err);
}

#[tokio::test]
async fn favorites_toggle_and_hide_deleted_articles() {
    let wiki = setup().await;
    let (_, subsection) = tree(&wiki.pool).await;
    let article = wiki
        .pipeline()
        .create_article(subsection.id, "Doc", "<p>body</p>", None)
        .await
        .unwrap();

    assert!(articles::toggle_favorite(&wiki.pool, "alice", article.id).await.unwrap());
    assert_eq!(articles::list_favorites(&wiki.pool, "alice").await.unwrap().len(), 1);

    lifecycle::soft_delete_article(&wiki.pool, article.id, None).await.unwrap();
    assert!(articles::list_favorites(&wiki.pool, "alice").await.unwrap().is_empty());

    lifecycle::restore_article(&wiki.pool, &wiki.cfg.chunking, article.id, None)
        .await
        .unwrap();
    assert_eq!(articles::list_favorites(&wiki.pool, "alice").await.unwrap().len(), 1);

    assert!(!articles::toggle_favorite(&wiki.pool, "alice", article.id).await.unwrap());
    assert!(articles::list_favorites(&wiki.pool, "alice").await.unwrap().is_empty());
}

#[tokio::test]
async fn search_matches_title_and_content_of_active_articles() {
    let wiki = setup().await;
    let (_, subsection) = tree(&wiki.pool).await;
    let pipeline = wiki.pipeline();

    let by_title = pipeline
        .create_article(subsection.id, "Kubernetes upgrade", "<p>notes</p>", None)
        .await
        .unwrap();
    let by_content = pipeline
        .create_article(subsection.id, "Misc", "<p>kubernetes tips</p>", None)
        .await
        .unwrap();
    pipeline
        .create_article(subsection.id, "Unrelated", "<p>nothing here</p>", None)
        .await
        .unwrap();

    let hits = articles::search_articles(&wiki.pool, "kubernetes").await.unwrap();
    let ids: Vec<i64> = hits.iter().map(|a| a.id).collect();
    assert!(ids.contains(&by_title.id) && ids.contains(&by_content.id));
    assert_eq!(ids.len(), 2);

    lifecycle::soft_delete_article(&wiki.pool, by_title.id, None).await.unwrap();
    let hits = articles::search_articles(&wiki.pool, "kubernetes").await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, by_content.id);
}

#[tokio::test]
async fn upload_rejects_non_media_types() {
    let wiki = setup().await;
    let err = attach::save_upload(
        &wiki.pool,
        &wiki.store,
        None,
        b"#!/bin/sh",
        "application/x-sh",
        "run.sh",
        None,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, WikiError::Validation(_)), "got: {:?}", err);
}

#[tokio::test]
async fn upload_admits_generic_declared_type_with_media_filename() {
    let wiki = setup().await;
    let upload = attach::save_upload(
        &wiki.pool,
        &wiki.store,
        None,
        b"fake",
        "application/octet-stream",
        "photo.png",
        None,
    )
    .await
    .unwrap();
    assert_eq!(upload.mime_type, "image/png");
    assert!(upload.filename.ends_with(".png"), "got: {}", upload.filename);
    assert!(wiki.store.contains(&upload.filename));
}

#[tokio::test]
async fn reconciled_attachment_with_unknown_extension_gets_generic_type() {
    let wiki = setup().await;
    let (_, subsection) = tree(&wiki.pool).await;
    let article = wiki
        .pipeline()
        .create_article(
            subsection.id,
            "Doc",
            r#"<p>see <a href="/media/archive.zzz">file</a></p>"#,
            None,
        )
        .await
        .unwrap();

    let attachments = attach::list_attachments(&wiki.pool, article.id).await.unwrap();
    assert_eq!(attachments.len(), 1);
    assert_eq!(attachments[0].filename, "archive.zzz");
    assert_eq!(
        attachments[0].mime_type.as_deref(),
        Some("application/octet-stream")
    );
}

#[tokio::test]
async fn export_covers_only_fully_active_articles() {
    let wiki = setup().await;
    let (section, subsection) = tree(&wiki.pool).await;
    let article = wiki
        .pipeline()
        .create_article(subsection.id, "Doc", "<p>exported body</p>", Some("alice"))
        .await
        .unwrap();

    let chunks = export::chunk_records(&wiki.pool).await.unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].article_title, "Doc");
    assert_eq!(chunks[0].section_id, section.id);
    assert_eq!(chunks[0].section_title, "Engineering");
    assert_eq!(chunks[0].subsection_id, subsection.id);
    assert_eq!(chunks[0].last_editor.as_deref(), Some("alice"));
    assert_eq!(
        chunks[0].path,
        format!("/sections/{}/subsections/{}/articles/{}", section.id, subsection.id, article.id)
    );
    assert!(chunks[0].created_at.starts_with("20"), "got: {}", chunks[0].created_at);
    assert!(chunks[0].updated_at.starts_with("20"), "got: {}", chunks[0].updated_at);

    let records = export::article_records(&wiki.pool).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].html, "<p>exported body</p>");
    assert_eq!(records[0].text, "exported body");
    assert_eq!(records[0].author.as_deref(), Some("alice"));
    assert_eq!(records[0].section_id, section.id);
    assert_eq!(records[0].subsection_id, subsection.id);

    // Deleting the section removes the whole subtree from the feeds.
    lifecycle::soft_delete_section(&wiki.pool, section.id, None).await.unwrap();
    assert!(export::chunk_records(&wiki.pool).await.unwrap().is_empty());
    assert!(export::article_records(&wiki.pool).await.unwrap().is_empty());
}

#[tokio::test]
async fn chunk_indices_stay_dense_across_edits() {
    let wiki = setup().await;
    let (_, subsection) = tree(&wiki.pool).await;
    let pipeline = wiki.pipeline();

    // Long content: several paragraphs against the 100-char test size.
    let long: String = (0..8)
        .map(|i| format!("<p>paragraph number {} with some longer padding text</p>", i))
        .collect();
    let article = pipeline
        .create_article(subsection.id, "Doc", &long, None)
        .await
        .unwrap();
    pipeline
        .edit_article(article.id, "Doc", "<p>short now</p>", None)
        .await
        .unwrap();

    let indices: Vec<i64> =
        sqlx::query_scalar("SELECT chunk_index FROM chunks WHERE article_id = ? ORDER BY chunk_index")
            .bind(article.id)
            .fetch_all(&wiki.pool)
            .await
            .unwrap();
    let expected: Vec<i64> = (0..indices.len() as i64).collect();
    assert_eq!(indices, expected);
    assert_eq!(indices.len(), 1);
}

#[tokio::test]
async fn create_under_deleted_subsection_is_rejected() {
    let wiki = setup().await;
    let (_, subsection) = tree(&wiki.pool).await;
    lifecycle::soft_delete_subsection(&wiki.pool, subsection.id, None).await.unwrap();

    let err = wiki
        .pipeline()
        .create_article(subsection.id, "Doc", "<p>x</p>", None)
        .await
        .unwrap_err();
    assert!(matches!(err, WikiError::Precondition(_)), "got: {:?}", err);
}

#[tokio::test]
async fn titles_are_required() {
    let wiki = setup().await;
    let err = sections::create_section(&wiki.pool, "   ", "", None).await.unwrap_err();
    assert!(matches!(err, WikiError::Validation(_)));

    let (_, subsection) = tree(&wiki.pool).await;
    let err = wiki
        .pipeline()
        .create_article(subsection.id, "", "<p>x</p>", None)
        .await
        .unwrap_err();
    assert!(matches!(err, WikiError::Validation(_)));
}
