//! Attachment bookkeeping.
//!
//! Attachment rows are derived metadata: the authoritative reference is the
//! article HTML pointing at locally stored media. After every content save
//! the rows are reconciled against the HTML so that files which arrived via
//! paste-localization (not an explicit upload) still get a row.

use sqlx::SqlitePool;
use tracing::debug;

use crate::dom::{self, Node};
use crate::error::{WikiError, WikiResult};
use crate::media::{is_allowed_media_mime, MediaError, MediaStore, StoredFile};
use crate::models::{now_ts, Attachment, AttachmentSnapshot};

/// Locally served media filenames referenced by `src` or `href` in the HTML,
/// in document order, deduplicated.
pub fn referenced_filenames(html: &str, store: &MediaStore) -> Vec<String> {
    let prefix = format!("{}/", store.url_base());
    let nodes = dom::parse(html);
    let mut seen: Vec<String> = Vec::new();
    collect_refs(&nodes, &prefix, &mut seen);
    seen
}

fn collect_refs(nodes: &[Node], prefix: &str, out: &mut Vec<String>) {
    for node in nodes {
        let Node::Element(el) = node else { continue };
        for key in ["src", "href"] {
            if let Some(value) = el.attr(key) {
                if let Some(rest) = value.strip_prefix(prefix) {
                    let name = rest.split(['?', '#']).next().unwrap_or(rest);
                    if !name.is_empty() && !out.iter().any(|n| n == name) {
                        out.push(name.to_string());
                    }
                }
            }
        }
        collect_refs(&el.children, prefix, out);
    }
}

/// Insert attachment rows for media the article HTML references but no row
/// records yet. Existing rows are never touched, so original uploader
/// attribution survives later edits by other users.
pub async fn reconcile_attachments(
    pool: &SqlitePool,
    store: &MediaStore,
    article_id: i64,
    html: &str,
    actor: Option<&str>,
) -> WikiResult<usize> {
    let mut added = 0usize;
    for filename in referenced_filenames(html, store) {
        let exists: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM attachments WHERE article_id = ? AND filename = ?",
        )
        .bind(article_id)
        .bind(&filename)
        .fetch_optional(pool)
        .await?;
        if exists.is_some() {
            continue;
        }
        let mime = mime_guess::from_path(&filename)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string();
        sqlx::query(
            "INSERT INTO attachments (article_id, filename, mime_type, uploaded_at, uploaded_by) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(article_id)
        .bind(&filename)
        .bind(&mime)
        .bind(now_ts())
        .bind(actor)
        .execute(pool)
        .await?;
        added += 1;
    }
    if added > 0 {
        debug!(article_id, added, "reconciled attachments from content");
    }
    Ok(added)
}

pub async fn list_attachments(pool: &SqlitePool, article_id: i64) -> WikiResult<Vec<Attachment>> {
    let rows = sqlx::query("SELECT * FROM attachments WHERE article_id = ? ORDER BY id")
        .bind(article_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(Attachment::from_row).collect())
}

/// Capture the article's current attachment set as revision-embeddable
/// values.
pub async fn snapshot_attachments(
    pool: &SqlitePool,
    article_id: i64,
) -> WikiResult<Vec<AttachmentSnapshot>> {
    let rows = list_attachments(pool, article_id).await?;
    Ok(rows
        .into_iter()
        .map(|a| AttachmentSnapshot {
            filename: a.filename,
            mime_type: a.mime_type,
            uploaded_by: a.uploaded_by,
            uploaded_at: Some(a.uploaded_at),
        })
        .collect())
}

#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub url: String,
    pub mime_type: String,
}

/// Store an explicitly uploaded file and, when an article is given, link it
/// with an attachment row. Non-media types and oversize payloads are
/// rejected before anything touches disk. Browsers frequently declare
/// `application/octet-stream`, so a filename-based guess is consulted
/// before rejecting.
pub async fn save_upload(
    pool: &SqlitePool,
    store: &MediaStore,
    article_id: Option<i64>,
    data: &[u8],
    mime: &str,
    filename_hint: &str,
    actor: Option<&str>,
) -> WikiResult<Upload> {
    let mime = resolve_upload_mime(mime, filename_hint)?;
    let mime = mime.as_str();
    let StoredFile { filename, url } = store
        .save_bytes(data, mime, filename_hint)
        .map_err(upload_error)?;

    if let Some(article_id) = article_id {
        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM articles WHERE id = ?")
            .bind(article_id)
            .fetch_optional(pool)
            .await?;
        if exists.is_none() {
            return Err(WikiError::not_found("article", article_id));
        }
        sqlx::query(
            "INSERT INTO attachments (article_id, filename, mime_type, uploaded_at, uploaded_by) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(article_id)
        .bind(&filename)
        .bind(mime)
        .bind(now_ts())
        .bind(actor)
        .execute(pool)
        .await?;
    }

    Ok(Upload {
        filename,
        url,
        mime_type: mime.to_string(),
    })
}

/// Declared type wins when it is already media; otherwise fall back to a
/// guess from the filename.
fn resolve_upload_mime(declared: &str, filename_hint: &str) -> WikiResult<String> {
    let declared = declared.trim();
    if is_allowed_media_mime(declared) {
        return Ok(declared.to_ascii_lowercase());
    }
    if let Some(guessed) = mime_guess::from_path(filename_hint).first_raw() {
        if is_allowed_media_mime(guessed) {
            return Ok(guessed.to_ascii_lowercase());
        }
    }
    Err(WikiError::validation(format!(
        "unsupported file type: {}",
        if declared.is_empty() { "unknown" } else { declared }
    )))
}

fn upload_error(e: MediaError) -> WikiError {
    match e {
        MediaError::TooLarge { size, limit } => WikiError::validation(format!(
            "file of {} bytes exceeds the {} byte limit",
            size, limit
        )),
        MediaError::DisallowedType(mime) => {
            WikiError::validation(format!("unsupported file type: {}", mime))
        }
        MediaError::Io(e) => WikiError::Io(e),
        other => WikiError::validation(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MediaConfig;

    fn test_store() -> (tempfile::TempDir, MediaStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = MediaStore::new(&MediaConfig {
            dir: tmp.path().to_path_buf(),
            url_base: "/media".to_string(),
            max_bytes: 1024,
        })
        .unwrap();
        (tmp, store)
    }

    #[test]
    fn collects_local_refs_in_order_without_duplicates() {
        let (_tmp, store) = test_store();
        let html = r#"
            <img src="/media/a.png">
            <a href="/media/b.pdf">doc</a>
            <img src="/media/a.png">
            <img src="https://elsewhere.example/c.png">
            <video src="/media/d.mp4?t=3"></video>
        "#;
        let refs = referenced_filenames(html, &store);
        assert_eq!(refs, vec!["a.png", "b.pdf", "d.mp4"]);
    }

    #[test]
    fn upload_mime_falls_back_to_filename_guess() {
        assert_eq!(
            resolve_upload_mime("application/octet-stream", "photo.png").unwrap(),
            "image/png"
        );
        assert_eq!(resolve_upload_mime("IMAGE/PNG", "whatever.bin").unwrap(), "image/png");
        assert!(resolve_upload_mime("application/octet-stream", "run.sh").is_err());
        assert!(resolve_upload_mime("", "notes.txt").is_err());
    }

    #[test]
    fn ignores_other_prefixes() {
        let (_tmp, store) = test_store();
        let html = r#"<img src="/mediafiles/a.png"><img src="media/b.png">"#;
        assert!(referenced_filenames(html, &store).is_empty());
    }
}
