//! Paragraph-boundary text chunker and per-article chunk rebuild.
//!
//! Splits extracted article text into retrieval segments bounded by a
//! configured character size, with a character-tail overlap between
//! consecutive chunks for context continuity. Deterministic for identical
//! input; every emitted chunk is hard-truncated to the size bound.

use sqlx::SqlitePool;

use crate::config::ChunkingConfig;
use crate::error::{WikiError, WikiResult};
use crate::extract::html_to_text;
use crate::models::now_ts;

/// Length of the `\n\n` separator joining paragraphs inside a chunk.
const SEPARATOR_LEN: usize = 2;

/// Split text into chunks of at most `size` characters, overlapping
/// consecutive chunks by the trailing `overlap` characters of the
/// previous one.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut buf: Vec<String> = Vec::new();
    let mut length = 0usize;

    for para in split_paragraphs(text) {
        let para = para.trim();
        if para.is_empty() {
            continue;
        }
        let para_len = para.chars().count();
        let add_len = if buf.is_empty() { 0 } else { SEPARATOR_LEN } + para_len;

        if length + add_len <= size {
            buf.push(para.to_string());
            length += add_len;
        } else {
            if !buf.is_empty() {
                chunks.push(buf.join("\n\n"));
            }
            match chunks.last() {
                Some(prev) if overlap > 0 => {
                    // Seed the next buffer with the previous chunk's tail so
                    // consecutive chunks share context.
                    let tail = char_tail(prev, overlap);
                    length = tail.chars().count() + SEPARATOR_LEN + para_len;
                    buf = vec![tail, para.to_string()];
                }
                _ => {
                    buf = vec![para.to_string()];
                    length = para_len;
                }
            }
        }
    }

    if !buf.is_empty() {
        chunks.push(buf.join("\n\n"));
    }

    chunks
        .into_iter()
        .map(|c| char_truncate(c, size))
        .collect()
}

/// Approximate token count: whitespace-delimited words.
pub fn token_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Paragraphs are separated by one or more blank lines (lines that are
/// empty or whitespace-only).
fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paras = Vec::new();
    let mut current = String::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paras.push(std::mem::take(&mut current));
            }
        } else {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
        }
    }
    if !current.is_empty() {
        paras.push(current);
    }
    paras
}

fn char_tail(s: &str, n: usize) -> String {
    let count = s.chars().count();
    if count <= n {
        return s.to_string();
    }
    s.chars().skip(count - n).collect()
}

fn char_truncate(s: String, n: usize) -> String {
    if s.chars().count() <= n {
        s
    } else {
        s.chars().take(n).collect()
    }
}

/// Replace every chunk of an article with a freshly computed sequence.
///
/// Delete-then-insert inside one transaction; indices are renumbered from 0.
/// Invoked after create, edit, and rollback.
pub async fn rebuild_article_chunks(
    pool: &SqlitePool,
    chunking: &ChunkingConfig,
    article_id: i64,
) -> WikiResult<usize> {
    let content: Option<String> = sqlx::query_scalar("SELECT content FROM articles WHERE id = ?")
        .bind(article_id)
        .fetch_optional(pool)
        .await?;
    let content = content.ok_or_else(|| WikiError::not_found("article", article_id))?;

    let text = html_to_text(&content);
    let parts = chunk_text(&text, chunking.size_chars, chunking.overlap_chars);
    let now = now_ts();

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM chunks WHERE article_id = ?")
        .bind(article_id)
        .execute(&mut *tx)
        .await?;
    for (idx, part) in parts.iter().enumerate() {
        sqlx::query(
            "INSERT INTO chunks (article_id, chunk_index, text, token_count, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(article_id)
        .bind(idx as i64)
        .bind(part)
        .bind(token_count(part) as i64)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    Ok(parts.len())
}

/// Regenerate chunks for every non-deleted article (administrative bulk op).
pub async fn rebuild_all_chunks(pool: &SqlitePool, chunking: &ChunkingConfig) -> WikiResult<u64> {
    let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM articles WHERE is_deleted = 0 ORDER BY id")
        .fetch_all(pool)
        .await?;
    let mut total = 0u64;
    for id in ids {
        total += rebuild_article_chunks(pool, chunking, id).await? as u64;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("", 1200, 200).is_empty());
        assert!(chunk_text("   \n\n  ", 1200, 200).is_empty());
    }

    #[test]
    fn small_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", 1200, 200);
        assert_eq!(chunks, vec!["Hello, world!"]);
    }

    #[test]
    fn paragraphs_under_limit_share_a_chunk() {
        let chunks = chunk_text("first para\n\nsecond para", 1200, 200);
        assert_eq!(chunks, vec!["first para\n\nsecond para"]);
    }

    #[test]
    fn overflow_starts_a_new_chunk_with_overlap() {
        // Paragraphs of 40 chars; size fits two (40 + 2 + 40 = 82).
        let p1 = "a".repeat(40);
        let p2 = "b".repeat(40);
        let p3 = "c".repeat(40);
        let text = format!("{}\n\n{}\n\n{}", p1, p2, p3);
        let chunks = chunk_text(&text, 90, 10);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], format!("{}\n\n{}", p1, p2));
        // Second chunk seeded with the 10-char tail of the first.
        assert_eq!(chunks[1], format!("{}\n\n{}", "b".repeat(10), p3));
    }

    #[test]
    fn no_overlap_when_disabled() {
        let p1 = "a".repeat(40);
        let p2 = "b".repeat(40);
        let text = format!("{}\n\n{}", p1, p2);
        let chunks = chunk_text(&text, 50, 0);
        assert_eq!(chunks, vec![p1, p2]);
    }

    #[test]
    fn every_chunk_respects_the_size_bound() {
        let text = (0..30)
            .map(|i| format!("Paragraph number {} with some padding text.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        for chunk in chunk_text(&text, 100, 20) {
            assert!(chunk.chars().count() <= 100);
        }
    }

    #[test]
    fn oversized_single_paragraph_is_truncated() {
        let text = "x".repeat(500);
        let chunks = chunk_text(&text, 100, 20);
        assert_eq!(chunks, vec!["x".repeat(100)]);
    }

    #[test]
    fn deterministic() {
        let text = "Alpha one two\n\nBeta three four\n\nGamma five six\n\nDelta seven eight";
        let a = chunk_text(text, 30, 8);
        let b = chunk_text(text, 30, 8);
        assert_eq!(a, b);
    }

    #[test]
    fn round_trip_reconstructs_paragraph_sequence() {
        let paras: Vec<String> = (0..12).map(|i| format!("paragraph {} body text", i)).collect();
        let text = paras.join("\n\n");
        let chunks = chunk_text(&text, 60, 15);
        // Every paragraph appears, in order, across the chunk sequence.
        let mut cursor = 0usize;
        for para in &paras {
            let pos = chunks[cursor..]
                .iter()
                .position(|c| c.contains(para.as_str()))
                .map(|offset| cursor + offset);
            let pos = pos.unwrap_or_else(|| panic!("paragraph {:?} lost", para));
            cursor = pos;
        }
    }

    #[test]
    fn token_count_is_word_count() {
        assert_eq!(token_count("one two  three\nfour"), 4);
        assert_eq!(token_count(""), 0);
    }
}
