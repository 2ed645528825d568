//! Media storage and localization.
//!
//! Embedded `data:` URIs and remote `http(s)` media referenced from article
//! HTML are copied into a locally served flat directory and the references
//! rewritten. Localization is best-effort: any failure (network error,
//! disallowed type, oversize payload, malformed URI) leaves the original
//! reference untouched and is logged, never surfaced to the edit.
//!
//! Filenames are random tokens, not content-derived — identical media
//! stored twice occupies two files. That is accepted; there is no
//! deduplication.

use base64::Engine;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::config::{FetchConfig, MediaConfig};
use crate::dom::{self, url_scheme, Element, Node};

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("not a data URI")]
    NotDataUri,

    #[error("disallowed media type: {0}")]
    DisallowedType(String),

    #[error("payload of {size} bytes exceeds the {limit} byte ceiling")]
    TooLarge { size: u64, limit: u64 },

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Known MIME → extension choices, consulted before any guessing.
const EXT_BY_MIME: &[(&str, &str)] = &[
    ("image/jpeg", ".jpg"),
    ("image/jpg", ".jpg"),
    ("image/png", ".png"),
    ("image/gif", ".gif"),
    ("image/webp", ".webp"),
    ("image/svg+xml", ".svg"),
    ("image/bmp", ".bmp"),
    ("image/heic", ".heic"),
    ("video/mp4", ".mp4"),
    ("audio/mpeg", ".mp3"),
    ("audio/mp4", ".m4a"),
    ("audio/aac", ".aac"),
    ("audio/ogg", ".ogg"),
    ("audio/wav", ".wav"),
];

pub fn is_allowed_media_mime(mime: &str) -> bool {
    let mime = mime.to_ascii_lowercase();
    mime.starts_with("image/") || mime.starts_with("video/") || mime.starts_with("audio/")
}

/// Extension for a stored file: MIME table first, then the filename hint,
/// then the MIME registry. May be empty.
pub fn choose_ext(mime: &str, hint: &str) -> String {
    let mime = mime.to_ascii_lowercase();
    if let Some((_, ext)) = EXT_BY_MIME.iter().find(|(m, _)| *m == mime) {
        return ext.to_string();
    }
    if let Some(ext) = Path::new(hint).extension().and_then(|e| e.to_str()) {
        return format!(".{}", ext.to_ascii_lowercase());
    }
    mime_guess::get_mime_extensions_str(&mime)
        .and_then(|exts| exts.first())
        .map(|e| format!(".{}", e))
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct StoredFile {
    pub filename: String,
    pub url: String,
}

/// Flat directory of media files plus the URL prefix they are served under.
#[derive(Debug, Clone)]
pub struct MediaStore {
    dir: PathBuf,
    url_base: String,
    max_bytes: u64,
}

impl MediaStore {
    pub fn new(config: &MediaConfig) -> std::io::Result<Self> {
        std::fs::create_dir_all(&config.dir)?;
        Ok(Self {
            dir: config.dir.clone(),
            url_base: config.url_base.trim_end_matches('/').to_string(),
            max_bytes: config.max_bytes,
        })
    }

    pub fn url_base(&self) -> &str {
        &self.url_base
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Write bytes under a freshly generated unique filename.
    pub fn save_bytes(&self, data: &[u8], mime: &str, hint: &str) -> Result<StoredFile, MediaError> {
        if data.len() as u64 > self.max_bytes {
            return Err(MediaError::TooLarge {
                size: data.len() as u64,
                limit: self.max_bytes,
            });
        }
        let ext = choose_ext(mime, hint);
        let filename = format!("{}{}", Uuid::new_v4().simple(), ext);
        std::fs::write(self.dir.join(&filename), data)?;
        let url = self.url_for(&filename);
        Ok(StoredFile { filename, url })
    }

    pub fn url_for(&self, filename: &str) -> String {
        format!("{}/{}", self.url_base, filename)
    }

    /// On-disk path for a stored filename. Any path components in the
    /// input are discarded so records cannot escape the media directory.
    pub fn file_path(&self, filename: &str) -> PathBuf {
        let base = Path::new(filename)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.dir.join(base)
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.file_path(filename).is_file()
    }

    /// Remove a stored file. Returns whether a file was actually removed;
    /// a missing file is not an error.
    pub fn remove(&self, filename: &str) -> bool {
        let path = self.file_path(filename);
        path.is_file() && std::fs::remove_file(&path).is_ok()
    }
}

/// Decode a `data:<mime>[;base64],<payload>` URI into bytes + MIME type.
pub fn decode_data_uri(uri: &str, max_bytes: u64) -> Result<(Vec<u8>, String), MediaError> {
    let rest = uri.strip_prefix("data:").ok_or(MediaError::NotDataUri)?;
    let (head, payload) = rest
        .split_once(',')
        .ok_or_else(|| MediaError::Decode("data URI has no payload".to_string()))?;

    let mut parts = head.split(';');
    let mime = match parts.next().map(str::trim) {
        Some("") | None => "text/plain".to_string(),
        Some(m) => m.to_ascii_lowercase(),
    };
    let is_base64 = parts.any(|p| p.trim().eq_ignore_ascii_case("base64"));

    if !is_allowed_media_mime(&mime) {
        return Err(MediaError::DisallowedType(mime));
    }

    let raw = if is_base64 {
        let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        base64::engine::general_purpose::STANDARD
            .decode(cleaned)
            .map_err(|e| MediaError::Decode(e.to_string()))?
    } else {
        urlencoding::decode_binary(payload.as_bytes()).into_owned()
    };

    if raw.len() as u64 > max_bytes {
        return Err(MediaError::TooLarge {
            size: raw.len() as u64,
            limit: max_bytes,
        });
    }
    Ok((raw, mime))
}

#[derive(Debug)]
pub struct Download {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub filename_hint: String,
}

/// Bounded HTTP client for pulling remote media into local storage.
#[derive(Debug, Clone)]
pub struct MediaFetcher {
    client: reqwest::Client,
    max_bytes: u64,
}

impl MediaFetcher {
    pub fn new(fetch: &FetchConfig, max_bytes: u64) -> Result<Self, MediaError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(fetch.connect_timeout_secs))
            .timeout(Duration::from_secs(fetch.timeout_secs))
            .user_agent(fetch.user_agent.clone())
            .build()
            .map_err(|e| MediaError::Fetch(e.to_string()))?;
        Ok(Self { client, max_bytes })
    }

    /// Download a remote resource, validating its type and streaming the
    /// body with a running size cap.
    pub async fn download(&self, url: &str) -> Result<Download, MediaError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| MediaError::Fetch(e.to_string()))?;

        let declared = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();

        // Servers omit or mis-state types often enough that the URL's
        // extension is worth consulting as a fallback.
        let mut mime = declared;
        if !is_allowed_media_mime(&mime) {
            if let Some(guessed) = mime_guess::from_path(url_path(url)).first_raw() {
                mime = guessed.to_ascii_lowercase();
            }
        }
        if !is_allowed_media_mime(&mime) {
            return Err(MediaError::DisallowedType(mime));
        }

        let filename_hint = disposition_filename(&resp)
            .unwrap_or_else(|| basename(url_path(url)).to_string());

        let mut bytes: Vec<u8> = Vec::new();
        let mut resp = resp;
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| MediaError::Fetch(e.to_string()))?
        {
            let total = bytes.len() as u64 + chunk.len() as u64;
            if total > self.max_bytes {
                return Err(MediaError::TooLarge {
                    size: total,
                    limit: self.max_bytes,
                });
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(Download {
            bytes,
            mime,
            filename_hint,
        })
    }
}

fn disposition_filename(resp: &reqwest::Response) -> Option<String> {
    let disp = resp
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)?
        .to_str()
        .ok()?;
    let (_, rest) = disp.split_once("filename=")?;
    let name = rest.trim_matches(|c| c == '"' || c == ';' || c == ' ');
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Path portion of an absolute URL, without query or fragment.
fn url_path(url: &str) -> &str {
    let after_scheme = match url.find("://") {
        Some(pos) => &url[pos + 3..],
        None => url,
    };
    let path = match after_scheme.find('/') {
        Some(pos) => &after_scheme[pos..],
        None => "",
    };
    let path = path.split('?').next().unwrap_or(path);
    path.split('#').next().unwrap_or(path)
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or("")
}

/// Rewrite `data:` and remote `http(s)` media references in the HTML to
/// locally stored copies. Already-local references and other protocols
/// (`mailto:`, `blob:`, …) are untouched. Never fails: on any per-item
/// error the original reference stays as-is.
pub async fn localize_media(html: &str, store: &MediaStore, fetcher: &MediaFetcher) -> String {
    if html.trim().is_empty() {
        return String::new();
    }

    let mut nodes = dom::parse(html);

    // First pass: collect candidate URLs in a deterministic walk order.
    let mut candidates: Vec<String> = Vec::new();
    collect_candidates(&nodes, store, &mut candidates);
    if candidates.is_empty() {
        return dom::serialize(&nodes);
    }

    // Each occurrence is resolved independently — duplicate references
    // are stored twice by design.
    let mut resolved: Vec<Option<String>> = Vec::with_capacity(candidates.len());
    for url in &candidates {
        resolved.push(resolve_one(url, store, fetcher).await);
    }

    // Second pass: the same walk order consumes the resolutions.
    let mut iter = resolved.into_iter();
    apply_candidates(&mut nodes, store, &mut iter);

    dom::serialize(&nodes)
}

/// Is this reference something we should try to pull into local storage?
fn is_candidate(value: &str, store: &MediaStore) -> bool {
    let v = value.trim();
    if v.is_empty() || v.starts_with(&format!("{}/", store.url_base())) {
        return false;
    }
    matches!(
        url_scheme(v).as_deref(),
        Some("data") | Some("http") | Some("https")
    )
}

/// First URL of a `srcset` value, if any.
fn srcset_first_url(srcset: &str) -> Option<String> {
    let first = srcset.split(',').next()?.trim();
    let url = first.split_whitespace().next()?;
    if url.is_empty() {
        None
    } else {
        Some(url.to_string())
    }
}

fn collect_candidates(nodes: &[Node], store: &MediaStore, out: &mut Vec<String>) {
    for node in nodes {
        let Node::Element(el) = node else { continue };
        match el.name.as_str() {
            "img" => {
                if let Some(src) = el.attr("src") {
                    if is_candidate(src, store) {
                        out.push(src.trim().to_string());
                    }
                }
                if let Some(url) = el.attr("srcset").and_then(|s| srcset_first_url(s)) {
                    if is_candidate(&url, store) {
                        out.push(url);
                    }
                }
            }
            "video" | "audio" | "source" => {
                if let Some(src) = el.attr("src") {
                    if is_candidate(src, store) {
                        out.push(src.trim().to_string());
                    }
                }
            }
            _ => {}
        }
        collect_candidates(&el.children, store, out);
    }
}

fn apply_candidates(
    nodes: &mut [Node],
    store: &MediaStore,
    resolved: &mut impl Iterator<Item = Option<String>>,
) {
    for node in nodes {
        let Node::Element(el) = node else { continue };
        match el.name.as_str() {
            "img" => {
                apply_src(el, store, resolved);
                let srcset_url = el.attr("srcset").and_then(srcset_first_url);
                if let Some(url) = srcset_url {
                    if is_candidate(&url, store) {
                        if let Some(Some(local)) = resolved.next() {
                            el.set_attr("src", local);
                            el.remove_attr("srcset");
                        }
                    }
                }
            }
            "video" | "audio" | "source" => apply_src(el, store, resolved),
            _ => {}
        }
        apply_candidates(&mut el.children, store, resolved);
    }
}

fn apply_src(
    el: &mut Element,
    store: &MediaStore,
    resolved: &mut impl Iterator<Item = Option<String>>,
) {
    let candidate = el.attr("src").map(|s| is_candidate(s, store)).unwrap_or(false);
    if candidate {
        if let Some(Some(local)) = resolved.next() {
            el.set_attr("src", local);
        }
    }
}

async fn resolve_one(url: &str, store: &MediaStore, fetcher: &MediaFetcher) -> Option<String> {
    let result = if url.starts_with("data:") {
        decode_data_uri(url, store.max_bytes())
            .and_then(|(bytes, mime)| store.save_bytes(&bytes, &mime, ""))
    } else {
        match fetcher.download(url).await {
            Ok(dl) => store.save_bytes(&dl.bytes, &dl.mime, &dl.filename_hint),
            Err(e) => Err(e),
        }
    };
    match result {
        Ok(stored) => Some(stored.url),
        Err(e) => {
            warn!(url, error = %e, "media localization skipped");
            None
        }
    }
}
