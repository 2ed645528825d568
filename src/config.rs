use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub media: MediaConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MediaConfig {
    /// Flat directory that holds every stored media file.
    pub dir: PathBuf,
    /// URL prefix the files are served under, e.g. `/media`.
    #[serde(default = "default_url_base")]
    pub url_base: String,
    /// Ceiling on a single decoded or downloaded payload, in bytes.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
}

fn default_url_base() -> String {
    "/media".to_string()
}
fn default_max_bytes() -> u64 {
    25 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub size_chars: usize,
    #[serde(default = "default_overlap")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size_chars: default_chunk_size(),
            overlap_chars: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1200
}
fn default_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_total_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            timeout_secs: default_total_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_connect_timeout() -> u64 {
    7
}
fn default_total_timeout() -> u64 {
    30
}
fn default_user_agent() -> String {
    "QuillWiki/0.3 (+https://quillwiki.local)".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default = "default_users_file")]
    pub users_file: PathBuf,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            users_file: default_users_file(),
        }
    }
}

fn default_users_file() -> PathBuf {
    PathBuf::from("/data/user.txt")
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.size_chars == 0 {
        anyhow::bail!("chunking.size_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.size_chars {
        anyhow::bail!("chunking.overlap_chars must be < chunking.size_chars");
    }
    if config.media.max_bytes == 0 {
        anyhow::bail!("media.max_bytes must be > 0");
    }
    if config.media.url_base.is_empty() || !config.media.url_base.starts_with('/') {
        anyhow::bail!("media.url_base must be a non-empty absolute path like /media");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let chunking = ChunkingConfig::default();
        assert_eq!(chunking.size_chars, 1200);
        assert_eq!(chunking.overlap_chars, 200);

        let fetch = FetchConfig::default();
        assert_eq!(fetch.connect_timeout_secs, 7);
        assert_eq!(fetch.timeout_secs, 30);
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        let toml_src = r#"
[db]
path = "/tmp/wiki.sqlite"

[media]
dir = "/tmp/media"

[chunking]
size_chars = 100
overlap_chars = 100
"#;
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), toml_src).unwrap();
        assert!(load_config(tmp.path()).is_err());
    }
}
