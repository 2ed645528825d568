//! # QuillWiki CLI (`quill`)
//!
//! Operator commands for the wiki content engine: database initialization,
//! chunk maintenance, export feeds, search, and trash inspection.
//!
//! ## Usage
//!
//! ```bash
//! quill --config ./config/quill.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `quill init` | Create the SQLite database and run schema migrations |
//! | `quill rebuild-chunks` | Regenerate retrieval chunks for all active articles |
//! | `quill rebuild-chunks --article <id>` | Regenerate chunks for one article |
//! | `quill export chunks` | Emit the chunk corpus as NDJSON or JSON |
//! | `quill export articles` | Emit full articles as NDJSON or JSON |
//! | `quill search "<query>"` | Substring search over active articles |
//! | `quill user <login>` | Look up a user in the credential file |
//! | `quill trash` | List everything currently soft-deleted |

use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use quillwiki::{articles, chunk, config, db, export, migrate, sections, users};

/// QuillWiki CLI — operator commands for the wiki content engine.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/quill.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "quill",
    about = "QuillWiki — content engine for a small collaborative wiki",
    version,
    long_about = "QuillWiki manages a three-level content tree backed by SQLite and runs every \
    article save through a fixed pipeline: sanitize, localize media, reconcile attachments, \
    snapshot a revision, rebuild retrieval chunks."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/quill.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. Idempotent —
    /// running it multiple times is safe, and concurrent first runs are
    /// serialized through a lock file next to the database.
    Init,

    /// Regenerate retrieval chunks.
    ///
    /// Re-extracts text and re-chunks either a single article or every
    /// active article. Useful after changing the chunking configuration.
    RebuildChunks {
        /// Rebuild only this article.
        #[arg(long)]
        article: Option<i64>,
    },

    /// Emit export feeds for downstream indexing.
    Export {
        #[command(subcommand)]
        what: ExportWhat,
    },

    /// Case-insensitive substring search over active article titles and content.
    Search {
        /// The search query string.
        query: String,
    },

    /// Look up a user in the credential file.
    User {
        /// Login name, as it appears in the first field of the file.
        login: String,
    },

    /// List soft-deleted sections, subsections, and articles.
    Trash,
}

/// Export subcommands.
#[derive(Subcommand)]
enum ExportWhat {
    /// One record per retrieval chunk, with article and tree context.
    Chunks {
        /// Output format. The JSON array form is capped; NDJSON streams everything.
        #[arg(long, value_enum, default_value_t = ExportFormat::Ndjson)]
        format: ExportFormat,

        /// Write to a file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// One record per active article, with both HTML and extracted text.
    Articles {
        /// Output format. The JSON array form is capped; NDJSON streams everything.
        #[arg(long, value_enum, default_value_t = ExportFormat::Ndjson)]
        format: ExportFormat,

        /// Write to a file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Ndjson,
    Json,
}

fn write_records<T: serde::Serialize>(
    records: &[T],
    format: ExportFormat,
    output: Option<&PathBuf>,
) -> anyhow::Result<()> {
    let mut sink: Box<dyn Write> = match output {
        Some(path) => Box::new(std::fs::File::create(path)?),
        None => Box::new(std::io::stdout().lock()),
    };
    match format {
        ExportFormat::Ndjson => export::write_ndjson(&mut sink, records)?,
        ExportFormat::Json => export::write_json_array(&mut sink, records)?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::RebuildChunks { article } => {
            let pool = db::connect(&cfg).await?;
            match article {
                Some(id) => {
                    let n = chunk::rebuild_article_chunks(&pool, &cfg.chunking, id).await?;
                    println!("Rebuilt {} chunks for article {}.", n, id);
                }
                None => {
                    let n = chunk::rebuild_all_chunks(&pool, &cfg.chunking).await?;
                    println!("Rebuilt {} chunks.", n);
                }
            }
        }
        Commands::Export { what } => {
            let pool = db::connect(&cfg).await?;
            match what {
                ExportWhat::Chunks { format, output } => {
                    let records = export::chunk_records(&pool).await?;
                    write_records(&records, format, output.as_ref())?;
                }
                ExportWhat::Articles { format, output } => {
                    let records = export::article_records(&pool).await?;
                    write_records(&records, format, output.as_ref())?;
                }
            }
        }
        Commands::Search { query } => {
            let pool = db::connect(&cfg).await?;
            let hits = articles::search_articles(&pool, &query).await?;
            if hits.is_empty() {
                println!("No matches.");
            }
            for article in hits {
                println!("[{}] {}", article.id, article.title);
            }
        }
        Commands::User { login } => {
            let mut cache = users::UserCache::new(cfg.auth.users_file.clone());
            match cache.lookup(&login) {
                Some(user) => println!(
                    "{} {} ({}){}",
                    user.first_name,
                    user.last_name,
                    user.login,
                    if user.is_admin { " [admin]" } else { "" }
                ),
                None => println!("No such user."),
            }
        }
        Commands::Trash => {
            let pool = db::connect(&cfg).await?;
            let trash = sections::list_trash(&pool).await?;
            for s in &trash.sections {
                println!("section    [{}] {}", s.id, s.title);
            }
            for ss in &trash.subsections {
                println!("subsection [{}] {}", ss.id, ss.title);
            }
            for a in &trash.articles {
                println!("article    [{}] {}", a.id, a.title);
            }
            if trash.sections.is_empty() && trash.subsections.is_empty() && trash.articles.is_empty()
            {
                println!("Trash is empty.");
            }
        }
    }

    Ok(())
}
