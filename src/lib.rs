//! # QuillWiki
//!
//! The content engine of a small collaborative wiki.
//!
//! QuillWiki manages a three-level content tree (sections, subsections,
//! articles) backed by SQLite, and runs every article save through a fixed
//! ingestion pipeline: sanitize the HTML against allow-lists, pull embedded
//! and remote media into local storage, reconcile attachment rows, snapshot
//! a revision, and rebuild the article's retrieval chunks.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────────────────────┐   ┌──────────┐
//! │  Editor  │──▶│ sanitize ▸ localize ▸ persist │──▶│  SQLite   │
//! │   HTML   │   │ reconcile ▸ snapshot ▸ chunk  │   │ + media/  │
//! └──────────┘   └───────────────────────────────┘   └────┬─────┘
//!                                                         │
//!                                  ┌──────────────────────┤
//!                                  ▼                      ▼
//!                            ┌──────────┐          ┌──────────┐
//!                            │   CLI    │          │  Export   │
//!                            │ (quill)  │          │ NDJSON/JSON│
//!                            └──────────┘          └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`dom`] | Owned HTML tree shared by the pipeline stages |
//! | [`sanitize`] | Allow-list markup sanitizer |
//! | [`media`] | Media storage, data-URI decoding, remote fetch, localization |
//! | [`extract`] | HTML to plain text |
//! | [`chunk`] | Paragraph chunking and chunk rebuild |
//! | [`attach`] | Attachment reconciliation, snapshots, uploads |
//! | [`sections`] | Section and subsection management |
//! | [`articles`] | Article pipeline, revisions, rollback, search, favorites |
//! | [`lifecycle`] | Cascading soft delete, restore, purge |
//! | [`export`] | NDJSON/JSON export feeds |
//! | [`users`] | Credential file cache |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod articles;
pub mod attach;
pub mod chunk;
pub mod config;
pub mod db;
pub mod dom;
pub mod error;
pub mod export;
pub mod extract;
pub mod lifecycle;
pub mod media;
pub mod migrate;
pub mod models;
pub mod sanitize;
pub mod sections;
pub mod users;
