//! # session-dl
//!
//! Download-session orchestration and progress tracking for bot backends.
//!
//! The crate supervises one external downloader invocation (yt-dlp) per
//! session: it checks free space up front, streams the downloader's output
//! into structured progress records, persists those records in a shared
//! JSON document that another process can poll, and reconciles the target
//! directory afterwards to identify the produced file.
//!
//! ## Design Philosophy
//!
//! - **Single supervised job** - No scheduler, no server; each invocation
//!   runs one download and returns a structured outcome
//! - **Shared progress document** - One JSON object keyed by session
//!   identifier, written with per-write exclusive access so parallel
//!   sessions never clobber each other
//! - **Telemetry is non-fatal** - Progress-store write failures are logged
//!   and swallowed; only the download itself can fail a job
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//!
//! ## Quick Start
//!
//! ```no_run
//! use session_dl::{Config, DownloadRequest, JsonFileStore, SessionJob};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let store = Arc::new(JsonFileStore::new(config.progress_path().clone()));
//!
//!     let request = DownloadRequest::new(
//!         url::Url::parse("https://example.com/download/episode-3")?,
//!         config.download_dir().clone(),
//!     )
//!     .with_session("session-42");
//!
//!     let artifact = SessionJob::new(config, store).run(request).await?;
//!     println!("{} ({})", artifact.filename, artifact.size);
//!     Ok(())
//! }
//! ```
//!
//! While a job runs, any process can poll the progress document at the
//! configured path and read the session's record by identifier.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Result types for the `api download` command surface
pub mod api;
/// Configuration types
pub mod config;
/// Pre-flight free-space checks
pub mod disk;
/// Error types
pub mod error;
/// Downloader output line classification
pub mod progress;
/// Artifact identification after a run
pub mod reconcile;
/// Session orchestration
pub mod session;
/// Shared progress document persistence
pub mod store;
/// External downloader supervision
pub mod supervisor;
/// Core types
pub mod types;

// Re-export commonly used types
pub use api::{DownloadResponse, download_action};
pub use config::{Config, DownloadConfig, StoreConfig, ToolConfig};
pub use error::{Error, Result, StoreError};
pub use session::SessionJob;
pub use store::{JsonFileStore, ProgressDocument, ProgressStore};
pub use supervisor::ProcessSupervisor;
pub use types::{Artifact, DownloadRequest, ProgressUpdate, SessionId, SessionRecord, Status};
