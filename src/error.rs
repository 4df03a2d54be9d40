//! Error types for session-dl
//!
//! The variants mirror the failure taxonomy of a supervised download
//! session: pre-flight resource checks, subprocess spawn/stream failures,
//! non-zero downloader exits, and progress-store write failures. Store
//! failures are deliberately non-fatal wherever progress is being reported
//! (callers log and continue), while download failures always surface as a
//! structured result at the [`SessionJob`](crate::session::SessionJob)
//! boundary.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for session-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for session-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "download_dir")
        key: Option<String>,
    },

    /// Known free space on the target filesystem is below the configured floor.
    ///
    /// Detected pre-flight, before any subprocess is spawned. Never retried.
    #[error("Low disk space: {available_gb:.2}GB available")]
    InsufficientSpace {
        /// Free space on the target directory's filesystem, in gigabytes
        available_gb: f64,
    },

    /// The external downloader exited with a non-zero code.
    ///
    /// The downloader's own retry flags are the only retry layer; this core
    /// reports the final exit code and stops.
    #[error("Download failed with code {code}")]
    ProcessFailed {
        /// The downloader's exit code
        code: i32,
    },

    /// The external downloader was terminated by a signal before exiting
    #[error("downloader terminated by signal")]
    ProcessKilled,

    /// Failed to start the external downloader process
    #[error("failed to spawn downloader: {0}")]
    Spawn(String),

    /// Failed to read the downloader's output stream
    #[error("failed to read downloader output: {0}")]
    Stream(String),

    /// The job was cancelled via its cancellation handle
    #[error("download cancelled")]
    Cancelled,

    /// Progress store operation failed
    ///
    /// Surfaced only from direct store calls; during a running job these
    /// are logged and swallowed so a transient write failure never aborts
    /// an in-flight download.
    #[error("progress store error: {0}")]
    Store(#[from] StoreError),

    /// The download URL could not be parsed
    #[error("invalid download URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Progress-store errors
///
/// The store is shared telemetry, not the download itself, so callers on the
/// hot path treat every variant as non-fatal.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to open or create the store or its lock file
    #[error("failed to open progress store {path}: {source}")]
    Open {
        /// Path that could not be opened
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Failed to acquire the cross-process document lock
    #[error("failed to lock progress store: {0}")]
    Lock(std::io::Error),

    /// Failed to persist the document
    #[error("failed to write progress store: {0}")]
    Write(std::io::Error),

    /// The document on disk is not valid JSON
    #[error("progress store contains invalid JSON: {0}")]
    Corrupt(serde_json::Error),

    /// The blocking store task was cancelled or panicked
    #[error("progress store task failed: {0}")]
    Task(String),
}
