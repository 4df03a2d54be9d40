//! Core types for session-dl

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

/// Caller-supplied identifier for one download attempt
///
/// Sessions are tracked independently in the progress store; the identifier
/// is opaque to this crate and typically minted by the bot that polls the
/// store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Create a new SessionId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session status
///
/// Moves only forward along
/// `initializing → starting → downloading* → (completed | error)`.
/// The running job stops writing once a terminal status has been recorded;
/// the store itself stays merge-only so a later job may reuse an identifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Pre-flight checks are running
    #[default]
    Initializing,
    /// The downloader process is being started (or has announced its destination)
    Starting,
    /// Progress lines are being observed
    Downloading,
    /// The downloader finished successfully
    Completed,
    /// The session failed; the record carries a non-empty error string
    Error,
}

impl Status {
    /// Whether this status ends the session (no further writes from the same job)
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Error)
    }
}

/// Structured snapshot of one session's download state
///
/// Exactly the per-session value stored in the shared progress document.
/// Sizes, speed, ETA and elapsed time are kept as the human-readable strings
/// the downloader printed (e.g. `"1.40GiB"`, `"3.2MiB/s"`, `"00:12"`); the
/// bot renders them verbatim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Current session status
    pub status: Status,
    /// Percent complete, 0–100
    pub progress: f64,
    /// Destination filename, empty until announced
    #[serde(default)]
    pub filename: String,
    /// Error message, empty when none
    #[serde(default)]
    pub error: String,
    /// Total size as printed by the downloader
    #[serde(default)]
    pub total_size: String,
    /// Bytes downloaded so far, as printed by the downloader
    #[serde(default)]
    pub downloaded_size: String,
    /// Current rate as printed by the downloader
    #[serde(default)]
    pub speed: String,
    /// Estimated time remaining, `HH:MM:SS` or `MM:SS`
    #[serde(default)]
    pub eta: String,
    /// Wall-clock time since the job started, `HH:MM:SS` or `MM:SS`
    #[serde(default)]
    pub time_elapsed: String,
    /// Unix time of the last write, in seconds
    pub timestamp: f64,
}

impl Default for SessionRecord {
    fn default() -> Self {
        Self {
            status: Status::Initializing,
            progress: 0.0,
            filename: String::new(),
            error: String::new(),
            total_size: String::new(),
            downloaded_size: String::new(),
            speed: String::new(),
            eta: String::new(),
            time_elapsed: String::new(),
            timestamp: 0.0,
        }
    }
}

impl SessionRecord {
    /// Merge an update into this record and stamp it with `timestamp`.
    ///
    /// Fields the update does not carry keep their stored values, so a
    /// filename announced early survives the progress writes that follow.
    pub fn apply(&mut self, update: &ProgressUpdate, timestamp: f64) {
        self.status = update.status;
        if let Some(progress) = update.progress {
            self.progress = progress;
        }
        if let Some(filename) = &update.filename {
            self.filename = filename.clone();
        }
        if let Some(error) = &update.error {
            self.error = error.clone();
        }
        if let Some(total_size) = &update.total_size {
            self.total_size = total_size.clone();
        }
        if let Some(downloaded_size) = &update.downloaded_size {
            self.downloaded_size = downloaded_size.clone();
        }
        if let Some(speed) = &update.speed {
            self.speed = speed.clone();
        }
        if let Some(eta) = &update.eta {
            self.eta = eta.clone();
        }
        if let Some(time_elapsed) = &update.time_elapsed {
            self.time_elapsed = time_elapsed.clone();
        }
        self.timestamp = timestamp;
    }
}

/// One field-level progress update, produced by the line classifier or the
/// session job itself
///
/// `None` fields are left untouched when the update is merged into a
/// [`SessionRecord`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProgressUpdate {
    /// New session status
    pub status: Status,
    /// Percent complete, 0–100
    pub progress: Option<f64>,
    /// Destination filename
    pub filename: Option<String>,
    /// Error message
    pub error: Option<String>,
    /// Total size string
    pub total_size: Option<String>,
    /// Downloaded-so-far string
    pub downloaded_size: Option<String>,
    /// Rate string
    pub speed: Option<String>,
    /// ETA string
    pub eta: Option<String>,
    /// Elapsed wall-clock string
    pub time_elapsed: Option<String>,
}

impl ProgressUpdate {
    /// A bare status change with no other fields
    pub fn status(status: Status) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// A `starting` update announcing the destination filename
    pub fn starting(filename: impl Into<String>) -> Self {
        Self {
            status: Status::Starting,
            filename: Some(filename.into()),
            ..Self::default()
        }
    }

    /// A terminal `completed` update: progress 100, ETA zeroed
    pub fn completed(time_elapsed: impl Into<String>) -> Self {
        Self {
            status: Status::Completed,
            progress: Some(100.0),
            eta: Some("00:00".to_string()),
            time_elapsed: Some(time_elapsed.into()),
            ..Self::default()
        }
    }

    /// A terminal `error` update carrying the failure message
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// One download to run: URL, target directory, optional session identifier
///
/// Ephemeral; lives only for the duration of one
/// [`SessionJob`](crate::session::SessionJob) invocation.
#[derive(Clone, Debug)]
pub struct DownloadRequest {
    /// The URL handed to the external downloader
    pub url: Url,
    /// Directory the downloader writes into (created if absent)
    pub download_dir: PathBuf,
    /// Session identifier for progress tracking; `None` disables tracking
    pub session: Option<SessionId>,
}

impl DownloadRequest {
    /// Create a request with no session tracking
    pub fn new(url: Url, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            url,
            download_dir: download_dir.into(),
            session: None,
        }
    }

    /// Attach a session identifier so pollers can observe progress
    #[must_use]
    pub fn with_session(mut self, session: impl Into<SessionId>) -> Self {
        self.session = Some(session.into());
        self
    }
}

/// The file a successful session produced, identified by filesystem
/// reconciliation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Base filename of the artifact
    pub filename: String,
    /// Human-readable size (e.g. `"1.5 MB"`), `"Unknown"` when it could not
    /// be determined
    pub size: String,
    /// Absolute path to the artifact (the directory itself for the
    /// placeholder result)
    pub path: PathBuf,
}
