//! Shared progress document
//!
//! One JSON object at a well-known path maps session identifiers to
//! [`SessionRecord`]s. Any job may merge one entry and any process (the bot,
//! typically) may poll the whole document. A naive read-whole /
//! write-whole pattern loses updates under concurrency, so writes here take
//! per-write exclusive access to the document: an in-process mutex plus a
//! cross-process advisory `flock` on a sidecar lock file, with the document
//! itself replaced atomically via temp-file + rename. Concurrent sessions
//! therefore never clobber each other's entries.
//!
//! Entries are never deleted by this core; removing stale sessions is the
//! caller's concern.

use crate::error::StoreError;
use crate::types::{ProgressUpdate, SessionId, SessionRecord};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::warn;

/// The whole shared document: session identifier → session record
pub type ProgressDocument = BTreeMap<String, SessionRecord>;

/// Keyed progress persistence behind a seam, so tests and embedders can
/// substitute their own backing
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Merge `update` into the record for `session`, creating the record if
    /// absent, and stamp it with the current unix time
    async fn update(
        &self,
        session: &SessionId,
        update: ProgressUpdate,
    ) -> std::result::Result<(), StoreError>;

    /// Return the whole document; a missing file reads as empty
    async fn snapshot(&self) -> std::result::Result<ProgressDocument, StoreError>;
}

/// File-backed [`ProgressStore`] holding the document as pretty-printed JSON
pub struct JsonFileStore {
    path: PathBuf,
    // Serializes writers within this process; flock covers other processes
    write_guard: Arc<Mutex<()>>,
}

impl JsonFileStore {
    /// Create a store over the document at `path`
    ///
    /// Nothing is touched on disk until the first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_guard: Arc::new(Mutex::new(())),
        }
    }

    /// Path of the underlying document
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ProgressStore for JsonFileStore {
    async fn update(
        &self,
        session: &SessionId,
        update: ProgressUpdate,
    ) -> std::result::Result<(), StoreError> {
        let path = self.path.clone();
        let guard = self.write_guard.clone();
        let session = session.as_str().to_string();
        let timestamp = now_unix();
        tokio::task::spawn_blocking(move || {
            let _in_process = guard.lock().unwrap_or_else(|e| e.into_inner());
            write_locked(&path, &session, &update, timestamp)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    async fn snapshot(&self) -> std::result::Result<ProgressDocument, StoreError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_document(&path))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

/// Current unix time in seconds, with sub-second precision
fn now_unix() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

fn write_locked(
    path: &Path,
    session: &str,
    update: &ProgressUpdate,
    timestamp: f64,
) -> std::result::Result<(), StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| StoreError::Open {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let _lock = DocumentLock::acquire(path)?;

    let mut document = load_or_default(path);
    document
        .entry(session.to_string())
        .or_default()
        .apply(update, timestamp);

    persist(path, &document)
}

/// Load the document for a read-modify-write cycle.
///
/// A missing file starts a fresh document; an unreadable or corrupt one is
/// logged and likewise starts fresh rather than wedging every future write.
fn load_or_default(path: &Path) -> ProgressDocument {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return ProgressDocument::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "progress document unreadable, starting fresh");
            return ProgressDocument::new();
        }
    };
    match serde_json::from_str(&raw) {
        Ok(document) => document,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "progress document corrupt, starting fresh");
            ProgressDocument::new()
        }
    }
}

/// Read the document without modifying it.
///
/// Unlike the write path, corruption surfaces as an error here: a poller
/// should know the document is bad instead of silently seeing it empty.
fn read_document(path: &Path) -> std::result::Result<ProgressDocument, StoreError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ProgressDocument::new()),
        Err(e) => {
            return Err(StoreError::Open {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };
    serde_json::from_str(&raw).map_err(StoreError::Corrupt)
}

/// Replace the document atomically: write a sibling temp file, then rename
/// over the target so pollers always see a complete document.
fn persist(path: &Path, document: &ProgressDocument) -> std::result::Result<(), StoreError> {
    let json = serde_json::to_string_pretty(document).map_err(StoreError::Corrupt)?;
    let tmp_path = sibling(path, ".tmp");

    let mut tmp = File::create(&tmp_path).map_err(|e| StoreError::Open {
        path: tmp_path.clone(),
        source: e,
    })?;
    tmp.write_all(json.as_bytes()).map_err(StoreError::Write)?;
    tmp.sync_all().map_err(StoreError::Write)?;
    drop(tmp);

    fs::rename(&tmp_path, path).map_err(StoreError::Write)
}

/// Build a sidecar path next to the document (`download_progress.json` →
/// `download_progress.json.tmp`)
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

/// Advisory cross-process lock over the document.
///
/// The lock lives on a sidecar file that is never renamed, so the locked
/// inode stays stable while the document itself is atomically replaced.
/// Released when the handle drops.
struct DocumentLock {
    _file: File,
}

impl DocumentLock {
    fn acquire(document_path: &Path) -> std::result::Result<Self, StoreError> {
        let lock_path = sibling(document_path, ".lock");
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| StoreError::Open {
                path: lock_path,
                source: e,
            })?;
        lock_exclusive(&file).map_err(StoreError::Lock)?;
        Ok(Self { _file: file })
    }
}

#[cfg(unix)]
fn lock_exclusive(file: &File) -> std::io::Result<()> {
    use std::os::fd::AsRawFd;

    // SAFETY: the fd is valid for the lifetime of `file` and the return
    // value is checked; the lock is released when the fd closes.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
fn lock_exclusive(_file: &File) -> std::io::Result<()> {
    // No advisory locking off unix; the in-process mutex plus atomic rename
    // still keep single-process writers safe.
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Status;

    fn store_in(dir: &tempfile::TempDir) -> JsonFileStore {
        JsonFileStore::new(dir.path().join("progress.json"))
    }

    #[tokio::test]
    async fn update_creates_document_and_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store
            .update(&SessionId::new("s1"), ProgressUpdate::status(Status::Initializing))
            .await
            .unwrap();

        let doc = store.snapshot().await.unwrap();
        assert_eq!(doc.len(), 1);
        let record = &doc["s1"];
        assert_eq!(record.status, Status::Initializing);
        assert!(record.timestamp > 0.0, "every write stamps the record");
    }

    #[tokio::test]
    async fn repeated_writes_to_one_session_keep_one_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let session = SessionId::new("s1");

        store
            .update(&session, ProgressUpdate::starting("a.mp4"))
            .await
            .unwrap();
        store
            .update(
                &session,
                ProgressUpdate {
                    status: Status::Downloading,
                    progress: Some(50.0),
                    ..ProgressUpdate::default()
                },
            )
            .await
            .unwrap();

        let doc = store.snapshot().await.unwrap();
        assert_eq!(doc.len(), 1, "same key must update, not duplicate");
        assert_eq!(doc["s1"].progress, 50.0);
        assert_eq!(doc["s1"].filename, "a.mp4", "merge keeps earlier fields");
    }

    #[tokio::test]
    async fn concurrent_sessions_do_not_lose_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(store_in(&dir));

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let session = SessionId::new(format!("session-{i}"));
                store
                    .update(&session, ProgressUpdate::status(Status::Starting))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let doc = store.snapshot().await.unwrap();
        assert_eq!(doc.len(), 8, "no entry may be clobbered by a racing writer");
    }

    #[tokio::test]
    async fn snapshot_of_missing_document_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.snapshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_document_fails_snapshot_but_not_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        fs::write(&path, "{ not json").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(matches!(
            store.snapshot().await,
            Err(StoreError::Corrupt(_))
        ));

        // The write path starts fresh instead of wedging
        store
            .update(&SessionId::new("s1"), ProgressUpdate::failed("boom"))
            .await
            .unwrap();
        let doc = store.snapshot().await.unwrap();
        assert_eq!(doc.len(), 1);
        assert_eq!(doc["s1"].status, Status::Error);
        assert_eq!(doc["s1"].error, "boom");
    }

    #[tokio::test]
    async fn document_is_pretty_printed_for_external_pollers() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .update(&SessionId::new("s1"), ProgressUpdate::status(Status::Starting))
            .await
            .unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains('\n'), "document should be human-inspectable");
    }
}
