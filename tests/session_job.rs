//! End-to-end session tests driven by a stub downloader script
//!
//! The stub stands in for yt-dlp: it scans its arguments for the `-P`
//! directory, prints canned output lines, optionally creates a file, and
//! exits with a chosen code. Everything else is the real pipeline: guard,
//! supervisor, parser, store, reconciler.

#![cfg(unix)]
#![allow(clippy::unwrap_used)]

use session_dl::{
    Config, DownloadRequest, Error, JsonFileStore, ProgressStore, SessionId, SessionJob, Status,
};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Write an executable stub downloader into `dir`.
///
/// The preamble binds `$dir` to the argument following `-P`, mirroring how
/// the real downloader receives its output directory.
fn stub_downloader(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-ytdlp");
    let script = format!(
        "#!/bin/sh\n\
         dir=\"\"\n\
         prev=\"\"\n\
         for arg in \"$@\"; do\n\
         \tif [ \"$prev\" = \"-P\" ]; then dir=\"$arg\"; fi\n\
         \tprev=\"$arg\"\n\
         done\n\
         {body}\n"
    );
    fs::write(&path, script).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

struct Harness {
    _root: tempfile::TempDir,
    config: Config,
    store: Arc<JsonFileStore>,
    files_dir: PathBuf,
}

fn harness(stub_body: &str) -> Harness {
    let root = tempfile::tempdir().unwrap();
    let files_dir = root.path().join("files");

    let mut config = Config::default();
    config.tool.binary_path = Some(stub_downloader(root.path(), stub_body));
    config.store.progress_path = root.path().join("progress.json");
    config.download.download_dir = files_dir.clone();
    // The stub is instant; let every observed line through
    config.store.update_interval = Duration::from_secs(0);
    // Keep the guard out of the way unless a test opts back in
    config.download.min_free_gb = 0.0;

    let store = Arc::new(JsonFileStore::new(config.store.progress_path.clone()));
    Harness {
        _root: root,
        config,
        store,
        files_dir,
    }
}

fn request(h: &Harness, session: Option<&str>) -> DownloadRequest {
    let mut request = DownloadRequest::new(
        url::Url::parse("https://example.com/download/episode-3").unwrap(),
        h.files_dir.clone(),
    );
    if let Some(session) = session {
        request = request.with_session(session);
    }
    request
}

fn job(h: &Harness) -> SessionJob {
    SessionJob::new(h.config.clone(), h.store.clone())
}

#[tokio::test]
async fn successful_session_yields_artifact_and_completed_record() {
    let h = harness(
        "echo \"[download] Destination: $dir/Episode 3.mp4\"\n\
         echo \"[download]  42.5% of 1.40GiB at 3.2MiB/s ETA 00:12\"\n\
         printf 'payload-bytes-here' > \"$dir/Episode 3.mp4\"\n\
         echo \"[download] 100% of 1.40GiB\"\n\
         exit 0",
    );

    let artifact = job(&h).run(request(&h, Some("sess-ok"))).await.unwrap();

    assert_eq!(artifact.filename, "Episode 3.mp4");
    assert_eq!(artifact.path, h.files_dir.join("Episode 3.mp4"));
    assert_eq!(artifact.size, "18.0 B");

    let doc = h.store.snapshot().await.unwrap();
    let record = &doc["sess-ok"];
    assert_eq!(record.status, Status::Completed);
    assert_eq!(record.progress, 100.0);
    assert_eq!(record.eta, "00:00");
    assert_eq!(
        record.filename, "Episode 3.mp4",
        "filename from the destination line must survive later merges"
    );
    assert!(record.timestamp > 0.0);
}

#[tokio::test]
async fn failing_downloader_yields_error_outcome_and_record() {
    let h = harness("echo \"ERROR: unsupported URL\"\nexit 1");

    let result = job(&h).run(request(&h, Some("sess-bad"))).await;
    assert!(matches!(result, Err(Error::ProcessFailed { code: 1 })));

    let doc = h.store.snapshot().await.unwrap();
    let record = &doc["sess-bad"];
    assert_eq!(record.status, Status::Error);
    assert_eq!(record.error, "Download failed with code 1");
}

#[tokio::test]
async fn session_without_identifier_is_untracked() {
    let h = harness(
        "printf 'x' > \"$dir/out.bin\"\n\
         echo \"[download] 100% of 1B\"\n\
         exit 0",
    );

    let artifact = job(&h).run(request(&h, None)).await.unwrap();
    assert_eq!(artifact.filename, "out.bin");
    assert!(
        h.store.snapshot().await.unwrap().is_empty(),
        "no session identifier means no store writes"
    );
}

#[tokio::test]
async fn stderr_lines_are_observed_like_stdout() {
    // yt-dlp mixes its channels; the supervisor merges both streams
    let h = harness(
        "echo \"[download] Destination: $dir/from-stderr.mp4\" 1>&2\n\
         printf 'x' > \"$dir/from-stderr.mp4\"\n\
         exit 0",
    );

    job(&h).run(request(&h, Some("sess-err-stream"))).await.unwrap();

    let doc = h.store.snapshot().await.unwrap();
    assert_eq!(doc["sess-err-stream"].filename, "from-stderr.mp4");
}

#[tokio::test]
async fn overwritten_file_falls_back_to_most_recent() {
    // The downloader replaces an existing file: the before/after diff is
    // empty, so reconciliation picks the freshest plain file instead
    let h = harness(
        "printf 'replaced' > \"$dir/existing.mp4\"\n\
         exit 0",
    );
    fs::create_dir_all(&h.files_dir).unwrap();
    fs::write(h.files_dir.join("existing.mp4"), b"old").unwrap();

    let artifact = job(&h).run(request(&h, None)).await.unwrap();
    assert_eq!(artifact.filename, "existing.mp4");
    assert_eq!(artifact.size, "8.0 B");
}

#[tokio::test]
async fn empty_directory_success_yields_placeholder() {
    let h = harness("exit 0");

    let artifact = job(&h).run(request(&h, None)).await.unwrap();
    assert_eq!(artifact.filename, "download_completed");
    assert_eq!(artifact.size, "Unknown");
    assert_eq!(artifact.path, h.files_dir);
}

#[tokio::test]
async fn cancellation_kills_the_downloader_and_records_error() {
    let h = harness("exec sleep 30");
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let result = job(&h)
        .run_with_cancel(request(&h, Some("sess-cancel")), cancel)
        .await;

    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(
        started.elapsed() < Duration::from_secs(10),
        "cancellation must not wait for the stub to finish sleeping"
    );

    let doc = h.store.snapshot().await.unwrap();
    let record = &doc["sess-cancel"];
    assert_eq!(record.status, Status::Error);
    assert_eq!(record.error, "download cancelled");
}

#[tokio::test]
async fn parallel_sessions_keep_separate_records() {
    let h = harness(
        "printf 'x' > \"$dir/a.bin\"\n\
         echo \"[download] 100% of 1B\"\n\
         exit 0",
    );

    let first = job(&h).run(request(&h, Some("sess-a")));
    let second = job(&h).run(request(&h, Some("sess-b")));
    let (first, second) = tokio::join!(first, second);
    first.unwrap();
    second.unwrap();

    let doc = h.store.snapshot().await.unwrap();
    assert_eq!(doc.len(), 2, "concurrent jobs must not lose each other's entries");
    assert_eq!(doc["sess-a"].status, Status::Completed);
    assert_eq!(doc["sess-b"].status, Status::Completed);
}

#[tokio::test]
async fn download_action_emits_one_success_line() {
    let h = harness(
        "printf 'x' > \"$dir/clip.mp4\"\n\
         exit 0",
    );

    let response = session_dl::download_action(
        &h.config,
        "https://example.com/download/episode-3",
        None,
        Some(SessionId::new("sess-api")),
    )
    .await;

    assert!(response.success);
    assert_eq!(response.exit_code(), 0);
    assert_eq!(response.filename.as_deref(), Some("clip.mp4"));

    let line = response.to_json_line().unwrap();
    assert!(!line.contains('\n'));
    assert!(line.contains("\"session_id\":\"sess-api\""));
}

#[tokio::test]
async fn download_action_emits_one_failure_line() {
    let h = harness("exit 7");

    let response = session_dl::download_action(
        &h.config,
        "https://example.com/download/episode-3",
        None,
        Some(SessionId::new("sess-api-fail")),
    )
    .await;

    assert!(!response.success);
    assert_eq!(response.exit_code(), 1);
    assert_eq!(
        response.error.as_deref(),
        Some("Download failed with code 7")
    );

    let doc = h.store.snapshot().await.unwrap();
    assert_eq!(doc["sess-api-fail"].status, Status::Error);
}
