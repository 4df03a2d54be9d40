//! Supervision of the external downloader process
//!
//! Spawns the downloader with its resilience flags, merges stdout and stderr
//! into one line stream, classifies lines into progress updates, and
//! interprets the exit code. Progress forwarding is throttled so a
//! fast-moving stream of output does not hammer the shared document: at
//! most one write per configured interval, except that a 100%-completion
//! line is always forwarded immediately.

use crate::config::ToolConfig;
use crate::error::{Error, Result};
use crate::progress::{classify_line, is_completion_line};
use crate::store::ProgressStore;
use crate::types::DownloadRequest;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One-shot supervisor for the external downloader
pub struct ProcessSupervisor {
    tool: ToolConfig,
    update_interval: Duration,
}

impl ProcessSupervisor {
    /// Create a supervisor from the downloader settings and write throttle
    pub fn new(tool: ToolConfig, update_interval: Duration) -> Self {
        Self {
            tool,
            update_interval,
        }
    }

    /// Resolve the downloader binary: explicit configured path, else PATH
    /// discovery
    fn resolve_binary(&self) -> Result<PathBuf> {
        if let Some(path) = &self.tool.binary_path {
            return Ok(path.clone());
        }
        which::which("yt-dlp").map_err(|e| Error::Spawn(format!("yt-dlp not found: {e}")))
    }

    fn build_command(&self, binary: &Path, request: &DownloadRequest) -> Command {
        let mut cmd = Command::new(binary);
        if self.tool.impersonate_generic {
            cmd.arg("--extractor-args").arg("generic:impersonate");
        }
        if !self.tool.preserve_mtime {
            cmd.arg("--no-mtime");
        }
        cmd.arg("--retries")
            .arg(self.tool.retries.to_string())
            .arg("--fragment-retries")
            .arg(self.tool.fragment_retries.to_string())
            .arg("--retry-sleep")
            .arg(self.tool.retry_sleep.as_secs().to_string())
            .arg("-P")
            .arg(&request.download_dir)
            .arg(request.url.as_str());
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Run the downloader to completion for `request`.
    ///
    /// Lines are read until both output streams end; when the request
    /// carries a session identifier, classified updates are forwarded to
    /// `store` through the throttle. Store failures are logged and
    /// swallowed. `started` anchors the elapsed-time strings in forwarded
    /// updates; triggering `cancel` kills the child and fails with
    /// [`Error::Cancelled`].
    pub async fn run(
        &self,
        request: &DownloadRequest,
        store: &dyn ProgressStore,
        started: Instant,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let binary = self.resolve_binary()?;
        info!(url = %request.url, binary = %binary.display(), "spawning downloader");

        let mut child = self
            .build_command(&binary, request)
            .spawn()
            .map_err(|e| Error::Spawn(e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Stream("downloader stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Stream("downloader stderr was not captured".to_string()))?;

        let (tx, mut rx) = mpsc::channel::<std::io::Result<String>>(64);
        tokio::spawn(pump_lines(stdout, tx.clone()));
        tokio::spawn(pump_lines(stderr, tx));

        let mut throttle = Throttle::new(self.update_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!(url = %request.url, "cancellation requested, killing downloader");
                    let _ = child.kill().await;
                    return Err(Error::Cancelled);
                }
                line = rx.recv() => {
                    match line {
                        Some(Ok(line)) => {
                            self.observe_line(&line, request, store, started, &mut throttle)
                                .await;
                        }
                        Some(Err(e)) => {
                            let _ = child.kill().await;
                            return Err(Error::Stream(e.to_string()));
                        }
                        None => break,
                    }
                }
            }
        }

        let exited = tokio::select! {
            status = child.wait() => Some(status),
            _ = cancel.cancelled() => None,
        };
        let Some(status) = exited else {
            let _ = child.kill().await;
            return Err(Error::Cancelled);
        };
        let status = status.map_err(|e| Error::Stream(e.to_string()))?;

        match status.code() {
            Some(0) => Ok(()),
            Some(code) => Err(Error::ProcessFailed { code }),
            None => Err(Error::ProcessKilled),
        }
    }

    async fn observe_line(
        &self,
        line: &str,
        request: &DownloadRequest,
        store: &dyn ProgressStore,
        started: Instant,
        throttle: &mut Throttle,
    ) {
        debug!(line, "downloader");
        let Some(session) = &request.session else {
            return;
        };
        if !throttle.admit(Instant::now(), line) {
            return;
        }
        if let Some(update) = classify_line(line.trim(), started.elapsed())
            && let Err(e) = store.update(session, update).await
        {
            // Telemetry writes never abort an in-flight download
            warn!(session = %session, error = %e, "progress write failed, continuing");
        }
    }
}

async fn pump_lines<R>(reader: R, tx: mpsc::Sender<std::io::Result<String>>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if tx.send(Ok(line)).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                break;
            }
        }
    }
}

/// Gate limiting how often observed lines reach the parser and store.
///
/// An admitted line consumes the window whether or not it produced an
/// update; a completion line is admitted regardless of the window.
struct Throttle {
    every: Duration,
    last: Option<Instant>,
}

impl Throttle {
    fn new(every: Duration) -> Self {
        Self { every, last: None }
    }

    fn admit(&mut self, now: Instant, line: &str) -> bool {
        let due = self
            .last
            .is_none_or(|last| now.duration_since(last) >= self.every);
        if due || is_completion_line(line) {
            self.last = Some(now);
            return true;
        }
        false
    }
}
