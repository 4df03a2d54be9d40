//! Session orchestration: disk guard, supervised download, reconciliation
//!
//! One [`SessionJob`] is one supervised download. `run` consumes the job, so
//! the supervisor can never be invoked twice for the same session. The order
//! of operations is fixed: the free-space guard runs before any subprocess
//! is spawned, the reconciler runs only after a reported-success exit, and
//! every failure path leaves a terminal `error` record in the store when a
//! session identifier is present.

use crate::config::Config;
use crate::disk;
use crate::error::Result;
use crate::progress::format_clock;
use crate::reconcile;
use crate::store::ProgressStore;
use crate::supervisor::ProcessSupervisor;
use crate::types::{Artifact, DownloadRequest, ProgressUpdate, SessionId, Status};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A single supervised download session
pub struct SessionJob {
    config: Config,
    store: Arc<dyn ProgressStore>,
}

impl SessionJob {
    /// Create a job over the given configuration and progress store
    pub fn new(config: Config, store: Arc<dyn ProgressStore>) -> Self {
        Self { config, store }
    }

    /// Run the session to completion without a cancellation handle
    pub async fn run(self, request: DownloadRequest) -> Result<Artifact> {
        self.run_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Run the session to completion.
    ///
    /// Triggering `cancel` kills the downloader and fails the job with
    /// [`Error::Cancelled`](crate::error::Error::Cancelled). On any failure
    /// a terminal `error` record is written (best-effort) before the error
    /// is returned.
    pub async fn run_with_cancel(
        self,
        request: DownloadRequest,
        cancel: CancellationToken,
    ) -> Result<Artifact> {
        match self.execute(&request, &cancel).await {
            Ok(artifact) => {
                info!(
                    file = %artifact.filename,
                    size = %artifact.size,
                    "download session finished"
                );
                Ok(artifact)
            }
            Err(e) => {
                self.record(
                    request.session.as_ref(),
                    ProgressUpdate::failed(e.to_string()),
                )
                .await;
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        request: &DownloadRequest,
        cancel: &CancellationToken,
    ) -> Result<Artifact> {
        disk::ensure_free_space(&request.download_dir, self.config.download.min_free_gb)?;

        let before = reconcile::snapshot(&request.download_dir);
        self.record(
            request.session.as_ref(),
            ProgressUpdate::status(Status::Initializing),
        )
        .await;

        let started = Instant::now();
        self.record(
            request.session.as_ref(),
            ProgressUpdate::status(Status::Starting),
        )
        .await;

        let supervisor = ProcessSupervisor::new(
            self.config.tool.clone(),
            self.config.store.update_interval,
        );
        supervisor
            .run(request, self.store.as_ref(), started, cancel)
            .await?;

        // The supervisor may already have forwarded the downloader's own
        // 100% line; this write finalizes the record either way.
        self.record(
            request.session.as_ref(),
            ProgressUpdate::completed(format_clock(started.elapsed())),
        )
        .await;

        Ok(reconcile::identify_artifact(&request.download_dir, &before))
    }

    async fn record(&self, session: Option<&SessionId>, update: ProgressUpdate) {
        let Some(session) = session else {
            return;
        };
        if let Err(e) = self.store.update(session, update).await {
            // Telemetry writes never abort or fail a job
            warn!(session = %session, error = %e, "progress write failed, continuing");
        }
    }
}
