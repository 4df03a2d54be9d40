//! Result types for the surrounding `api download` action
//!
//! The CLI that embeds this core answers every `download` action with
//! exactly one JSON line and a matching exit code. This module supplies that
//! contract: [`DownloadResponse`] is the line's shape, and
//! [`download_action`] folds a whole session into it without ever
//! propagating an error to the caller. The sibling `search`, `episodes` and
//! `qualities` actions are served by the scraping collaborators, not by this
//! crate.

use crate::config::Config;
use crate::error::Result;
use crate::session::SessionJob;
use crate::store::{JsonFileStore, ProgressStore};
use crate::types::{Artifact, DownloadRequest, ProgressUpdate, SessionId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;
use url::Url;

/// The single JSON result line of a `download` action
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DownloadResponse {
    /// Whether the session succeeded
    pub success: bool,
    /// Directory the downloader was pointed at
    pub download_dir: PathBuf,
    /// Artifact filename (success only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Human-readable artifact size (success only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Absolute artifact path (success only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Failure message (failure only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Session identifier the caller supplied, echoed back
    pub session_id: Option<SessionId>,
}

impl DownloadResponse {
    /// Build the success shape from a reconciled artifact
    pub fn success(
        download_dir: impl Into<PathBuf>,
        artifact: Artifact,
        session: Option<SessionId>,
    ) -> Self {
        Self {
            success: true,
            download_dir: download_dir.into(),
            filename: Some(artifact.filename),
            size: Some(artifact.size),
            path: Some(artifact.path),
            error: None,
            session_id: session,
        }
    }

    /// Build the failure shape from a message
    pub fn failure(
        download_dir: impl Into<PathBuf>,
        error: impl Into<String>,
        session: Option<SessionId>,
    ) -> Self {
        Self {
            success: false,
            download_dir: download_dir.into(),
            filename: None,
            size: None,
            path: None,
            error: Some(error.into()),
            session_id: session,
        }
    }

    /// Serialize to the one line the CLI prints
    pub fn to_json_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Process exit code matching this response (0 success, 1 failure)
    pub fn exit_code(&self) -> i32 {
        if self.success { 0 } else { 1 }
    }
}

/// Run one download session and fold the outcome into a [`DownloadResponse`].
///
/// Never fails: every error becomes the failure shape of the response, and a
/// terminal `error` record is left in the progress store when a session
/// identifier was supplied. `download_dir` falls back to the configured
/// default when `None`.
pub async fn download_action(
    config: &Config,
    url: &str,
    download_dir: Option<PathBuf>,
    session: Option<SessionId>,
) -> DownloadResponse {
    let dir = download_dir.unwrap_or_else(|| config.download.download_dir.clone());
    let store: Arc<dyn ProgressStore> =
        Arc::new(JsonFileStore::new(config.store.progress_path.clone()));

    let url = match Url::parse(url) {
        Ok(url) => url,
        Err(e) => {
            let message = format!("invalid download URL: {e}");
            if let Some(session) = &session
                && let Err(e) = store
                    .update(session, ProgressUpdate::failed(message.clone()))
                    .await
            {
                warn!(session = %session, error = %e, "progress write failed");
            }
            return DownloadResponse::failure(dir, message, session);
        }
    };

    let mut request = DownloadRequest::new(url, &dir);
    if let Some(session) = session.clone() {
        request = request.with_session(session);
    }

    let job = SessionJob::new(config.clone(), store);
    match job.run(request).await {
        Ok(artifact) => DownloadResponse::success(dir, artifact, session),
        Err(e) => DownloadResponse::failure(dir, e.to_string(), session),
    }
}
