//! Configuration types for session-dl

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Download target configuration (directory, free-space floor)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Download directory (default: "./downloads")
    ///
    /// Created on demand before the pre-flight free-space check.
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Minimum free space in gigabytes required to start a job (default: 1.0)
    ///
    /// A job fails before spawning the downloader when known free space is
    /// strictly below this floor. Unknown free space (the filesystem query
    /// failed) never fails the job.
    #[serde(default = "default_min_free_gb")]
    pub min_free_gb: f64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            min_free_gb: default_min_free_gb(),
        }
    }
}

/// External downloader configuration (binary path, resilience flags)
///
/// Used as a nested sub-config within [`Config`]. The defaults reproduce the
/// fixed invocation this core was built around:
/// `yt-dlp --extractor-args generic:impersonate --no-mtime --retries 3
/// --fragment-retries 3 --retry-sleep 5 -P <dir> <url>`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Path to the downloader executable (searched on PATH if None)
    #[serde(default)]
    pub binary_path: Option<PathBuf>,

    /// Number of download retries (default: 3)
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Number of fragment retries (default: 3)
    #[serde(default = "default_retries")]
    pub fragment_retries: u32,

    /// Sleep between retries (default: 5 seconds)
    #[serde(default = "default_five_secs", with = "duration_serde")]
    pub retry_sleep: Duration,

    /// Impersonate a generic client via extractor args (default: true)
    #[serde(default = "default_true")]
    pub impersonate_generic: bool,

    /// Preserve the remote file modification time (default: false)
    #[serde(default)]
    pub preserve_mtime: bool,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            binary_path: None,
            retries: default_retries(),
            fragment_retries: default_retries(),
            retry_sleep: default_five_secs(),
            impersonate_generic: true,
            preserve_mtime: false,
        }
    }
}

/// Progress store configuration (document path, write throttle)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path of the shared progress document
    /// (default: `<system temp dir>/download_progress.json`)
    #[serde(default = "default_progress_path")]
    pub progress_path: PathBuf,

    /// Minimum interval between progress-store writes during a stream of
    /// downloader output (default: 5 seconds)
    ///
    /// A 100%-completion line bypasses the throttle and is forwarded
    /// immediately.
    #[serde(default = "default_five_secs", with = "duration_serde")]
    pub update_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            progress_path: default_progress_path(),
            update_interval: default_five_secs(),
        }
    }
}

/// Main configuration for a download session
///
/// Fields are organized into logical sub-configs:
/// - [`download`](DownloadConfig) - target directory, free-space floor
/// - [`tool`](ToolConfig) - downloader binary and resilience flags
/// - [`store`](StoreConfig) - progress document path and write throttle
///
/// All sub-config fields are flattened for serialization, so the JSON/TOML
/// format stays flat (no nesting).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download target settings
    #[serde(flatten)]
    pub download: DownloadConfig,

    /// External downloader settings
    #[serde(flatten)]
    pub tool: ToolConfig,

    /// Progress store settings
    #[serde(flatten)]
    pub store: StoreConfig,
}

impl Config {
    /// Download directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }

    /// Shared progress document path
    pub fn progress_path(&self) -> &PathBuf {
        &self.store.progress_path
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_min_free_gb() -> f64 {
    1.0
}

fn default_retries() -> u32 {
    3
}

fn default_five_secs() -> Duration {
    Duration::from_secs(5)
}

fn default_true() -> bool {
    true
}

fn default_progress_path() -> PathBuf {
    std::env::temp_dir().join("download_progress.json")
}

// Duration serialization helper (seconds as integer)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
