//! Filesystem reconciliation: identify the artifact a download produced
//!
//! The downloader names its own output, so the only reliable way to find the
//! produced file is to snapshot the target directory before the run and diff
//! it afterwards. When the diff is empty (the downloader overwrote an
//! existing file, say) the most recently modified plain file stands in, and
//! when even that fails the caller gets a generic placeholder; a
//! reconciliation miss never fails a job that already downloaded
//! successfully.

use crate::types::Artifact;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

const SIZE_UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// Non-recursive filename snapshot of `dir`
///
/// A missing or unreadable directory reads as empty.
pub fn snapshot(dir: &Path) -> HashSet<String> {
    let mut names = HashSet::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            names.insert(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names
}

/// Identify the artifact of a finished run, given the pre-run snapshot.
///
/// Selection order:
/// 1. any filename present now but not in `before`; when several appeared,
///    the pick among them is arbitrary (no ordering is defined);
/// 2. otherwise the most recently modified plain file in the directory;
/// 3. otherwise a placeholder (`download_completed`, size `Unknown`, path =
///    the directory itself).
pub fn identify_artifact(dir: &Path, before: &HashSet<String>) -> Artifact {
    let after = snapshot(dir);

    if let Some(name) = after.difference(before).next() {
        let path = dir.join(name);
        return Artifact {
            filename: name.clone(),
            size: file_size(&path),
            path,
        };
    }

    if let Some((filename, path)) = latest_file(dir) {
        debug!(dir = %dir.display(), file = %filename, "no new file, falling back to most recent");
        return Artifact {
            filename,
            size: file_size(&path),
            path,
        };
    }

    Artifact {
        filename: "download_completed".to_string(),
        size: "Unknown".to_string(),
        path: dir.to_path_buf(),
    }
}

/// Most recently modified plain file in `dir` (non-recursive)
fn latest_file(dir: &Path) -> Option<(String, PathBuf)> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut best: Option<(SystemTime, String, PathBuf)> = None;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };
        if best.as_ref().is_none_or(|(t, _, _)| modified > *t) {
            best = Some((
                modified,
                entry.file_name().to_string_lossy().into_owned(),
                path,
            ));
        }
    }
    best.map(|(_, filename, path)| (filename, path))
}

/// Human-readable size of the file at `path`
///
/// `"Not Found"` when the file does not exist, `"Unknown"` when its metadata
/// cannot be read.
pub fn file_size(path: &Path) -> String {
    if !path.exists() {
        return "Not Found".to_string();
    }
    match std::fs::metadata(path) {
        Ok(meta) => format_size(meta.len()),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "could not stat artifact");
            "Unknown".to_string()
        }
    }
}

/// Format a byte count as `<value> <unit>` with units B/KB/MB/GB.
///
/// The value is rounded to two decimals; whole values keep one decimal
/// (`2.0 KB`). Counts at or beyond the unit list clamp to GB.
///
/// ```
/// use session_dl::reconcile::format_size;
///
/// assert_eq!(format_size(0), "0 B");
/// assert_eq!(format_size(1536), "1.5 KB");
/// assert_eq!(format_size(1_572_864), "1.5 MB");
/// ```
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }
    let exponent = ((bytes as f64).log(1024.0).floor() as usize).min(SIZE_UNITS.len() - 1);
    let value = bytes as f64 / 1024f64.powi(exponent as i32);
    let rounded = (value * 100.0).round() / 100.0;
    if rounded.fract() == 0.0 {
        format!("{:.1} {}", rounded, SIZE_UNITS[exponent])
    } else {
        format!("{} {}", rounded, SIZE_UNITS[exponent])
    }
}
