//! Classifier for downloader output lines
//!
//! The downloader's free-text output is the genuine external interface of
//! this core: one line goes in together with the elapsed wall-clock time
//! since the job started, and at most one [`ProgressUpdate`] comes out.
//! The classifier is stateless (no multi-line state machine), and a line
//! that matches an outer pattern but fails a sub-extraction simply omits
//! that field rather than erroring.

use crate::types::{ProgressUpdate, Status};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

/// Marker the downloader prints when a file reaches 100%
///
/// Matched by substring, so `[download] 100.0% of ...` intermediate lines do
/// NOT count as completion; they classify as ordinary progress.
const COMPLETION_MARKER: &str = "[download] 100%";

#[allow(clippy::expect_used)]
fn pattern(re: &str) -> Regex {
    Regex::new(re).expect("hard-coded pattern compiles")
}

static PERCENT: LazyLock<Regex> = LazyLock::new(|| pattern(r"(\d+\.?\d*)%"));
static TOTAL_SIZE: LazyLock<Regex> = LazyLock::new(|| pattern(r"of\s+([0-9.]+[KMGT]?iB)"));
static DOWNLOADED: LazyLock<Regex> = LazyLock::new(|| pattern(r"(\d+\.?\d*[KMGT]?iB)\s+of"));
static SPEED: LazyLock<Regex> = LazyLock::new(|| pattern(r"at\s+([0-9.]+[KMGT]?iB/s)"));
static ETA: LazyLock<Regex> = LazyLock::new(|| pattern(r"ETA\s+([0-9:]+)"));
static DESTINATION: LazyLock<Regex> = LazyLock::new(|| pattern(r"\[download\] Destination: (.+)"));

/// Whether a line announces 100% completion
///
/// Completion lines bypass the supervisor's write throttle, so this check is
/// shared between the classifier and the throttle gate.
pub fn is_completion_line(line: &str) -> bool {
    line.contains(COMPLETION_MARKER)
}

/// Classify one line of downloader output.
///
/// Rules, in priority order:
/// 1. a 100%-completion line yields a terminal `completed` update;
/// 2. a progress line (`[download]` plus a percent token) yields a
///    `downloading` update with whatever sizes/speed/ETA could be extracted;
/// 3. a destination announcement yields a `starting` update carrying the
///    base filename;
/// 4. anything else yields nothing.
///
/// `elapsed` is the wall-clock time since the job started and is rendered
/// with [`format_clock`] into the update's `time_elapsed`.
pub fn classify_line(line: &str, elapsed: Duration) -> Option<ProgressUpdate> {
    if is_completion_line(line) {
        return Some(ProgressUpdate::completed(format_clock(elapsed)));
    }

    if line.contains("[download]") && line.contains('%') {
        // The percent token gates the whole rule: without one there is
        // nothing to report.
        let progress: f64 = capture(&PERCENT, line)?.parse().ok()?;
        return Some(ProgressUpdate {
            status: Status::Downloading,
            progress: Some(progress),
            total_size: capture(&TOTAL_SIZE, line),
            downloaded_size: capture(&DOWNLOADED, line),
            speed: capture(&SPEED, line),
            eta: capture(&ETA, line),
            time_elapsed: Some(format_clock(elapsed)),
            ..ProgressUpdate::default()
        });
    }

    if let Some(caps) = DESTINATION.captures(line) {
        let filename = caps
            .get(1)
            .map(|m| m.as_str().trim())
            .and_then(|p| Path::new(p).file_name())
            .map(|n| n.to_string_lossy().into_owned());
        return Some(ProgressUpdate {
            status: Status::Starting,
            filename,
            ..ProgressUpdate::default()
        });
    }

    None
}

fn capture(re: &Regex, line: &str) -> Option<String> {
    re.captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Render elapsed wall-clock time as `HH:MM:SS` when at least an hour has
/// passed, `MM:SS` otherwise
pub fn format_clock(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}
