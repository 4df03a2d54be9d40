//! Pre-flight free-space checks for the download directory
//!
//! The guard runs before the downloader is spawned: the target directory is
//! created if absent, its filesystem is queried, and a job is refused only
//! when free space is *known* to be below the configured floor. A failed
//! query means "unknown", which never fails the job.

use crate::error::{Error, Result};
use std::path::Path;
use tracing::debug;

const BYTES_PER_GB: f64 = (1024u64 * 1024 * 1024) as f64;

/// Get available disk space for a given path
///
/// Uses platform-specific APIs to query filesystem statistics:
/// - Linux/macOS: statvfs
/// - Windows: GetDiskFreeSpaceExW
///
/// # Returns
///
/// The available disk space in bytes, or an I/O error if the check fails.
pub fn available_bytes(path: &Path) -> std::io::Result<u64> {
    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        // SAFETY: c_path is a valid null-terminated C string, stat is zeroed
        // before the call, the return value is checked, and the struct is
        // only read after a successful call.
        unsafe {
            let mut stat: libc::statvfs = std::mem::zeroed();
            if libc::statvfs(c_path.as_ptr(), &mut stat) != 0 {
                return Err(std::io::Error::last_os_error());
            }

            // f_bavail is the block count available to unprivileged users;
            // f_frsize is the fragment size (preferred over f_bsize)
            Ok(stat.f_bavail.saturating_mul(stat.f_frsize))
        }
    }

    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::fileapi::GetDiskFreeSpaceExW;

        let wide_path: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        // SAFETY: wide_path is a valid null-terminated wide string, all
        // output pointers reference valid aligned u64s, the return value is
        // checked, and the outputs are only read after a successful call.
        unsafe {
            let mut free_bytes_available: u64 = 0;
            let mut _total_bytes: u64 = 0;
            let mut _total_free_bytes: u64 = 0;

            if GetDiskFreeSpaceExW(
                wide_path.as_ptr(),
                &mut free_bytes_available as *mut u64 as *mut _,
                &mut _total_bytes as *mut u64 as *mut _,
                &mut _total_free_bytes as *mut u64 as *mut _,
            ) == 0
            {
                return Err(std::io::Error::last_os_error());
            }

            Ok(free_bytes_available)
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "Disk space checking is not supported on this platform",
        ))
    }
}

/// Free space at `path` in gigabytes, or `None` when the query fails
pub fn free_space_gb(path: &Path) -> Option<f64> {
    match available_bytes(path) {
        Ok(bytes) => Some(bytes as f64 / BYTES_PER_GB),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "free-space query failed, treating as unknown");
            None
        }
    }
}

/// Apply the free-space floor policy to a query result.
///
/// Fails iff free space is known and strictly below `floor_gb`; unknown
/// free space passes.
pub fn check_floor(free_gb: Option<f64>, floor_gb: f64) -> Result<()> {
    match free_gb {
        Some(available_gb) if available_gb < floor_gb => {
            Err(Error::InsufficientSpace { available_gb })
        }
        _ => Ok(()),
    }
}

/// Create `dir` if absent, then enforce the free-space floor on it
pub fn ensure_free_space(dir: &Path, floor_gb: f64) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    check_floor(free_space_gb(dir), floor_gb)
}
