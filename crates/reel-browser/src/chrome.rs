//! Chrome binary discovery.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Known Chrome binary locations, in search priority order.
const KNOWN_PATHS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/opt/homebrew/bin/chromium",
    "/usr/local/bin/chromium",
];

/// Executable names looked up on `PATH` after the known locations.
const PATH_NAMES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];

/// Find a Chrome or Chromium binary.
///
/// Search order:
/// 1. `explicit` (from `--chrome-path`)
/// 2. Known install locations
/// 3. `PATH`
pub fn find_chrome(explicit: Option<&Path>) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH");
    find_chrome_in(explicit, KNOWN_PATHS, path_var.as_deref())
}

fn find_chrome_in(
    explicit: Option<&Path>,
    known: &[&str],
    path_var: Option<&OsStr>,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        if is_executable(path) {
            return Some(path.to_path_buf());
        }
        tracing::warn!(path = %path.display(), "chrome path not executable, searching defaults");
    }

    for candidate in known {
        let path = Path::new(candidate);
        if is_executable(path) {
            tracing::debug!(path = %candidate, "found Chrome binary");
            return Some(path.to_path_buf());
        }
    }

    let path_var = path_var?;
    for dir in std::env::split_paths(path_var) {
        for name in PATH_NAMES {
            let path = dir.join(name);
            if is_executable(&path) {
                tracing::debug!(path = %path.display(), "found Chrome binary on PATH");
                return Some(path);
            }
        }
    }

    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.is_file()
        && path
            .metadata()
            .map(|m| m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
