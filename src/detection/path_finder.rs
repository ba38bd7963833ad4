//! Executable lookup inside explicit directory lists.

use std::path::{Path, PathBuf};

/// Extensions tried after the bare name, in order.
const EXTENSIONS: &[&str] = &["exe", "cmd", "bat"];

/// Find `name` in one of `dirs`, in order.
///
/// Tries the `which` crate over the given directories first, which applies
/// the platform's executable rules. If that finds nothing, checks each
/// directory for the bare name and then `name.exe`, `name.cmd` and
/// `name.bat`, so Windows shims are found on any host.
///
/// Directories that do not exist are skipped.
pub fn find_executable_in<P: AsRef<Path>>(name: &str, dirs: &[P]) -> Option<PathBuf> {
    let existing: Vec<&Path> = dirs
        .iter()
        .map(AsRef::as_ref)
        .filter(|dir| dir.is_dir())
        .collect();
    if existing.is_empty() {
        return None;
    }

    if let Ok(joined) = std::env::join_paths(&existing) {
        if let Ok(path) = which::which_in(name, Some(joined), ".") {
            return Some(path);
        }
    }

    for dir in existing {
        let bare = dir.join(name);
        if bare.is_file() {
            return Some(bare);
        }
        for ext in EXTENSIONS {
            let candidate = dir.join(format!("{name}.{ext}"));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }

    None
}
