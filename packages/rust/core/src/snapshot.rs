//! Unpacking of repository snapshot archives.
//!
//! The snapshot fallback downloads a whole repository as a zip archive and
//! expands the descriptor inside the unpacked tree. Helpers here deal with
//! the archive itself: writing members to disk safely and finding the root
//! directory the hosting service wraps the tree in.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use pomwatch_shared::{PomwatchError, Result};
use zip::ZipArchive;

/// Unpack a zip snapshot into `dest`.
///
/// Members whose names would resolve outside `dest` are skipped rather than
/// written. Unix permission bits are restored when the archive carries them.
pub(crate) fn unpack_archive(bytes: &[u8], dest: &Path) -> Result<()> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| PomwatchError::parse(format!("invalid snapshot archive: {e}")))?;

    for i in 0..archive.len() {
        let mut member = archive
            .by_index(i)
            .map_err(|e| PomwatchError::parse(format!("unreadable snapshot member {i}: {e}")))?;
        // Names with traversal components resolve to None.
        let Some(target) = member.enclosed_name().map(|p| dest.join(p)) else {
            continue;
        };

        if member.is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| PomwatchError::io(&target, e))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PomwatchError::io(parent, e))?;
        }
        let mut out = std::fs::File::create(&target).map_err(|e| PomwatchError::io(&target, e))?;
        std::io::copy(&mut member, &mut out).map_err(|e| PomwatchError::io(&target, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = member.unix_mode() {
                std::fs::set_permissions(&target, std::fs::Permissions::from_mode(mode))
                    .map_err(|e| PomwatchError::io(&target, e))?;
            }
        }
    }
    Ok(())
}

/// Locate the unpacked tree root under `dir`.
///
/// Snapshot archives wrap the tree in a single directory named after the
/// repository plus a commit id, e.g. `acme-widget-0a1b2c3`. The first
/// directory whose name contains the repository's short name wins, compared
/// case-insensitively.
pub(crate) fn locate_root(dir: &Path, repo_name: &str) -> Result<PathBuf> {
    let needle = repo_name.to_ascii_lowercase();
    let entries = std::fs::read_dir(dir).map_err(|e| PomwatchError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| PomwatchError::io(dir, e))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        if entry
            .file_name()
            .to_string_lossy()
            .to_ascii_lowercase()
            .contains(&needle)
        {
            return Ok(path);
        }
    }
    Err(PomwatchError::validation(format!(
        "no unpacked directory matching {:?} under {}",
        repo_name,
        dir.display()
    )))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
