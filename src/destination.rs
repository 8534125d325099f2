//! Writing extracted entries to a directory.
//!
//! Entry names come from untrusted archives, so every name is validated with
//! [`EntryPath`]. Directories are created one component at a time and each
//! existing component must resolve inside the destination before anything
//! below it is created. A symlink sitting at a file target is never followed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::entry_path::EntryPath;
use crate::extract::Entry;
use crate::{Error, Result};

/// What [`write_entries`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// Files written.
    pub files: usize,
    /// Directories created for directory entries.
    pub directories: usize,
    /// File entries without content, left out.
    pub skipped: usize,
    /// Total bytes written.
    pub bytes_written: u64,
    /// Paths written, in entry order.
    pub written: Vec<PathBuf>,
}

/// Writes `entries` below `dest`, creating it if needed.
///
/// Directory entries become directories, file entries with content become
/// files (replacing existing ones), and file entries without content are
/// skipped.
///
/// # Errors
///
/// Returns [`Error::PathTraversal`] or [`Error::InvalidEntryPath`] for an
/// unsafe entry name, before touching the disk for that entry, and
/// [`Error::Io`] if a write fails.
pub fn write_entries(entries: &[Entry], dest: impl AsRef<Path>) -> Result<WriteSummary> {
    let dest = dest.as_ref();
    fs::create_dir_all(dest)?;
    let root = dest.canonicalize()?;

    let mut summary = WriteSummary::default();
    for entry in entries {
        let path = EntryPath::new(&entry.name)?;
        let target = path.to_path(&root);

        if entry.is_directory {
            create_dir_inside(&root, &target, &entry.name)?;
            summary.directories += 1;
            log::debug!("created directory {}", target.display());
            continue;
        }

        let Some(content) = &entry.content else {
            log::debug!("no content for '{}', skipping", entry.name);
            summary.skipped += 1;
            continue;
        };

        if let Some(parent) = target.parent() {
            create_dir_inside(&root, parent, &entry.name)?;
        }
        if is_symlink(&target)? {
            return Err(Error::PathTraversal {
                path: entry.name.clone(),
            });
        }
        fs::write(&target, content)?;
        log::debug!("wrote {} bytes to {}", content.len(), target.display());

        summary.files += 1;
        summary.bytes_written += content.len() as u64;
        summary.written.push(target);
    }
    Ok(summary)
}

/// Creates `dir` below `root` one component at a time.
///
/// Every component that already exists, including symlinks planted by
/// earlier entries or already present in the destination, must resolve
/// below `root` before the next one is created.
fn create_dir_inside(root: &Path, dir: &Path, entry_name: &str) -> Result<()> {
    let traversal = || Error::PathTraversal {
        path: entry_name.to_string(),
    };
    let relative = dir.strip_prefix(root).map_err(|_| traversal())?;

    let mut current = root.to_path_buf();
    for component in relative.components() {
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(_) => {
                if !current.canonicalize()?.starts_with(root) {
                    return Err(traversal());
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => match fs::create_dir(&current) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if !current.canonicalize()?.starts_with(root) {
                        return Err(traversal());
                    }
                }
                Err(e) => return Err(e.into()),
            },
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn is_symlink(path: &Path) -> Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(meta) => Ok(meta.file_type().is_symlink()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
