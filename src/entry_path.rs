//! Entry path type with validation for writing entries to disk.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Maximum length for entry paths (in bytes).
///
/// RAR itself limits names to 2048 characters; this leaves room for
/// multi-byte encodings.
const MAX_PATH_LENGTH: usize = 8192;

/// Windows reserved device names that cannot be used as filenames.
///
/// Rejected on all platforms so that an archive extracted anywhere produces
/// the same tree.
const WINDOWS_RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Checks if a filename is a Windows reserved name, with or without an
/// extension (`CON.txt` is reserved too).
fn is_windows_reserved(name: &str) -> bool {
    let base = match name.find('.') {
        Some(pos) => &name[..pos],
        None => name,
    };
    WINDOWS_RESERVED_NAMES
        .iter()
        .any(|reserved| base.eq_ignore_ascii_case(reserved))
}

/// A validated, relative entry name.
///
/// RAR archives created on Windows store `\` separators, so `EntryPath`
/// normalizes both separators to `/` and then checks that:
/// - the path is not empty and holds no NUL bytes
/// - it is relative (no leading `/`, no `C:` drive prefix)
/// - no segment is empty, `.` or `..`
/// - no segment is a Windows device name
///
/// A single trailing separator, as some archivers write for directories,
/// is dropped.
///
/// # Examples
///
/// ```
/// use unrar_session::EntryPath;
///
/// let path = EntryPath::new("encryption\\encryption.txt").unwrap();
/// assert_eq!(path.as_str(), "encryption/encryption.txt");
///
/// assert!(EntryPath::new("../secret").is_err());
/// assert!(EntryPath::new("C:/Windows/win.ini").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryPath(String);

impl EntryPath {
    /// Normalizes and validates an entry name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PathTraversal`] for absolute paths and `..`
    /// segments, and [`Error::InvalidEntryPath`] for every other violation.
    pub fn new(name: &str) -> Result<Self> {
        if name.contains('\0') {
            return Err(Error::InvalidEntryPath("contains NUL byte".into()));
        }
        if name.len() > MAX_PATH_LENGTH {
            return Err(Error::InvalidEntryPath(format!(
                "path exceeds maximum length of {} bytes",
                MAX_PATH_LENGTH
            )));
        }

        let normalized = name.replace('\\', "/");
        let normalized = normalized.strip_suffix('/').unwrap_or(&normalized);

        if normalized.is_empty() {
            return Err(Error::InvalidEntryPath("empty path".into()));
        }
        if normalized.starts_with('/') || has_drive_prefix(normalized) {
            return Err(Error::PathTraversal {
                path: name.to_string(),
            });
        }

        for segment in normalized.split('/') {
            match segment {
                "" => {
                    return Err(Error::InvalidEntryPath(
                        "empty segment (consecutive separators)".into(),
                    ));
                }
                "." => return Err(Error::InvalidEntryPath("'.' segment not allowed".into())),
                ".." => {
                    return Err(Error::PathTraversal {
                        path: name.to_string(),
                    });
                }
                s if is_windows_reserved(s) => {
                    return Err(Error::InvalidEntryPath(format!(
                        "Windows reserved filename '{}' not allowed",
                        s
                    )));
                }
                _ => {}
            }
        }

        Ok(Self(normalized.to_string()))
    }

    /// Returns the normalized path.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the last segment.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Returns the parent directory, if the path has more than one segment.
    pub fn parent(&self) -> Option<Self> {
        self.0.rfind('/').map(|idx| Self(self.0[..idx].to_string()))
    }

    /// Returns an iterator over the segments.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Joins the path below `root` using the platform separator.
    pub fn to_path(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        path.extend(self.components());
        path
    }
}

impl AsRef<str> for EntryPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
