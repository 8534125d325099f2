//! Staging namespace for archive bytes.
//!
//! Engines read archives "as if from a file". Before a session opens an
//! archive, its bytes are copied into the engine's private namespace under a
//! fresh [`StagingPath`]; the session removes the copy again when it closes.
//!
//! Two backends are provided:
//!
//! - [`MemoryStaging`]: a map of byte blobs, for engines that read from memory.
//! - [`DirStaging`]: a private temporary directory, for engines that need a
//!   real file path.
//!
//! ```rust
//! use unrar_session::staging::{self, MemoryStaging, StagingArea};
//!
//! let area = MemoryStaging::new();
//! let path = staging::stage(&area, b"Rar!").unwrap();
//! assert!(area.contains(&path));
//!
//! staging::unstage(&area, &path);
//! staging::unstage(&area, &path); // already gone: logged, not an error
//! assert!(!area.contains(&path));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{Error, Result};

/// Maximum length for a staging key (without the leading slash).
const MAX_KEY_LENGTH: usize = 255;

/// Extension appended to generated keys.
const STAGED_EXTENSION: &str = "rar";

/// Process-wide counter backing [`StagingPath::unique`].
static NEXT_STAGING_ID: AtomicU64 = AtomicU64::new(0);

/// Attempts at finding an unused key before giving up.
const MAX_STAGE_ATTEMPTS: usize = 16;

/// A key in the staging namespace, of the form `/<name>`.
///
/// The name is a single segment: it never contains `/` or `\`, is never
/// `.` or `..` and holds no NUL bytes. A staging path therefore cannot
/// address anything outside its namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StagingPath(String);

impl StagingPath {
    /// Creates a staging path from a string, validating it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEntryPath`] if the key is not a single
    /// segment below the namespace root.
    pub fn new(s: &str) -> Result<Self> {
        let name = s
            .strip_prefix('/')
            .ok_or_else(|| Error::InvalidEntryPath(format!("staging path must start with '/': {s:?}")))?;

        if name.is_empty() {
            return Err(Error::InvalidEntryPath("empty staging path".into()));
        }
        if name.len() > MAX_KEY_LENGTH {
            return Err(Error::InvalidEntryPath(format!(
                "staging path exceeds {} bytes",
                MAX_KEY_LENGTH
            )));
        }
        if name.contains(['/', '\\', '\0']) {
            return Err(Error::InvalidEntryPath(format!(
                "staging path must be a single segment: {s:?}"
            )));
        }
        if name == "." || name == ".." {
            return Err(Error::InvalidEntryPath(format!(
                "staging path cannot be '{name}'"
            )));
        }

        Ok(Self(s.to_string()))
    }

    /// Generates a fresh path that no other call in this process returns.
    pub fn unique() -> Self {
        let id = NEXT_STAGING_ID.fetch_add(1, Ordering::Relaxed);
        Self(format!(
            "/staged-{}-{:08}.{}",
            std::process::id(),
            id,
            STAGED_EXTENSION
        ))
    }

    /// Returns the full key, including the leading slash.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the key without the leading slash.
    pub fn name(&self) -> &str {
        &self.0[1..]
    }
}

impl fmt::Display for StagingPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An isolated, byte-addressable namespace an engine reads archives from.
pub trait StagingArea: Send + Sync {
    /// Stores a copy of `bytes` under `path`, replacing any previous blob.
    fn write(&self, path: &StagingPath, bytes: &[u8]) -> io::Result<()>;

    /// Returns the blob stored under `path`.
    fn read(&self, path: &StagingPath) -> io::Result<Arc<[u8]>>;

    /// Removes the blob under `path`.
    ///
    /// Returns an error of kind [`io::ErrorKind::NotFound`] if nothing is
    /// stored there.
    fn remove(&self, path: &StagingPath) -> io::Result<()>;

    /// Returns true if a blob is stored under `path`.
    fn contains(&self, path: &StagingPath) -> bool;

    /// Returns the number of blobs currently staged.
    fn len(&self) -> usize;

    /// Returns true if nothing is staged.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Copies `bytes` into `area` under a fresh unique path.
///
/// The staged copy is fully independent of the caller's buffer.
pub fn stage(area: &dyn StagingArea, bytes: &[u8]) -> io::Result<StagingPath> {
    for _ in 0..MAX_STAGE_ATTEMPTS {
        let path = StagingPath::unique();
        if area.contains(&path) {
            // Something else staged under our key; roll a new one.
            continue;
        }
        area.write(&path, bytes)?;
        log::debug!("staged {} bytes at {}", bytes.len(), path);
        return Ok(path);
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        "could not find an unused staging path",
    ))
}

/// Removes a staged copy.
///
/// Never fails: a path that is already gone is logged at debug level, any
/// other removal failure is logged as a warning.
pub fn unstage(area: &dyn StagingArea, path: &StagingPath) {
    match area.remove(path) {
        Ok(()) => log::debug!("unstaged {}", path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::debug!("staging path {} already removed", path);
        }
        Err(e) => log::warn!("Failed to remove staged archive {}: {}", path, e),
    }
}

/// Acquires a mutex lock, recovering from poisoned state if necessary.
///
/// Every mutex in the crate guards data that is only ever replaced whole,
/// so a panic in another holder cannot leave it half-updated.
pub(crate) fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        log::warn!("mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

/// In-memory staging area.
#[derive(Default)]
pub struct MemoryStaging {
    blobs: Mutex<HashMap<StagingPath, Arc<[u8]>>>,
}

impl MemoryStaging {
    /// Creates an empty staging area.
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Debug for MemoryStaging {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStaging")
            .field("staged", &self.len())
            .finish()
    }
}

impl StagingArea for MemoryStaging {
    fn write(&self, path: &StagingPath, bytes: &[u8]) -> io::Result<()> {
        lock_or_recover(&self.blobs).insert(path.clone(), Arc::from(bytes));
        Ok(())
    }

    fn read(&self, path: &StagingPath) -> io::Result<Arc<[u8]>> {
        lock_or_recover(&self.blobs)
            .get(path)
            .cloned()
            .ok_or_else(|| not_found(path))
    }

    fn remove(&self, path: &StagingPath) -> io::Result<()> {
        lock_or_recover(&self.blobs)
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| not_found(path))
    }

    fn contains(&self, path: &StagingPath) -> bool {
        lock_or_recover(&self.blobs).contains_key(path)
    }

    fn len(&self) -> usize {
        lock_or_recover(&self.blobs).len()
    }
}

/// Staging area backed by a private temporary directory.
///
/// The directory and everything still staged in it are deleted when the
/// area is dropped.
#[derive(Debug)]
pub struct DirStaging {
    root: tempfile::TempDir,
}

impl DirStaging {
    /// Creates a staging directory under the system temporary directory.
    pub fn new() -> io::Result<Self> {
        let root = tempfile::Builder::new()
            .prefix("unrar-stage-")
            .tempdir()?;
        Ok(Self { root })
    }

    /// Creates a staging directory under `parent`.
    pub fn new_in(parent: impl AsRef<Path>) -> io::Result<Self> {
        let root = tempfile::Builder::new()
            .prefix("unrar-stage-")
            .tempdir_in(parent)?;
        Ok(Self { root })
    }

    /// Returns the directory holding staged files.
    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Returns the real file path behind a staging key.
    pub fn resolve(&self, path: &StagingPath) -> PathBuf {
        self.root.path().join(path.name())
    }
}

impl StagingArea for DirStaging {
    fn write(&self, path: &StagingPath, bytes: &[u8]) -> io::Result<()> {
        std::fs::write(self.resolve(path), bytes)
    }

    fn read(&self, path: &StagingPath) -> io::Result<Arc<[u8]>> {
        std::fs::read(self.resolve(path)).map(Arc::from)
    }

    fn remove(&self, path: &StagingPath) -> io::Result<()> {
        std::fs::remove_file(self.resolve(path))
    }

    fn contains(&self, path: &StagingPath) -> bool {
        self.resolve(path).is_file()
    }

    fn len(&self) -> usize {
        std::fs::read_dir(self.root.path())
            .map(|entries| entries.filter_map(|e| e.ok()).count())
            .unwrap_or(0)
    }
}

fn not_found(path: &StagingPath) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("nothing staged at {}", path),
    )
}
