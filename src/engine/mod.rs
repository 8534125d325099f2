//! Capability interface of the wrapped extraction engine.
//!
//! The engine is an opaque archive reader, usually reached through a
//! foreign-function boundary. Sessions talk to it only through the two
//! traits in this module:
//!
//! - [`Engine`]: process-wide state (staging namespace, global password,
//!   opening archives).
//! - [`ArchiveHandle`]: one opened archive and the header record under its
//!   read position.
//!
//! The native UnRAR binding lives in [`native`] (feature `native`). Any other
//! engine, including test doubles, plugs in by implementing both traits.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::password::Password;
use crate::staging::{StagingArea, StagingPath, lock_or_recover};

#[cfg(feature = "native")]
#[cfg_attr(docsrs, doc(cfg(feature = "native")))]
pub mod ffi;

#[cfg(feature = "native")]
#[cfg_attr(docsrs, doc(cfg(feature = "native")))]
pub mod native;

/// Kind of the header record under the read position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderKind {
    /// A file or directory entry.
    File,
    /// The explicit end-of-archive marker.
    EndOfArchive,
    /// Any other record (comments, service headers, ...), with its raw type.
    Other(u8),
}

/// Failure reported by the engine itself.
///
/// Sessions translate these into [`crate::Error`] with entry context.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum EngineFault {
    /// The staged path could not be opened.
    #[error("cannot open staged file")]
    Open,
    /// The engine ran out of memory.
    #[error("out of memory")]
    NoMemory,
    /// Payload or header data failed its integrity check.
    #[error("bad data")]
    BadData,
    /// The archive structure is damaged.
    #[error("bad archive")]
    BadArchive,
    /// The stream is not an archive of a format the engine knows.
    #[error("unknown archive format")]
    UnknownFormat,
    /// Reading the staged stream failed.
    #[error("read error")]
    Read,
    /// Encrypted content was reached without a password.
    #[error("missing password")]
    MissingPassword,
    /// The password did not decrypt the content.
    #[error("bad password")]
    BadPassword,
    /// The archive needs a feature the engine does not provide.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// Any other engine status code.
    #[error("engine error code {0}")]
    Other(i32),
}

/// Process-wide extraction engine.
pub trait Engine: Send + Sync {
    /// Returns a short human-readable engine name for logs.
    fn name(&self) -> &str;

    /// Returns the engine's private staging namespace.
    fn staging(&self) -> &dyn StagingArea;

    /// Opens the archive staged under `path`.
    ///
    /// This only opens the stream; [`ArchiveHandle::is_archive`] decides
    /// whether it holds a well-formed archive.
    fn open(&self, path: &StagingPath) -> Result<Box<dyn ArchiveHandle>, EngineFault>;

    /// Sets the engine-global password; the empty string clears it.
    ///
    /// Callers serialize access through [`EngineHandle`], which installs a
    /// session's password only for the duration of one engine call.
    fn set_password(&self, password: &str);
}

/// One opened archive inside the engine.
///
/// Values returned by the header accessors describe the record under the
/// current read position and are only meaningful until the next
/// [`read_header`](Self::read_header) or [`seek_to_next`](Self::seek_to_next).
pub trait ArchiveHandle: Send {
    /// Checks that the opened stream is a well-formed archive.
    ///
    /// Returns `Ok(false)` for corrupt or foreign data. Returns an error
    /// only when the engine needs a password to read encrypted headers.
    fn is_archive(&mut self) -> Result<bool, EngineFault>;

    /// Reads the next header record.
    ///
    /// Returns `Ok(false)` when there are no more records.
    fn read_header(&mut self) -> Result<bool, EngineFault>;

    /// Kind of the current record.
    fn header_kind(&self) -> HeaderKind;

    /// Entry name of the current FILE record.
    fn file_name(&self) -> String;

    /// Declared unpacked size of the current FILE record.
    fn file_size(&self) -> u64;

    /// Whether the current FILE record is a directory.
    fn is_directory(&self) -> bool;

    /// Whether the current FILE record's payload is encrypted.
    fn is_encrypted(&self) -> bool {
        false
    }

    /// Decompresses (and decrypts) the current entry into an engine-owned
    /// buffer.
    ///
    /// The borrow ends at the next call on this handle; callers copy out.
    fn read_file_data(&mut self) -> Result<&[u8], EngineFault>;

    /// Moves the read position past the current entry's payload.
    fn seek_to_next(&mut self) -> Result<(), EngineFault>;
}

/// Shared reference to a ready engine.
///
/// Cloning is cheap; all clones share the engine and its extraction lock.
#[derive(Clone)]
pub struct EngineHandle {
    engine: Arc<dyn Engine>,
    extraction: Arc<Mutex<()>>,
}

impl EngineHandle {
    /// Wraps a ready engine.
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            extraction: Arc::new(Mutex::new(())),
        }
    }

    /// Returns the underlying engine.
    pub fn engine(&self) -> &dyn Engine {
        self.engine.as_ref()
    }

    /// Returns the engine's staging namespace.
    pub fn staging(&self) -> &dyn StagingArea {
        self.engine.staging()
    }

    /// Returns true if both handles refer to the same engine instance.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.extraction, &b.extraction)
    }

    /// Runs `f` with `password` installed as the engine-global password.
    ///
    /// Only one such call runs at a time per engine. The password is cleared
    /// again before the lock is released.
    pub(crate) fn with_password<R>(&self, password: &Password, f: impl FnOnce() -> R) -> R {
        let _guard = lock_or_recover(&self.extraction);
        self.engine.set_password(password.as_str());
        let _reset = ClearPassword(self.engine.as_ref());
        f()
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("engine", &self.engine.name())
            .finish()
    }
}

/// Clears the engine password when dropped, including on unwind.
struct ClearPassword<'a>(&'a dyn Engine);

impl Drop for ClearPassword<'_> {
    fn drop(&mut self) {
        self.0.set_password("");
    }
}
