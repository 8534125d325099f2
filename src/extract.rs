//! Entry extraction.
//!
//! [`Session::extract_current`] is the single-entry primitive. On top of it
//! this module provides the [`Entries`] iterator, which drives the full
//! advance/extract/seek loop, and the scoped helpers [`extract_bytes`],
//! [`extract_bytes_async`] and [`list_bytes`], which open, walk and close a
//! session in one call.

use std::borrow::Cow;
use std::fmt;

use crate::cursor::{HeaderRecord, Termination};
use crate::engine::{EngineFault, EngineHandle};
use crate::error::DecryptionFailure;
use crate::password::Password;
use crate::session::{Session, SessionState, decryption_failure};
use crate::{Error, Result};

/// Default cap on a single entry's size (100 MiB).
pub const DEFAULT_MAX_ENTRY_SIZE: u64 = 100 * 1024 * 1024;

/// Number of leading content bytes shown in debug logs.
const PREVIEW_LEN: usize = 10;

/// A file or directory entry, with its content if it was extracted.
#[derive(Clone, PartialEq, Eq)]
pub struct Entry {
    /// Entry name as stored in the archive.
    pub name: String,
    /// Declared unpacked size in bytes.
    pub size: u64,
    /// Whether the entry is a directory.
    pub is_directory: bool,
    /// Whether the entry's payload is encrypted.
    pub is_encrypted: bool,
    /// Extracted bytes. Always `None` for directories.
    pub content: Option<Vec<u8>>,
}

impl Entry {
    fn from_record(record: &HeaderRecord) -> Self {
        Self {
            name: record.name.clone(),
            size: record.size,
            is_directory: record.is_directory,
            is_encrypted: record.is_encrypted,
            content: None,
        }
    }

    /// Content decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> Option<Cow<'_, str>> {
        self.content.as_deref().map(String::from_utf8_lossy)
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("is_directory", &self.is_directory)
            .field("is_encrypted", &self.is_encrypted)
            .field("content_len", &self.content.as_ref().map(Vec::len))
            .finish()
    }
}

/// Options for walking an archive.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Password installed on the session before iterating.
    pub password: Option<Password>,
    /// Whether to extract file content or only list metadata.
    pub read_content: bool,
    /// Entries declaring or producing more bytes fail with
    /// [`Error::ResourceLimitExceeded`]. `None` disables the check.
    pub max_entry_size: Option<u64>,
    /// Fail entries whose content length differs from the declared size.
    pub verify_size: bool,
    /// Abort [`Session::extract_all`] on the first failed entry.
    pub stop_on_error: bool,
    /// Report [`Error::Truncated`] when iteration ends without an
    /// end-of-archive record.
    pub require_end_of_archive: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            password: None,
            read_content: true,
            max_entry_size: Some(DEFAULT_MAX_ENTRY_SIZE),
            verify_size: false,
            stop_on_error: false,
            require_end_of_archive: true,
        }
    }
}

impl ExtractOptions {
    /// Creates options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Options that list entries without extracting content.
    pub fn metadata_only() -> Self {
        Self::default().read_content(false)
    }

    /// Sets the password for encrypted archives.
    pub fn password(mut self, password: impl Into<Password>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets whether content is extracted.
    pub fn read_content(mut self, read: bool) -> Self {
        self.read_content = read;
        self
    }

    /// Sets the per-entry size cap.
    pub fn max_entry_size(mut self, limit: Option<u64>) -> Self {
        self.max_entry_size = limit;
        self
    }

    /// Sets whether content length is checked against the declared size.
    pub fn verify_size(mut self, verify: bool) -> Self {
        self.verify_size = verify;
        self
    }

    /// Sets whether the first failed entry aborts extraction.
    pub fn stop_on_error(mut self, stop: bool) -> Self {
        self.stop_on_error = stop;
        self
    }

    /// Sets whether a missing end-of-archive record is an error.
    pub fn require_end_of_archive(mut self, require: bool) -> Self {
        self.require_end_of_archive = require;
        self
    }
}

/// An entry that could not be extracted.
#[derive(Debug)]
pub struct EntryFailure {
    /// Name of the entry, or empty for archive-level failures.
    pub name: String,
    /// What went wrong.
    pub error: Error,
}

/// Outcome of [`Session::extract_all`].
#[derive(Debug, Default)]
pub struct ExtractResult {
    /// Entries read successfully, in archive order.
    pub entries: Vec<Entry>,
    /// Entries that failed, in archive order.
    pub failures: Vec<EntryFailure>,
    /// How iteration ended.
    pub termination: Option<Termination>,
}

impl ExtractResult {
    /// Returns true if no entry failed.
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of file entries that carry content.
    pub fn files(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_directory).count()
    }

    /// Number of directory entries.
    pub fn directories(&self) -> usize {
        self.entries.iter().filter(|e| e.is_directory).count()
    }

    /// Sum of the extracted content lengths.
    pub fn total_bytes(&self) -> u64 {
        self.entries
            .iter()
            .filter_map(|e| e.content.as_ref())
            .map(|c| c.len() as u64)
            .sum()
    }

    /// Turns the first failure into an error.
    pub fn into_result(mut self) -> Result<Vec<Entry>> {
        if self.failures.is_empty() {
            Ok(self.entries)
        } else {
            Err(self.failures.remove(0).error)
        }
    }
}

impl Session {
    /// Extracts the entry under the cursor into an owned buffer.
    ///
    /// Valid once per FILE record that is not a directory, right after
    /// [`advance`](Session::advance) yielded it. The session password is
    /// installed on the engine for this call only. Empty content is not an
    /// error.
    ///
    /// # Errors
    ///
    /// - [`Error::Decryption`] if the password is missing or wrong
    /// - [`Error::Extraction`] for any other engine failure
    /// - [`Error::InvalidState`] when called out of order
    pub fn extract_current(&mut self) -> Result<Vec<u8>> {
        if self.state != SessionState::Iterating {
            return Err(self.invalid("extract", "no record has been read"));
        }
        let record = match self.cursor.check_extract() {
            Ok(record) => record.clone(),
            Err(reason) => return Err(self.invalid("extract", reason)),
        };
        self.cursor.mark_extracted();

        if record.is_encrypted && self.password.is_empty() {
            return Err(Error::Decryption {
                entry_name: record.name,
                reason: DecryptionFailure::PasswordRequired,
            });
        }

        let Some(archive) = self.archive.as_mut() else {
            return Err(self.invalid("extract", "no archive is open"));
        };
        let outcome = self.engine.with_password(&self.password, || {
            archive.read_file_data().map(<[u8]>::to_vec)
        });

        match outcome {
            Ok(content) => {
                log::debug!(
                    "extracted '{}': {} bytes, starts with [{}]",
                    record.name,
                    content.len(),
                    hex_preview(&content)
                );
                Ok(content)
            }
            Err(fault) => Err(self.classify_fault(&record, fault)),
        }
    }

    fn classify_fault(&self, record: &HeaderRecord, fault: EngineFault) -> Error {
        let reason = decryption_failure(&fault, &self.password).or_else(|| {
            // Engines without a password check report decryption with a
            // wrong key as a data error.
            (record.is_encrypted && fault == EngineFault::BadData).then(|| {
                if self.password.is_empty() {
                    DecryptionFailure::PasswordRequired
                } else {
                    DecryptionFailure::WrongPassword
                }
            })
        });
        match reason {
            Some(reason) => Error::Decryption {
                entry_name: record.name.clone(),
                reason,
            },
            None => Error::Extraction {
                entry_name: record.name.clone(),
                reason: fault.to_string(),
            },
        }
    }

    /// Iterates over the remaining entries.
    ///
    /// Installs `options.password` if set. See [`Entries`].
    pub fn entries<'a>(&'a mut self, options: &'a ExtractOptions) -> Entries<'a> {
        if let Some(password) = &options.password {
            self.set_password(password.clone());
        }
        Entries {
            session: self,
            options,
            needs_seek: false,
            finished: false,
        }
    }

    /// Reads every remaining entry, collecting failures per entry.
    ///
    /// # Errors
    ///
    /// Returns the first error when `options.stop_on_error` is set, and
    /// [`Error::InvalidState`] if the session is not validated or a record
    /// is still under the cursor.
    pub fn extract_all(&mut self, options: &ExtractOptions) -> Result<ExtractResult> {
        if !matches!(self.state, SessionState::Validated | SessionState::Iterating) {
            return Err(self.invalid("extract_all", "the archive has not been validated"));
        }
        if self.cursor.current().is_some() {
            return Err(self.invalid(
                "extract_all",
                "call seek_next() before extracting the remaining entries",
            ));
        }

        let mut result = ExtractResult::default();
        let mut entries = self.entries(options);
        while let Some(item) = entries.next() {
            match item {
                Ok(entry) => result.entries.push(entry),
                Err(error) if options.stop_on_error => return Err(error),
                Err(error) => {
                    let name = entries.last_name().unwrap_or_default().to_string();
                    log::warn!("skipping entry '{}': {}", name, error);
                    result.failures.push(EntryFailure { name, error });
                }
            }
        }
        drop(entries);

        result.termination = self.termination();
        Ok(result)
    }
}

/// Iterator over the entries of a validated [`Session`].
///
/// Calls [`Session::seek_next`] after every record and skips records that
/// are not FILE records. A failed entry is yielded as `Err` and iteration
/// continues with the next record; failures of the cursor itself end the
/// iteration. When iteration stops without an end-of-archive record and
/// [`ExtractOptions::require_end_of_archive`] is set, one final
/// [`Error::Truncated`] is yielded.
///
/// Dropping the iterator early leaves the session between records, ready
/// for a manual [`Session::advance`].
pub struct Entries<'a> {
    session: &'a mut Session,
    options: &'a ExtractOptions,
    needs_seek: bool,
    finished: bool,
}

impl Entries<'_> {
    /// Name of the record most recently read, if it is still current.
    pub fn last_name(&self) -> Option<&str> {
        self.session.cursor.current().map(|r| r.name.as_str())
    }

    fn materialize(&mut self, record: &HeaderRecord) -> Result<Entry> {
        let mut entry = Entry::from_record(record);
        if !self.options.read_content || !record.has_content() {
            return Ok(entry);
        }

        if let Some(limit) = self.options.max_entry_size {
            if record.size > limit {
                return Err(Error::ResourceLimitExceeded(format!(
                    "entry '{}' declares {} bytes, limit is {}",
                    record.name, record.size, limit
                )));
            }
        }

        let content = self.session.extract_current()?;
        let actual = content.len() as u64;

        if let Some(limit) = self.options.max_entry_size {
            if actual > limit {
                return Err(Error::ResourceLimitExceeded(format!(
                    "entry '{}' produced {} bytes, limit is {}",
                    record.name, actual, limit
                )));
            }
        }
        if self.options.verify_size && actual != record.size {
            return Err(Error::SizeMismatch {
                entry_name: record.name.clone(),
                expected: record.size,
                actual,
            });
        }

        entry.content = Some(content);
        Ok(entry)
    }
}

impl Iterator for Entries<'_> {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }
            if self.needs_seek {
                self.needs_seek = false;
                if let Err(e) = self.session.seek_next() {
                    self.finished = true;
                    return Some(Err(e));
                }
            }

            let record = match self.session.advance() {
                Ok(Some(record)) => record,
                Ok(None) => {
                    self.finished = true;
                    if self.options.require_end_of_archive && !self.session.reached_end_of_archive() {
                        return Some(Err(Error::Truncated));
                    }
                    return None;
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            };

            self.needs_seek = true;
            if !record.is_file() {
                log::debug!("skipping {:?} record", record.kind);
                continue;
            }
            return Some(self.materialize(&record));
        }
    }
}

impl Drop for Entries<'_> {
    fn drop(&mut self) {
        if self.needs_seek && !self.finished {
            if let Err(e) = self.session.seek_next() {
                log::debug!("seek after early stop failed: {}", e);
            }
        }
    }
}

/// Extracts every entry of an archive held in memory.
///
/// Opens a session, walks it with `options` and closes it again, whatever
/// the outcome.
///
/// # Errors
///
/// Returns [`Error::Open`] if the engine cannot open the staged bytes and
/// [`Error::InvalidFormat`] if they are not an archive. Per-entry failures
/// land in [`ExtractResult::failures`] unless `options.stop_on_error` is set.
pub fn extract_bytes(
    engine: &EngineHandle,
    bytes: &[u8],
    options: &ExtractOptions,
) -> Result<ExtractResult> {
    let mut session = Session::new(engine);
    if let Some(password) = &options.password {
        session.set_password(password.clone());
    }

    if !session.open(bytes)? {
        return Err(Error::Open {
            path: session
                .staging_path()
                .map(ToString::to_string)
                .unwrap_or_default(),
        });
    }
    if !session.validate()? {
        return Err(Error::InvalidFormat(format!(
            "{} bytes are not a supported archive",
            bytes.len()
        )));
    }

    let result = session.extract_all(options);
    session.close();
    result
}

/// Lists entry metadata without extracting content.
///
/// # Errors
///
/// Same as [`extract_bytes`].
pub fn list_bytes(engine: &EngineHandle, bytes: &[u8], password: Option<Password>) -> Result<ExtractResult> {
    let mut options = ExtractOptions::metadata_only();
    options.password = password;
    extract_bytes(engine, bytes, &options)
}

/// Runs [`extract_bytes`] on tokio's blocking pool.
///
/// # Errors
///
/// Same as [`extract_bytes`]; a panic inside the engine surfaces as
/// [`Error::Extraction`].
pub async fn extract_bytes_async(
    engine: EngineHandle,
    bytes: Vec<u8>,
    options: ExtractOptions,
) -> Result<ExtractResult> {
    tokio::task::spawn_blocking(move || extract_bytes(&engine, &bytes, &options))
        .await
        .map_err(|e| Error::Extraction {
            entry_name: String::new(),
            reason: format!("extraction task failed: {e}"),
        })?
}

fn hex_preview(content: &[u8]) -> String {
    content
        .iter()
        .take(PREVIEW_LEN)
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}
