//! Archive sessions.
//!
//! A [`Session`] drives one archive through the engine:
//!
//! ```text
//! CREATED --open--> OPENED --validate--> VALIDATED --advance--> ITERATING --close--> CLOSED
//! ```
//!
//! Inside `ITERATING` the caller loops over header records with
//! [`Session::advance`], optionally extracts the current entry, and always
//! moves on with [`Session::seek_next`]. [`Session::close`] may be called
//! from any state and runs automatically on drop, so the staged copy of the
//! archive is removed on every exit path.
//!
//! ```rust,no_run
//! use unrar_session::{Session, loader};
//!
//! # async fn demo(bytes: Vec<u8>) -> unrar_session::Result<()> {
//! let engine = loader::acquire_engine().await?;
//! let mut session = Session::new(&engine);
//! if !session.open(&bytes)? || !session.validate()? {
//!     println!("not a RAR archive");
//!     return Ok(());
//! }
//! while let Some(record) = session.advance()? {
//!     if record.has_content() {
//!         let content = session.extract_current()?;
//!         println!("{}: {} bytes", record.name, content.len());
//!     }
//!     session.seek_next()?;
//! }
//! session.close();
//! # Ok(())
//! # }
//! ```

use std::fmt;

use crate::cursor::{Cursor, HeaderRecord, Termination};
use crate::engine::{ArchiveHandle, EngineFault, EngineHandle, HeaderKind};
use crate::error::DecryptionFailure;
use crate::password::Password;
use crate::staging::{self, StagingPath};
use crate::{Error, Result};

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Nothing staged yet.
    Created,
    /// The engine opened the staged bytes.
    Opened,
    /// The engine confirmed the bytes are an archive.
    Validated,
    /// At least one header record was requested.
    Iterating,
    /// Staged bytes were removed; terminal.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "CREATED",
            Self::Opened => "OPENED",
            Self::Validated => "VALIDATED",
            Self::Iterating => "ITERATING",
            Self::Closed => "CLOSED",
        })
    }
}

/// One archive opened through a shared engine.
pub struct Session {
    pub(crate) engine: EngineHandle,
    pub(crate) state: SessionState,
    pub(crate) password: Password,
    pub(crate) cursor: Cursor,
    pub(crate) archive: Option<Box<dyn ArchiveHandle>>,
    /// Staged copy still owned by this session.
    staged: Option<StagingPath>,
    /// Path of the last staged copy, kept for reporting after close.
    staging_path: Option<StagingPath>,
    /// An open attempt was made; the session cannot be opened again.
    spent: bool,
}

impl Session {
    /// Creates a session on `engine`.
    pub fn new(engine: &EngineHandle) -> Self {
        Self {
            engine: engine.clone(),
            state: SessionState::Created,
            password: Password::none(),
            cursor: Cursor::new(),
            archive: None,
            staged: None,
            staging_path: None,
            spent: false,
        }
    }

    /// Stages `bytes` and asks the engine to open them.
    ///
    /// Returns `Ok(false)` if the engine cannot open the staged copy; the
    /// copy is removed immediately and the session must not be reused.
    /// Whether the bytes are an archive at all is decided later by
    /// [`validate`](Self::validate).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the session was already opened and
    /// [`Error::Io`] if the bytes cannot be staged.
    pub fn open(&mut self, bytes: &[u8]) -> Result<bool> {
        self.check_openable("open")?;
        self.spent = true;
        let path = staging::stage(self.engine.staging(), bytes)?;
        Ok(self.open_path(path))
    }

    /// Adopts an already staged archive and asks the engine to open it.
    ///
    /// The session takes ownership of `path` and removes it on close. A path
    /// with nothing staged under it yields `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the session was already opened.
    pub fn open_staged(&mut self, path: StagingPath) -> Result<bool> {
        self.check_openable("open")?;
        self.spent = true;
        Ok(self.open_path(path))
    }

    fn check_openable(&self, operation: &'static str) -> Result<()> {
        if self.spent || self.state != SessionState::Created {
            return Err(self.invalid(operation, "a session can only be opened once"));
        }
        Ok(())
    }

    fn open_path(&mut self, path: StagingPath) -> bool {
        self.staged = Some(path.clone());
        self.staging_path = Some(path.clone());

        match self.engine.engine().open(&path) {
            Ok(archive) => {
                self.archive = Some(archive);
                self.state = SessionState::Opened;
                log::debug!("session opened {}", path);
                true
            }
            Err(fault) => {
                log::debug!("engine cannot open {}: {}", path, fault);
                self.unstage();
                false
            }
        }
    }

    /// Sets the password used for encrypted headers and entries.
    ///
    /// The empty string clears it. The password is only checked when the
    /// engine needs it.
    pub fn set_password(&mut self, password: impl Into<Password>) {
        self.password = password.into();
    }

    /// Asks the engine whether the opened bytes are a well-formed archive.
    ///
    /// Returns `Ok(false)` for corrupt or foreign data; the caller should
    /// close the session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decryption`] if the archive headers are encrypted and
    /// the password is missing or wrong, and [`Error::InvalidState`] unless
    /// the session is `OPENED`.
    pub fn validate(&mut self) -> Result<bool> {
        if self.state != SessionState::Opened {
            return Err(self.invalid("validate", "validate() must directly follow a successful open()"));
        }
        let Some(archive) = self.archive.as_mut() else {
            return Err(Error::InvalidState {
                operation: "validate",
                state: self.state,
                reason: "no archive is open",
            });
        };

        let outcome = self
            .engine
            .with_password(&self.password, || archive.is_archive());
        match outcome {
            Ok(true) => {
                self.state = SessionState::Validated;
                log::debug!("archive validated");
                Ok(true)
            }
            Ok(false) => {
                log::debug!("engine rejected the staged bytes as an archive");
                Ok(false)
            }
            Err(fault) => match decryption_failure(&fault, &self.password) {
                Some(reason) => Err(Error::Decryption {
                    entry_name: String::new(),
                    reason,
                }),
                None => {
                    log::debug!("validation failed: {}", fault);
                    Ok(false)
                }
            },
        }
    }

    /// Reads the next header record.
    ///
    /// Returns `Ok(None)` when the engine has no more records or reports the
    /// end-of-archive record; [`termination`](Self::termination) tells the
    /// two apart. Every yielded record must be followed by
    /// [`seek_next`](Self::seek_next).
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptArchive`] (or [`Error::Decryption`] for
    /// encrypted headers) if the engine fails mid-stream; iteration ends
    /// with [`Termination::Failed`].
    pub fn advance(&mut self) -> Result<Option<HeaderRecord>> {
        if !matches!(self.state, SessionState::Validated | SessionState::Iterating) {
            return Err(self.invalid("advance", "the archive has not been validated"));
        }
        match self.cursor.check_advance() {
            Ok(true) => {}
            Ok(false) => return Ok(None),
            Err(reason) => return Err(self.invalid("advance", reason)),
        }
        self.state = SessionState::Iterating;

        let Some(archive) = self.archive.as_mut() else {
            return Err(Error::InvalidState {
                operation: "advance",
                state: self.state,
                reason: "no archive is open",
            });
        };
        let outcome = self
            .engine
            .with_password(&self.password, || read_record(archive.as_mut()));

        match outcome {
            Ok(None) => {
                log::debug!("no more header records after {}", self.cursor.records_seen());
                self.cursor.finish(Termination::Exhausted);
                Ok(None)
            }
            Ok(Some(record)) if record.kind == HeaderKind::EndOfArchive => {
                log::debug!("end of archive after {} records", self.cursor.records_seen());
                self.cursor.finish(Termination::EndOfArchive);
                Ok(None)
            }
            Ok(Some(record)) => {
                log::debug!(
                    "record {:?} '{}' ({} bytes{})",
                    record.kind,
                    record.name,
                    record.size,
                    if record.is_directory { ", directory" } else { "" }
                );
                self.cursor.land(record.clone());
                Ok(Some(record))
            }
            Err(fault) => {
                self.cursor.finish(Termination::Failed);
                Err(match decryption_failure(&fault, &self.password) {
                    Some(reason) => Error::Decryption {
                        entry_name: String::new(),
                        reason,
                    },
                    None => Error::CorruptArchive {
                        reason: fault.to_string(),
                    },
                })
            }
        }
    }

    /// Moves past the current record's payload, whether or not it was read.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if no record is under the cursor and
    /// [`Error::CorruptArchive`] if the engine cannot skip the payload.
    pub fn seek_next(&mut self) -> Result<()> {
        if self.state != SessionState::Iterating || self.cursor.current().is_none() {
            return Err(self.invalid("seek_next", "no record under the cursor"));
        }
        let Some(archive) = self.archive.as_mut() else {
            return Err(Error::InvalidState {
                operation: "seek_next",
                state: self.state,
                reason: "no archive is open",
            });
        };

        let outcome = self
            .engine
            .with_password(&self.password, || archive.seek_to_next());
        match outcome {
            Ok(()) => {
                self.cursor.release();
                Ok(())
            }
            Err(fault) => {
                self.cursor.finish(Termination::Failed);
                Err(Error::CorruptArchive {
                    reason: format!("cannot skip entry: {fault}"),
                })
            }
        }
    }

    /// Closes the archive and removes the staged copy.
    ///
    /// Safe to call any number of times and from any state.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        // Drop the engine handle before the file it reads from.
        self.archive = None;
        self.unstage();
        self.state = SessionState::Closed;
        log::debug!("session closed");
    }

    fn unstage(&mut self) {
        if let Some(path) = self.staged.take() {
            staging::unstage(self.engine.staging(), &path);
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Staging path of the archive, if one was ever assigned.
    pub fn staging_path(&self) -> Option<&StagingPath> {
        self.staging_path.as_ref()
    }

    /// How iteration ended, once it has.
    pub fn termination(&self) -> Option<Termination> {
        self.cursor.termination()
    }

    /// Returns true if iteration reached the explicit end-of-archive record.
    pub fn reached_end_of_archive(&self) -> bool {
        self.termination().is_some_and(Termination::is_complete)
    }

    /// Number of header records yielded so far.
    pub fn records_seen(&self) -> u64 {
        self.cursor.records_seen()
    }

    /// The engine this session runs on.
    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    pub(crate) fn invalid(&self, operation: &'static str, reason: &'static str) -> Error {
        Error::InvalidState {
            operation,
            state: self.state,
            reason,
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("staging_path", &self.staging_path)
            .field("termination", &self.termination())
            .field("records_seen", &self.records_seen())
            .finish_non_exhaustive()
    }
}

/// Reads one record and copies it out of the engine.
fn read_record(archive: &mut dyn ArchiveHandle) -> std::result::Result<Option<HeaderRecord>, EngineFault> {
    if !archive.read_header()? {
        return Ok(None);
    }
    let kind = archive.header_kind();
    let record = match kind {
        HeaderKind::File => HeaderRecord {
            kind,
            name: archive.file_name(),
            size: archive.file_size(),
            is_directory: archive.is_directory(),
            is_encrypted: archive.is_encrypted(),
        },
        _ => HeaderRecord {
            kind,
            name: String::new(),
            size: 0,
            is_directory: false,
            is_encrypted: false,
        },
    };
    Ok(Some(record))
}

/// Classifies an engine fault as a password problem, if it is one.
pub(crate) fn decryption_failure(fault: &EngineFault, password: &Password) -> Option<DecryptionFailure> {
    match fault {
        EngineFault::MissingPassword => Some(DecryptionFailure::PasswordRequired),
        EngineFault::BadPassword if password.is_empty() => Some(DecryptionFailure::PasswordRequired),
        EngineFault::BadPassword => Some(DecryptionFailure::WrongPassword),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::Created.to_string(), "CREATED");
        assert_eq!(SessionState::Iterating.to_string(), "ITERATING");
        assert_eq!(SessionState::Closed.to_string(), "CLOSED");
    }

    #[test]
    fn test_decryption_failure_classification() {
        let none = Password::none();
        let some = Password::new("123");
        assert_eq!(
            decryption_failure(&EngineFault::MissingPassword, &some),
            Some(DecryptionFailure::PasswordRequired)
        );
        assert_eq!(
            decryption_failure(&EngineFault::BadPassword, &none),
            Some(DecryptionFailure::PasswordRequired)
        );
        assert_eq!(
            decryption_failure(&EngineFault::BadPassword, &some),
            Some(DecryptionFailure::WrongPassword)
        );
        assert_eq!(decryption_failure(&EngineFault::BadData, &some), None);
    }
}
