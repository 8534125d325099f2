//! Error types for archive session operations.
//!
//! This module provides the [`Error`] enum which represents all possible
//! failure modes when driving an archive engine, along with a convenient
//! [`Result<T>`] type alias.
//!
//! # Distinguishing failures
//!
//! Callers that present errors to users usually only need to tell apart
//! "the engine could not be loaded", "this is not an archive" and "wrong
//! password". [`Error::category`] collapses the variants into those groups:
//!
//! ```rust
//! use unrar_session::{Error, ErrorCategory};
//!
//! fn user_message(error: &Error) -> &'static str {
//!     match error.category() {
//!         ErrorCategory::EngineLoad => "The extraction engine could not be loaded.",
//!         ErrorCategory::Format => "This file is not a valid archive.",
//!         ErrorCategory::Decryption => "Incorrect or missing password.",
//!         _ => "Extraction failed.",
//!     }
//! }
//! ```

use std::io;

use crate::session::SessionState;

/// Why an encrypted entry could not be decrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecryptionFailure {
    /// The entry is encrypted and no password was set.
    PasswordRequired,
    /// A password was set but the engine rejected it.
    WrongPassword,
}

impl std::fmt::Display for DecryptionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PasswordRequired => write!(f, "password required"),
            Self::WrongPassword => write!(f, "wrong password"),
        }
    }
}

/// Helper struct for formatting Decryption error messages.
struct DecryptionDisplay<'a> {
    entry_name: &'a str,
    reason: DecryptionFailure,
}

impl std::fmt::Display for DecryptionDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.reason {
            DecryptionFailure::PasswordRequired => write!(f, "Password required")?,
            DecryptionFailure::WrongPassword => write!(f, "Wrong password")?,
        }
        if self.entry_name.is_empty() {
            write!(f, " for archive headers")
        } else {
            write!(f, " for entry '{}'", self.entry_name)
        }
    }
}

/// Coarse grouping of [`Error`] variants for user-facing reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The native engine could not be acquired.
    EngineLoad,
    /// The staged bytes could not be opened by the engine.
    Open,
    /// The input is not a recognized archive or is structurally corrupt.
    Format,
    /// An encrypted entry needs a (different) password.
    Decryption,
    /// Decompression of a single entry failed.
    Extraction,
    /// An operation was called in the wrong session state.
    Usage,
    /// Writing extracted entries to disk failed validation.
    Destination,
    /// Underlying I/O failure.
    Io,
}

/// The main error type for archive session operations.
///
/// | Category | Variants |
/// |----------|----------|
/// | Engine | [`EngineLoad`][Self::EngineLoad] |
/// | Open | [`Open`][Self::Open] |
/// | Format | [`InvalidFormat`][Self::InvalidFormat], [`CorruptArchive`][Self::CorruptArchive], [`Truncated`][Self::Truncated] |
/// | Decryption | [`Decryption`][Self::Decryption] |
/// | Extraction | [`Extraction`][Self::Extraction], [`SizeMismatch`][Self::SizeMismatch], [`ResourceLimitExceeded`][Self::ResourceLimitExceeded] |
/// | Usage | [`InvalidState`][Self::InvalidState] |
/// | Destination | [`InvalidEntryPath`][Self::InvalidEntryPath], [`PathTraversal`][Self::PathTraversal] |
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred while staging bytes or writing output.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The native engine could not be located or failed to start.
    ///
    /// Every later acquisition retries the load.
    #[error("Failed to load extraction engine: {reason}")]
    EngineLoad {
        /// Description of every attempt that failed.
        reason: String,
    },

    /// The engine could not open the staged bytes as a stream.
    #[error("Cannot open staged archive at {path}")]
    Open {
        /// The staging path that failed to open.
        path: String,
    },

    /// The opened stream is not an archive of the supported format.
    #[error("Not a valid archive: {0}")]
    InvalidFormat(String),

    /// The engine failed while reading the archive directory.
    #[error("Corrupt archive: {reason}")]
    CorruptArchive {
        /// Engine description of the failure.
        reason: String,
    },

    /// Iteration stopped before an explicit end-of-archive record.
    #[error("Archive ended without an end-of-archive record")]
    Truncated,

    /// An encrypted entry could not be decrypted.
    ///
    /// An empty `entry_name` means the archive headers themselves are
    /// encrypted.
    #[error("{}", DecryptionDisplay { entry_name, reason: *reason })]
    Decryption {
        /// Name of the entry being extracted.
        entry_name: String,
        /// Whether the password was missing or wrong.
        reason: DecryptionFailure,
    },

    /// Decompression of an entry failed for a reason other than the password.
    #[error("Failed to extract '{entry_name}': {reason}")]
    Extraction {
        /// Name of the entry being extracted.
        entry_name: String,
        /// Engine description of the failure.
        reason: String,
    },

    /// Extracted content length differs from the declared size.
    #[error("Size mismatch for '{entry_name}': declared {expected} bytes, extracted {actual}")]
    SizeMismatch {
        /// Name of the entry.
        entry_name: String,
        /// Size declared in the header record.
        expected: u64,
        /// Length of the extracted content.
        actual: u64,
    },

    /// An entry exceeds the configured limits.
    #[error("Resource limit exceeded: {0}")]
    ResourceLimitExceeded(String),

    /// A session operation was called out of order.
    #[error("Cannot {operation} in state {state}: {reason}")]
    InvalidState {
        /// The rejected operation.
        operation: &'static str,
        /// The session state at the time of the call.
        state: SessionState,
        /// Why the call was rejected.
        reason: &'static str,
    },

    /// An entry name cannot be mapped to a safe relative path.
    #[error("Invalid entry path: {0}")]
    InvalidEntryPath(String),

    /// Writing an entry would escape the destination directory.
    #[error("Path traversal detected in entry '{path}'")]
    PathTraversal {
        /// The offending entry name.
        path: String,
    },
}

impl Error {
    /// Returns the coarse category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Io(_) => ErrorCategory::Io,
            Self::EngineLoad { .. } => ErrorCategory::EngineLoad,
            Self::Open { .. } => ErrorCategory::Open,
            Self::InvalidFormat(_) | Self::CorruptArchive { .. } | Self::Truncated => {
                ErrorCategory::Format
            }
            Self::Decryption { .. } => ErrorCategory::Decryption,
            Self::Extraction { .. }
            | Self::SizeMismatch { .. }
            | Self::ResourceLimitExceeded(_) => ErrorCategory::Extraction,
            Self::InvalidState { .. } => ErrorCategory::Usage,
            Self::InvalidEntryPath(_) | Self::PathTraversal { .. } => ErrorCategory::Destination,
        }
    }

    /// Returns true if a password prompt could resolve this error.
    pub fn is_decryption(&self) -> bool {
        matches!(self, Self::Decryption { .. })
    }

    /// Returns true if the input is not a usable archive.
    pub fn is_format(&self) -> bool {
        self.category() == ErrorCategory::Format
    }
}

/// A specialized Result type for archive session operations.
pub type Result<T> = std::result::Result<T, Error>;
