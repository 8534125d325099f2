//! Forward-only cursor over an archive's header records.
//!
//! The engine only exposes the record under its read position, and its
//! accessors go stale as soon as the position moves. The cursor therefore
//! copies every record into an owned [`HeaderRecord`] when it is read and
//! tracks where the session stands between records.

use std::fmt;

use crate::engine::HeaderKind;

/// Owned copy of one header record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRecord {
    /// Kind of the record.
    pub kind: HeaderKind,
    /// Entry name; empty for non-FILE records.
    pub name: String,
    /// Declared unpacked size in bytes; 0 for non-FILE records.
    pub size: u64,
    /// Whether the entry is a directory.
    pub is_directory: bool,
    /// Whether the entry's payload is encrypted.
    pub is_encrypted: bool,
}

impl HeaderRecord {
    /// Returns true for FILE records, including directories.
    pub fn is_file(&self) -> bool {
        self.kind == HeaderKind::File
    }

    /// Returns true for FILE records that carry a payload.
    pub fn has_content(&self) -> bool {
        self.is_file() && !self.is_directory
    }
}

/// How iteration over the header records ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Termination {
    /// The engine reported an explicit end-of-archive record.
    EndOfArchive,
    /// The engine reported that no further record could be read.
    Exhausted,
    /// Reading the next record failed.
    Failed,
}

impl Termination {
    /// Returns true only when the archive was fully consumed.
    pub fn is_complete(self) -> bool {
        self == Self::EndOfArchive
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::EndOfArchive => "end of archive",
            Self::Exhausted => "no more records",
            Self::Failed => "read failure",
        })
    }
}

#[derive(Debug, Clone)]
enum Position {
    /// Between records; the next read may happen.
    Between,
    /// A record is under the read position.
    On { record: HeaderRecord, extracted: bool },
    /// No more records will be produced.
    Done(Termination),
}

/// Position tracker used by [`crate::Session`].
#[derive(Debug, Clone)]
pub(crate) struct Cursor {
    position: Position,
    records_seen: u64,
}

impl Cursor {
    pub(crate) fn new() -> Self {
        Self {
            position: Position::Between,
            records_seen: 0,
        }
    }

    /// Checks that a new record may be read.
    ///
    /// Returns `Ok(true)` if reading may proceed and `Ok(false)` when
    /// iteration already ended.
    pub(crate) fn check_advance(&self) -> Result<bool, &'static str> {
        match self.position {
            Position::Between => Ok(true),
            Position::On { .. } => Err("call seek_next() before reading the next record"),
            Position::Done(_) => Ok(false),
        }
    }

    /// Places `record` under the read position.
    pub(crate) fn land(&mut self, record: HeaderRecord) {
        self.records_seen += 1;
        self.position = Position::On {
            record,
            extracted: false,
        };
    }

    /// Ends iteration.
    pub(crate) fn finish(&mut self, termination: Termination) {
        self.position = Position::Done(termination);
    }

    /// Leaves the current record.
    ///
    /// Returns false if no record was under the read position.
    pub(crate) fn release(&mut self) -> bool {
        match self.position {
            Position::On { .. } => {
                self.position = Position::Between;
                true
            }
            _ => false,
        }
    }

    /// The record under the read position, if any.
    pub(crate) fn current(&self) -> Option<&HeaderRecord> {
        match &self.position {
            Position::On { record, .. } => Some(record),
            _ => None,
        }
    }

    /// Checks that the payload of the current record may be extracted.
    pub(crate) fn check_extract(&self) -> Result<&HeaderRecord, &'static str> {
        match &self.position {
            Position::On { extracted: true, .. } => Err("entry was already extracted"),
            Position::On { record, .. } if !record.is_file() => Err("current record is not a file entry"),
            Position::On { record, .. } if record.is_directory => Err("current entry is a directory"),
            Position::On { record, .. } => Ok(record),
            Position::Between => Err("no record under the cursor; call advance() first"),
            Position::Done(_) => Err("iteration has ended"),
        }
    }

    pub(crate) fn mark_extracted(&mut self) {
        if let Position::On { extracted, .. } = &mut self.position {
            *extracted = true;
        }
    }

    pub(crate) fn termination(&self) -> Option<Termination> {
        match self.position {
            Position::Done(t) => Some(t),
            _ => None,
        }
    }

    pub(crate) fn records_seen(&self) -> u64 {
        self.records_seen
    }
}
