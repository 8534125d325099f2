//! RAR signature sniffing.
//!
//! Only the marker block at the start of the data is inspected; the archive
//! structure itself is left to the engine. The result is used for messages
//! and logs, never to decide whether the engine gets to see the bytes.

/// RAR 1.5 to 4.x marker: `Rar!` 0x1A 0x07 0x00.
pub const RAR4_SIGNATURE: &[u8] = &[0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x00];

/// RAR 5.0 marker: `Rar!` 0x1A 0x07 0x01 0x00.
pub const RAR5_SIGNATURE: &[u8] = &[0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x01, 0x00];

/// How far into the data [`find_signature`] looks for a self-extracting stub.
pub const MAX_SFX_SEARCH: usize = 1024 * 1024;

/// Archive format recognized from the signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    /// RAR 1.5 to 4.x.
    Rar4,
    /// RAR 5.0 and later.
    Rar5,
    /// No RAR signature.
    Unknown,
}

impl ArchiveFormat {
    /// Returns a human-readable name for this format.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Rar4 => "RAR4",
            Self::Rar5 => "RAR5",
            Self::Unknown => "Unknown",
        }
    }

    /// Returns true for either RAR generation.
    pub fn is_rar(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Detects the format from the first bytes of `data`.
///
/// ```rust
/// use unrar_session::format::{self, ArchiveFormat};
///
/// assert_eq!(format::detect(b"Rar!\x1a\x07\x01\x00..."), ArchiveFormat::Rar5);
/// assert_eq!(format::detect(b"PK\x03\x04"), ArchiveFormat::Unknown);
/// ```
pub fn detect(data: &[u8]) -> ArchiveFormat {
    if data.starts_with(RAR5_SIGNATURE) {
        ArchiveFormat::Rar5
    } else if data.starts_with(RAR4_SIGNATURE) {
        ArchiveFormat::Rar4
    } else {
        ArchiveFormat::Unknown
    }
}

/// Finds the first RAR signature within the first [`MAX_SFX_SEARCH`] bytes.
///
/// Returns the offset and format, which is non-zero for archives behind a
/// self-extracting stub.
pub fn find_signature(data: &[u8]) -> Option<(usize, ArchiveFormat)> {
    let window = &data[..data.len().min(MAX_SFX_SEARCH + RAR5_SIGNATURE.len())];
    let prefix = &RAR4_SIGNATURE[..6];
    window
        .windows(prefix.len())
        .enumerate()
        .filter(|(_, w)| *w == prefix)
        .find_map(|(offset, _)| match detect(&data[offset..]) {
            ArchiveFormat::Unknown => None,
            format => Some((offset, format)),
        })
}
