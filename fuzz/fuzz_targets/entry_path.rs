//! Fuzz target for EntryPath::new with arbitrary string input.
//!
//! Entry names come straight from archive headers, so this exercises the
//! normalization and validation applied before anything is written to disk.
//!
//! Run with: cargo +nightly fuzz run entry_path
//!
//! Properties checked for every accepted name:
//! - no `..` or `.` segment survives normalization
//! - the result is relative and holds no NUL bytes or backslashes
//! - joining below a root never leaves it

#![no_main]

use std::path::Path;

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(name) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(path) = unrar_session::EntryPath::new(name) else {
        return;
    };
    let normalized = path.as_str();

    assert!(
        normalized.split('/').all(|s| !s.is_empty() && s != "." && s != ".."),
        "Bad segment in normalized path: {:?}",
        normalized
    );
    assert!(!normalized.starts_with('/'), "Absolute path accepted: {:?}", normalized);
    assert!(!normalized.contains('\\'), "Backslash survived: {:?}", normalized);
    assert!(!normalized.contains('\0'), "NUL byte in path: {:?}", normalized);

    let root = Path::new("/fuzz-root");
    assert!(path.to_path(root).starts_with(root), "Escaped root: {:?}", normalized);
});
