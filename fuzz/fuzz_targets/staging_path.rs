//! Fuzz target for StagingPath::new.
//!
//! Run with: cargo +nightly fuzz run staging_path
//!
//! Every accepted key must stay a single segment directly below the
//! staging namespace root.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(key) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(path) = unrar_session::StagingPath::new(key) {
        let name = path.name();
        assert_eq!(path.as_str(), key);
        assert!(!name.is_empty());
        assert!(!name.contains(['/', '\\', '\0']), "Multi-segment key: {:?}", key);
        assert!(name != "." && name != "..", "Dot key accepted: {:?}", key);
    }
});
