//! Tests for the session state machine and staging cleanup.
//!
//! Every test runs against the in-memory fixture engine from `common`, and
//! checks that nothing stays staged once the session is gone.

mod common;

use common::{FixtureBuilder, fixture_engine, simple_archive};
use unrar_session::staging::{self, StagingArea, StagingPath};
use unrar_session::{Error, HeaderKind, Session, SessionState, Termination};

#[test]
fn test_simple_archive_walkthrough() {
    let (engine, handle) = fixture_engine();
    let mut session = Session::new(&handle);
    assert_eq!(session.state(), SessionState::Created);

    assert!(session.open(&simple_archive()).unwrap());
    assert_eq!(session.state(), SessionState::Opened);
    assert_eq!(engine.memory_staging().len(), 1);

    assert!(session.validate().unwrap());
    assert_eq!(session.state(), SessionState::Validated);

    let record = session.advance().unwrap().expect("one file record");
    assert_eq!(session.state(), SessionState::Iterating);
    assert_eq!(record.kind, HeaderKind::File);
    assert_eq!(record.name, "q.txt");
    assert_eq!(record.size, 3);
    assert!(!record.is_directory);

    let content = session.extract_current().unwrap();
    assert_eq!(String::from_utf8(content).unwrap(), "123");
    session.seek_next().unwrap();

    assert!(session.advance().unwrap().is_none());
    assert_eq!(session.termination(), Some(Termination::EndOfArchive));
    assert!(session.reached_end_of_archive());
    assert_eq!(session.records_seen(), 1);

    session.close();
    assert_eq!(session.state(), SessionState::Closed);
    assert!(engine.memory_staging().is_empty());
    assert_eq!(engine.stats().open_handles(), 0);
}

#[test]
fn test_close_twice_is_noop() {
    let (engine, handle) = fixture_engine();
    let mut session = Session::new(&handle);
    assert!(session.open(&simple_archive()).unwrap());
    let path = session.staging_path().cloned().unwrap();

    session.close();
    session.close();
    assert_eq!(session.state(), SessionState::Closed);
    assert!(!engine.memory_staging().contains(&path));
    // The path is still reported after close.
    assert_eq!(session.staging_path(), Some(&path));
}

#[test]
fn test_close_from_every_state() {
    let (engine, handle) = fixture_engine();

    let mut created = Session::new(&handle);
    created.close();
    assert_eq!(created.state(), SessionState::Closed);

    let mut opened = Session::new(&handle);
    opened.open(&simple_archive()).unwrap();
    opened.close();

    let mut iterating = Session::new(&handle);
    iterating.open(&simple_archive()).unwrap();
    iterating.validate().unwrap();
    iterating.advance().unwrap();
    iterating.close();

    assert!(engine.memory_staging().is_empty());
    assert_eq!(engine.stats().open_handles(), 0);
}

#[test]
fn test_drop_closes_session() {
    let (engine, handle) = fixture_engine();
    {
        let mut session = Session::new(&handle);
        session.open(&simple_archive()).unwrap();
        session.validate().unwrap();
        session.advance().unwrap();
    }
    assert!(engine.memory_staging().is_empty());
    assert_eq!(engine.stats().open_handles(), 0);
}

#[test]
fn test_drop_closes_session_on_panic() {
    let (engine, handle) = fixture_engine();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let mut session = Session::new(&handle);
        session.open(&simple_archive()).unwrap();
        panic!("caller failed mid-session");
    }));
    assert!(result.is_err());
    assert!(engine.memory_staging().is_empty());
}

#[test]
fn test_nonexistent_staged_path_does_not_open() {
    let (engine, handle) = fixture_engine();
    let mut session = Session::new(&handle);
    let path = StagingPath::new("/temp.rar").unwrap();

    assert!(!session.open_staged(path).unwrap());
    assert_eq!(session.state(), SessionState::Created);
    assert!(engine.memory_staging().is_empty());

    // Spent: neither a second open nor validate is accepted.
    assert!(matches!(
        session.open(&simple_archive()),
        Err(Error::InvalidState { operation: "open", .. })
    ));
    assert!(matches!(
        session.validate(),
        Err(Error::InvalidState { operation: "validate", .. })
    ));
    session.close();
}

#[test]
fn test_open_staged_adopts_path() {
    let (engine, handle) = fixture_engine();
    let path = staging::stage(engine.memory_staging(), &simple_archive()).unwrap();

    let mut session = Session::new(&handle);
    assert!(session.open_staged(path.clone()).unwrap());
    assert!(session.validate().unwrap());
    session.close();
    assert!(!engine.memory_staging().contains(&path));
}

#[test]
fn test_open_twice_rejected() {
    let (_engine, handle) = fixture_engine();
    let mut session = Session::new(&handle);
    assert!(session.open(&simple_archive()).unwrap());

    let err = session.open(&simple_archive()).unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidState {
            state: SessionState::Opened,
            ..
        }
    ));
    assert!(err.to_string().contains("OPENED"), "{err}");
}

#[test]
fn test_garbage_does_not_validate() {
    let (engine, handle) = fixture_engine();
    let mut session = Session::new(&handle);

    assert!(session.open(b"this is not an archive at all").unwrap());
    assert!(!session.validate().unwrap());
    assert_eq!(session.state(), SessionState::Opened);
    assert!(session.advance().is_err());

    session.close();
    assert!(engine.memory_staging().is_empty());
}

#[test]
fn test_operations_before_validate_rejected() {
    let (_engine, handle) = fixture_engine();
    let mut session = Session::new(&handle);

    assert!(matches!(
        session.advance(),
        Err(Error::InvalidState { operation: "advance", .. })
    ));
    assert!(matches!(
        session.extract_current(),
        Err(Error::InvalidState { operation: "extract", .. })
    ));

    session.open(&simple_archive()).unwrap();
    assert!(matches!(
        session.seek_next(),
        Err(Error::InvalidState { operation: "seek_next", .. })
    ));
    assert!(session.validate().unwrap());
    assert!(matches!(
        session.validate(),
        Err(Error::InvalidState { state: SessionState::Validated, .. })
    ));
}

#[test]
fn test_advance_requires_seek_next() {
    let (_engine, handle) = fixture_engine();
    let bytes = FixtureBuilder::new()
        .file("a.txt", b"a")
        .file("b.txt", b"b")
        .build();
    let mut session = Session::new(&handle);
    session.open(&bytes).unwrap();
    session.validate().unwrap();

    assert_eq!(session.advance().unwrap().unwrap().name, "a.txt");
    assert!(matches!(
        session.advance(),
        Err(Error::InvalidState { operation: "advance", .. })
    ));

    // Skipping the payload without reading it keeps the next record intact.
    session.seek_next().unwrap();
    assert_eq!(session.advance().unwrap().unwrap().name, "b.txt");
    assert_eq!(session.extract_current().unwrap(), b"b");

    // seek_next without a record under the cursor is rejected.
    session.seek_next().unwrap();
    assert!(session.seek_next().is_err());
}

#[test]
fn test_extract_after_seek_next_rejected() {
    let (_engine, handle) = fixture_engine();
    let bytes = FixtureBuilder::new().file("a.txt", b"a").build();
    let mut session = Session::new(&handle);
    session.open(&bytes).unwrap();
    session.validate().unwrap();

    session.advance().unwrap().unwrap();
    session.seek_next().unwrap();
    match session.extract_current() {
        Err(Error::InvalidState { operation, reason, .. }) => {
            assert_eq!(operation, "extract");
            assert_eq!(reason, "no record under the cursor; call advance() first");
        }
        other => panic!("expected InvalidState, got {other:?}"),
    }

    assert!(session.advance().unwrap().is_none());
    assert!(session.reached_end_of_archive());
    match session.extract_current() {
        Err(Error::InvalidState { operation, reason, .. }) => {
            assert_eq!(operation, "extract");
            assert_eq!(reason, "iteration has ended");
        }
        other => panic!("expected InvalidState, got {other:?}"),
    }
}

#[test]
fn test_extract_rules() {
    let (_engine, handle) = fixture_engine();
    let bytes = FixtureBuilder::new()
        .dir("docs")
        .file("docs/readme.txt", b"hello")
        .comment("archive comment")
        .build();
    let mut session = Session::new(&handle);
    session.open(&bytes).unwrap();
    session.validate().unwrap();

    let dir = session.advance().unwrap().unwrap();
    assert!(dir.is_directory);
    assert!(matches!(
        session.extract_current(),
        Err(Error::InvalidState { reason: "current entry is a directory", .. })
    ));
    session.seek_next().unwrap();

    session.advance().unwrap().unwrap();
    assert_eq!(session.extract_current().unwrap(), b"hello");
    assert!(matches!(
        session.extract_current(),
        Err(Error::InvalidState { reason: "entry was already extracted", .. })
    ));
    session.seek_next().unwrap();

    let other = session.advance().unwrap().unwrap();
    assert_eq!(other.kind, HeaderKind::Other(b'C'));
    assert!(other.name.is_empty());
    assert!(session.extract_current().is_err());
    session.seek_next().unwrap();

    assert!(session.advance().unwrap().is_none());
    assert!(session.reached_end_of_archive());
}

#[test]
fn test_empty_entry_is_not_an_error() {
    let (_engine, handle) = fixture_engine();
    let bytes = FixtureBuilder::new().file("empty.txt", b"").build();
    let mut session = Session::new(&handle);
    session.open(&bytes).unwrap();
    session.validate().unwrap();

    let record = session.advance().unwrap().unwrap();
    assert_eq!(record.size, 0);
    assert!(session.extract_current().unwrap().is_empty());
}

#[test]
fn test_missing_end_record_is_exhausted() {
    let (_engine, handle) = fixture_engine();
    let bytes = FixtureBuilder::new().file("q.txt", b"123").without_end().build();
    let mut session = Session::new(&handle);
    session.open(&bytes).unwrap();
    session.validate().unwrap();

    session.advance().unwrap().unwrap();
    session.seek_next().unwrap();
    assert!(session.advance().unwrap().is_none());
    assert_eq!(session.termination(), Some(Termination::Exhausted));
    assert!(!session.reached_end_of_archive());
}

#[test]
fn test_truncated_header_fails_cursor() {
    let (_engine, handle) = fixture_engine();
    let mut bytes = FixtureBuilder::new()
        .file("a.txt", b"first")
        .file("b.txt", b"second")
        .build();
    // Cut into the second record's header.
    let cut = bytes.len() - 14;
    bytes.truncate(cut);

    let mut session = Session::new(&handle);
    session.open(&bytes).unwrap();
    session.validate().unwrap();

    assert_eq!(session.advance().unwrap().unwrap().name, "a.txt");
    session.seek_next().unwrap();

    let err = session.advance().unwrap_err();
    assert!(matches!(err, Error::CorruptArchive { .. }), "{err}");
    assert!(err.is_format());
    assert_eq!(session.termination(), Some(Termination::Failed));

    // The cursor stays terminated.
    assert!(session.advance().unwrap().is_none());
}

#[test]
fn test_content_survives_close() {
    let (_engine, handle) = fixture_engine();
    let mut session = Session::new(&handle);
    session.open(&simple_archive()).unwrap();
    session.validate().unwrap();
    session.advance().unwrap();
    let content = session.extract_current().unwrap();
    drop(session);

    assert_eq!(content, b"123");
}

#[test]
fn test_concurrent_sessions_use_distinct_paths() {
    let (engine, handle) = fixture_engine();
    let mut a = Session::new(&handle);
    let mut b = Session::new(&handle);
    a.open(&simple_archive()).unwrap();
    b.open(&simple_archive()).unwrap();

    assert_ne!(a.staging_path(), b.staging_path());
    assert_eq!(engine.memory_staging().len(), 2);

    a.close();
    assert_eq!(engine.memory_staging().len(), 1);
    assert!(b.validate().unwrap());
    b.close();
    assert!(engine.memory_staging().is_empty());
}
