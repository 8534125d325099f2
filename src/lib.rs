//! # unrar-session
//!
//! Safe sessions over a native RAR extraction engine.
//!
//! The engine (the UnRAR shared library by default) decompresses and
//! decrypts; this crate drives it. It loads the engine once per process,
//! stages untrusted archive bytes into the engine's private namespace, walks
//! the header records one at a time, copies every entry's content into an
//! owned buffer and removes the staged copy again on every exit path.
//!
//! ## Quick Start
//!
//! ### Extracting an Archive
//!
//! ```rust,no_run
//! use unrar_session::{ExtractOptions, Result, extract_bytes, loader};
//!
//! # async fn demo() -> Result<()> {
//! let engine = loader::acquire_engine().await?;
//! let bytes = std::fs::read("archive.rar")?;
//!
//! let result = extract_bytes(&engine, &bytes, &ExtractOptions::default())?;
//! for entry in &result.entries {
//!     println!("{}: {} bytes", entry.name, entry.size);
//! }
//! for failure in &result.failures {
//!     eprintln!("{}: {}", failure.name, failure.error);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Extracting Password-Protected Archives
//!
//! ```rust,no_run
//! use unrar_session::{Error, ExtractOptions, Result, extract_bytes, loader};
//!
//! # async fn demo(bytes: Vec<u8>) -> Result<()> {
//! let engine = loader::acquire_engine().await?;
//! let options = ExtractOptions::new().password("123").stop_on_error(true);
//!
//! match extract_bytes(&engine, &bytes, &options) {
//!     Ok(result) => println!("{} files", result.files()),
//!     Err(e) if e.is_decryption() => println!("wrong password"),
//!     Err(e) => return Err(e),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Driving a Session by Hand
//!
//! [`Session`] exposes every step. See the [`session`] module for the state
//! machine.
//!
//! ## Engines
//!
//! Sessions only see the [`engine::Engine`] and [`engine::ArchiveHandle`]
//! traits. The `native` feature (enabled by default) provides
//! [`engine::native::NativeEngine`], which loads the UnRAR library at run
//! time; where it is looked up is controlled by [`EngineConfig`].
//!
//! The engine password is process-wide. [`EngineHandle`] serializes every
//! call that may need it, so sessions never see each other's passwords.
//!
//! ## Feature Flags
//!
//! | Feature | Description | Default |
//! |---------|-------------|---------|
//! | `native` | UnRAR shared library binding | Yes |
//! | `cli` | The `unrar-session` command-line tool | No |
//!
//! ## Logging
//!
//! The crate logs through the [`log`](https://docs.rs/log) facade and never
//! installs a logger itself.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod config;
pub mod cursor;
pub mod destination;
pub mod engine;
pub mod entry_path;
pub mod error;
pub mod extract;
pub mod format;
pub mod loader;
pub mod password;
pub mod session;
pub mod staging;

pub use config::EngineConfig;
pub use cursor::{HeaderRecord, Termination};
pub use destination::{WriteSummary, write_entries};
pub use engine::{EngineHandle, HeaderKind};
pub use entry_path::EntryPath;
pub use error::{DecryptionFailure, Error, ErrorCategory, Result};
pub use extract::{
    Entries, Entry, EntryFailure, ExtractOptions, ExtractResult, extract_bytes,
    extract_bytes_async, list_bytes,
};
pub use format::ArchiveFormat;
pub use loader::EngineLoader;
pub use password::Password;
pub use session::{Session, SessionState};
pub use staging::StagingPath;
