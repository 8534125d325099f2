//! Shared test utilities for integration tests.
//!
//! The native UnRAR library is not available in CI, so the integration tests
//! drive sessions against [`FixtureEngine`], an in-memory engine implementing
//! the same capability traits over a tiny record format built with
//! [`FixtureBuilder`].
//!
//! Note: `#![allow(dead_code)]` is required because each integration test file
//! compiles as a separate crate and may only use a subset of these helpers.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use unrar_session::EngineHandle;
use unrar_session::engine::{ArchiveHandle, Engine, EngineFault, HeaderKind};
use unrar_session::staging::{MemoryStaging, StagingArea, StagingPath};

/// Magic of a fixture archive with plain headers.
pub const MAGIC: &[u8] = b"FXAR\x01";
/// Magic of a fixture archive with password-protected headers.
pub const MAGIC_LOCKED: &[u8] = b"FXAR\x02";

const KIND_FILE: u8 = b'F';
const KIND_END: u8 = b'E';
const KIND_COMMENT: u8 = b'C';

const FLAG_DIR: u8 = 0x01;
const FLAG_ENCRYPTED: u8 = 0x02;
const FLAG_CORRUPT: u8 = 0x04;
/// Encrypted without a password check tag: a wrong key shows up as bad data.
const FLAG_UNCHECKED: u8 = 0x08;

/// Content of the encrypted fixture entry, typo included.
pub const ENCRYPTED_TEXT: &str = "The passwor is 123, keep it safe.";

/// FNV-1a, used as the password check tag.
fn tag(password: &str) -> u32 {
    password.bytes().fold(0x811c_9dc5u32, |h, b| {
        (h ^ u32::from(b)).wrapping_mul(0x0100_0193)
    })
}

fn checksum(data: &[u8]) -> u32 {
    data.iter()
        .fold(0u32, |acc, &b| acc.rotate_left(5) ^ u32::from(b))
}

fn xor(data: &[u8], password: &str) -> Vec<u8> {
    let key = password.as_bytes();
    data.iter()
        .enumerate()
        .map(|(i, &b)| b ^ key[i % key.len()] ^ (i as u8))
        .collect()
}

/// Builds fixture archives.
#[derive(Debug, Clone, Default)]
pub struct FixtureBuilder {
    header_password: Option<String>,
    records: Vec<u8>,
    omit_end: bool,
}

impl FixtureBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Protects the headers with `password`.
    pub fn header_password(mut self, password: &str) -> Self {
        self.header_password = Some(password.to_string());
        self
    }

    fn record(mut self, flags: u8, name: &str, declared: u64, check_tag: Option<u32>) -> Self {
        let r = &mut self.records;
        r.push(KIND_FILE);
        r.push(flags);
        r.extend_from_slice(&(name.len() as u16).to_le_bytes());
        r.extend_from_slice(name.as_bytes());
        r.extend_from_slice(&declared.to_le_bytes());
        if let Some(tag) = check_tag {
            r.extend_from_slice(&tag.to_le_bytes());
        }
        self
    }

    fn payload(mut self, plain: &[u8], stored: &[u8]) -> Self {
        let r = &mut self.records;
        r.extend_from_slice(&checksum(plain).to_le_bytes());
        r.extend_from_slice(&(stored.len() as u32).to_le_bytes());
        r.extend_from_slice(stored);
        self
    }

    /// Adds a plain file.
    pub fn file(self, name: &str, content: &[u8]) -> Self {
        self.record(0, name, content.len() as u64, None)
            .payload(content, content)
    }

    /// Adds a directory entry.
    pub fn dir(self, name: &str) -> Self {
        self.record(FLAG_DIR, name, 0, None).payload(&[], &[])
    }

    /// Adds a file encrypted with `password`.
    pub fn encrypted_file(self, name: &str, content: &[u8], password: &str) -> Self {
        self.record(FLAG_ENCRYPTED, name, content.len() as u64, Some(tag(password)))
            .payload(content, &xor(content, password))
    }

    /// Adds a file encrypted without a password check.
    pub fn unchecked_encrypted_file(self, name: &str, content: &[u8], password: &str) -> Self {
        self.record(
            FLAG_ENCRYPTED | FLAG_UNCHECKED,
            name,
            content.len() as u64,
            None,
        )
        .payload(content, &xor(content, password))
    }

    /// Adds a file whose payload fails to decompress.
    pub fn corrupt_file(self, name: &str, content: &[u8]) -> Self {
        self.record(FLAG_CORRUPT, name, content.len() as u64, None)
            .payload(content, content)
    }

    /// Adds a file whose header declares `declared` bytes.
    pub fn file_declaring(self, name: &str, content: &[u8], declared: u64) -> Self {
        self.record(0, name, declared, None)
            .payload(content, content)
    }

    /// Adds a non-file record.
    pub fn comment(mut self, text: &str) -> Self {
        self.records.push(KIND_COMMENT);
        self.records
            .extend_from_slice(&(text.len() as u16).to_le_bytes());
        self.records.extend_from_slice(text.as_bytes());
        self
    }

    /// Leaves out the end-of-archive record.
    pub fn without_end(mut self) -> Self {
        self.omit_end = true;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::new();
        match &self.header_password {
            Some(pw) => {
                out.extend_from_slice(MAGIC_LOCKED);
                out.extend_from_slice(&tag(pw).to_le_bytes());
            }
            None => out.extend_from_slice(MAGIC),
        }
        out.extend_from_slice(&self.records);
        if !self.omit_end {
            out.push(KIND_END);
        }
        out
    }
}

/// `q.txt` containing `123`.
pub fn simple_archive() -> Vec<u8> {
    FixtureBuilder::new().file("q.txt", b"123").build()
}

/// `encryption/` and `encryption/encryption.txt`, encrypted with `123`.
pub fn encrypted_archive() -> Vec<u8> {
    FixtureBuilder::new()
        .dir("encryption")
        .encrypted_file("encryption/encryption.txt", ENCRYPTED_TEXT.as_bytes(), "123")
        .build()
}

/// Counters shared between the engine and its open archives.
#[derive(Debug, Default)]
pub struct EngineStats {
    password: Mutex<String>,
    password_history: Mutex<Vec<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    extractions: AtomicUsize,
    opened: AtomicUsize,
    dropped: AtomicUsize,
    /// Extraction delay, to widen race windows in concurrency tests.
    delay_ms: AtomicUsize,
}

impl EngineStats {
    fn password(&self) -> String {
        self.password.lock().unwrap().clone()
    }

    /// Password currently installed on the engine.
    pub fn installed_password(&self) -> String {
        self.password()
    }

    /// Every value passed to `set_password`, in order.
    pub fn password_history(&self) -> Vec<String> {
        self.password_history.lock().unwrap().clone()
    }

    /// Highest number of overlapping `read_file_data` calls.
    pub fn max_concurrent_extractions(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn extractions(&self) -> usize {
        self.extractions.load(Ordering::SeqCst)
    }

    /// Archive handles opened and not yet dropped.
    pub fn open_handles(&self) -> usize {
        self.opened.load(Ordering::SeqCst) - self.dropped.load(Ordering::SeqCst)
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
    }
}

/// In-memory engine reading [`FixtureBuilder`] archives.
#[derive(Debug, Default)]
pub struct FixtureEngine {
    staging: MemoryStaging,
    stats: Arc<EngineStats>,
}

impl FixtureEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn memory_staging(&self) -> &MemoryStaging {
        &self.staging
    }
}

impl Engine for FixtureEngine {
    fn name(&self) -> &str {
        "fixture"
    }

    fn staging(&self) -> &dyn StagingArea {
        &self.staging
    }

    fn open(&self, path: &StagingPath) -> Result<Box<dyn ArchiveHandle>, EngineFault> {
        let data = self.staging.read(path).map_err(|_| EngineFault::Open)?;
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FixtureArchive {
            data,
            stats: Arc::clone(&self.stats),
            pos: 0,
            current: None,
            buffer: Vec::new(),
        }))
    }

    fn set_password(&self, password: &str) {
        *self.stats.password.lock().unwrap() = password.to_string();
        self.stats
            .password_history
            .lock()
            .unwrap()
            .push(password.to_string());
    }
}

/// Creates a fixture engine and a handle to it.
pub fn fixture_engine() -> (Arc<FixtureEngine>, EngineHandle) {
    let engine = Arc::new(FixtureEngine::new());
    let handle = EngineHandle::new(engine.clone());
    (engine, handle)
}

#[derive(Debug, Clone)]
struct Current {
    kind: HeaderKind,
    name: String,
    declared: u64,
    flags: u8,
    tag: Option<u32>,
    checksum: u32,
    payload: std::ops::Range<usize>,
    pending: bool,
}

struct FixtureArchive {
    data: Arc<[u8]>,
    stats: Arc<EngineStats>,
    pos: usize,
    current: Option<Current>,
    buffer: Vec<u8>,
}

impl FixtureArchive {
    fn take(&mut self, n: usize) -> Result<&[u8], EngineFault> {
        let end = self.pos.checked_add(n).ok_or(EngineFault::BadArchive)?;
        let slice = self.data.get(self.pos..end).ok_or(EngineFault::BadArchive)?;
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16, EngineFault> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, EngineFault> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, EngineFault> {
        let b = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_le_bytes(buf))
    }

    fn check_header_password(&self) -> Result<(), EngineFault> {
        if !self.data.starts_with(MAGIC_LOCKED) {
            return Ok(());
        }
        let stored = self
            .data
            .get(MAGIC.len()..MAGIC.len() + 4)
            .ok_or(EngineFault::BadArchive)?;
        let stored = u32::from_le_bytes([stored[0], stored[1], stored[2], stored[3]]);
        let password = self.stats.password();
        if password.is_empty() {
            Err(EngineFault::MissingPassword)
        } else if tag(&password) != stored {
            Err(EngineFault::BadPassword)
        } else {
            Ok(())
        }
    }

    fn parse_record(&mut self) -> Result<Current, EngineFault> {
        let kind = self.take(1)?[0];
        match kind {
            KIND_END => Ok(Current {
                kind: HeaderKind::EndOfArchive,
                name: String::new(),
                declared: 0,
                flags: 0,
                tag: None,
                checksum: 0,
                payload: self.pos..self.pos,
                pending: false,
            }),
            KIND_COMMENT => {
                let len = self.u16()? as usize;
                let start = self.pos;
                self.take(len)?;
                Ok(Current {
                    kind: HeaderKind::Other(KIND_COMMENT),
                    name: String::new(),
                    declared: 0,
                    flags: 0,
                    tag: None,
                    checksum: 0,
                    payload: start..start,
                    pending: false,
                })
            }
            KIND_FILE => {
                let flags = self.take(1)?[0];
                let name_len = self.u16()? as usize;
                let name = String::from_utf8_lossy(self.take(name_len)?).into_owned();
                let declared = self.u64()?;
                let tag = if flags & FLAG_ENCRYPTED != 0 && flags & FLAG_UNCHECKED == 0 {
                    Some(self.u32()?)
                } else {
                    None
                };
                let checksum = self.u32()?;
                let len = self.u32()? as usize;
                let start = self.pos;
                let end = start.checked_add(len).ok_or(EngineFault::BadArchive)?;
                if end > self.data.len() {
                    return Err(EngineFault::BadArchive);
                }
                Ok(Current {
                    kind: HeaderKind::File,
                    name,
                    declared,
                    flags,
                    tag,
                    checksum,
                    payload: start..end,
                    pending: true,
                })
            }
            _ => Err(EngineFault::BadArchive),
        }
    }

    fn decode(&self, current: &Current) -> Result<Vec<u8>, EngineFault> {
        let stored = &self.data[current.payload.clone()];
        if current.flags & FLAG_CORRUPT != 0 {
            return Err(EngineFault::BadData);
        }
        let plain = if current.flags & FLAG_ENCRYPTED != 0 {
            let password = self.stats.password();
            if password.is_empty() {
                return Err(EngineFault::MissingPassword);
            }
            if let Some(expected) = current.tag {
                if tag(&password) != expected {
                    return Err(EngineFault::BadPassword);
                }
            }
            xor(stored, &password)
        } else {
            stored.to_vec()
        };
        if checksum(&plain) != current.checksum {
            return Err(EngineFault::BadData);
        }
        Ok(plain)
    }
}

impl ArchiveHandle for FixtureArchive {
    fn is_archive(&mut self) -> Result<bool, EngineFault> {
        if self.data.starts_with(MAGIC) {
            self.pos = MAGIC.len();
            return Ok(true);
        }
        if self.data.starts_with(MAGIC_LOCKED) {
            self.check_header_password()?;
            self.pos = MAGIC_LOCKED.len() + 4;
            return Ok(true);
        }
        Ok(false)
    }

    fn read_header(&mut self) -> Result<bool, EngineFault> {
        if let Some(current) = &self.current {
            if current.kind == HeaderKind::EndOfArchive {
                return Ok(false);
            }
            if current.pending {
                self.pos = current.payload.end;
            }
        }
        self.current = None;
        if self.pos >= self.data.len() {
            return Ok(false);
        }
        self.check_header_password()?;
        let current = self.parse_record()?;
        self.current = Some(current);
        Ok(true)
    }

    fn header_kind(&self) -> HeaderKind {
        self.current
            .as_ref()
            .map_or(HeaderKind::Other(0), |c| c.kind)
    }

    fn file_name(&self) -> String {
        self.current
            .as_ref()
            .map(|c| c.name.clone())
            .unwrap_or_default()
    }

    fn file_size(&self) -> u64 {
        self.current.as_ref().map_or(0, |c| c.declared)
    }

    fn is_directory(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|c| c.flags & FLAG_DIR != 0)
    }

    fn is_encrypted(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|c| c.flags & FLAG_ENCRYPTED != 0)
    }

    fn read_file_data(&mut self) -> Result<&[u8], EngineFault> {
        let current = match &self.current {
            Some(c) if c.kind == HeaderKind::File && c.pending => c.clone(),
            _ => return Err(EngineFault::Unsupported("no payload under the cursor".into())),
        };

        let active = self.stats.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_active.fetch_max(active, Ordering::SeqCst);
        let delay = self.stats.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay as u64));
        }
        let decoded = self.decode(&current);
        self.stats.active.fetch_sub(1, Ordering::SeqCst);
        self.stats.extractions.fetch_add(1, Ordering::SeqCst);

        self.pos = current.payload.end;
        if let Some(c) = &mut self.current {
            c.pending = false;
        }
        self.buffer = decoded?;
        Ok(&self.buffer)
    }

    fn seek_to_next(&mut self) -> Result<(), EngineFault> {
        if let Some(current) = &mut self.current {
            if current.pending {
                self.pos = current.payload.end;
                current.pending = false;
            }
        }
        Ok(())
    }
}

impl Drop for FixtureArchive {
    fn drop(&mut self) {
        self.stats.dropped.fetch_add(1, Ordering::SeqCst);
    }
}
