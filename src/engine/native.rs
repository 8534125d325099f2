//! Engine backed by the native UnRAR shared library.
//!
//! The library is loaded at runtime with `libloading`; nothing links against
//! it at build time. Staged archives live in a private [`DirStaging`]
//! directory because the library only reads real files.
//!
//! Data is pulled through the `UCM_PROCESSDATA` callback while the library
//! "tests" the current entry, so nothing is ever written outside the staging
//! directory. Password requests (`UCM_NEEDPASSWORD[W]`) are answered from the
//! engine-global password at the time of the request; nothing is installed
//! on the archive handle, so clearing the engine password takes effect on
//! the next request.

use std::ffi::CString;
use std::os::raw::{c_char, c_int, c_uint};
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::{Arc, Mutex};

use libloading::Library;

use super::ffi::{self, Handle, LParam, RARHeaderDataEx, RAROpenArchiveDataEx, WChar};
use super::{ArchiveHandle, Engine, EngineFault, HeaderKind};
use crate::config::EngineConfig;
use crate::password::Password;
use crate::staging::{DirStaging, StagingArea, StagingPath, lock_or_recover};
use crate::{Error, Result};

/// Resolved entry points of a loaded UnRAR library.
struct UnrarApi {
    open_archive_ex: ffi::RAROpenArchiveExFn,
    close_archive: ffi::RARCloseArchiveFn,
    read_header_ex: ffi::RARReadHeaderExFn,
    process_file: ffi::RARProcessFileFn,
    set_callback: ffi::RARSetCallbackFn,
    version: c_int,
    path: PathBuf,
    // Keeps the function pointers above valid; dropped last.
    _library: Library,
}

impl UnrarApi {
    fn load(path: &Path) -> std::result::Result<Self, String> {
        // SAFETY: loading a library runs its initializers. The UnRAR library
        // has no initialization side effects beyond static construction.
        let library = unsafe { Library::new(path) }.map_err(|e| e.to_string())?;

        macro_rules! symbol {
            ($name:literal, $ty:ty) => {{
                // SAFETY: the declared type matches the prototype in dll.hpp.
                let sym: libloading::Symbol<'_, $ty> = unsafe { library.get($name) }
                    .map_err(|e| format!("missing symbol {}: {}", stringify!($name), e))?;
                *sym
            }};
        }

        let open_archive_ex = symbol!(b"RAROpenArchiveEx\0", ffi::RAROpenArchiveExFn);
        let close_archive = symbol!(b"RARCloseArchive\0", ffi::RARCloseArchiveFn);
        let read_header_ex = symbol!(b"RARReadHeaderEx\0", ffi::RARReadHeaderExFn);
        let process_file = symbol!(b"RARProcessFile\0", ffi::RARProcessFileFn);
        let set_callback = symbol!(b"RARSetCallback\0", ffi::RARSetCallbackFn);
        let get_dll_version = symbol!(b"RARGetDllVersion\0", ffi::RARGetDllVersionFn);

        // SAFETY: RARGetDllVersion takes no arguments and has no preconditions.
        let version = unsafe { get_dll_version() };

        Ok(Self {
            open_archive_ex,
            close_archive,
            read_header_ex,
            process_file,
            set_callback,
            version,
            path: path.to_path_buf(),
            _library: library,
        })
    }
}

/// The UnRAR shared library as an [`Engine`].
pub struct NativeEngine {
    api: Arc<UnrarApi>,
    staging: DirStaging,
    password: Arc<Mutex<Password>>,
}

impl NativeEngine {
    /// Probes the configured locations and loads the first library found.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineLoad`] listing every attempt if no candidate
    /// loads, or naming the staging root if the staging directory cannot be
    /// created.
    pub fn load(config: &EngineConfig) -> Result<Self> {
        let mut attempts = Vec::new();
        for candidate in config.library_candidates() {
            match UnrarApi::load(&candidate) {
                Ok(api) => {
                    log::info!(
                        "loaded UnRAR library {} (API version {})",
                        api.path.display(),
                        api.version
                    );
                    let staging = create_staging(config)?;
                    log::debug!("staging archives in {}", staging.root().display());
                    return Ok(Self {
                        api: Arc::new(api),
                        staging,
                        password: Arc::new(Mutex::new(Password::none())),
                    });
                }
                Err(reason) => {
                    log::debug!("cannot load {}: {}", candidate.display(), reason);
                    attempts.push(format!("{}: {}", candidate.display(), reason));
                }
            }
        }

        Err(Error::EngineLoad {
            reason: if attempts.is_empty() {
                "no library candidates configured".into()
            } else {
                attempts.join("; ")
            },
        })
    }

    /// API version reported by `RARGetDllVersion`.
    pub fn api_version(&self) -> i32 {
        self.api.version
    }

    /// File the library was loaded from.
    pub fn library_path(&self) -> &Path {
        &self.api.path
    }
}

fn create_staging(config: &EngineConfig) -> Result<DirStaging> {
    let created = match config.staging_root() {
        Some(root) => DirStaging::new_in(root),
        None => DirStaging::new(),
    };
    created.map_err(|e| Error::EngineLoad {
        reason: match config.staging_root() {
            Some(root) => format!("cannot create staging directory in {}: {e}", root.display()),
            None => format!("cannot create staging directory: {e}"),
        },
    })
}

/// Converts `path` for `RAROpenArchiveDataEx::ArcName`, keeping the raw
/// bytes on unix.
fn path_to_cstring(path: &Path) -> Option<CString> {
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;
        CString::new(path.as_os_str().as_bytes()).ok()
    }
    #[cfg(not(unix))]
    {
        CString::new(path.to_string_lossy().into_owned()).ok()
    }
}

impl Engine for NativeEngine {
    fn name(&self) -> &str {
        "unrar"
    }

    fn staging(&self) -> &dyn StagingArea {
        &self.staging
    }

    fn open(&self, path: &StagingPath) -> std::result::Result<Box<dyn ArchiveHandle>, EngineFault> {
        let file = self.staging.resolve(path);
        if !file.is_file() {
            return Err(EngineFault::Open);
        }
        let arc_name = path_to_cstring(&file).ok_or(EngineFault::Open)?;

        let state = Box::new(CallbackState {
            password: Arc::clone(&self.password),
            buffer: Vec::new(),
        });

        Ok(Box::new(NativeArchive {
            api: Arc::clone(&self.api),
            arc_name,
            handle: ptr::null_mut(),
            header: RARHeaderDataEx::boxed(),
            state: Box::into_raw(state),
            current: Current::None,
            payload_pending: false,
        }))
    }

    fn set_password(&self, password: &str) {
        *lock_or_recover(&self.password) = Password::new(password);
    }
}

/// State shared with the library callback.
struct CallbackState {
    password: Arc<Mutex<Password>>,
    buffer: Vec<u8>,
}

impl CallbackState {
    fn current_password(&self) -> Password {
        lock_or_recover(&self.password).clone()
    }
}

/// Callback for `RARSetCallback`.
///
/// # Safety
///
/// `user_data` must point to a live `CallbackState` that nothing else
/// accesses for the duration of the library call.
unsafe extern "system" fn unrar_callback(
    msg: c_uint,
    user_data: LParam,
    p1: LParam,
    p2: LParam,
) -> c_int {
    // SAFETY: guaranteed by the caller contract above.
    let state = unsafe { &mut *(user_data as *mut CallbackState) };

    match msg {
        ffi::UCM_PROCESSDATA => {
            if p1 != 0 && p2 > 0 {
                // SAFETY: the library passes a buffer of p2 readable bytes.
                let chunk = unsafe { std::slice::from_raw_parts(p1 as *const u8, p2 as usize) };
                state.buffer.extend_from_slice(chunk);
            }
            1
        }
        ffi::UCM_NEEDPASSWORD => {
            let password = state.current_password();
            if password.is_empty() || p1 == 0 || p2 <= 0 {
                return -1;
            }
            let bytes = password.to_c_bytes();
            let capacity = p2 as usize;
            let len = (bytes.len() - 1).min(capacity - 1);
            // SAFETY: the library passes a writable buffer of p2 chars.
            unsafe {
                let dst = p1 as *mut c_char;
                ptr::copy_nonoverlapping(bytes.as_ptr() as *const c_char, dst, len);
                *dst.add(len) = 0;
            }
            1
        }
        ffi::UCM_NEEDPASSWORDW => {
            let password = state.current_password();
            if password.is_empty() || p1 == 0 || p2 <= 0 {
                return -1;
            }
            let wide = encode_wide(password.as_str());
            let capacity = p2 as usize;
            let len = wide.len().min(capacity - 1);
            // SAFETY: the library passes a writable buffer of p2 wide chars.
            unsafe {
                let dst = p1 as *mut WChar;
                ptr::copy_nonoverlapping(wide.as_ptr(), dst, len);
                *dst.add(len) = 0;
            }
            1
        }
        // Multi-volume archives are not supported: refuse to switch volumes.
        ffi::UCM_CHANGEVOLUME | ffi::UCM_CHANGEVOLUMEW => -1,
        _ => 0,
    }
}

fn encode_wide(s: &str) -> Vec<WChar> {
    #[cfg(windows)]
    {
        s.encode_utf16().collect()
    }
    #[cfg(not(windows))]
    {
        s.chars().map(|c| c as WChar).collect()
    }
}

/// Metadata of the record under the read position.
enum Current {
    None,
    File {
        name: String,
        size: u64,
        flags: c_uint,
    },
    EndOfArchive,
}

/// One archive opened through the UnRAR library.
struct NativeArchive {
    api: Arc<UnrarApi>,
    arc_name: CString,
    handle: Handle,
    header: Box<RARHeaderDataEx>,
    state: *mut CallbackState,
    current: Current,
    payload_pending: bool,
}

// SAFETY: the library handle and callback state are only touched through
// `&mut self`, so a `NativeArchive` is used by one thread at a time.
unsafe impl Send for NativeArchive {}

impl NativeArchive {
    fn process(&mut self, operation: c_int) -> c_int {
        // SAFETY: `handle` is open (checked by callers) and the callback state
        // outlives the call.
        unsafe { (self.api.process_file)(self.handle, operation, ptr::null(), ptr::null()) }
    }

    fn is_encrypted_flag(&self) -> bool {
        matches!(self.current, Current::File { flags, .. } if flags & ffi::RHDF_ENCRYPTED != 0)
    }
}

impl ArchiveHandle for NativeArchive {
    fn is_archive(&mut self) -> std::result::Result<bool, EngineFault> {
        if !self.handle.is_null() {
            return Ok(true);
        }

        let mut request = RAROpenArchiveDataEx::zeroed();
        request.ArcName = self.arc_name.as_ptr();
        request.OpenMode = ffi::RAR_OM_EXTRACT;
        request.Callback = Some(unrar_callback);
        request.UserData = self.state as LParam;

        // SAFETY: `request` is fully initialized and `arc_name` outlives it.
        let handle = unsafe { (self.api.open_archive_ex)(&mut request) };
        let result = request.OpenResult as c_int;

        if handle.is_null() || result != ffi::ERAR_SUCCESS {
            if !handle.is_null() {
                // SAFETY: the handle came from RAROpenArchiveEx.
                unsafe { (self.api.close_archive)(handle) };
            }
            return match fault_from_code(result) {
                fault @ (EngineFault::MissingPassword | EngineFault::BadPassword) => Err(fault),
                fault => {
                    log::debug!("UnRAR rejected archive: {fault}");
                    Ok(false)
                }
            };
        }

        self.handle = handle;
        // SAFETY: the handle is open and the state pointer is live.
        unsafe { (self.api.set_callback)(self.handle, Some(unrar_callback), self.state as LParam) };
        Ok(true)
    }

    fn read_header(&mut self) -> std::result::Result<bool, EngineFault> {
        if self.handle.is_null() || matches!(self.current, Current::EndOfArchive) {
            return Ok(false);
        }
        if self.payload_pending {
            self.seek_to_next()?;
        }

        // SAFETY: `handle` is open and `header` points to a zeroed struct of
        // the size the library expects.
        let code = unsafe { (self.api.read_header_ex)(self.handle, &mut *self.header) };
        match code {
            ffi::ERAR_SUCCESS => {
                self.current = Current::File {
                    name: self.header.file_name(),
                    size: self.header.unpacked_size(),
                    flags: self.header.Flags,
                };
                self.payload_pending = true;
                Ok(true)
            }
            ffi::ERAR_END_ARCHIVE => {
                self.current = Current::EndOfArchive;
                Ok(true)
            }
            code => {
                self.current = Current::None;
                Err(fault_from_code(code))
            }
        }
    }

    fn header_kind(&self) -> HeaderKind {
        match self.current {
            Current::EndOfArchive => HeaderKind::EndOfArchive,
            Current::File { .. } => HeaderKind::File,
            Current::None => HeaderKind::Other(0),
        }
    }

    fn file_name(&self) -> String {
        match &self.current {
            Current::File { name, .. } => name.clone(),
            _ => String::new(),
        }
    }

    fn file_size(&self) -> u64 {
        match self.current {
            Current::File { size, .. } => size,
            _ => 0,
        }
    }

    fn is_directory(&self) -> bool {
        matches!(self.current, Current::File { flags, .. } if flags & ffi::RHDF_DIRECTORY != 0)
    }

    fn is_encrypted(&self) -> bool {
        self.is_encrypted_flag()
    }

    fn read_file_data(&mut self) -> std::result::Result<&[u8], EngineFault> {
        if !self.payload_pending {
            return Err(EngineFault::Unsupported("payload already consumed".into()));
        }

        let hint = usize::try_from(self.file_size()).unwrap_or(0).min(64 * 1024 * 1024);
        {
            // SAFETY: no library call is in progress.
            let state = unsafe { &mut *self.state };
            state.buffer.clear();
            state.buffer.reserve(hint);
        }

        let code = self.process(ffi::RAR_TEST);
        self.payload_pending = false;

        // SAFETY: the library call has returned; the buffer lives until the
        // next `&mut self` call.
        let state = unsafe { &*self.state };
        match code {
            ffi::ERAR_SUCCESS => Ok(&state.buffer),
            code => Err(fault_from_code(code)),
        }
    }

    fn seek_to_next(&mut self) -> std::result::Result<(), EngineFault> {
        if self.payload_pending {
            self.payload_pending = false;
            let code = self.process(ffi::RAR_SKIP);
            if code != ffi::ERAR_SUCCESS {
                return Err(fault_from_code(code));
            }
        }
        if !matches!(self.current, Current::EndOfArchive) {
            self.current = Current::None;
        }
        Ok(())
    }
}

impl Drop for NativeArchive {
    fn drop(&mut self) {
        if !self.handle.is_null() {
            // SAFETY: the handle came from RAROpenArchiveEx and is closed once.
            let code = unsafe { (self.api.close_archive)(self.handle) };
            if code != ffi::ERAR_SUCCESS {
                log::warn!("RARCloseArchive failed: {}", fault_from_code(code));
            }
            self.handle = ptr::null_mut();
        }
        // SAFETY: created by Box::into_raw in `NativeEngine::open`; the
        // library no longer references it after close.
        drop(unsafe { Box::from_raw(self.state) });
    }
}

/// Maps an `ERAR_*` status code to an [`EngineFault`].
pub(crate) fn fault_from_code(code: c_int) -> EngineFault {
    match code {
        ffi::ERAR_NO_MEMORY => EngineFault::NoMemory,
        ffi::ERAR_BAD_DATA => EngineFault::BadData,
        ffi::ERAR_BAD_ARCHIVE => EngineFault::BadArchive,
        ffi::ERAR_UNKNOWN_FORMAT => EngineFault::UnknownFormat,
        ffi::ERAR_EOPEN => EngineFault::Open,
        ffi::ERAR_EREAD => EngineFault::Read,
        ffi::ERAR_MISSING_PASSWORD => EngineFault::MissingPassword,
        ffi::ERAR_BAD_PASSWORD => EngineFault::BadPassword,
        ffi::ERAR_LARGE_DICT => EngineFault::Unsupported("dictionary too large".into()),
        ffi::ERAR_EREFERENCE => EngineFault::Unsupported("file reference".into()),
        code => EngineFault::Other(code),
    }
}
