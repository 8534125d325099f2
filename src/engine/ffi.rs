//! Raw declarations of the UnRAR shared library API.
//!
//! Layouts and constants follow `dll.hpp` of the UnRAR library. Only the
//! subset used by [`super::native`] is declared. All functions use the
//! `PASCAL`/`CALLBACK` calling convention, which is `stdcall` on 32-bit
//! Windows and the C convention elsewhere, so they are declared
//! `extern "system"`.

#![allow(non_snake_case, missing_docs)]

use std::os::raw::{c_char, c_int, c_uint, c_void};

/// `wchar_t` as used by the library on this platform.
#[cfg(windows)]
pub type WChar = u16;
/// `wchar_t` as used by the library on this platform.
#[cfg(not(windows))]
pub type WChar = i32;

/// `LPARAM`: pointer-sized user data.
pub type LParam = isize;

/// Opaque archive handle returned by `RAROpenArchiveEx`.
pub type Handle = *mut c_void;

pub const ERAR_SUCCESS: c_int = 0;
pub const ERAR_END_ARCHIVE: c_int = 10;
pub const ERAR_NO_MEMORY: c_int = 11;
pub const ERAR_BAD_DATA: c_int = 12;
pub const ERAR_BAD_ARCHIVE: c_int = 13;
pub const ERAR_UNKNOWN_FORMAT: c_int = 14;
pub const ERAR_EOPEN: c_int = 15;
pub const ERAR_ECREATE: c_int = 16;
pub const ERAR_ECLOSE: c_int = 17;
pub const ERAR_EREAD: c_int = 18;
pub const ERAR_EWRITE: c_int = 19;
pub const ERAR_SMALL_BUF: c_int = 20;
pub const ERAR_UNKNOWN: c_int = 21;
pub const ERAR_MISSING_PASSWORD: c_int = 22;
pub const ERAR_EREFERENCE: c_int = 23;
pub const ERAR_BAD_PASSWORD: c_int = 24;
pub const ERAR_LARGE_DICT: c_int = 25;

pub const RAR_OM_EXTRACT: c_uint = 1;

pub const RAR_SKIP: c_int = 0;
pub const RAR_TEST: c_int = 1;

pub const UCM_CHANGEVOLUME: c_uint = 0;
pub const UCM_PROCESSDATA: c_uint = 1;
pub const UCM_NEEDPASSWORD: c_uint = 2;
pub const UCM_CHANGEVOLUMEW: c_uint = 3;
pub const UCM_NEEDPASSWORDW: c_uint = 4;

/// Header flag: the payload is encrypted.
pub const RHDF_ENCRYPTED: c_uint = 0x04;
/// Header flag: the entry is a directory.
pub const RHDF_DIRECTORY: c_uint = 0x20;

/// Callback installed with `RARSetCallback` or `RAROpenArchiveDataEx`.
pub type UnrarCallback =
    Option<unsafe extern "system" fn(msg: c_uint, user_data: LParam, p1: LParam, p2: LParam) -> c_int>;

/// `struct RAROpenArchiveDataEx`.
#[repr(C)]
pub struct RAROpenArchiveDataEx {
    pub ArcName: *const c_char,
    pub ArcNameW: *const WChar,
    pub OpenMode: c_uint,
    pub OpenResult: c_uint,
    pub CmtBuf: *mut c_char,
    pub CmtBufSize: c_uint,
    pub CmtSize: c_uint,
    pub CmtState: c_uint,
    pub Flags: c_uint,
    pub Callback: UnrarCallback,
    pub UserData: LParam,
    pub OpFlags: c_uint,
    pub CmtBufW: *mut WChar,
    pub MarkOfTheWeb: *mut WChar,
    pub Reserved: [c_uint; 23],
}

/// `struct RARHeaderDataEx`.
#[repr(C)]
pub struct RARHeaderDataEx {
    pub ArcName: [c_char; 1024],
    pub ArcNameW: [WChar; 1024],
    pub FileName: [c_char; 1024],
    pub FileNameW: [WChar; 1024],
    pub Flags: c_uint,
    pub PackSize: c_uint,
    pub PackSizeHigh: c_uint,
    pub UnpSize: c_uint,
    pub UnpSizeHigh: c_uint,
    pub HostOS: c_uint,
    pub FileCRC: c_uint,
    pub FileTime: c_uint,
    pub UnpVer: c_uint,
    pub Method: c_uint,
    pub FileAttr: c_uint,
    pub CmtBuf: *mut c_char,
    pub CmtBufSize: c_uint,
    pub CmtSize: c_uint,
    pub CmtState: c_uint,
    pub DictSize: c_uint,
    pub HashType: c_uint,
    pub Hash: [c_char; 32],
    pub RedirType: c_uint,
    pub RedirName: *mut WChar,
    pub RedirNameSize: c_uint,
    pub DirTarget: c_uint,
    pub MtimeLow: c_uint,
    pub MtimeHigh: c_uint,
    pub CtimeLow: c_uint,
    pub CtimeHigh: c_uint,
    pub AtimeLow: c_uint,
    pub AtimeHigh: c_uint,
    pub ArcNameEx: *mut WChar,
    pub ArcNameExSize: c_uint,
    pub FileNameEx: *mut WChar,
    pub FileNameExSize: c_uint,
    pub Reserved: [c_uint; 982],
}

impl RAROpenArchiveDataEx {
    /// Returns a zero-initialized request.
    pub fn zeroed() -> Self {
        // SAFETY: every field is an integer, an integer array, a raw pointer
        // or an `Option` of a function pointer; all-zero is valid for each.
        unsafe { std::mem::zeroed() }
    }
}

impl RARHeaderDataEx {
    /// Returns a zero-initialized header on the heap.
    pub fn boxed() -> Box<Self> {
        // SAFETY: see `RAROpenArchiveDataEx::zeroed`.
        Box::new(unsafe { std::mem::zeroed() })
    }

    /// Declared unpacked size, combining the high and low halves.
    pub fn unpacked_size(&self) -> u64 {
        (u64::from(self.UnpSizeHigh) << 32) | u64::from(self.UnpSize)
    }

    /// Entry name, preferring the wide field.
    pub fn file_name(&self) -> String {
        let wide = decode_wide(&self.FileNameW);
        if !wide.is_empty() {
            return wide;
        }
        decode_narrow(&self.FileName)
    }
}

pub type RAROpenArchiveExFn = unsafe extern "system" fn(*mut RAROpenArchiveDataEx) -> Handle;
pub type RARCloseArchiveFn = unsafe extern "system" fn(Handle) -> c_int;
pub type RARReadHeaderExFn = unsafe extern "system" fn(Handle, *mut RARHeaderDataEx) -> c_int;
pub type RARProcessFileFn =
    unsafe extern "system" fn(Handle, c_int, *const c_char, *const c_char) -> c_int;
pub type RARSetCallbackFn = unsafe extern "system" fn(Handle, UnrarCallback, LParam);
pub type RARGetDllVersionFn = unsafe extern "system" fn() -> c_int;

/// Decodes a NUL-terminated wide string buffer.
pub fn decode_wide(buf: &[WChar]) -> String {
    let end = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    let units = &buf[..end];

    #[cfg(windows)]
    {
        String::from_utf16_lossy(units)
    }

    #[cfg(not(windows))]
    {
        units
            .iter()
            .map(|&c| {
                u32::try_from(c)
                    .ok()
                    .and_then(char::from_u32)
                    .unwrap_or(char::REPLACEMENT_CHARACTER)
            })
            .collect()
    }
}

/// Decodes a NUL-terminated narrow string buffer.
pub fn decode_narrow(buf: &[c_char]) -> String {
    let bytes: Vec<u8> = buf
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}
