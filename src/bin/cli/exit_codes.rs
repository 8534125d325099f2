//! Exit codes for the CLI tool.

use unrar_session::{Error, ErrorCategory};

/// Exit code constants
pub const SUCCESS: i32 = 0;
/// Operation completed with warnings
pub const WARNING: i32 = 1;
/// Fatal error occurred
pub const FATAL_ERROR: i32 = 2;
/// Archive format error
pub const BAD_ARCHIVE: i32 = 3;
/// Wrong or missing password
pub const WRONG_PASSWORD: i32 = 4;
/// I/O error
pub const IO_ERROR: i32 = 5;
/// The UnRAR library could not be loaded
pub const ENGINE_UNAVAILABLE: i32 = 6;
/// Invalid command line arguments
pub const BAD_ARGS: i32 = 255;

/// Exit code enum for structured handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    Warning,
    FatalError,
    BadArchive,
    WrongPassword,
    IoError,
    EngineUnavailable,
    BadArgs,
}

impl ExitCode {
    /// Returns the numeric exit code
    pub fn code(self) -> i32 {
        match self {
            Self::Success => SUCCESS,
            Self::Warning => WARNING,
            Self::FatalError => FATAL_ERROR,
            Self::BadArchive => BAD_ARCHIVE,
            Self::WrongPassword => WRONG_PASSWORD,
            Self::IoError => IO_ERROR,
            Self::EngineUnavailable => ENGINE_UNAVAILABLE,
            Self::BadArgs => BAD_ARGS,
        }
    }
}

/// Converts a library error to an exit code
pub fn error_to_exit_code(error: &Error) -> ExitCode {
    match error.category() {
        ErrorCategory::EngineLoad => ExitCode::EngineUnavailable,
        ErrorCategory::Open | ErrorCategory::Format => ExitCode::BadArchive,
        ErrorCategory::Decryption => ExitCode::WrongPassword,
        ErrorCategory::Io => ExitCode::IoError,
        ErrorCategory::Destination | ErrorCategory::Extraction | ErrorCategory::Usage => {
            ExitCode::FatalError
        }
    }
}
