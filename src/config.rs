//! Engine configuration.
//!
//! [`EngineConfig`] decides where the native UnRAR library is looked up and
//! where archives are staged. It is built like the other option structs of
//! the crate:
//!
//! ```rust
//! use unrar_session::EngineConfig;
//!
//! let config = EngineConfig::new()
//!     .library_path("/opt/unrar/libunrar.so")
//!     .search_dir("/usr/local/lib")
//!     .exe_dir_fallback(false);
//!
//! let candidates = config.library_candidates();
//! assert_eq!(candidates[0], std::path::Path::new("/opt/unrar/libunrar.so"));
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Environment variable naming the library file to load.
pub const ENV_LIBRARY_PATH: &str = "UNRAR_LIB_PATH";

/// Environment variable naming the parent directory for staged archives.
pub const ENV_STAGING_DIR: &str = "UNRAR_STAGING_DIR";

/// File names the UnRAR library is distributed under on this platform.
#[cfg(target_os = "windows")]
pub const LIBRARY_NAMES: &[&str] = &["UnRAR64.dll", "unrar.dll"];
/// File names the UnRAR library is distributed under on this platform.
#[cfg(target_os = "macos")]
pub const LIBRARY_NAMES: &[&str] = &["libunrar.dylib"];
/// File names the UnRAR library is distributed under on this platform.
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
pub const LIBRARY_NAMES: &[&str] = &["libunrar.so", "libunrar.so.5"];

/// Where to find the engine and where to stage archives.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    library_path: Option<PathBuf>,
    env_library_path: Option<PathBuf>,
    search_dirs: Vec<PathBuf>,
    staging_root: Option<PathBuf>,
    exe_dir_fallback: bool,
    system_fallback: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            library_path: None,
            env_library_path: None,
            search_dirs: Vec::new(),
            staging_root: None,
            exe_dir_fallback: true,
            system_fallback: true,
        }
    }
}

impl EngineConfig {
    /// Creates a configuration that only uses the default lookup locations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration from `UNRAR_LIB_PATH` and `UNRAR_STAGING_DIR`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var_os(key))
    }

    /// Creates a configuration using `lookup` in place of the process
    /// environment.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<OsString>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty()).map(PathBuf::from);
        Self {
            env_library_path: non_empty(ENV_LIBRARY_PATH),
            staging_root: non_empty(ENV_STAGING_DIR),
            ..Self::default()
        }
    }

    /// Loads exactly this library file before trying anything else.
    pub fn library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(path.into());
        self
    }

    /// Adds a directory to probe for the platform library names.
    pub fn search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dirs.push(dir.into());
        self
    }

    /// Replaces the list of directories to probe.
    pub fn search_dirs<I, P>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.search_dirs = dirs.into_iter().map(Into::into).collect();
        self
    }

    /// Stages archives in a private directory created under `dir`.
    pub fn staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_root = Some(dir.into());
        self
    }

    /// Whether to probe the directory of the running executable.
    pub fn exe_dir_fallback(mut self, enabled: bool) -> Self {
        self.exe_dir_fallback = enabled;
        self
    }

    /// Whether to finally hand the bare library names to the system loader.
    pub fn system_fallback(mut self, enabled: bool) -> Self {
        self.system_fallback = enabled;
        self
    }

    /// Parent directory for the staging area, if configured.
    pub fn staging_root(&self) -> Option<&Path> {
        self.staging_root.as_deref()
    }

    /// Returns the library locations to try, in order.
    ///
    /// 1. the explicit [`library_path`](Self::library_path)
    /// 2. `UNRAR_LIB_PATH` (when built with [`from_env`](Self::from_env))
    /// 3. each search directory joined with every [`LIBRARY_NAMES`] entry
    /// 4. the directory of the current executable
    /// 5. the bare names, resolved by the system loader
    ///
    /// Duplicates are removed, keeping the first occurrence.
    pub fn library_candidates(&self) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        candidates.extend(self.library_path.iter().cloned());
        candidates.extend(self.env_library_path.iter().cloned());

        let mut dirs = self.search_dirs.clone();
        if self.exe_dir_fallback {
            if let Some(dir) = exe_dir() {
                dirs.push(dir);
            }
        }
        for dir in &dirs {
            candidates.extend(LIBRARY_NAMES.iter().map(|name| dir.join(name)));
        }

        if self.system_fallback {
            candidates.extend(LIBRARY_NAMES.iter().map(PathBuf::from));
        }

        let mut seen = std::collections::HashSet::new();
        candidates.retain(|c| seen.insert(c.clone()));
        candidates
    }
}

fn exe_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}
