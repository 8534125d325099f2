//! Lazy, memoized engine initialization.
//!
//! An [`EngineLoader`] runs its factory at most once successfully. Callers
//! that arrive while initialization is in flight wait for the same attempt
//! and receive clones of the same [`EngineHandle`]. A failed attempt leaves
//! the loader empty, so the next caller retries.
//!
//! ```rust,no_run
//! # async fn demo() -> unrar_session::Result<()> {
//! let engine = unrar_session::loader::acquire_engine().await?;
//! let again = unrar_session::loader::acquire_engine().await?;
//! assert!(unrar_session::EngineHandle::ptr_eq(&engine, &again));
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::OnceCell;

use crate::engine::{Engine, EngineHandle};
use crate::{Error, Result};

type Factory = dyn Fn() -> Result<Arc<dyn Engine>> + Send + Sync;

/// Single-flight initializer for an engine.
pub struct EngineLoader {
    cell: OnceCell<EngineHandle>,
    factory: Arc<Factory>,
    attempts: AtomicUsize,
}

impl EngineLoader {
    /// Creates a loader that builds its engine with `factory`.
    ///
    /// The factory runs on tokio's blocking pool, since loading a shared
    /// library and creating its staging directory block.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn Engine>> + Send + Sync + 'static,
    {
        Self {
            cell: OnceCell::new(),
            factory: Arc::new(factory),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Returns the ready engine, initializing it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineLoad`] if the factory fails or panics.
    pub async fn acquire(&self) -> Result<EngineHandle> {
        let handle = self
            .cell
            .get_or_try_init(|| async {
                let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
                log::debug!("initializing engine (attempt {attempt})");

                let factory = Arc::clone(&self.factory);
                let engine = tokio::task::spawn_blocking(move || factory())
                    .await
                    .map_err(|e| Error::EngineLoad {
                        reason: format!("engine initialization aborted: {e}"),
                    })??;

                log::info!("engine '{}' ready", engine.name());
                Ok::<_, Error>(EngineHandle::new(engine))
            })
            .await?;
        Ok(handle.clone())
    }

    /// Returns the engine if it is already initialized.
    pub fn get(&self) -> Option<EngineHandle> {
        self.cell.get().cloned()
    }

    /// Returns true once an initialization attempt has succeeded.
    pub fn is_ready(&self) -> bool {
        self.cell.initialized()
    }

    /// Number of times the factory has been started.
    pub fn load_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for EngineLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineLoader")
            .field("ready", &self.is_ready())
            .field("load_count", &self.load_count())
            .finish()
    }
}

/// Returns the process-wide native engine.
///
/// The first call loads the UnRAR library using
/// [`EngineConfig::from_env`](crate::EngineConfig::from_env); later calls
/// return the same handle.
///
/// # Errors
///
/// Returns [`Error::EngineLoad`] if the library cannot be loaded. The next
/// call tries again.
#[cfg(feature = "native")]
#[cfg_attr(docsrs, doc(cfg(feature = "native")))]
pub async fn acquire_engine() -> Result<EngineHandle> {
    use std::sync::OnceLock;

    use crate::config::EngineConfig;
    use crate::engine::native::NativeEngine;

    static LOADER: OnceLock<EngineLoader> = OnceLock::new();

    let loader = LOADER.get_or_init(|| {
        EngineLoader::new(|| {
            let engine = NativeEngine::load(&EngineConfig::from_env())?;
            Ok(Arc::new(engine) as Arc<dyn Engine>)
        })
    });
    loader.acquire().await
}
