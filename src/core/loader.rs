//! Purpose: Abstract the platform's module loading primitives behind one trait.
//! Exports: `ModuleLoader`, `ServeOutcome`, `NativeLoader`.
//! Role: Seam between broker bookkeeping and `dlopen`-style native calls.
//! Invariants: `serve` takes ownership of the endpoint; it is closed if no entry exists.
//! Invariants: A missing symbol is never confused with a module-reported failure.
use std::os::fd::{IntoRawFd, OwnedFd};
use std::os::raw::c_int;
use std::path::Path;

use libloading::{Library, Symbol};
use tracing::{debug, warn};

use crate::core::error::{Error, ErrorKind};

/// Result of one serve call, as seen by the serving worker.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ServeOutcome {
    /// The module tracks its own clients from now on.
    SelfManaged,
    Handled,
    EntryNotFound,
    Failed(i32),
}

impl ServeOutcome {
    /// Classifies a serve entry point's return value.
    pub fn from_status(status: i32) -> Self {
        match status {
            1 => ServeOutcome::SelfManaged,
            status if status >= 0 => ServeOutcome::Handled,
            status => ServeOutcome::Failed(status),
        }
    }
}

pub trait ModuleLoader: Send + Sync + 'static {
    type Handle: Send + Sync + 'static;

    fn load(&self, path: &Path) -> Result<Self::Handle, Error>;
    fn serve(&self, handle: &Self::Handle, symbol: &str, endpoint: OwnedFd) -> ServeOutcome;
    /// `None` when the count cannot be obtained; callers must then assume clients exist.
    fn client_count(&self, handle: &Self::Handle, symbol: &str) -> Option<u32>;
    fn unload(&self, handle: Self::Handle);
}

type ServeFn = unsafe extern "C" fn(sockfd: c_int, flags: c_int) -> c_int;
type CountFn = unsafe extern "C" fn() -> c_int;

// Entry points may return -2 themselves; it must not read as "symbol missing".
const RESERVED_NOT_FOUND: c_int = -2;

/// `dlopen`/`dlsym`/`dlclose` through `libloading`.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeLoader;

impl ModuleLoader for NativeLoader {
    type Handle = Library;

    fn load(&self, path: &Path) -> Result<Library, Error> {
        // SAFETY: Loading runs the library's initialisers; manifests only name trusted modules.
        unsafe { Library::new(path) }.map_err(|err| {
            warn!(path = %path.display(), error = %err, "module load failed");
            Error::new(ErrorKind::UnableToLoad)
                .with_message("unable to load module")
                .with_path(path)
                .with_source(err)
        })
    }

    fn serve(&self, handle: &Library, symbol: &str, endpoint: OwnedFd) -> ServeOutcome {
        // SAFETY: Serve entry points are `int (*)(int, int)` by contract.
        let entry: Symbol<ServeFn> = match unsafe { handle.get(symbol.as_bytes()) } {
            Ok(entry) => entry,
            Err(err) => {
                debug!(symbol, error = %err, "serve entry point missing");
                return ServeOutcome::EntryNotFound;
            }
        };
        let fd = endpoint.into_raw_fd();
        // SAFETY: The module takes ownership of `fd`; the library stays loaded while a
        // lease on it is held.
        let status = unsafe { entry(fd, 0) };
        if status == RESERVED_NOT_FOUND {
            return ServeOutcome::Failed(-1);
        }
        ServeOutcome::from_status(status)
    }

    fn client_count(&self, handle: &Library, symbol: &str) -> Option<u32> {
        // SAFETY: Count entry points are `int (*)(void)` by contract.
        let entry: Symbol<CountFn> = match unsafe { handle.get(symbol.as_bytes()) } {
            Ok(entry) => entry,
            Err(err) => {
                debug!(symbol, error = %err, "client count entry point missing");
                return None;
            }
        };
        // SAFETY: See above; called under the cache lock with no lease outstanding.
        let count = unsafe { entry() };
        u32::try_from(count).ok()
    }

    fn unload(&self, handle: Library) {
        if let Err(err) = handle.close() {
            warn!(error = %err, "module unload failed");
        }
    }
}
