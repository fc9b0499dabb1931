//! Purpose: The injectable broker context: one registry, one cache, one chain.
//! Exports: `Broker`.
//! Role: Public entry point for Rust hosts; the C ABI wraps one process-global instance.
//! Invariants: The registry is installed at most once per broker.
//! Invariants: Independent brokers share no state, so tests may create many.
use std::ffi::OsStr;
use std::os::fd::OwnedFd;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use tracing::debug;

use crate::core::cache::ModuleCache;
use crate::core::dirs::{DirKind, Directories, SystemDirectories};
use crate::core::error::{Error, ErrorKind};
use crate::core::flags::{InitFlags, OpenFlags};
use crate::core::loader::{ModuleLoader, NativeLoader};
use crate::core::reaper;
use crate::core::registry::Registry;
use crate::core::resolve::{ResolutionChain, ResolveContext};

pub type ApiResult<T> = Result<T, Error>;

pub struct Broker<L: ModuleLoader = NativeLoader> {
    registry: OnceLock<Registry>,
    init_lock: Mutex<()>,
    cache: ModuleCache<L>,
    chain: ResolutionChain<L>,
    dirs: Box<dyn Directories>,
}

impl Broker<NativeLoader> {
    pub fn new() -> Self {
        Self::with_parts(NativeLoader, SystemDirectories::new())
    }
}

impl Default for Broker<NativeLoader> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ModuleLoader> Broker<L> {
    pub fn with_parts(loader: L, dirs: impl Directories + 'static) -> Self {
        Self {
            registry: OnceLock::new(),
            init_lock: Mutex::new(()),
            cache: ModuleCache::new(loader),
            chain: ResolutionChain::standard(),
            dirs: Box::new(dirs),
        }
    }

    pub fn with_chain(mut self, chain: ResolutionChain<L>) -> Self {
        self.chain = chain;
        self
    }

    /// Loads the manifest described by `flags` and `source` (a path, or the manifest
    /// text). Fails if this broker already has a registry, before looking at the arguments.
    pub fn initialize(&self, flags: InitFlags, source: impl AsRef<OsStr>) -> ApiResult<()> {
        let source = source.as_ref();
        self.initialize_with(|| Registry::load(flags, source, self.dirs.as_ref()))
    }

    /// As `initialize`, with flags in their host bit layout.
    pub fn initialize_bits(&self, bits: u32, source: impl AsRef<OsStr>) -> ApiResult<()> {
        let source = source.as_ref();
        self.initialize_with(|| {
            let flags = InitFlags::from_bits(bits)?;
            Registry::load(flags, source, self.dirs.as_ref())
        })
    }

    /// Installs an already validated registry.
    pub fn install(&self, registry: Registry) -> ApiResult<()> {
        self.initialize_with(|| Ok(registry))
    }

    fn initialize_with(&self, build: impl FnOnce() -> ApiResult<Registry>) -> ApiResult<()> {
        let _guard = self
            .init_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.registry.get().is_some() {
            return Err(already_initialized());
        }
        let registry = build()?;
        debug!(
            services = registry.services().count(),
            launches = registry.launches().count(),
            interfaces_dir = %registry.interfaces_dir().display(),
            "registry initialized"
        );
        self.registry
            .set(registry)
            .map_err(|_| already_initialized())
    }

    pub fn is_initialized(&self) -> bool {
        self.registry.get().is_some()
    }

    pub fn registry(&self) -> Option<&Registry> {
        self.registry.get()
    }

    /// Resolves an absolute path to a descriptor owned by the caller.
    pub fn resolve(&self, path: impl AsRef<Path>, flags: OpenFlags) -> ApiResult<OwnedFd> {
        let registry = self.registry.get().ok_or_else(|| {
            Error::new(ErrorKind::NotInitialized).with_message("broker is not initialized")
        })?;
        let cx = ResolveContext {
            registry,
            cache: &self.cache,
        };
        self.chain.resolve(&cx, path.as_ref(), flags)
    }

    /// Runs one reaper sweep and returns the number of modules unloaded.
    pub fn cleanup(&self) -> usize {
        reaper::sweep(&self.cache)
    }

    pub fn directory(&self, kind: DirKind) -> PathBuf {
        self.dirs.get(kind)
    }

    pub fn cache(&self) -> &ModuleCache<L> {
        &self.cache
    }
}

fn already_initialized() -> Error {
    Error::new(ErrorKind::AlreadyInitialized).with_message("broker is already initialized")
}
