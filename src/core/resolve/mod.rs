//! Purpose: Turn an absolute resource path into an open descriptor.
//! Exports: `ResolutionChain`, `Resolver`, `Resolution`, `ResolveContext`,
//! `ServiceResolver`, `FsResolver`.
//! Role: Chain of responsibility run by `Broker::resolve`.
//! Invariants: Relative and empty paths never reach a resolver.
//! Invariants: Only `NotApplicable` advances the chain; any result short-circuits it.
//! Invariants: The whole chain runs under one lock, serializing all resolutions.
use std::os::fd::OwnedFd;
use std::path::Path;
use std::sync::Mutex;

use crate::core::cache::ModuleCache;
use crate::core::error::{Error, ErrorKind};
use crate::core::flags::OpenFlags;
use crate::core::loader::ModuleLoader;
use crate::core::registry::Registry;

mod fs;
mod service;

pub use fs::FsResolver;
pub use service::ServiceResolver;

pub enum Resolution {
    Applicable(Result<OwnedFd, Error>),
    NotApplicable,
}

/// Shared state a resolver may consult.
pub struct ResolveContext<'a, L: ModuleLoader> {
    pub registry: &'a Registry,
    pub cache: &'a ModuleCache<L>,
}

pub trait Resolver<L: ModuleLoader>: Send + Sync {
    fn name(&self) -> &'static str;
    fn try_resolve(
        &self,
        cx: &ResolveContext<'_, L>,
        path: &Path,
        flags: OpenFlags,
    ) -> Resolution;
}

pub struct ResolutionChain<L: ModuleLoader> {
    resolvers: Vec<Box<dyn Resolver<L>>>,
    lock: Mutex<()>,
}

impl<L: ModuleLoader> ResolutionChain<L> {
    /// Services first, then the real filesystem.
    pub fn standard() -> Self {
        Self::with_resolvers(vec![Box::new(ServiceResolver), Box::new(FsResolver)])
    }

    pub fn with_resolvers(resolvers: Vec<Box<dyn Resolver<L>>>) -> Self {
        Self {
            resolvers,
            lock: Mutex::new(()),
        }
    }

    pub fn resolve(
        &self,
        cx: &ResolveContext<'_, L>,
        path: &Path,
        flags: OpenFlags,
    ) -> Result<OwnedFd, Error> {
        if !path.is_absolute() {
            return Err(Error::new(ErrorKind::NotFound)
                .with_message("path must be absolute")
                .with_path(path));
        }

        let _guard = self
            .lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for resolver in &self.resolvers {
            match resolver.try_resolve(cx, path, flags) {
                Resolution::Applicable(result) => {
                    tracing::trace!(
                        resolver = resolver.name(),
                        path = %path.display(),
                        ok = result.is_ok(),
                        "path resolved"
                    );
                    return result;
                }
                Resolution::NotApplicable => continue,
            }
        }
        Err(Error::new(ErrorKind::NotFound).with_path(path))
    }
}
