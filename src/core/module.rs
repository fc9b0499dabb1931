//! Purpose: Loaded-module records and the counted leases that keep them alive.
//! Exports: `LoadedModule`, `Lease`.
//! Role: Shared between the module cache, serving workers, and the reaper.
//! Invariants: The reference count never goes below zero.
//! Invariants: Each `Lease` releases its count exactly once, on drop.
//! Invariants: The native handle is only taken by the reaper, under the cache lock.
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use tracing::warn;

use crate::core::registry::ServiceDescriptor;

pub struct LoadedModule<H> {
    descriptor: Arc<ServiceDescriptor>,
    handle: RwLock<Option<H>>,
    refs: AtomicU32,
    self_managed: AtomicBool,
}

impl<H> LoadedModule<H> {
    /// Creates the record with a count of one and hands that count to the creator.
    pub(crate) fn create(descriptor: Arc<ServiceDescriptor>, handle: H) -> Lease<H> {
        let module = Arc::new(Self {
            descriptor,
            handle: RwLock::new(Some(handle)),
            refs: AtomicU32::new(1),
            self_managed: AtomicBool::new(false),
        });
        Lease { module }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    pub fn is_pinned(&self) -> bool {
        self.descriptor.pinned
    }

    pub fn ref_count(&self) -> u32 {
        self.refs.load(Ordering::Acquire)
    }

    pub fn is_self_managed(&self) -> bool {
        self.self_managed.load(Ordering::Acquire)
    }

    pub(crate) fn mark_self_managed(&self) {
        self.self_managed.store(true, Ordering::Release);
    }

    pub fn is_loaded(&self) -> bool {
        self.read_handle().is_some()
    }

    fn acquire(&self) {
        self.refs.fetch_add(1, Ordering::AcqRel);
    }

    fn release(&self) {
        let released = self
            .refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |refs| refs.checked_sub(1));
        if released.is_err() {
            warn!(module = self.name(), "reference count released below zero");
        }
    }

    /// Runs `f` against the native handle; `None` once the module has been unloaded.
    pub(crate) fn with_handle<R>(&self, f: impl FnOnce(&H) -> R) -> Option<R> {
        self.read_handle().as_ref().map(f)
    }

    pub(crate) fn take_handle(&self) -> Option<H> {
        self.handle
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    fn read_handle(&self) -> std::sync::RwLockReadGuard<'_, Option<H>> {
        self.handle
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<H> fmt::Debug for LoadedModule<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModule")
            .field("name", &self.descriptor.name)
            .field("refs", &self.ref_count())
            .field("self_managed", &self.is_self_managed())
            .field("pinned", &self.descriptor.pinned)
            .finish()
    }
}

/// One counted hold on a loaded module. Cloning takes another hold.
pub struct Lease<H> {
    module: Arc<LoadedModule<H>>,
}

impl<H> Lease<H> {
    pub(crate) fn acquire(module: &Arc<LoadedModule<H>>) -> Self {
        module.acquire();
        Self {
            module: Arc::clone(module),
        }
    }

    pub fn module(&self) -> &Arc<LoadedModule<H>> {
        &self.module
    }

    /// Gives the hold back; equivalent to dropping the lease.
    pub fn release(self) {}
}

impl<H> Clone for Lease<H> {
    fn clone(&self) -> Self {
        Self::acquire(&self.module)
    }
}

impl<H> Drop for Lease<H> {
    fn drop(&mut self) {
        self.module.release();
    }
}

impl<H> fmt::Debug for Lease<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Lease").field(&self.module).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn descriptor(pinned: bool) -> Arc<ServiceDescriptor> {
        Arc::new(ServiceDescriptor {
            name: "/svc.test".to_string(),
            library: PathBuf::from("libtest.so"),
            interface: "test".to_string(),
            pinned,
        })
    }

    #[test]
    fn leases_count_holds() {
        let first = LoadedModule::create(descriptor(false), ());
        let module = Arc::clone(first.module());
        assert_eq!(module.ref_count(), 1);

        let second = first.clone();
        let third = Lease::acquire(&module);
        assert_eq!(module.ref_count(), 3);

        drop(first);
        second.release();
        assert_eq!(module.ref_count(), 1);
        drop(third);
        assert_eq!(module.ref_count(), 0);
    }

    #[test]
    fn release_saturates_at_zero() {
        let lease = LoadedModule::create(descriptor(false), ());
        let module = Arc::clone(lease.module());
        drop(lease);
        module.release();
        assert_eq!(module.ref_count(), 0);
    }

    #[test]
    fn handle_is_taken_once() {
        let lease = LoadedModule::create(descriptor(true), 42u32);
        let module = lease.module();
        assert!(module.is_pinned());
        assert_eq!(module.with_handle(|h| *h + 1), Some(43));
        assert_eq!(module.take_handle(), Some(42));
        assert_eq!(module.take_handle(), None);
        assert!(!module.is_loaded());
        assert_eq!(module.with_handle(|h| *h), None);
    }

    #[test]
    fn self_managed_flag_sticks() {
        let lease = LoadedModule::create(descriptor(false), ());
        assert!(!lease.module().is_self_managed());
        lease.module().mark_self_managed();
        assert!(lease.module().is_self_managed());
    }
}
