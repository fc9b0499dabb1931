//! Purpose: Load-once, use-many cache of service modules keyed by service name.
//! Exports: `ModuleCache`, `ModuleSnapshot`.
//! Role: Sole owner of `LoadedModule` records; hands out counted leases.
//! Invariants: At most one record per service name; creation happens under the lock.
//! Invariants: A failed load leaves the cache unchanged.
//! Invariants: Releasing a lease never unloads; only the reaper removes records.
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::core::error::{Error, ErrorKind};
use crate::core::loader::ModuleLoader;
use crate::core::module::{Lease, LoadedModule};
use crate::core::registry::Registry;

pub(crate) type ModuleMap<H> = HashMap<String, Arc<LoadedModule<H>>>;

/// Point-in-time view of one cached module.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ModuleSnapshot {
    pub name: String,
    pub refs: u32,
    pub self_managed: bool,
    pub pinned: bool,
}

pub struct ModuleCache<L: ModuleLoader> {
    loader: Arc<L>,
    modules: Mutex<ModuleMap<L::Handle>>,
}

impl<L: ModuleLoader> ModuleCache<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader: Arc::new(loader),
            modules: Mutex::new(HashMap::new()),
        }
    }

    pub fn loader(&self) -> &Arc<L> {
        &self.loader
    }

    /// Returns a lease on the named module, loading it first if needed. The lease is
    /// the caller's hold; drop it (or call `release`) when done.
    pub fn get_or_load(&self, registry: &Registry, name: &str) -> Result<Lease<L::Handle>, Error> {
        let mut modules = self.lock();
        if let Some(module) = modules.get(name) {
            return Ok(Lease::acquire(module));
        }

        let descriptor = registry.service(name).ok_or_else(|| {
            Error::new(ErrorKind::NotFound).with_message(format!("no service named '{name}'"))
        })?;
        let path = registry.library_path(descriptor);
        let handle = self.loader.load(&path).map_err(|err| {
            if err.kind() == ErrorKind::UnableToLoad {
                err
            } else {
                Error::new(ErrorKind::UnableToLoad)
                    .with_path(&path)
                    .with_source(err)
            }
        })?;
        debug!(service = name, path = %path.display(), "module loaded");

        let lease = LoadedModule::create(Arc::clone(descriptor), handle);
        modules.insert(name.to_string(), Arc::clone(lease.module()));
        Ok(lease)
    }

    pub fn release(&self, lease: Lease<L::Handle>) {
        lease.release();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn get(&self, name: &str) -> Option<Arc<LoadedModule<L::Handle>>> {
        self.lock().get(name).cloned()
    }

    /// Snapshot of every cached module, sorted by name.
    pub fn loaded(&self) -> Vec<ModuleSnapshot> {
        let mut out: Vec<ModuleSnapshot> = self
            .lock()
            .values()
            .map(|module| ModuleSnapshot {
                name: module.name().to_string(),
                refs: module.ref_count(),
                self_managed: module.is_self_managed(),
                pinned: module.is_pinned(),
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ModuleMap<L::Handle>> {
        self.modules
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::flags::ManifestShape;
    use crate::core::testing::FakeLoader;
    use std::sync::Barrier;
    use std::sync::atomic::Ordering;

    fn registry() -> Registry {
        Registry::parse(
            r#"{"interfaces": {
                "/svc.a": {"library": "liba.so", "interface": "a"},
                "/svc.bad": {"library": "libbad.so", "interface": "bad"}
            }}"#,
            ManifestShape::Bare,
            "/ifaces",
        )
        .expect("registry")
    }

    #[test]
    fn first_lookup_loads_and_later_lookups_reuse() {
        let registry = registry();
        let cache = ModuleCache::new(FakeLoader::default());

        let first = cache.get_or_load(&registry, "/svc.a").expect("load");
        assert_eq!(first.module().ref_count(), 1);
        let second = cache.get_or_load(&registry, "/svc.a").expect("reuse");
        assert!(Arc::ptr_eq(first.module(), second.module()));
        assert_eq!(second.module().ref_count(), 2);
        assert_eq!(cache.loader().loads.load(Ordering::SeqCst), 1);
        assert_eq!(
            cache.loader().last_path().as_deref(),
            Some(std::path::Path::new("/ifaces/liba.so"))
        );

        cache.release(first);
        drop(second);
        let module = cache.get("/svc.a").expect("cached");
        assert_eq!(module.ref_count(), 0);
        assert!(module.is_loaded());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn unknown_name_is_not_found() {
        let cache = ModuleCache::new(FakeLoader::default());
        let err = cache.get_or_load(&registry(), "/svc.none").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(cache.is_empty());
    }

    #[test]
    fn failed_load_leaves_cache_unchanged() {
        let cache = ModuleCache::new(FakeLoader::failing_on("libbad.so"));
        let err = cache.get_or_load(&registry(), "/svc.bad").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnableToLoad);
        assert!(cache.is_empty());
        assert_eq!(cache.loader().loads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn concurrent_lookups_load_once() {
        let registry = Arc::new(registry());
        let cache = Arc::new(ModuleCache::new(FakeLoader::default()));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let cache = Arc::clone(&cache);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    let lease = cache.get_or_load(&registry, "/svc.a").expect("load");
                    lease.module().ref_count()
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().expect("join") >= 1);
        }

        assert_eq!(cache.loader().loads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.loaded()[0].refs, 0);
    }
}
