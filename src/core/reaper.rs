//! Purpose: Reclaim cached modules that no longer have clients.
//! Exports: `sweep`.
//! Role: On-demand pass invoked by hosts through `cleanup`.
//! Invariants: Pinned modules are never unloaded.
//! Invariants: A module with outstanding leases is never unloaded.
//! Invariants: Self-managed modules are unloaded only on a client count of exactly zero.
use tracing::debug;

use crate::core::cache::ModuleCache;
use crate::core::loader::ModuleLoader;

/// Unloads every eligible module and returns how many were unloaded.
pub fn sweep<L: ModuleLoader>(cache: &ModuleCache<L>) -> usize {
    let loader = cache.loader();
    let mut modules = cache.lock();
    let mut unloaded = 0;

    modules.retain(|name, module| {
        if module.is_pinned() {
            return true;
        }
        let refs = module.ref_count();
        if refs > 0 {
            return true;
        }
        if module.is_self_managed() {
            let symbol = module.descriptor().count_symbol();
            let reported = module
                .with_handle(|handle| loader.client_count(handle, &symbol))
                .flatten();
            match reported {
                Some(0) => {}
                Some(clients) => {
                    debug!(service = %name, clients, "module still has clients");
                    return true;
                }
                None => {
                    debug!(service = %name, "client count unavailable; keeping module");
                    return true;
                }
            }
        }

        if let Some(handle) = module.take_handle() {
            loader.unload(handle);
        }
        debug!(service = %name, "module unloaded");
        unloaded += 1;
        false
    });

    unloaded
}
