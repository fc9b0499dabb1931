//! Purpose: Run one serve call per resolved service on a detached thread.
//! Exports: `spawn_worker`.
//! Role: Hands the module its end of the channel and reports failures as diagnostics.
//! Invariants: The worker's lease is released exactly once, whatever the outcome.
//! Invariants: Failures never reach the resolving caller, which already has its endpoint.
use std::os::fd::OwnedFd;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::core::error::{Error, ErrorKind};
use crate::core::loader::{ModuleLoader, ServeOutcome};
use crate::core::module::Lease;

/// Starts the worker. The returned handle may be dropped to detach it.
pub fn spawn_worker<L: ModuleLoader>(
    loader: Arc<L>,
    lease: Lease<L::Handle>,
    endpoint: OwnedFd,
) -> Result<JoinHandle<ServeOutcome>, Error> {
    let name = format!("cordis-serve:{}", lease.module().name());
    thread::Builder::new()
        .name(name)
        .spawn(move || serve(loader.as_ref(), lease, endpoint))
        .map_err(|err| {
            let errno = err.raw_os_error().unwrap_or(libc::EAGAIN);
            Error::new(ErrorKind::Os)
                .with_message("unable to spawn serving worker")
                .with_errno(errno)
                .with_source(err)
        })
}

fn serve<L: ModuleLoader>(loader: &L, lease: Lease<L::Handle>, endpoint: OwnedFd) -> ServeOutcome {
    let module = lease.module();
    let descriptor = module.descriptor();
    let symbol = descriptor.serve_symbol();

    let outcome = module
        .with_handle(|handle| loader.serve(handle, &symbol, endpoint))
        .unwrap_or(ServeOutcome::EntryNotFound);

    match outcome {
        ServeOutcome::SelfManaged => {
            module.mark_self_managed();
            debug!(service = module.name(), "module now tracks its own clients");
        }
        ServeOutcome::Handled => {
            debug!(service = module.name(), "serve call returned");
        }
        ServeOutcome::EntryNotFound => {
            warn!(
                service = module.name(),
                interface = %descriptor.interface,
                "interface '{}' not found",
                descriptor.interface
            );
        }
        ServeOutcome::Failed(status) => {
            warn!(
                service = module.name(),
                interface = %descriptor.interface,
                status,
                "interface '{}' returned a failure",
                descriptor.interface
            );
        }
    }

    drop(lease);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::ModuleCache;
    use crate::core::flags::ManifestShape;
    use crate::core::registry::Registry;
    use crate::core::testing::FakeLoader;
    use std::os::unix::net::UnixStream;
    use std::sync::atomic::Ordering;

    fn cache_with_lease() -> (ModuleCache<FakeLoader>, Lease<std::path::PathBuf>) {
        let registry = Registry::parse(
            r#"{"interfaces": {"/svc.a": {"library": "liba.so", "interface": "a"}}}"#,
            ManifestShape::Bare,
            "/ifaces",
        )
        .expect("registry");
        let cache = ModuleCache::new(FakeLoader::default());
        let lease = cache.get_or_load(&registry, "/svc.a").expect("load");
        (cache, lease)
    }

    fn run(cache: &ModuleCache<FakeLoader>, lease: Lease<std::path::PathBuf>) -> ServeOutcome {
        let (_ours, theirs) = UnixStream::pair().expect("pair");
        spawn_worker(Arc::clone(cache.loader()), lease, OwnedFd::from(theirs))
            .expect("spawn")
            .join()
            .expect("join")
    }

    #[test]
    fn each_outcome_releases_the_lease() {
        let outcomes = [
            ServeOutcome::Handled,
            ServeOutcome::EntryNotFound,
            ServeOutcome::Failed(-1),
        ];
        for expected in outcomes {
            let (cache, lease) = cache_with_lease();
            let module = Arc::clone(lease.module());
            cache.loader().set_outcome(expected);

            assert_eq!(run(&cache, lease), expected);
            assert_eq!(module.ref_count(), 0);
            assert!(!module.is_self_managed());
            assert_eq!(cache.loader().serves.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn self_managed_signal_sets_flag() {
        let (cache, lease) = cache_with_lease();
        let module = Arc::clone(lease.module());
        cache.loader().set_outcome(ServeOutcome::SelfManaged);

        assert_eq!(run(&cache, lease), ServeOutcome::SelfManaged);
        assert!(module.is_self_managed());
        assert_eq!(module.ref_count(), 0);
    }

    #[test]
    fn unloaded_module_is_reported_not_found() {
        let (cache, lease) = cache_with_lease();
        let _ = lease.module().take_handle();
        let module = Arc::clone(lease.module());

        assert_eq!(run(&cache, lease), ServeOutcome::EntryNotFound);
        assert_eq!(cache.loader().serves.load(Ordering::SeqCst), 0);
        assert_eq!(module.ref_count(), 0);
    }
}
