// Resolver for configured service names: load the module and hand it one end of a channel.
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::Arc;

use super::{Resolution, ResolveContext, Resolver};
use crate::core::error::{Error, ErrorKind};
use crate::core::flags::OpenFlags;
use crate::core::loader::ModuleLoader;
use crate::core::serve::spawn_worker;

#[derive(Clone, Copy, Debug, Default)]
pub struct ServiceResolver;

impl<L: ModuleLoader> Resolver<L> for ServiceResolver {
    fn name(&self) -> &'static str {
        "service"
    }

    fn try_resolve(
        &self,
        cx: &ResolveContext<'_, L>,
        path: &Path,
        flags: OpenFlags,
    ) -> Resolution {
        let Some(name) = path.to_str() else {
            return Resolution::NotApplicable;
        };
        if cx.registry.service(name).is_none() {
            return Resolution::NotApplicable;
        }
        Resolution::Applicable(open_service(cx, name, flags))
    }
}

fn open_service<L: ModuleLoader>(
    cx: &ResolveContext<'_, L>,
    name: &str,
    flags: OpenFlags,
) -> Result<OwnedFd, Error> {
    if !flags.allows_interface() {
        return Err(Error::new(ErrorKind::WrongKind)
            .with_message(format!("'{name}' is an interface")));
    }
    // Channels are bidirectional, so the caller must ask for write access.
    if !flags.write() {
        return Err(Error::new(ErrorKind::WriteRequired)
            .with_message(format!("'{name}' requires write access")));
    }

    let lookup = cx.cache.get_or_load(cx.registry, name)?;
    let worker = lookup.clone();
    let (caller_end, module_end) = UnixStream::pair().map_err(Error::from_io)?;
    // Detached: the caller never waits on the serve call.
    drop(spawn_worker(
        Arc::clone(cx.cache.loader()),
        worker,
        OwnedFd::from(module_end),
    )?);
    lookup.release();
    Ok(OwnedFd::from(caller_end))
}
