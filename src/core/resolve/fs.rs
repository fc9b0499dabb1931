// Resolver for real filesystem objects: regular files are opened, unix sockets are dialed.
use std::fs::OpenOptions;
use std::os::fd::{AsFd, OwnedFd};
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::UnixStream;
use std::path::Path;

use super::{Resolution, ResolveContext, Resolver};
use crate::core::error::{Error, ErrorKind};
use crate::core::flags::OpenFlags;
use crate::core::loader::ModuleLoader;

#[derive(Clone, Copy, Debug, Default)]
pub struct FsResolver;

impl<L: ModuleLoader> Resolver<L> for FsResolver {
    fn name(&self) -> &'static str {
        "fs"
    }

    fn try_resolve(
        &self,
        _cx: &ResolveContext<'_, L>,
        path: &Path,
        flags: OpenFlags,
    ) -> Resolution {
        Resolution::Applicable(open_path(path, flags))
    }
}

fn open_path(path: &Path, flags: OpenFlags) -> Result<OwnedFd, Error> {
    let stat = std::fs::metadata(path);
    // Existence alone classifies the path, even if it could not be opened.
    if !flags.allows_fs() && stat.is_ok() {
        return Err(Error::new(ErrorKind::WrongKind)
            .with_message("path is a filesystem object")
            .with_path(path));
    }
    let stat = stat.map_err(|err| Error::from_io(err).with_path(path))?;

    let file_type = stat.file_type();
    if file_type.is_dir() {
        return Err(Error::os(libc::EISDIR).with_path(path));
    }

    if file_type.is_socket() {
        if !flags.write() {
            return Err(Error::new(ErrorKind::WriteRequired)
                .with_message("sockets require write access")
                .with_path(path));
        }
        let stream = UnixStream::connect(path).map_err(|err| Error::from_io(err).with_path(path))?;
        return dup_cloexec(&stream).map_err(|err| {
            Error::new(ErrorKind::WrongKind)
                .with_message("dialed socket has no transferable descriptor")
                .with_path(path)
                .with_source(err)
        });
    }

    let file = OpenOptions::new()
        .read(true)
        .write(flags.write())
        .open(path)
        .map_err(|err| Error::from_io(err).with_path(path))?;
    dup_cloexec(&file).map_err(|err| Error::from_io(err).with_path(path))
}

/// Duplicates with `F_DUPFD_CLOEXEC` so the descriptor never leaks across `exec`.
fn dup_cloexec(source: &impl AsFd) -> std::io::Result<OwnedFd> {
    source.as_fd().try_clone_to_owned()
}
