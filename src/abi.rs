//! Purpose: C ABI bridge for embedding hosts (libcordis).
//! Exports: `libcordis_init`, `libcordis_init_from`, `libcordis_open`, `libcordis_cleanup`,
//! `libcordis_get_path`.
//! Role: Stable ABI over one process-global `Broker`; declared in `include/libcordis.h`.
//! Invariants: Every entry point returns a status code; panics never cross the boundary.
//! Invariants: Status codes map 1:1 with `to_status_code`.
use std::ffi::{CStr, OsStr};
use std::os::fd::IntoRawFd;
use std::os::raw::{c_char, c_int};
use std::os::unix::ffi::OsStrExt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::ptr;
use std::sync::LazyLock;

use tracing_subscriber::EnvFilter;

use crate::api::{
    Broker, DirKind, Error, ErrorKind, INIT_JSON_MANIFEST, INIT_LOAD_FILE, OpenFlags,
    to_status_code,
};

static BROKER: LazyLock<Broker> = LazyLock::new(Broker::new);

const LOG_ENV: &str = "CORDIS_LOG";
const INTERNAL_FAILURE: c_int = -libc::EIO;

/// Set flags to 0. Loads `<executable>.manifest.json`.
/// Returns 0 on success, or a negative init error.
#[unsafe(no_mangle)]
pub extern "C" fn libcordis_init(flags: c_int) -> c_int {
    guarded(|| {
        init_tracing();
        if BROKER.is_initialized() {
            return to_status_code(&Error::new(ErrorKind::AlreadyInitialized));
        }
        if flags & 0x00FF != 0 {
            return to_status_code(&Error::new(ErrorKind::InvalidFlags));
        }
        let bits = flags as u32 | INIT_LOAD_FILE | INIT_JSON_MANIFEST;
        status(BROKER.initialize_bits(bits, ""))
    })
}

/// Loads the manifest named by `arg` (a path, or inline JSON) as selected by `flags`.
#[unsafe(no_mangle)]
pub extern "C" fn libcordis_init_from(flags: c_int, arg: *const c_char) -> c_int {
    guarded(|| {
        init_tracing();
        let arg = if arg.is_null() {
            OsStr::new("")
        } else {
            OsStr::from_bytes(unsafe { CStr::from_ptr(arg) }.to_bytes())
        };
        status(BROKER.initialize_bits(flags as u32, arg))
    })
}

/// Returns a file descriptor on success, or a negative error value.
#[unsafe(no_mangle)]
pub extern "C" fn libcordis_open(path: *const c_char, flags: c_int) -> c_int {
    guarded(|| {
        if !BROKER.is_initialized() {
            return to_status_code(&Error::new(ErrorKind::NotInitialized));
        }
        if path.is_null() {
            return to_status_code(&Error::new(ErrorKind::NotFound));
        }
        let bytes = unsafe { CStr::from_ptr(path) }.to_bytes();
        let path = Path::new(OsStr::from_bytes(bytes));
        match BROKER.resolve(path, OpenFlags::from_bits(flags as u32)) {
            Ok(fd) => fd.into_raw_fd(),
            Err(err) => to_status_code(&err),
        }
    })
}

/// Unloads modules that are no longer in use; returns how many were unloaded.
#[unsafe(no_mangle)]
pub extern "C" fn libcordis_cleanup() -> c_int {
    guarded(|| c_int::try_from(BROKER.cleanup()).unwrap_or(c_int::MAX))
}

/// Copies the directory selected by `which` into `dest`. Returns the path length, or
/// the buffer size needed (length plus NUL) when `destlen` is too small.
#[unsafe(no_mangle)]
pub extern "C" fn libcordis_get_path(which: c_int, dest: *mut c_char, destlen: usize) -> usize {
    catch_unwind(AssertUnwindSafe(|| {
        let path = DirKind::from_code(which)
            .map(|kind| BROKER.directory(kind))
            .unwrap_or_default();
        copy_to_buffer(path.as_os_str().as_bytes(), dest, destlen)
    }))
    .unwrap_or(0)
}

fn copy_to_buffer(value: &[u8], dest: *mut c_char, destlen: usize) -> usize {
    let len = value.len();
    if len >= destlen {
        // An empty value needs no space at all.
        return if len == 0 { 0 } else { len + 1 };
    }
    if dest.is_null() {
        return len + 1;
    }
    unsafe {
        ptr::copy_nonoverlapping(value.as_ptr(), dest.cast::<u8>(), len);
        *dest.add(len) = 0;
    }
    len
}

fn status(result: Result<(), Error>) -> c_int {
    match result {
        Ok(()) => 0,
        Err(err) => to_status_code(&err),
    }
}

fn guarded(f: impl FnOnce() -> c_int) -> c_int {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or(INTERNAL_FAILURE)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
