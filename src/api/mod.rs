//! Purpose: Define the public Rust API boundary for cordis.
//! Exports: `Broker` plus the core types hosts need to drive it.
//! Role: Stable surface for Rust hosts; the C ABI and CLI are built on it.
//! Invariants: Every host-visible operation goes through `Broker`.
//! Invariants: Loader and directory seams stay injectable for tests.

mod broker;

pub use crate::core::cache::{ModuleCache, ModuleSnapshot};
pub use crate::core::dirs::{DirKind, Directories, SystemDirectories};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind, to_status_code};
pub use crate::core::flags::{
    INIT_JSON_MAIN, INIT_JSON_MANIFEST, INIT_LOAD_FILE, INIT_LOAD_STRING, InitFlags,
    ManifestShape, ManifestSource, OPEN_FS, OPEN_INTERFACE, OPEN_KIND_MASK, OPEN_WRITE,
    OpenFlags,
};
pub use crate::core::loader::{ModuleLoader, NativeLoader, ServeOutcome};
pub use crate::core::module::{Lease, LoadedModule};
pub use crate::core::registry::{LaunchDescriptor, Registry, ServiceDescriptor};
pub use crate::core::resolve::{Resolution, ResolutionChain, ResolveContext, Resolver};
pub use broker::{ApiResult, Broker};
