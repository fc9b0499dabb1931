//! Purpose: Embeddable broker that resolves paths to service-module channels or files.
//! Exports: `api` (the `Broker` and its types), `core` (registry, cache, resolvers), `abi`.
//! Role: Linked into host processes as a Rust library or via the `libcordis_*` C ABI.
//! Invariants: A loaded module is never unloaded while a lease on it is held.
//! Invariants: Core modules take their collaborators (loader, directories) explicitly.
pub mod abi;
pub mod api;
pub mod core;
