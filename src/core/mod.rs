// Core modules implementing configuration, module lifetime, and path resolution.
pub mod cache;
pub mod dirs;
pub mod error;
pub mod flags;
pub mod loader;
pub mod module;
pub mod reaper;
pub mod registry;
pub mod resolve;
pub mod serve;

#[cfg(test)]
pub(crate) mod testing;
