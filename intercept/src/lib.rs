//! startwarp-intercept: self-safe symbol resolution.
//!
//! A library that exports its own `dlsym` cannot call `dlsym` by name: the
//! dynamic linker binds the call back to the export and the lookup recurses.
//! This crate splits resolution in two tiers. [`resolver::raw`] reaches the
//! system `dlsym` through `dlvsym` with a pinned symbol version, which name
//! based interposition never touches. [`Resolver`] caches that pointer once
//! per process and serves every other lookup from it.

pub mod error;
pub mod module;
pub mod resolver;
pub mod symbol;
pub mod types;

pub use error::ResolveError;
pub use resolver::{raw_resolver_loads, DlsymFn, Handle, Resolver};
pub use symbol::Symbol;
pub use types::{MAIN_PROGRAM, ModuleInfo};

/// Initialize the resolver eagerly.
///
/// Lookups initialize it on first use anyway; calling this from a library
/// constructor moves the one-time cost ahead of the host's own code.
pub fn init() -> Result<(), ResolveError> {
    Resolver::global().map(|_| ())
}

/// Process-global lock for tests that touch process-wide resolver state.
#[cfg(test)]
pub(crate) fn lock_resolver_tests() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(())).lock().unwrap_or_else(|e| e.into_inner())
}
