//! The contract an instrumentation module implements.
//!
//! The agent only knows how to attach; what happens once attached comes from
//! a [`Plugin`]. A Rust payload links this crate, implements the trait and
//! calls [`export_plugin!`](crate::export_plugin) once. Payloads written in
//! other languages export the well-known hook symbols instead (see
//! [`HookSlot`](startwarp_protocol::HookSlot)); the hook table falls back to
//! those when nothing is registered.

use core::ffi::{CStr, c_void};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::OnceLock;

use log::{debug, error, warn};
use startwarp_protocol::{ExportedHookFn, ProcessIdentity};

use crate::error::AttachError;

/// Signature of the alternate entry point the launcher probe dispatches to.
pub type AlternateEntryFn = ExportedHookFn;

/// Lifecycle hooks, in the order they run:
/// `pre_glue`, `debug_pre_main` (verbose only), `pre_main`, the host's `main`,
/// then `post_main`.
pub trait Plugin: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// First hook, before anything else in the host runs. Required: an error
    /// aborts the process with the reserved exit code unless tolerance is set.
    fn pre_glue(&self) -> anyhow::Result<()>;

    /// Last hook before the host's `main`. Required, same policy as `pre_glue`.
    fn pre_main(&self) -> anyhow::Result<()>;

    /// Extra diagnostics, only called when verbosity is enabled.
    fn debug_pre_main(&self, _identity: &ProcessIdentity) {}

    /// Runs after `main` returns with its status. Errors are logged only.
    fn post_main(&self, _status: i32) -> anyhow::Result<()> {
        Ok(())
    }

    /// Entry point for the launcher probe. `None` leaves the slot unbound.
    fn alternate_entry(&self) -> Option<AlternateEntryFn> {
        None
    }

    /// Redirect a by-name lookup made through `dlsym`.
    ///
    /// Called from inside `dlsym`, so it must not block. Lookups the plugin
    /// itself makes from here are not redirected again.
    fn symbol_override(&self, _name: &CStr) -> Option<*mut c_void> {
        None
    }
}

static PLUGIN: OnceLock<Box<dyn Plugin>> = OnceLock::new();

/// Register the process's plugin. Only the first registration wins.
pub fn register(plugin: Box<dyn Plugin>) -> Result<(), AttachError> {
    let name = plugin.name().to_string();
    match PLUGIN.set(plugin) {
        Ok(()) => {
            debug!("registered plugin {}", name);
            Ok(())
        }
        Err(rejected) => Err(AttachError::AlreadyRegistered {
            existing: registered().map(|p| p.name().to_string()).unwrap_or_default(),
            rejected: rejected.name().to_string(),
        }),
    }
}

/// Registration path used by [`export_plugin!`](crate::export_plugin), which
/// runs in a library constructor where there is nobody to return an error to.
#[doc(hidden)]
pub fn register_or_log(plugin: Box<dyn Plugin>) {
    if let Err(e) = register(plugin) {
        error!("{}", e);
    }
}

pub fn registered() -> Option<&'static dyn Plugin> {
    PLUGIN.get().map(|p| p.as_ref())
}

/// Run a plugin callback that has no error channel of its own. A panic is
/// logged and reported as `None` instead of unwinding into the C caller.
pub(crate) fn guarded<T>(plugin: &dyn Plugin, callback: &str, f: impl FnOnce() -> T) -> Option<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            warn!(
                "plugin {} panicked in {}: {}",
                plugin.name(),
                callback,
                panic_message(&*payload)
            );
            None
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Register a plugin from a library constructor, before the host's startup
/// routine runs.
///
/// ```ignore
/// struct Overlay;
/// impl startwarp_agent::Plugin for Overlay { /* ... */ }
/// startwarp_agent::export_plugin!(Overlay);
/// ```
#[macro_export]
macro_rules! export_plugin {
    ($plugin:expr) => {
        #[cfg(target_os = "linux")]
        #[unsafe(link_section = ".init_array")]
        #[used]
        static __STARTWARP_REGISTER_PLUGIN: extern "C" fn() = {
            extern "C" fn register() {
                $crate::plugin::register_or_log(::std::boxed::Box::new($plugin));
            }
            register
        };
    };
}
