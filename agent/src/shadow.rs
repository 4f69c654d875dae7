//! The shadowing `dlsym`.
//!
//! Every by-name lookup in the process lands here once the agent is loaded.
//! Lookups are answered in this order:
//!
//! 1. a name ending in the direct-lookup suffix is stripped and forwarded
//!    untouched, bypassing every redirect below;
//! 2. the alternate entry name returns the registered plugin's entry point;
//! 3. the registered plugin may redirect the name;
//! 4. everything else goes to the real `dlsym`.
//!
//! [`route`] makes the decision. The exported `dlsym` (see `lib.rs`) is a
//! trampoline around it: when `route` forwards, the trampoline tail-calls the
//! real `dlsym` with the caller's return address still in place, so glibc
//! resolves `RTLD_NEXT` relative to the object that called `dlsym`, not to
//! the agent.

use core::ffi::{CStr, c_char, c_void};
use std::cell::{Cell, RefCell};
use std::ffi::CString;
use std::ptr;

use log::trace;
use startwarp_intercept::{DlsymFn, resolver};
use startwarp_protocol::{ALTERNATE_ENTRY_SYMBOL, DIRECT_LOOKUP_SUFFIX};

use crate::plugin::{self, Plugin, guarded};

thread_local! {
    /// Set while a plugin's `symbol_override` runs on this thread.
    static IN_OVERRIDE: Cell<bool> = const { Cell::new(false) };

    /// Last stripped direct-lookup name. Must outlive the forwarded call,
    /// which happens after `route` has returned.
    static DIRECT_NAME: RefCell<Option<CString>> = const { RefCell::new(None) };
}

struct OverrideGuard;

impl OverrideGuard {
    fn enter() -> Option<Self> {
        let already = IN_OVERRIDE.with(|flag| flag.replace(true));
        (!already).then_some(OverrideGuard)
    }
}

impl Drop for OverrideGuard {
    fn drop(&mut self) {
        IN_OVERRIDE.with(|flag| flag.set(false));
    }
}

/// Where a lookup goes when the agent does not answer it itself.
#[repr(C)]
pub struct Forward {
    /// Name to hand on. Differs from the requested one for direct lookups.
    pub symbol: *const c_char,
    /// The real `dlsym`. `None` when it cannot be obtained.
    pub target: Option<DlsymFn>,
}

/// Decide a `dlsym(_, symbol)` call.
///
/// Returns the answer when the agent redirects the name. Otherwise returns
/// null and fills `forward` with the name and the `dlsym` to hand it to.
///
/// # Safety
/// `symbol` must be null or NUL-terminated; `forward` must be writable.
pub unsafe extern "C" fn route(symbol: *const c_char, forward: *mut Forward) -> *mut c_void {
    let forward = unsafe { &mut *forward };
    forward.symbol = symbol;
    forward.target = None;

    if symbol.is_null() {
        return ptr::null_mut();
    }
    let name = unsafe { CStr::from_ptr(symbol) };

    if let Some(base) = name.to_bytes().strip_suffix(DIRECT_LOOKUP_SUFFIX.as_bytes()) {
        let Some(base) = stash_direct_name(base) else {
            return ptr::null_mut();
        };
        forward.symbol = base;
        forward.target = resolver::forwarding_target();
        return ptr::null_mut();
    }

    if let Some(address) = redirect(name) {
        trace!("dlsym({:?}) redirected to {:p}", name, address);
        return address;
    }

    forward.target = resolver::forwarding_target();
    ptr::null_mut()
}

/// Keep `base` alive in thread-local storage and return a pointer to it.
fn stash_direct_name(base: &[u8]) -> Option<*const c_char> {
    // base came out of a CStr, so it holds no interior NUL.
    let base = CString::new(base).ok()?;
    DIRECT_NAME
        .try_with(|slot| {
            let mut slot = slot.try_borrow_mut().ok()?;
            Some(slot.insert(base).as_ptr())
        })
        .ok()
        .flatten()
}

/// Body of the exported `dlsym` where no trampoline is available, and the
/// in-process equivalent used by tests. The forwarded call is made from here,
/// so `RTLD_NEXT` is relative to the agent.
///
/// # Safety
/// Same contract as `dlsym(3)`: `handle` must be a valid scope and `symbol`
/// null or a NUL-terminated string.
pub unsafe fn shadow_dlsym(handle: *mut c_void, symbol: *const c_char) -> *mut c_void {
    let mut forward = Forward {
        symbol,
        target: None,
    };
    let answer = unsafe { route(symbol, &mut forward) };
    if !answer.is_null() {
        return answer;
    }
    match forward.target {
        Some(dlsym) => unsafe { dlsym(handle, forward.symbol) },
        None => ptr::null_mut(),
    }
}

/// Address the registered plugin wants `name` to resolve to, if any.
fn redirect(name: &CStr) -> Option<*mut c_void> {
    if resolver::is_initializing() {
        return None;
    }
    redirect_to(plugin::registered()?, name)
}

fn redirect_to(plugin: &dyn Plugin, name: &CStr) -> Option<*mut c_void> {
    if name.to_bytes() == ALTERNATE_ENTRY_SYMBOL.as_bytes() {
        let entry = guarded(plugin, "alternate_entry", || plugin.alternate_entry());
        if let Some(entry) = entry.flatten() {
            return Some(entry as *mut c_void);
        }
    }

    let _guard = OverrideGuard::enter()?;
    guarded(plugin, "symbol_override", || plugin.symbol_override(name))
        .flatten()
        .filter(|address| !address.is_null())
}
