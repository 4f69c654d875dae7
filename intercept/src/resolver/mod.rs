//! Public tier: the process-wide cached resolver.

pub mod raw;

use core::ffi::{c_char, c_void};
use std::cell::Cell;
use std::ffi::{CStr, CString};
use std::ptr::{self, NonNull};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};

use log::{debug, error};

use crate::error::{ResolveError, Result};
use crate::symbol::Symbol;

pub use raw::DlsymFn;

/// Process-wide resolver, initialized at most once.
static RESOLVER: OnceLock<Result<Resolver>> = OnceLock::new();

/// Bootstrap `dlsym`, published before the cache is complete so re-entrant
/// lookups made during initialization still have somewhere to go.
static BOOTSTRAP: AtomicPtr<c_void> = AtomicPtr::new(ptr::null_mut());

static RAW_LOADS: AtomicUsize = AtomicUsize::new(0);

static FAILURE_LOGGED: AtomicBool = AtomicBool::new(false);

thread_local! {
    static INITIALIZING: Cell<bool> = const { Cell::new(false) };
}

/// How many times the resolver has fetched the raw `dlsym` in this process.
pub fn raw_resolver_loads() -> usize {
    RAW_LOADS.load(Ordering::Acquire)
}

/// True while the current thread is building the resolver.
pub fn is_initializing() -> bool {
    INITIALIZING.with(|c| c.get())
}

/// Marks the current thread as initializing; restores the previous state on drop.
struct InitGuard(bool);

impl InitGuard {
    fn enter() -> Self {
        Self(INITIALIZING.with(|c| c.replace(true)))
    }
}

impl Drop for InitGuard {
    fn drop(&mut self) {
        INITIALIZING.with(|c| c.set(self.0));
    }
}

/// Lookup scope passed to `dlsym`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handle {
    /// Global scope in load order (`RTLD_DEFAULT`).
    Default,
    /// Objects loaded after the caller (`RTLD_NEXT`).
    Next,
    /// A handle returned by `dlopen`.
    Library(NonNull<c_void>),
}

impl Handle {
    pub fn as_ptr(self) -> *mut c_void {
        match self {
            Handle::Default => libc::RTLD_DEFAULT,
            Handle::Next => libc::RTLD_NEXT,
            Handle::Library(h) => h.as_ptr(),
        }
    }
}

/// The cached, unshadowed `dlsym`.
#[derive(Debug)]
pub struct Resolver {
    dlsym: Symbol<DlsymFn>,
}

impl Resolver {
    /// The process-wide resolver. The first caller builds it; concurrent
    /// callers block until it is ready. A failed initialization is cached too,
    /// so a broken process never retries.
    pub fn global() -> Result<&'static Resolver> {
        RESOLVER
            .get_or_init(|| {
                let _guard = InitGuard::enter();
                Self::bootstrap()
            })
            .as_ref()
            .map_err(Clone::clone)
    }

    fn bootstrap() -> Result<Resolver> {
        RAW_LOADS.fetch_add(1, Ordering::AcqRel);

        let (raw, bootstrap_version) = raw::bootstrap_dlsym()?;
        BOOTSTRAP.store(raw.as_ptr(), Ordering::Release);

        // Ask the versioned dlsym for the next default-version dlsym, so an
        // interposer loaded after this one stays in the chain.
        let next = unsafe { (raw.get())(libc::RTLD_NEXT, c"dlsym".as_ptr()) };
        let dlsym = if next.is_null() {
            raw
        } else {
            // SAFETY: any object exporting dlsym exports it with this signature.
            unsafe { Symbol::from_address("dlsym", next)? }
        };

        debug!(
            "resolver ready: dlsym at {:#x} ({}), bootstrapped via {}",
            dlsym.address(),
            dlsym.module().unwrap_or_else(|| "?".to_string()),
            bootstrap_version.to_string_lossy()
        );

        Ok(Resolver { dlsym })
    }

    pub fn dlsym(&self) -> &Symbol<DlsymFn> {
        &self.dlsym
    }

    /// Forward a raw lookup to the system `dlsym`.
    ///
    /// # Safety
    /// Same contract as `dlsym(3)`: `handle` must be a valid scope and `name`
    /// a NUL-terminated string.
    pub unsafe fn lookup_raw(&self, handle: *mut c_void, name: *const c_char) -> *mut c_void {
        unsafe { (self.dlsym.get())(handle, name) }
    }

    /// Address of `name` in `handle`'s scope.
    pub fn lookup(&self, handle: Handle, name: &str) -> Result<usize> {
        let cname = CString::new(name).map_err(|_| ResolveError::InvalidName(name.to_string()))?;
        let address = unsafe { self.lookup_raw(handle.as_ptr(), cname.as_ptr()) };
        if address.is_null() {
            return Err(ResolveError::NotFound {
                name: name.to_string(),
                reason: last_dl_error(),
            });
        }
        Ok(address as usize)
    }

    /// Look `name` up and wrap it as a typed capability.
    ///
    /// # Safety
    /// The caller must name a function whose signature matches `F`.
    pub unsafe fn resolve<F: Copy>(&self, handle: Handle, name: &str) -> Result<Symbol<F>> {
        let address = self.lookup(handle, name)?;
        unsafe { Symbol::from_address(name, address as *mut c_void) }
    }
}

/// The `dlsym` a shadowing `dlsym` should hand the lookup to.
///
/// Builds the cached resolver on first use. On the thread that is building it
/// (for example when the loader calls back in while the cache is being filled)
/// this returns the bootstrap pointer instead and never re-enters
/// initialization. Returns `None`, and logs once, if no raw resolver exists.
pub fn forwarding_target() -> Option<DlsymFn> {
    if is_initializing() {
        let bootstrap = BOOTSTRAP.load(Ordering::Acquire);
        if bootstrap.is_null() {
            return None;
        }
        // SAFETY: BOOTSTRAP only ever holds a dlsym revision.
        return Some(unsafe { std::mem::transmute::<*mut c_void, DlsymFn>(bootstrap) });
    }

    match Resolver::global() {
        Ok(resolver) => Some(resolver.dlsym().get()),
        Err(e) => {
            if !FAILURE_LOGGED.swap(true, Ordering::AcqRel) {
                error!("cannot resolve symbols: {}", e);
            }
            None
        }
    }
}

/// Message from `dlerror`, or a placeholder when the loader kept none.
pub(crate) fn last_dl_error() -> String {
    let msg = unsafe { libc::dlerror() };
    if msg.is_null() {
        "no loader error recorded".to_string()
    } else {
        unsafe { CStr::from_ptr(msg) }.to_string_lossy().into_owned()
    }
}
