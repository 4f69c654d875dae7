//! Bootstrap tier: reach the system `dlsym` without going through its name.
//!
//! `dlvsym` takes an explicit symbol version. A shadowing `dlsym` exported by
//! a preloaded library carries no version, so asking for `dlsym@GLIBC_x`
//! skips it and lands on the C library's definition.

use core::ffi::{c_char, c_void};
use std::ffi::CStr;

use log::debug;

use super::Handle;
use crate::error::{ResolveError, Result};
use crate::symbol::Symbol;

/// Signature of `dlsym`.
pub type DlsymFn = unsafe extern "C" fn(*mut c_void, *const c_char) -> *mut c_void;

#[cfg(all(target_os = "linux", target_env = "gnu"))]
unsafe extern "C" {
    fn dlvsym(handle: *mut c_void, symbol: *const c_char, version: *const c_char)
    -> *mut c_void;
}

/// `dlsym` revisions to request, in order. The architecture's base revision
/// comes first; `GLIBC_2.34` is where `dlsym` moved into libc proper.
#[cfg(all(target_os = "linux", target_env = "gnu", target_arch = "x86_64"))]
pub const DLSYM_VERSIONS: &[&CStr] = &[c"GLIBC_2.2.5", c"GLIBC_2.34"];

#[cfg(all(target_os = "linux", target_env = "gnu", target_arch = "aarch64"))]
pub const DLSYM_VERSIONS: &[&CStr] = &[c"GLIBC_2.17", c"GLIBC_2.34"];

#[cfg(all(target_os = "linux", target_env = "gnu", target_arch = "x86"))]
pub const DLSYM_VERSIONS: &[&CStr] = &[c"GLIBC_2.0", c"GLIBC_2.34"];

#[cfg(all(target_os = "linux", target_env = "gnu", target_arch = "riscv64"))]
pub const DLSYM_VERSIONS: &[&CStr] = &[c"GLIBC_2.27", c"GLIBC_2.34"];

#[cfg(all(
    target_os = "linux",
    target_env = "gnu",
    not(any(
        target_arch = "x86_64",
        target_arch = "aarch64",
        target_arch = "x86",
        target_arch = "riscv64"
    ))
))]
pub const DLSYM_VERSIONS: &[&CStr] = &[c"GLIBC_2.34"];

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
pub const DLSYM_VERSIONS: &[&CStr] = &[];

/// Resolve one specific revision of `name`, bypassing by-name interposition.
///
/// # Safety
/// The caller must name a function whose signature matches `F`.
#[cfg(all(target_os = "linux", target_env = "gnu"))]
pub unsafe fn resolve_raw<F: Copy>(handle: Handle, name: &CStr, version: &CStr) -> Result<Symbol<F>> {
    let address = unsafe { dlvsym(handle.as_ptr(), name.as_ptr(), version.as_ptr()) };
    let label = format!("{}@{}", name.to_string_lossy(), version.to_string_lossy());
    if address.is_null() {
        return Err(ResolveError::NotFound {
            reason: super::last_dl_error(),
            name: label,
        });
    }
    unsafe { Symbol::from_address(&label, address) }
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
pub unsafe fn resolve_raw<F: Copy>(
    _handle: Handle,
    _name: &CStr,
    _version: &CStr,
) -> Result<Symbol<F>> {
    Err(ResolveError::Unsupported)
}

/// Fetch the system `dlsym` by version. Each revision is tried once; there is
/// no retry loop.
pub fn bootstrap_dlsym() -> Result<(Symbol<DlsymFn>, &'static CStr)> {
    if DLSYM_VERSIONS.is_empty() {
        return Err(ResolveError::Unsupported);
    }

    for version in DLSYM_VERSIONS {
        // SAFETY: every revision of dlsym has the DlsymFn signature.
        match unsafe { resolve_raw::<DlsymFn>(Handle::Next, c"dlsym", version) } {
            Ok(sym) => {
                debug!("bootstrap dlsym {} at {:#x}", sym.name(), sym.address());
                return Ok((sym, version));
            }
            Err(e) => debug!("bootstrap attempt failed: {}", e),
        }
    }

    Err(ResolveError::BootstrapUnavailable {
        tried: DLSYM_VERSIONS
            .iter()
            .map(|v| v.to_string_lossy())
            .collect::<Vec<_>>()
            .join(", "),
    })
}
