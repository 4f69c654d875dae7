//! A conventional interposer, preloaded after the agent by the integration
//! tests.
//!
//! It wraps `getpid` and finds the function it wraps with
//! `dlsym(RTLD_NEXT, "getpid")`, like most preload wrappers do. If that lookup
//! comes back to this library the process exits with [`LOOP_EXIT_CODE`]
//! instead of recursing forever.

use core::ffi::c_void;
use std::sync::atomic::{AtomicBool, Ordering};

pub const LOOP_EXIT_CODE: libc::c_int = 99;

type GetpidFn = unsafe extern "C" fn() -> libc::pid_t;

static REPORTED: AtomicBool = AtomicBool::new(false);

fn marker(line: &[u8]) {
    // raw write(2): getpid can be reached from inside the runtime's own locks
    unsafe {
        libc::write(libc::STDERR_FILENO, line.as_ptr() as *const c_void, line.len());
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn getpid() -> libc::pid_t {
    let next = unsafe { libc::dlsym(libc::RTLD_NEXT, c"getpid".as_ptr()) };
    if next == getpid as *mut c_void {
        marker(b"chained: RTLD_NEXT returned this wrapper\n");
        unsafe { libc::_exit(LOOP_EXIT_CODE) };
    }
    if next.is_null() {
        marker(b"chained: RTLD_NEXT found no getpid\n");
        unsafe { libc::_exit(LOOP_EXIT_CODE) };
    }
    if !REPORTED.swap(true, Ordering::Relaxed) {
        marker(b"chained: forwarded to the next getpid\n");
    }
    let next: GetpidFn = unsafe { std::mem::transmute(next) };
    unsafe { next() }
}
