//! startwarp agent: attaches a plugin to a host process at startup.
//!
//! Built as a cdylib and loaded ahead of the C library through `LD_PRELOAD`.
//! The library exports two symbols the dynamic linker binds in preference to
//! glibc's:
//!
//! - `__libc_start_main`, which swaps the host's `main` for a wrapper that
//!   runs the plugin's lifecycle hooks around it (see [`entry`]);
//! - `dlsym`, which lets the plugin redirect by-name lookups and otherwise
//!   hands them on untouched (see [`shadow`]).
//!
//! A Rust plugin links this crate as an rlib and registers itself with
//! [`export_plugin!`]. The resulting cdylib carries both exports.

pub mod config;
pub mod diagnostics;
pub mod entry;
pub mod error;
pub mod hooks;
pub mod logging;
pub mod plugin;
pub mod shadow;

#[cfg(test)]
mod test_utils;

pub use config::{AgentConfig, Verbosity};
pub use error::AttachError;
pub use hooks::{HookOutcome, HookPolicy, HookTable, Stage};
pub use plugin::{AlternateEntryFn, Plugin, register, registered};
pub use startwarp_protocol::{HookSlot, ProcessIdentity};

/// Eagerly build the resolver cache when the library is loaded.
///
/// Returns 0 on success and 1 when the real `dlsym` cannot be obtained. The
/// failure is reported again, and acted on, when the startup routine runs.
#[unsafe(no_mangle)]
pub extern "C" fn startwarp_agent_init() -> i32 {
    match startwarp_intercept::init() {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

#[cfg(all(target_os = "linux", target_env = "gnu", not(test)))]
mod exports {
    use core::ffi::{c_char, c_int, c_void};

    use crate::entry::{self, MainFn};
    use crate::shadow;

    #[unsafe(no_mangle)]
    pub unsafe extern "C" fn __libc_start_main(
        main: MainFn,
        argc: c_int,
        argv: *mut *mut c_char,
        init: Option<MainFn>,
        fini: Option<unsafe extern "C" fn()>,
        rtld_fini: Option<unsafe extern "C" fn()>,
        stack_end: *mut c_void,
    ) -> c_int {
        unsafe { entry::start_main(main, argc, argv, init, fini, rtld_fini, stack_end) }
    }

    // The exported dlsym asks shadow::route what to do. When the lookup is
    // forwarded, it tail-calls the real dlsym with the caller's return address
    // still on the stack, so RTLD_NEXT stays relative to the calling object.

    /// Frame: `[rsp]` forward.symbol, `[rsp+8]` forward.target, `[rsp+16]` handle.
    #[cfg(target_arch = "x86_64")]
    #[unsafe(naked)]
    #[unsafe(no_mangle)]
    pub unsafe extern "C" fn dlsym(_handle: *mut c_void, _symbol: *const c_char) -> *mut c_void {
        core::arch::naked_asm!(
            "push rbp",
            "mov rbp, rsp",
            "sub rsp, 32",
            "mov [rsp+16], rdi",
            // route(symbol, &mut forward)
            "mov rdi, rsi",
            "mov rsi, rsp",
            "call {route}",
            // answered by the agent
            "test rax, rax",
            "jnz 2f",
            // no real dlsym: return null
            "mov rax, [rsp+8]",
            "test rax, rax",
            "jz 2f",
            "mov rdi, [rsp+16]",
            "mov rsi, [rsp]",
            "leave",
            "jmp rax",
            "2:",
            "leave",
            "ret",
            route = sym shadow::route,
        )
    }

    /// Frame: `[sp]` x29/x30, `[sp+16]` handle, `[sp+32]` forward.symbol,
    /// `[sp+40]` forward.target.
    #[cfg(target_arch = "aarch64")]
    #[unsafe(naked)]
    #[unsafe(no_mangle)]
    pub unsafe extern "C" fn dlsym(_handle: *mut c_void, _symbol: *const c_char) -> *mut c_void {
        core::arch::naked_asm!(
            "stp x29, x30, [sp, #-48]!",
            "mov x29, sp",
            "str x0, [sp, #16]",
            // route(symbol, &mut forward)
            "mov x0, x1",
            "add x1, sp, #32",
            "bl {route}",
            // answered by the agent
            "cbnz x0, 2f",
            // no real dlsym: return null
            "ldr x16, [sp, #40]",
            "cbz x16, 2f",
            "ldr x0, [sp, #16]",
            "ldr x1, [sp, #32]",
            "ldp x29, x30, [sp], #48",
            "br x16",
            "2:",
            "ldp x29, x30, [sp], #48",
            "ret",
            route = sym shadow::route,
        )
    }

    // TODO: trampolines for the remaining glibc targets; until then RTLD_NEXT
    // lookups through the shadow resolve relative to the agent there.
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    #[unsafe(no_mangle)]
    pub unsafe extern "C" fn dlsym(handle: *mut c_void, symbol: *const c_char) -> *mut c_void {
        unsafe { shadow::shadow_dlsym(handle, symbol) }
    }

    /// Constructor for automatic initialization on library load.
    #[unsafe(link_section = ".init_array")]
    #[used]
    static INIT: extern "C" fn() = {
        extern "C" fn init() {
            crate::startwarp_agent_init();
        }
        init
    };
}
