//! Entry interception: run the lifecycle hooks around the host's `main`.
//!
//! The exported `__libc_start_main` resolves the real startup routine once,
//! swaps the host's `main` for [`wrapped_main`] and hands control back to the
//! C library. `wrapped_main` runs the hooks, calls the real `main` exactly
//! once with the original arguments and returns its status untouched.

use core::ffi::{c_char, c_int, c_void};
use std::io::{self, Write};
use std::sync::OnceLock;

use log::{debug, error, warn};
use startwarp_intercept::{Handle, Resolver, Symbol};
use startwarp_protocol::{HookSlot, ProcessIdentity, RESOLUTION_FAILURE_EXIT_CODE};

use crate::config::AgentConfig;
use crate::diagnostics;
use crate::error::AttachError;
use crate::hooks::{HookPolicy, HookTable, Stage};
use crate::logging;
use crate::plugin;

/// Signature of a C `main` as `__libc_start_main` receives it.
pub type MainFn = unsafe extern "C" fn(c_int, *mut *mut c_char, *mut *mut c_char) -> c_int;

/// Signature of glibc's `__libc_start_main`.
pub type LibcStartMainFn = unsafe extern "C" fn(
    main: MainFn,
    argc: c_int,
    argv: *mut *mut c_char,
    init: Option<MainFn>,
    fini: Option<unsafe extern "C" fn()>,
    rtld_fini: Option<unsafe extern "C" fn()>,
    stack_end: *mut c_void,
) -> c_int;

/// The resolved-symbol cache: the real startup routine and the real `dlsym`.
pub struct AttachContext {
    resolver: &'static Resolver,
    real_start_main: Symbol<LibcStartMainFn>,
}

static CONTEXT: OnceLock<Result<AttachContext, AttachError>> = OnceLock::new();
static HOOK_TABLE: OnceLock<HookTable> = OnceLock::new();
static REAL_MAIN: OnceLock<MainFn> = OnceLock::new();

impl AttachContext {
    /// Resolve both addresses at most once. Failure is cached as well.
    pub fn global() -> Result<&'static AttachContext, AttachError> {
        CONTEXT
            .get_or_init(Self::resolve)
            .as_ref()
            .map_err(Clone::clone)
    }

    fn resolve() -> Result<AttachContext, AttachError> {
        let resolver = Resolver::global()?;
        // SAFETY: __libc_start_main has had this signature since glibc 2.0.
        let real_start_main =
            unsafe { resolver.resolve::<LibcStartMainFn>(Handle::Next, "__libc_start_main")? };
        debug!(
            "real __libc_start_main at {:#x} ({})",
            real_start_main.address(),
            real_start_main.module().unwrap_or_else(|| "?".to_string())
        );
        Ok(AttachContext {
            resolver,
            real_start_main,
        })
    }

    pub fn resolver(&self) -> &'static Resolver {
        self.resolver
    }

    pub fn real_start_main(&self) -> &Symbol<LibcStartMainFn> {
        &self.real_start_main
    }
}

/// The hook table, built from the registered plugin or, failing that, from
/// the well-known exported hook symbols.
pub fn hook_table() -> &'static HookTable {
    HOOK_TABLE.get_or_init(|| {
        let table = match plugin::registered() {
            Some(plugin) => HookTable::from_plugin(plugin),
            None => match AttachContext::global() {
                Ok(context) => HookTable::discover(context.resolver()),
                Err(e) => {
                    warn!("cannot discover exported hooks: {}", e);
                    HookTable::empty()
                }
            },
        };
        table.log_bindings();
        table
    })
}

/// Capture the host's real `main` and return the wrapper to run instead.
///
/// Only the first `main` is kept; later calls reuse it.
pub fn intercept(real_main: MainFn) -> MainFn {
    let captured = *REAL_MAIN.get_or_init(|| real_main);
    if !std::ptr::fn_addr_eq(captured, real_main) {
        warn!("startup routine entered again with a different main, keeping the first");
    }
    wrapped_main
}

/// Body of the exported `__libc_start_main`.
///
/// # Safety
/// Arguments must be exactly those the C runtime passed to `__libc_start_main`.
pub unsafe fn start_main(
    main: MainFn,
    argc: c_int,
    argv: *mut *mut c_char,
    init: Option<MainFn>,
    fini: Option<unsafe extern "C" fn()>,
    rtld_fini: Option<unsafe extern "C" fn()>,
    stack_end: *mut c_void,
) -> c_int {
    let config = AgentConfig::from_env();
    logging::init(&config);

    let context = match AttachContext::global() {
        Ok(context) => context,
        Err(e) => {
            error!("cannot attach: {}", e);
            let _ = writeln!(io::stderr(), "startwarp: cannot attach: {}", e);
            std::process::exit(e.exit_code());
        }
    };

    hook_table();
    let wrapped = intercept(main);
    debug!("launching main");
    unsafe {
        (context.real_start_main.get())(wrapped, argc, argv, init, fini, rtld_fini, stack_end)
    }
}

/// Replacement `main` handed to the real startup routine.
///
/// # Safety
/// Called by the C runtime with the host's original `main` arguments.
pub unsafe extern "C" fn wrapped_main(
    argc: c_int,
    argv: *mut *mut c_char,
    envp: *mut *mut c_char,
) -> c_int {
    let Some(real_main) = REAL_MAIN.get().copied() else {
        let _ = writeln!(io::stderr(), "startwarp: wrapped main entered before interception");
        std::process::exit(RESOLUTION_FAILURE_EXIT_CODE);
    };

    let config = AgentConfig::from_env();
    logging::init(&config);

    let mut stderr = io::stderr();
    match run_startup(&config, hook_table(), &mut stderr, || unsafe {
        real_main(argc, argv, envp)
    }) {
        Ok(status) => status,
        Err(e) => {
            error!("aborting startup: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

/// The startup sequence: diagnostics, pre-glue, debug-pre-main, pre-main,
/// `real_main`, post-main.
///
/// Returns `real_main`'s status unchanged. Returns an error, without calling
/// `real_main`, when a required hook is missing or fails and the policy does
/// not tolerate it.
pub fn run_startup(
    config: &AgentConfig,
    hooks: &HookTable,
    diagnostics_out: &mut dyn Write,
    real_main: impl FnOnce() -> c_int,
) -> Result<c_int, AttachError> {
    let policy = HookPolicy::from(config);
    let verbose = config.verbosity.is_enabled();
    debug!("pre-main");

    let identity = verbose.then(ProcessIdentity::capture);
    if let Some(identity) = &identity {
        if let Err(e) = diagnostics::emit(config.verbosity, identity, diagnostics_out) {
            warn!("cannot write diagnostics: {}", e);
        }
        diagnostics::log_load_order();
    }

    policy.enforce(HookSlot::PreGlue, hooks.invoke(Stage::PreGlue))?;

    if let Some(identity) = &identity {
        policy.enforce(
            HookSlot::DebugPreMain,
            hooks.invoke(Stage::DebugPreMain(identity)),
        )?;
    }

    debug!("entering pre-main hook");
    policy.enforce(HookSlot::PreMain, hooks.invoke(Stage::PreMain))?;

    let status = real_main();
    debug!("post-main, status {}", status);

    policy.enforce(HookSlot::PostMain, hooks.invoke(Stage::PostMain(status)))?;
    Ok(status)
}
