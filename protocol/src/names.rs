//! The fixed ABI an instrumentation module is resolved against.
//!
//! Every hook is looked up by a well-known exported name at attach time. The
//! names, the reserved exit codes and the environment toggles live here so the
//! agent and the probe can never disagree about them.

use std::ffi::CStr;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Exit status used when a required lifecycle hook is missing (or fails) and
/// the tolerance toggle is not set.
pub const HOOK_MISSING_EXIT_CODE: i32 = 37;

/// Exit status used when the real startup routine or the real `dlsym` cannot
/// be obtained. There is no tolerance override for this.
pub const RESOLUTION_FAILURE_EXIT_CODE: i32 = 1;

/// Verbosity toggle. `json` switches identity diagnostics to JSON.
pub const DEBUG_ENV: &str = "STARTWARP_DEBUG";

/// Tolerance toggle: downgrade a missing required hook to a logged warning.
pub const IGNORE_INIT_ERRORS_ENV: &str = "STARTWARP_IGNORE_INIT_ERRORS";

/// Optional `env_logger` filter that overrides the level implied by [`DEBUG_ENV`].
pub const LOG_ENV: &str = "STARTWARP_LOG";

/// Suffix that asks the shadowing `dlsym` for the unmodified address of the
/// symbol named by the rest of the string.
pub const DIRECT_LOOKUP_SUFFIX: &str = "_sw_direct";

/// Name of the alternate entry point the launcher probe looks for.
pub const ALTERNATE_ENTRY_SYMBOL: &str = "startwarp_launch";

/// Printed by the probe when the agent is not attached.
pub const PROBE_GUIDANCE: &str = "You are meant to run this with startwarp loaded into the process.";

/// Signature of every exported lifecycle hook.
pub type ExportedHookFn = unsafe extern "C" fn() -> libc::c_int;

/// One slot of the hook table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookSlot {
    PreGlue,
    PreMain,
    DebugPreMain,
    PostMain,
    AlternateEntry,
}

impl HookSlot {
    /// All slots in the order they are resolved.
    pub const ALL: [HookSlot; 5] = [
        HookSlot::PreGlue,
        HookSlot::PreMain,
        HookSlot::DebugPreMain,
        HookSlot::PostMain,
        HookSlot::AlternateEntry,
    ];

    /// Exported symbol name the slot is discovered by.
    pub fn symbol_name(self) -> &'static str {
        match self {
            HookSlot::PreGlue => "startwarp_preglue",
            HookSlot::PreMain => "startwarp_premain",
            HookSlot::DebugPreMain => "startwarp_premain_debug",
            HookSlot::PostMain => "startwarp_postmain",
            HookSlot::AlternateEntry => ALTERNATE_ENTRY_SYMBOL,
        }
    }

    pub fn symbol_cstr(self) -> &'static CStr {
        match self {
            HookSlot::PreGlue => c"startwarp_preglue",
            HookSlot::PreMain => c"startwarp_premain",
            HookSlot::DebugPreMain => c"startwarp_premain_debug",
            HookSlot::PostMain => c"startwarp_postmain",
            HookSlot::AlternateEntry => c"startwarp_launch",
        }
    }

    /// Required slots abort the process when unbound, unless tolerance is set.
    pub fn is_required(self) -> bool {
        matches!(self, HookSlot::PreGlue | HookSlot::PreMain)
    }

    pub fn label(self) -> &'static str {
        match self {
            HookSlot::PreGlue => "pre-glue",
            HookSlot::PreMain => "pre-main",
            HookSlot::DebugPreMain => "debug-pre-main",
            HookSlot::PostMain => "post-main",
            HookSlot::AlternateEntry => "alternate-entry",
        }
    }
}

impl fmt::Display for HookSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Interpret an environment toggle. Unset, empty, `0`, `false`, `no` and `off`
/// are disabled; anything else is enabled.
pub fn is_truthy(value: Option<&str>) -> bool {
    match value.map(str::trim) {
        None | Some("") => false,
        Some(v) => !matches!(
            v.to_ascii_lowercase().as_str(),
            "0" | "false" | "no" | "off"
        ),
    }
}
