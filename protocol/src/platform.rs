//! Platform-specific constants for locating and preloading the agent.

use std::ffi::OsString;
use std::path::Path;

/// Library file extension for the current platform.
pub const LIB_EXTENSION: &str = if cfg!(target_os = "macos") { "dylib" } else { "so" };

/// Library file prefix for the current platform.
pub const LIB_PREFIX: &str = "lib";

/// Environment variable the dynamic loader reads preloaded libraries from.
/// `None` where the agent cannot be preloaded.
pub const PRELOAD_ENV_VAR: Option<&str> = if cfg!(target_os = "linux") {
    Some("LD_PRELOAD")
} else {
    None
};

/// File name of a cdylib built from the crate `crate_name` (dashes allowed).
pub fn cdylib_name(crate_name: &str) -> String {
    format!(
        "{}{}.{}",
        LIB_PREFIX,
        crate_name.replace('-', "_"),
        LIB_EXTENSION
    )
}

/// File name of the standalone agent library.
pub fn agent_lib_name() -> String {
    cdylib_name("startwarp-agent")
}

/// Value for the preload variable that puts `library` first, keeping whatever
/// was already preloaded after it.
pub fn preload_value(library: &Path, existing: Option<OsString>) -> OsString {
    let mut value = OsString::from(library.as_os_str());
    if let Some(existing) = existing.filter(|e| !e.is_empty()) {
        value.push(":");
        value.push(existing);
    }
    value
}
