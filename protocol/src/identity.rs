//! Read-only snapshot of who the current process is.

use std::fmt;

use serde::{Deserialize, Serialize};

#[cfg(all(target_os = "linux", target_env = "gnu"))]
unsafe extern "C" {
    static program_invocation_name: *const libc::c_char;
}

/// Process identity captured at a single point in time.
///
/// Not cached: every call to [`ProcessIdentity::capture`] reads the values
/// again, so a snapshot taken after `fork` reports the child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessIdentity {
    pub pid: u32,
    pub gid: u32,
    pub uid: u32,
    pub ppid: u32,
    /// Name the process was invoked under.
    pub invocation_name: String,
    /// Value of `_`, which most shells set to the path of the command they ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launcher: Option<String>,
}

impl ProcessIdentity {
    pub fn capture() -> Self {
        // SAFETY: these calls only read process credentials and cannot fail.
        let (pid, gid, uid, ppid) = unsafe {
            (
                libc::getpid() as u32,
                libc::getgid(),
                libc::getuid(),
                libc::getppid() as u32,
            )
        };

        Self {
            pid,
            gid,
            uid,
            ppid,
            invocation_name: invocation_name(),
            launcher: std::env::var("_").ok(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
fn invocation_name() -> String {
    // SAFETY: glibc initialises program_invocation_name before any constructor runs.
    let ptr = unsafe { program_invocation_name };
    if ptr.is_null() {
        return fallback_invocation_name();
    }
    unsafe { std::ffi::CStr::from_ptr(ptr) }
        .to_string_lossy()
        .into_owned()
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
fn invocation_name() -> String {
    fallback_invocation_name()
}

fn fallback_invocation_name() -> String {
    std::env::args_os()
        .next()
        .map(|a| a.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl fmt::Display for ProcessIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Process id: {}, group: {} user: {}, parent pid: {}",
            self.pid, self.gid, self.uid, self.ppid
        )?;
        write!(f, "Process name: {}", self.invocation_name)?;
        if let Some(launcher) = &self.launcher {
            write!(f, "\nLaunched via: {}", launcher)?;
        }
        Ok(())
    }
}
