//! Plugin preloaded by the probe integration tests.
//!
//! Prints a marker line to stderr from each hook so tests can check the
//! order. Behaviour is steered through the environment:
//!
//! - `STARTWARP_FIXTURE_FAIL` names a hook (`pre-glue`, `pre-main`,
//!   `post-main`) that should return an error;
//! - `STARTWARP_FIXTURE_ENTRY_STATUS` is the value the alternate entry
//!   returns, 5 when unset.

use std::io::Write;

use anyhow::bail;
use log::debug;
use startwarp_agent::{AlternateEntryFn, Plugin, ProcessIdentity};

pub const FAIL_ENV: &str = "STARTWARP_FIXTURE_FAIL";
pub const ENTRY_STATUS_ENV: &str = "STARTWARP_FIXTURE_ENTRY_STATUS";
pub const DEFAULT_ENTRY_STATUS: libc::c_int = 5;

struct FixturePlugin;

fn marker(line: std::fmt::Arguments<'_>) {
    let _ = writeln!(std::io::stderr(), "fixture: {}", line);
}

fn hook(label: &str, detail: &str) -> anyhow::Result<()> {
    marker(format_args!("{}{}", label, detail));
    if std::env::var(FAIL_ENV).is_ok_and(|v| v == label) {
        bail!("{} failed on request", label);
    }
    Ok(())
}

unsafe extern "C" fn launch() -> libc::c_int {
    let status = std::env::var(ENTRY_STATUS_ENV)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(DEFAULT_ENTRY_STATUS);
    marker(format_args!("launch -> {}", status));
    status
}

impl Plugin for FixturePlugin {
    fn name(&self) -> &str {
        "fixture"
    }

    fn pre_glue(&self) -> anyhow::Result<()> {
        hook("pre-glue", "")
    }

    fn pre_main(&self) -> anyhow::Result<()> {
        hook("pre-main", "")
    }

    fn debug_pre_main(&self, identity: &ProcessIdentity) {
        debug!("attached to {}", identity.invocation_name);
        marker(format_args!("debug-pre-main pid={}", identity.pid));
    }

    fn post_main(&self, status: i32) -> anyhow::Result<()> {
        hook("post-main", &format!(" status={}", status))
    }

    fn alternate_entry(&self) -> Option<AlternateEntryFn> {
        Some(launch as AlternateEntryFn)
    }
}

startwarp_agent::export_plugin!(FixturePlugin);
