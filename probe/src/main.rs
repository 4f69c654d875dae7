//! startwarp-probe: reports whether startwarp is attached to this process.
//!
//! Run on its own it prints guidance and exits 0. Run under the agent with a
//! plugin that provides an alternate entry point, it hands control to that
//! entry point and exits with whatever it returns.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use log::debug;
use startwarp_intercept::Symbol;
use startwarp_protocol::{ExportedHookFn, HookSlot, PROBE_GUIDANCE};

#[derive(Parser)]
#[command(name = "startwarp-probe")]
#[command(version, about = "Check whether startwarp is loaded", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Ignored; accepted so the probe can stand in for any host command line
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, hide = true)]
    args: Vec<String>,
}

/// Look the alternate entry point up through the process's `dlsym`, which is
/// the agent's when the agent is preloaded.
fn find_alternate_entry() -> Option<Symbol<ExportedHookFn>> {
    let slot = HookSlot::AlternateEntry;
    let address = unsafe { libc::dlsym(libc::RTLD_DEFAULT, slot.symbol_cstr().as_ptr()) };
    // SAFETY: every alternate entry point has the exported hook signature.
    let entry =
        unsafe { Symbol::<ExportedHookFn>::from_address(slot.symbol_name(), address) }.ok()?;
    debug!("{} at {:#x}", entry.name(), entry.address());
    Some(entry)
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    if !cli.args.is_empty() {
        debug!("ignoring {} trailing argument(s)", cli.args.len());
    }

    match find_alternate_entry() {
        None => {
            println!("{}", PROBE_GUIDANCE);
            Ok(ExitCode::SUCCESS)
        }
        Some(entry) => {
            let status = unsafe { (entry.get())() };
            debug!("alternate entry returned {}", status);
            // Returning instead of exiting keeps the post-main hook in the
            // path. Only the low 8 bits survive, as with exit(3).
            Ok(ExitCode::from(status as u8))
        }
    }
}
