//! Process identity output, gated on the verbosity toggle.

use std::io::{self, Write};

use log::debug;
use startwarp_intercept::module;
use startwarp_protocol::ProcessIdentity;

use crate::config::Verbosity;

/// Write `identity` to `out` in the requested format. Writes nothing when quiet.
pub fn emit(verbosity: Verbosity, identity: &ProcessIdentity, out: &mut dyn Write) -> io::Result<()> {
    match verbosity {
        Verbosity::Quiet => Ok(()),
        Verbosity::Text => writeln!(out, "{}", identity),
        Verbosity::Json => {
            let json = identity.to_json().map_err(io::Error::other)?;
            writeln!(out, "{}", json)
        }
    }
}

/// Log the loaded objects in load order. The agent should sit between the
/// executable and the C library.
pub fn log_load_order() {
    for (index, m) in module::enumerate_modules().iter().enumerate() {
        debug!("load order [{}] {} at {:#x}", index, m.path, m.base_address);
    }
}
