//! Names, codes and types shared between the startwarp agent and the launcher probe.

pub mod identity;
pub mod names;
pub mod platform;

pub use identity::ProcessIdentity;
pub use names::*;
