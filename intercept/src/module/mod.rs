//! Loaded-object inspection used to validate and describe resolved addresses.

#[cfg(not(target_os = "linux"))]
use crate::types::ModuleInfo;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "linux")]
pub use linux::*;

#[cfg(not(target_os = "linux"))]
pub fn enumerate_modules() -> Vec<ModuleInfo> {
    Vec::new()
}

#[cfg(not(target_os = "linux"))]
pub fn module_for_address(_address: usize) -> Option<String> {
    None
}
