/// One loaded object as reported by the dynamic linker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    /// Path the object was loaded from. The main executable reports
    /// [`MAIN_PROGRAM`].
    pub path: String,
    /// Load bias applied to the object's addresses.
    pub base_address: usize,
}

/// Placeholder path for the main executable, which the linker lists unnamed.
pub const MAIN_PROGRAM: &str = "[main]";
