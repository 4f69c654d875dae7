use startwarp_intercept::ResolveError;
use startwarp_protocol::{HOOK_MISSING_EXIT_CODE, HookSlot, RESOLUTION_FAILURE_EXIT_CODE};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum AttachError {
    #[error("symbol resolution failed: {0}")]
    Resolve(#[from] ResolveError),

    #[error("plugin {existing} is already registered, refusing {rejected}")]
    AlreadyRegistered { existing: String, rejected: String },

    #[error("required {0} hook is not bound")]
    MissingRequiredHook(HookSlot),

    #[error("required {slot} hook failed: {reason}")]
    RequiredHookFailed { slot: HookSlot, reason: String },
}

impl AttachError {
    /// Exit status the process terminates with when this error is fatal.
    pub fn exit_code(&self) -> i32 {
        match self {
            AttachError::Resolve(_) => RESOLUTION_FAILURE_EXIT_CODE,
            AttachError::AlreadyRegistered { .. }
            | AttachError::MissingRequiredHook(_)
            | AttachError::RequiredHookFailed { .. } => HOOK_MISSING_EXIT_CODE,
        }
    }
}
