use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("symbol name {0:?} contains an interior NUL byte")]
    InvalidName(String),

    #[error("symbol {name} not found: {reason}")]
    NotFound { name: String, reason: String },

    #[error("no usable dlsym revision found (tried {tried})")]
    BootstrapUnavailable { tried: String },

    #[error("{name}: expected a function pointer type ({expected} bytes), got {actual} bytes")]
    NotAFunctionPointer {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("symbol resolution is not supported on this platform")]
    Unsupported,
}

pub type Result<T> = std::result::Result<T, ResolveError>;
