//! Environment toggles read by the wrapped entry point.

use startwarp_protocol::{DEBUG_ENV, IGNORE_INIT_ERRORS_ENV, LOG_ENV, is_truthy};

/// How much the agent reports about the process it is attached to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Verbosity {
    #[default]
    Quiet,
    Text,
    Json,
}

impl Verbosity {
    pub fn from_value(value: Option<&str>) -> Self {
        if !is_truthy(value) {
            return Verbosity::Quiet;
        }
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "json" => Verbosity::Json,
            _ => Verbosity::Text,
        }
    }

    pub fn is_enabled(self) -> bool {
        self != Verbosity::Quiet
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentConfig {
    pub verbosity: Verbosity,
    /// Continue when a required hook is missing or fails.
    pub tolerate_missing_hooks: bool,
    /// Explicit `env_logger` filter, overriding the verbosity default.
    pub log_filter: Option<String>,
}

impl AgentConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            verbosity: Verbosity::from_value(lookup(DEBUG_ENV).as_deref()),
            tolerate_missing_hooks: is_truthy(lookup(IGNORE_INIT_ERRORS_ENV).as_deref()),
            log_filter: lookup(LOG_ENV).filter(|f| !f.trim().is_empty()),
        }
    }

    pub fn log_filter(&self) -> &str {
        match &self.log_filter {
            Some(filter) => filter,
            None if self.verbosity.is_enabled() => "debug",
            None => "warn",
        }
    }
}
