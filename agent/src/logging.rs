use crate::config::AgentConfig;

/// Install the `env_logger` backend. Later calls are no-ops, so both the
/// startup routine and the wrapped `main` can call this.
pub fn init(config: &AgentConfig) {
    let _ = env_logger::Builder::new()
        .parse_filters(config.log_filter())
        .format_timestamp(None)
        .try_init();
}
