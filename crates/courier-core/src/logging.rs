//! Global `tracing` subscriber setup.
//!
//! Library crates only emit through `tracing` macros; binaries call one of
//! the initialisers below once at startup. `RUST_LOG` always wins over the
//! level passed in.

use tracing_subscriber::EnvFilter;

fn filter_for(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize the global subscriber with compact, human-readable stderr output.
///
/// Subsequent calls are no-ops.
pub fn init_subscriber(level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter_for(level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // set_global_default is a no-op if already set
    let _ = subscriber.try_init();
}

/// Initialize the global subscriber with JSON lines on stderr.
///
/// Subsequent calls are no-ops.
pub fn init_json_subscriber(level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter_for(level))
        .with_target(true)
        .with_current_span(true)
        .with_writer(std::io::stderr);

    let _ = subscriber.try_init();
}

/// Level used when logging is switched off in settings: only warnings and errors.
pub const QUIET_LEVEL: &str = "warn";

/// Pick the subscriber level from the `logEnabled` switch and an explicit override.
pub fn effective_level<'a>(log_enabled: bool, requested: &'a str) -> &'a str {
    if log_enabled { requested } else { QUIET_LEVEL }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_subscriber_does_not_panic() {
        init_subscriber("debug");
        init_subscriber("info");
        init_json_subscriber("info");
    }

    #[test]
    fn disabled_logging_is_quiet() {
        assert_eq!(effective_level(false, "debug"), "warn");
        assert_eq!(effective_level(true, "debug"), "debug");
    }
}
