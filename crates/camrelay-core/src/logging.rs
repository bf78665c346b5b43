//! Structured logging with `tracing`.
//!
//! The relay logs to stderr in compact form. `RUST_LOG` overrides the level
//! passed in by the caller.

/// Level used when the debug flag is off.
pub const DEFAULT_LEVEL: &str = "info";
/// Level used when the debug flag is on; frame updates are logged at `debug`.
pub const DEBUG_LEVEL: &str = "debug";

/// Pick the filter level for the debug flag.
pub fn level_for(debug: bool) -> &'static str {
    if debug { DEBUG_LEVEL } else { DEFAULT_LEVEL }
}

/// Install the global `tracing` subscriber, writing compact lines to stderr.
///
/// `RUST_LOG` takes precedence over `level`. Only the first call installs a
/// subscriber; later calls leave it in place.
pub fn init_subscriber(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .compact()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
