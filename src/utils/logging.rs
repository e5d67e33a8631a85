use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins when set; otherwise the
/// crate logs at `info` and dependencies at `warn`.
pub fn init() {
    init_with("opsboard=info,warn");
}

/// Install the global subscriber with an explicit default filter
/// (the CLI's `--verbose` passes a debug directive).
pub fn init_with(default_filter: &str) {
    let fmt_layer = fmt::layer().with_target(false);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
