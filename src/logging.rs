//! Logging init: structured logs on stderr so stdout stays free for reports.

use tracing_subscriber::EnvFilter;

/// `RUST_LOG` takes precedence over the `verbose` default.
pub fn init_logging(verbose: bool) {
    let default_filter = if verbose { "info,rmsync=debug" } else { "warn,rmsync=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
