use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Console logging with `RUST_LOG` filtering. Falls back to `info`, or
/// `debug` when `verbose`. Safe to call more than once.
pub fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_names(true)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(verbose, "logging initialized");
    }
}
