use tracing_subscriber::EnvFilter;

/// Initialise logging. Debug builds default to `debug`, release builds to
/// `info`. `RUST_LOG` may raise the level only when debug logging is enabled
/// in the settings file.
pub fn init(debug: bool) {
    let level = if debug { "debug" } else { "info" };

    // With debug logging off the filter is pinned so a stray RUST_LOG in the
    // environment cannot flood the console.
    let filter = if debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    } else {
        EnvFilter::new(level)
    };

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
