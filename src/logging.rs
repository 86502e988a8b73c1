use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_ENV: &str = "INTEROP_RS_LOG";

/// Installs a stderr subscriber filtered by `INTEROP_RS_LOG`, falling back to
/// `debug` or `warn` depending on `verbose`. Safe to call more than once.
pub fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
