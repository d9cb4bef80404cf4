use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "DOCSTREAM_LOG";

/// Install the stderr subscriber. `DOCSTREAM_LOG` wins over `RUST_LOG`;
/// without either, `verbose` picks between debug and warn for this crate.
pub fn init(verbose: bool) {
    let fallback = if verbose { "docstream=debug" } else { "docstream=warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(fallback));

    // Ignore the error when a subscriber is already set (tests, embedding).
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
