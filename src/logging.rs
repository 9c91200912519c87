use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise this crate logs at `info`, or `debug`
/// with `verbose`.
pub fn init(verbose: bool) {
    let default = if verbose {
        "chain_ingest=debug"
    } else {
        "chain_ingest=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .init();
}
