use tracing_subscriber::EnvFilter;

const CRATES: [&str; 6] = [
    "parcel",
    "parcel_archive",
    "parcel_compress",
    "parcel_config",
    "parcel_storage",
    "parcel_sync",
];

/// Default filter: everything else at `warn`, this workspace at `level`.
fn default_directives(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    std::iter::once("warn".to_string())
        .chain(CRATES.iter().map(|name| format!("{name}={level}")))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber. `RUST_LOG` replaces the default filter.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .init();
}
