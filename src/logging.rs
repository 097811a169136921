//! Logging setup for the `inzip` binary.
//!
//! The library only emits `tracing` events; this module installs the
//! subscriber that prints them. `RUST_LOG` takes precedence over `-v`:
//!
//! ```bash
//! RUST_LOG=inzip=trace inzip list archive.zip
//! ```

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Default filter for a verbosity count given on the command line.
pub fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "inzip=warn",
        1 => "inzip=info",
        2 => "inzip=debug",
        _ => "inzip=trace",
    }
}

/// Initialize the logging/tracing system. Events go to stderr so they never
/// mix with entry content written to stdout.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .compact(),
    );

    // Set as global default (ignore error if already set)
    let _ = tracing::subscriber::set_global_default(subscriber);
}
