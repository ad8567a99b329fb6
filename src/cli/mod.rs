//! Command-line surface of the `builder` and `launcher` binaries

pub mod args;
pub mod commands;

pub use args::{BuilderArgs, LauncherArgs, LogArgs, LogFormat};

use tracing_subscriber::EnvFilter;

/// Install the stderr subscriber: 0 = warn, 1 = info, 2+ = debug
///
/// `RUST_LOG` takes precedence over the verbosity flag. Without it only this
/// crate's events pass; TLS and HTTP internals stay quiet.
pub fn init_logging(log: &LogArgs) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(log.verbose)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time();

    // A second init (tests, embedding) keeps the first subscriber
    let _ = match log.log_format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

fn default_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "buildpack_lifecycle=warn",
        1 => "buildpack_lifecycle=info",
        _ => "buildpack_lifecycle=debug",
    }
}
