//! Logging setup for the `galleria` binary.
//!
//! Levels are chosen in priority order:
//!
//! 1. `RUST_LOG` (if set and valid)
//! 2. `--quiet` (errors only) or `--verbose` (debug, then trace)
//! 3. Info
//!
//! Logs go to stderr so listings on stdout stay pipeable.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Calling it twice is a no-op.
pub fn init_logging(verbose: u8, quiet: bool) {
    let (filter, from_env) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => {
            let level = determine_level(verbose, quiet);
            (EnvFilter::default().add_directive(level.into()), false)
        }
    };

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        // Module paths are noise at the default level
        .with_target(verbose > 0 || from_env)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(
            "Logging initialized at {}",
            if from_env { "RUST_LOG".to_string() } else { determine_level(verbose, quiet).to_string() }
        );
    }
}

fn determine_level(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        LevelFilter::ERROR
    } else {
        match verbose {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }
}
