mod act;
mod cli;
mod comment;
mod config;
mod diff;
mod extract;
mod model;
mod observe;
mod poll;
mod process;
mod schedule;
mod storage;

use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    init_tracing();
    cli::run()
}

/// Logs go to stderr; `DEV_WATCH_LOG` takes an `EnvFilter` directive.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("DEV_WATCH_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
