use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // stdout carries the JSON outcome, so diagnostics go to stderr.
    let filter = EnvFilter::try_from_env("REENGAGE_CLI_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_target(false).with_env_filter(filter).with_writer(std::io::stderr).init();

    reengage_cli::run()
}
