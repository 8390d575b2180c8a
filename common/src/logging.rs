//! Process-global structured logging, initialized once at the top of each
//! binary's `main`. Stderr by default; `--log-file` redirects to a
//! non-blocking file writer. `--verbose` raises the default level from
//! `info` to `debug`; `RUST_LOG` always wins if set, matching the reference
//! server's own env-filter-driven subscriber setup.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Returned guard must be kept alive for the life of the process when a log
/// file is in use, or buffered lines can be lost on exit; binaries store it
/// in a local that outlives `main`'s body.
pub fn init(verbose: bool, log_file: Option<&str>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    match log_file {
        Some(path) if path != "-" => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .unwrap_or_else(|e| panic!("could not open log file {path}: {e}"));
            let (writer, guard) = tracing_appender::non_blocking(file);
            builder.with_writer(writer).with_ansi(false).init();
            Some(guard)
        }
        _ => {
            builder.with_writer(std::io::stderr).init();
            None
        }
    }
}
