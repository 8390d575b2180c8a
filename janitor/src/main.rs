//! Entry point for the `wifiology-janitor` binary: a single pass of
//! age-based deletion plus optional engine maintenance, then exit.

mod clean;
mod cli;

use std::time::Duration;

use clap::Parser;

use clean::CleanOptions;
use wifiology_common::store::Store;

fn main() {
    let cli = cli::Cli::parse();
    let settings = match cli.resolve() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    let _log_guard = wifiology_common::logging::init(settings.verbose, Some(&settings.log_file));

    let mut store = match Store::open(&settings.db, Duration::from_secs(settings.db_timeout_seconds)) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to open store");
            std::process::exit(1);
        }
    };

    let options = CleanOptions {
        max_age_days: settings.measurement_max_age_days,
        do_vacuum: settings.do_vacuum,
        do_optimize: settings.do_optimize,
    };

    match clean::clean(&mut store, &options) {
        Ok(_) => std::process::exit(0),
        Err(e) => {
            tracing::error!(error = %e, "janitor run failed");
            std::process::exit(1);
        }
    }
}
