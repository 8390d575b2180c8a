//! Entry point for the `wifiology-capture` binary: resolves configuration,
//! then either runs as the supervised capture worker (if spawned with a
//! heartbeat fd) or as the watchdog supervisor that spawns and restarts it.

mod capture_loop;
mod capture_sink;
mod cli;
mod radio;
mod watchdog;

use std::time::Duration;

use clap::Parser;

use cli::Settings;
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

    if let Some(mut heartbeat_writer) = watchdog::HeartbeatWriter::from_env() {
        std::process::exit(run_worker(&settings, &mut heartbeat_writer));
    }

    if !is_root() {
        if settings.ignore_non_root {
            tracing::warn!("running without root privileges because --ignore-non-root was set");
        } else {
            tracing::error!("capture requires root privileges; pass --ignore-non-root to override");
            std::process::exit(1);
        }
    }

    let exe = match std::env::current_exe() {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(error = %e, "could not resolve the current executable path");
            std::process::exit(1);
        }
    };
    let args: Vec<String> = std::env::args().skip(1).collect();

    let result = watchdog::run_monitored(
        move |write_fd| {
            std::process::Command::new(&exe)
                .args(&args)
                .env(watchdog::CHILD_FD_ENV, write_fd.to_string())
                .spawn()
        },
        watchdog::Policy::default(),
    );

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            tracing::error!(error = %e, "supervisor exited with an unhandled error");
            std::process::exit(1);
        }
    }
}

fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Runs inside the supervised child: opens the store, acquires the radio,
/// and drives the capture loop until it returns or a heartbeat-timeout kill
/// tears this process down from outside.
fn run_worker(settings: &Settings, heartbeat_writer: &mut watchdog::HeartbeatWriter) -> i32 {
    let mut store = match Store::open(&settings.database_loc, Duration::from_secs(settings.db_timeout_seconds)) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to open store");
            return 1;
        }
    };

    let radio = match radio::RadioHandle::acquire(&settings.interface) {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(error = %e, "failed to acquire radio interface");
            return 1;
        }
    };

    let config = capture_loop::LoopConfig {
        interface: settings.interface.clone(),
        tmp_dir: settings.tmp_dir.clone(),
        sample_seconds: settings.sample_seconds,
        capture_rounds: settings.capture_rounds,
    };

    let result = capture_loop::run(&mut store, &radio, &config, || heartbeat_writer.beat());
    let _ = radio.release();

    match result {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %e, "capture loop exited with an unhandled error");
            1
        }
    }
}
