//! Entry point for the `wifiology-upload` binary: loops `pull_and_upload`
//! forever, snoozing a fixed delay between rounds that made no progress.

mod cli;
mod uploader;

use std::time::Duration;

use clap::Parser;

use uploader::ReqwestTransport;
use wifiology_common::store::Store;

#[tokio::main]
async fn main() {
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

    let transport = ReqwestTransport::new();
    loop {
        let progressed = uploader::pull_and_upload(
            &mut store,
            &transport,
            &settings.base_url,
            &settings.node_id,
            &settings.api_key,
            settings.batch_size,
        )
        .await;

        match progressed {
            Ok(true) => continue,
            Ok(false) => {
                tokio::time::sleep(Duration::from_secs(settings.round_delay_seconds)).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "upload round failed, snoozing before retry");
                tokio::time::sleep(Duration::from_secs(settings.round_delay_seconds)).await;
            }
        }
    }
}
