//! CLI & Config (C11) for the capture binary: a declarative `clap` parser
//! layered over an optional TOML config file and `WIFIOLOGY_CAPTURE__*`
//! environment overrides, in that precedence order (CLI wins).

use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;

use wifiology_common::Result;

#[derive(Debug, Parser)]
#[command(name = "wifiology-capture", about = "Channel-hopping 802.11 capture worker")]
pub struct Cli {
    /// Wireless interface to capture from (will be placed into monitor mode).
    pub interface: String,
    /// Scratch directory for per-channel pcap files.
    pub tmp_dir: PathBuf,

    #[arg(short = 's', long = "sample-seconds")]
    pub sample_seconds: Option<u64>,

    #[arg(long = "database-loc")]
    pub database_loc: Option<String>,

    #[arg(short = 'r', long = "capture-rounds")]
    pub capture_rounds: Option<u64>,

    #[arg(long = "ignore-non-root")]
    pub ignore_non_root: bool,

    #[arg(long = "db-timeout-seconds")]
    pub db_timeout_seconds: Option<u64>,

    #[arg(short = 'l', long = "log-file")]
    pub log_file: Option<String>,

    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    #[arg(long = "config")]
    pub config: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    sample_seconds: Option<u64>,
    database_loc: Option<String>,
    capture_rounds: Option<u64>,
    db_timeout_seconds: Option<u64>,
    log_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub interface: String,
    pub tmp_dir: PathBuf,
    pub sample_seconds: u64,
    pub database_loc: String,
    pub capture_rounds: u64,
    pub ignore_non_root: bool,
    pub db_timeout_seconds: u64,
    pub log_file: String,
    pub verbose: bool,
}

impl Cli {
    pub fn resolve(self) -> Result<Settings> {
        let file: FileConfig =
            wifiology_common::config::load_layered(self.config.as_deref(), "WIFIOLOGY_CAPTURE").unwrap_or_default();

        Ok(Settings {
            interface: self.interface,
            tmp_dir: self.tmp_dir,
            sample_seconds: self.sample_seconds.or(file.sample_seconds).unwrap_or(10),
            database_loc: self.database_loc.or(file.database_loc).unwrap_or_else(|| ":memory:".to_string()),
            capture_rounds: self.capture_rounds.or(file.capture_rounds).unwrap_or(0),
            ignore_non_root: self.ignore_non_root,
            db_timeout_seconds: self.db_timeout_seconds.or(file.db_timeout_seconds).unwrap_or(60),
            log_file: self.log_file.or(file.log_file).unwrap_or_else(|| "-".to_string()),
            verbose: self.verbose,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_nothing_else_is_supplied() {
        let cli = Cli {
            interface: "wlan0mon".to_string(),
            tmp_dir: PathBuf::from("/tmp/wifiology"),
            sample_seconds: None,
            database_loc: None,
            capture_rounds: None,
            ignore_non_root: false,
            db_timeout_seconds: None,
            log_file: None,
            verbose: false,
            config: None,
        };
        let settings = cli.resolve().unwrap();
        assert_eq!(settings.sample_seconds, 10);
        assert_eq!(settings.database_loc, ":memory:");
        assert_eq!(settings.capture_rounds, 0);
        assert_eq!(settings.db_timeout_seconds, 60);
        assert_eq!(settings.log_file, "-");
    }

    #[test]
    fn explicit_cli_flag_wins_over_everything() {
        let cli = Cli {
            interface: "wlan0mon".to_string(),
            tmp_dir: PathBuf::from("/tmp/wifiology"),
            sample_seconds: Some(30),
            database_loc: None,
            capture_rounds: None,
            ignore_non_root: true,
            db_timeout_seconds: None,
            log_file: None,
            verbose: true,
            config: None,
        };
        let settings = cli.resolve().unwrap();
        assert_eq!(settings.sample_seconds, 30);
        assert!(settings.ignore_non_root);
        assert!(settings.verbose);
    }
}
