//! CLI & Config (C11) for the upload binary: same layered precedence as the
//! capture binary's parser (CLI > file > environment > hardcoded default).

use clap::Parser;
use serde::Deserialize;

use wifiology_common::Result;

#[derive(Debug, Parser)]
#[command(name = "wifiology-upload", about = "Ships unshipped measurements to the collector")]
pub struct Cli {
    /// Path to the sqlite store file.
    pub db: String,
    /// Collector base URL, e.g. `https://collector.example.org`.
    pub base_url: String,
    /// This sensor's node id as registered with the collector.
    pub node_id: String,
    /// API key sent as `X-API-Key`.
    pub api_key: String,

    #[arg(long = "batch-size")]
    pub batch_size: Option<i64>,

    #[arg(long = "db-timeout-seconds")]
    pub db_timeout_seconds: Option<u64>,

    #[arg(short = 'l', long = "log-file")]
    pub log_file: Option<String>,

    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    #[arg(long = "config")]
    pub config: Option<String>,

    #[arg(long = "round-delay-seconds")]
    pub round_delay_seconds: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    batch_size: Option<i64>,
    db_timeout_seconds: Option<u64>,
    log_file: Option<String>,
    round_delay_seconds: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub db: String,
    pub base_url: String,
    pub node_id: String,
    pub api_key: String,
    pub batch_size: i64,
    pub db_timeout_seconds: u64,
    pub log_file: String,
    pub verbose: bool,
    pub round_delay_seconds: u64,
}

impl Cli {
    pub fn resolve(self) -> Result<Settings> {
        let file: FileConfig =
            wifiology_common::config::load_layered(self.config.as_deref(), "WIFIOLOGY_UPLOAD").unwrap_or_default();

        Ok(Settings {
            db: self.db,
            base_url: self.base_url,
            node_id: self.node_id,
            api_key: self.api_key,
            batch_size: self.batch_size.or(file.batch_size).unwrap_or(50),
            db_timeout_seconds: self.db_timeout_seconds.or(file.db_timeout_seconds).unwrap_or(60),
            log_file: self.log_file.or(file.log_file).unwrap_or_else(|| "-".to_string()),
            verbose: self.verbose,
            round_delay_seconds: self.round_delay_seconds.or(file.round_delay_seconds).unwrap_or(30),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_cli() -> Cli {
        Cli {
            db: "wifiology.db".to_string(),
            base_url: "https://collector.example.org".to_string(),
            node_id: "node-1".to_string(),
            api_key: "secret".to_string(),
            batch_size: None,
            db_timeout_seconds: None,
            log_file: None,
            verbose: false,
            config: None,
            round_delay_seconds: None,
        }
    }

    #[test]
    fn defaults_apply_when_nothing_else_is_supplied() {
        let settings = base_cli().resolve().unwrap();
        assert_eq!(settings.batch_size, 50);
        assert_eq!(settings.round_delay_seconds, 30);
        assert_eq!(settings.log_file, "-");
    }

    #[test]
    fn explicit_cli_flag_wins_over_everything() {
        let mut cli = base_cli();
        cli.batch_size = Some(10);
        let settings = cli.resolve().unwrap();
        assert_eq!(settings.batch_size, 10);
    }
}
