//! CLI & Config (C11) for the janitor binary.

use clap::Parser;
use serde::Deserialize;

use wifiology_common::Result;

#[derive(Debug, Parser)]
#[command(name = "wifiology-janitor", about = "Prunes aged measurements from the store")]
pub struct Cli {
    /// Path to the sqlite store file.
    pub db: String,

    #[arg(long = "measurement-max-age-days")]
    pub measurement_max_age_days: Option<f64>,

    #[arg(long = "do-vacuum")]
    pub do_vacuum: bool,

    #[arg(long = "do-optimize")]
    pub do_optimize: bool,

    #[arg(short = 'l', long = "log-file")]
    pub log_file: Option<String>,

    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    #[arg(long = "db-timeout-seconds")]
    pub db_timeout_seconds: Option<u64>,

    #[arg(long = "config")]
    pub config: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    measurement_max_age_days: Option<f64>,
    log_file: Option<String>,
    db_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub db: String,
    pub measurement_max_age_days: f64,
    pub do_vacuum: bool,
    pub do_optimize: bool,
    pub log_file: String,
    pub verbose: bool,
    pub db_timeout_seconds: u64,
}

impl Cli {
    pub fn resolve(self) -> Result<Settings> {
        let file: FileConfig =
            wifiology_common::config::load_layered(self.config.as_deref(), "WIFIOLOGY_JANITOR").unwrap_or_default();

        Ok(Settings {
            db: self.db,
            measurement_max_age_days: self.measurement_max_age_days.or(file.measurement_max_age_days).unwrap_or(30.0),
            do_vacuum: self.do_vacuum,
            do_optimize: self.do_optimize,
            log_file: self.log_file.or(file.log_file).unwrap_or_else(|| "-".to_string()),
            verbose: self.verbose,
            db_timeout_seconds: self.db_timeout_seconds.or(file.db_timeout_seconds).unwrap_or(60),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_cli() -> Cli {
        Cli {
            db: "wifiology.db".to_string(),
            measurement_max_age_days: None,
            do_vacuum: false,
            do_optimize: false,
            log_file: None,
            verbose: false,
            db_timeout_seconds: None,
            config: None,
        }
    }

    #[test]
    fn defaults_apply_when_nothing_else_is_supplied() {
        let settings = base_cli().resolve().unwrap();
        assert_eq!(settings.measurement_max_age_days, 30.0);
        assert!(!settings.do_vacuum);
        assert!(!settings.do_optimize);
    }

    #[test]
    fn explicit_cli_flags_win_over_everything() {
        let mut cli = base_cli();
        cli.measurement_max_age_days = Some(7.0);
        cli.do_vacuum = true;
        let settings = cli.resolve().unwrap();
        assert_eq!(settings.measurement_max_age_days, 7.0);
        assert!(settings.do_vacuum);
    }
}
