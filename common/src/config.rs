//! Layered configuration shared by all three binaries: an optional TOML
//! file, then prefixed double-underscore-separated environment variables,
//! mirroring the reference server's own `Config::builder()` layering. CLI
//! flags are layered on top of the result by each binary's own `cli` module,
//! since `clap` parses those independently of this crate.

use config::{Config as RawConfig, Environment, File, FileFormat};
use serde::de::DeserializeOwned;

use crate::error::{Result, WifiologyError};

pub fn load_layered<T: DeserializeOwned>(config_path: Option<&str>, env_prefix: &str) -> Result<T> {
    let mut builder = RawConfig::builder();
    if let Some(path) = config_path {
        builder = builder.add_source(File::new(path, FileFormat::Toml).required(false));
    }
    builder = builder.add_source(Environment::with_prefix(env_prefix).separator("__"));
    let raw = builder
        .build()
        .map_err(|e| WifiologyError::Invariant(format!("config load failed: {e}")))?;
    raw.try_deserialize()
        .map_err(|e| WifiologyError::Invariant(format!("config parse failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Settings {
        db_timeout_seconds: u64,
        #[serde(default)]
        batch_size: Option<u32>,
    }

    #[test]
    fn file_values_load_when_env_absent() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "db_timeout_seconds = 60\nbatch_size = 5").unwrap();
        let settings: Settings = load_layered(Some(file.path().to_str().unwrap()), "WIFIOLOGY_TEST_FILE").unwrap();
        assert_eq!(settings, Settings { db_timeout_seconds: 60, batch_size: Some(5) });
    }

    #[test]
    fn environment_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "db_timeout_seconds = 60").unwrap();
        std::env::set_var("WIFIOLOGY_TEST_ENV__DB_TIMEOUT_SECONDS", "120");
        let settings: Settings = load_layered(Some(file.path().to_str().unwrap()), "WIFIOLOGY_TEST_ENV").unwrap();
        std::env::remove_var("WIFIOLOGY_TEST_ENV__DB_TIMEOUT_SECONDS");
        assert_eq!(settings.db_timeout_seconds, 120);
    }
}
