use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use tokencraft_connector::config::ConnectorConfig;
use tokencraft_logger::LogConfig;

/// The top-level configuration for the `tokencraft` binary.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct CliConfig {
    #[serde(default)]
    pub connector: ConnectorConfig,
    #[serde(default)]
    pub cli: CliSpecificConfig,
}

/// Contains settings that are unique to the binary.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CliSpecificConfig {
    /// Path to the Solana keypair file used as the wallet. A leading `~/` is expanded.
    pub keypair_path: String,
    /// Seconds between two forced refreshes in `run`. `0` disables them.
    #[serde(default)]
    pub refresh_interval_secs: u64,
    /// Logging configuration.
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for CliSpecificConfig {
    fn default() -> Self {
        Self {
            keypair_path: "~/.config/solana/id.json".to_string(),
            refresh_interval_secs: 0,
            log: LogConfig::default(),
        }
    }
}

impl CliSpecificConfig {
    /// The keypair path with a leading `~/` replaced by `$HOME`.
    pub fn keypair_path(&self) -> PathBuf {
        expand_home(&self.keypair_path)
    }
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}

/// Loads the configuration from a TOML file.
///
/// Values may be overridden by `TOKENCRAFT`-prefixed environment variables that use `__`
/// as the path separator.
pub fn load_config(path: &str) -> Result<CliConfig> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name(path))
        .add_source(config::Environment::with_prefix("TOKENCRAFT").separator("__"));

    let settings: CliConfig = builder
        .build()
        .context(format!("Failed to build configuration from '{}'", path))?
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    Ok(settings)
}
