//! Run configuration: candidate endpoints, ledger location and the fund table.
//!
//! A default configuration is compiled into the binary from `quotes.toml`, so a
//! run works without any file on disk. Passing `--config` replaces it wholesale.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::funds::{FundId, FundTable, RawFund};

const DEFAULT_CONFIG: &str = include_str!("../quotes.toml");

const DEFAULT_TIMEOUT_SECS: u64 = 15;
const DEFAULT_MIN_BODY_CHARS: usize = 1000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("no endpoints configured")]
    NoEndpoints,

    #[error("unknown fund `{0}`")]
    UnknownFund(String),

    #[error("fund `{0}` is missing from the config")]
    MissingFund(FundId),

    #[error("fund `{fund}` has an unusable display name `{name}`")]
    InvalidDisplayName { fund: FundId, name: String },

    #[error("display name `{0}` is used by more than one fund")]
    DuplicateDisplayName(String),

    #[error("fund `{fund}`: `{value}` is not a quote like 21,4981")]
    InvalidQuote { fund: FundId, value: String },

    #[error("fund `{fund}`: invalid pattern `{pattern}`: {source}")]
    InvalidPattern {
        fund: FundId,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("fund `{fund}`: pattern `{pattern}` has no capture group")]
    PatternWithoutCapture { fund: FundId, pattern: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProbeSettings {
    /// Candidate URLs in priority order.
    pub endpoints: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// A body must be strictly longer than this to count as a real page.
    #[serde(default = "default_min_body_chars")]
    pub min_body_chars: usize,
}

impl ProbeSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_min_body_chars() -> usize {
    DEFAULT_MIN_BODY_CHARS
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerSettings {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    probe: ProbeSettings,
    ledger: LedgerSettings,
    funds: BTreeMap<String, RawFund>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub probe: ProbeSettings,
    pub ledger: LedgerSettings,
    pub funds: FundTable,
}

impl Config {
    /// The configuration shipped inside the binary.
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_toml_str(DEFAULT_CONFIG)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(contents)?;

        if raw.probe.endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }

        Ok(Config {
            probe: raw.probe,
            ledger: raw.ledger,
            funds: FundTable::from_raw(raw.funds)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_config_is_valid() {
        let config = Config::embedded().unwrap();
        assert_eq!(config.probe.endpoints.len(), 3);
        assert_eq!(config.probe.timeout(), Duration::from_secs(15));
        assert_eq!(config.probe.min_body_chars, 1000);
        assert_eq!(config.ledger.path, PathBuf::from("cotacoes_fundos_cgd.csv"));

        let usa = config.funds.get(FundId::Usa);
        assert_eq!(usa.display_name, "Caixa Ações EUA");
        assert_eq!(usa.known_values, vec!["14,6558", "14,7888"]);
        assert_eq!(usa.fallback, "14,6558");
        assert_eq!(usa.patterns.len(), 2);
    }

    #[test]
    fn test_defaults_apply() {
        let edited = DEFAULT_CONFIG
            .replace("timeout_secs = 15\n", "")
            .replace("min_body_chars = 1000\n", "");
        let config = Config::from_toml_str(&edited).unwrap();
        assert_eq!(config.probe.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(config.probe.min_body_chars, DEFAULT_MIN_BODY_CHARS);
    }

    #[test]
    fn test_unknown_fund_key_rejected() {
        let edited = DEFAULT_CONFIG.replace("[funds.europe]", "[funds.asia]");
        assert!(matches!(
            Config::from_toml_str(&edited),
            Err(ConfigError::UnknownFund(key)) if key == "asia"
        ));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        assert!(matches!(
            Config::from_toml_str("[probe\nendpoints = "),
            Err(ConfigError::Parse(_))
        ));

        let edited = DEFAULT_CONFIG.replace("min_body_chars", "min_body_size");
        assert!(matches!(
            Config::from_toml_str(&edited),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_empty_endpoint_list_rejected() {
        let config = r#"
            [probe]
            endpoints = []

            [ledger]
            path = "ledger.csv"
        "#;
        // endpoints are checked before the (here absent) fund table
        let err = Config::from_toml_str(&format!("{config}\n[funds]\n")).unwrap_err();
        assert!(matches!(err, ConfigError::NoEndpoints));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/quotes.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quotes.toml");
        fs::write(&path, DEFAULT_CONFIG.replace("cotacoes_fundos_cgd.csv", "other.csv")).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.ledger.path, PathBuf::from("other.csv"));
    }
}
