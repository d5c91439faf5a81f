use cashpilot_core::{AnalysisConfig, ConfigError};
use cashpilot_import::{Categorizer, RuleError};
use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Path of the optional TOML config file.
pub const CONFIG_ENV: &str = "CASHPILOT_CONFIG";
/// Overrides `addr` from the config file.
pub const ADDR_ENV: &str = "CASHPILOT_ADDR";

const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ServerConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid server config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid listen address '{value}': {source}")]
    Addr {
        value: String,
        source: AddrParseError,
    },
    #[error(transparent)]
    Analysis(#[from] ConfigError),
    #[error(transparent)]
    Rules(#[from] RuleError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// Bunyan JSON records.
    Json,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    /// Maximum request body size in bytes.
    pub body_limit: usize,
    pub log_format: LogFormat,
    /// Optional `[[rules]]` file with user categorization rules.
    pub rules_file: Option<PathBuf>,
    pub analysis: AnalysisConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            body_limit: DEFAULT_BODY_LIMIT,
            log_format: LogFormat::default(),
            rules_file: None,
            analysis: AnalysisConfig::default(),
        }
    }
}

fn read(path: &Path) -> Result<String, ServerConfigError> {
    std::fs::read_to_string(path).map_err(|source| ServerConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

impl ServerConfig {
    pub fn from_toml(content: &str) -> Result<Self, ServerConfigError> {
        let config: ServerConfig = toml::from_str(content)?;
        config.analysis.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ServerConfigError> {
        Self::from_toml(&read(path)?)
    }

    /// Defaults, then the file named by `CASHPILOT_CONFIG`, then `CASHPILOT_ADDR`.
    pub fn from_env() -> Result<Self, ServerConfigError> {
        let config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(Path::new(&path))?,
            None => Self::default(),
        };
        config.with_addr_override(std::env::var(ADDR_ENV).ok())
    }

    pub fn with_addr_override(mut self, value: Option<String>) -> Result<Self, ServerConfigError> {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            self.addr = value
                .trim()
                .parse()
                .map_err(|source| ServerConfigError::Addr { value, source })?;
        }
        Ok(self)
    }

    /// The built-in keyword tables, plus user rules when `rules_file` is set.
    pub fn categorizer(&self) -> Result<Categorizer, ServerConfigError> {
        match &self.rules_file {
            Some(path) => Ok(Categorizer::from_toml(&read(path)?, &self.analysis)?),
            None => Ok(Categorizer::new(&self.analysis)),
        }
    }
}
