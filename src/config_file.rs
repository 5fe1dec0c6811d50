//! Configuration file support
//!
//! Loads walker limits, the record format and logging options from TOML.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::{
    LogConfig, LogFormat, WalkerConfig, DEFAULT_MAX_DEPTH, DEFAULT_MAX_DIAGNOSTICS,
    DEFAULT_MAX_RECORDS, DEFAULT_MAX_RECORD_SIZE,
};
use crate::error::Result;
use crate::formats::Format;

/// Configuration file format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Walker limits
    #[serde(default)]
    pub walker: WalkerSettings,
    /// Record format; sniffed from the input when absent
    pub format: Option<Format>,
    /// Logging settings
    pub logging: Option<LoggingSettings>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkerSettings {
    /// Maximum container nesting depth
    pub max_depth: Option<u32>,
    /// Largest declared record length in bytes
    pub max_record_size: Option<u64>,
    /// Records visited before stopping
    pub max_records: Option<usize>,
    /// Diagnostics kept before counting only
    pub max_diagnostics: Option<usize>,
    /// Report record types with no handler
    pub report_unknown: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: Option<LogFormat>,
}

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: ConfigFile = toml::from_str(&content)?;
        if let Some(Format::Tlv(tlv)) = &config.format {
            tlv.layout.validate()?;
        }
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Generate default configuration file
    pub fn default_config() -> Self {
        Self {
            walker: WalkerSettings {
                max_depth: Some(DEFAULT_MAX_DEPTH),
                max_record_size: Some(DEFAULT_MAX_RECORD_SIZE),
                max_records: Some(DEFAULT_MAX_RECORDS),
                max_diagnostics: Some(DEFAULT_MAX_DIAGNOSTICS),
                report_unknown: Some(true),
            },
            format: Some(Format::Isobmff),
            logging: Some(LoggingSettings {
                level: "info".to_string(),
                format: Some(LogFormat::Pretty),
            }),
        }
    }

    /// Convert to WalkerConfig
    pub fn into_walker_config(self) -> WalkerConfig {
        let defaults = WalkerConfig::default();
        WalkerConfig {
            max_depth: self.walker.max_depth.unwrap_or(defaults.max_depth),
            max_record_size: self
                .walker
                .max_record_size
                .unwrap_or(defaults.max_record_size),
            max_records: self.walker.max_records.unwrap_or(defaults.max_records),
            max_diagnostics: self
                .walker
                .max_diagnostics
                .unwrap_or(defaults.max_diagnostics),
            report_unknown: self
                .walker
                .report_unknown
                .unwrap_or(defaults.report_unknown),
        }
    }

    /// Logging settings with defaults filled in
    pub fn log_config(&self) -> LogConfig {
        match &self.logging {
            Some(logging) => LogConfig {
                level: logging.level.clone(),
                format: logging.format.unwrap_or_default(),
            },
            None => LogConfig::default(),
        }
    }
}

/// Generate a default configuration file
pub fn generate_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
    let config = ConfigFile::default_config();
    config.to_file(path)?;
    Ok(())
}
