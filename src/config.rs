//! Walker configuration

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default recursion cap for container records
pub const DEFAULT_MAX_DEPTH: u32 = 100;

/// Default ceiling on a single record's declared length (`i32::MAX`)
pub const DEFAULT_MAX_RECORD_SIZE: u64 = i32::MAX as u64;

/// Default cap on records visited by one walk
pub const DEFAULT_MAX_RECORDS: usize = 1_000_000;

/// Default cap on stored diagnostics
pub const DEFAULT_MAX_DIAGNOSTICS: usize = 10_000;

/// Limits and reporting options for one walk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkerConfig {
    /// Deepest container nesting that is still recursed into
    pub max_depth: u32,

    /// Largest declared record length accepted
    pub max_record_size: u64,

    /// Records visited before the walk stops
    pub max_records: usize,

    /// Diagnostics stored before further ones are only counted
    pub max_diagnostics: usize,

    /// Emit an `UnknownType` note for unregistered record types
    pub report_unknown: bool,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_record_size: DEFAULT_MAX_RECORD_SIZE,
            max_records: DEFAULT_MAX_RECORDS,
            max_diagnostics: DEFAULT_MAX_DIAGNOSTICS,
            report_unknown: true,
        }
    }
}

impl WalkerConfig {
    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_record_size(mut self, max_record_size: u64) -> Self {
        self.max_record_size = max_record_size;
        self
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: WalkerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration for the `recwalk` binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Filter directive (trace, debug, info, warn, error, or EnvFilter syntax)
    pub level: String,

    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "record_walker=info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WalkerConfig::default();
        assert_eq!(config.max_depth, 100);
        assert_eq!(config.max_record_size, 2_147_483_647);
        assert!(config.report_unknown);
    }

    #[test]
    fn test_builders() {
        let config = WalkerConfig::default()
            .with_max_depth(3)
            .with_max_record_size(64);
        assert_eq!(config.max_depth, 3);
        assert_eq!(config.max_record_size, 64);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: WalkerConfig = toml::from_str("max_depth = 7").unwrap();
        assert_eq!(config.max_depth, 7);
        assert_eq!(config.max_records, DEFAULT_MAX_RECORDS);
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("walker.toml");
        let path = path.to_str().unwrap();

        let config = WalkerConfig::default().with_max_depth(12);
        config.to_file(path).unwrap();
        assert_eq!(WalkerConfig::from_file(path).unwrap(), config);
    }
}
