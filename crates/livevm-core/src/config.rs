//! Application configuration.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::chain::{Chain, ChainRegistry};
use crate::error::ConfigError;
use crate::window::DEFAULT_WINDOW_SIZE;

/// Top-level configuration, loaded from a JSON file.
///
/// ```json
/// {
///   "chains": [
///     { "id": "8453", "name": "Base", "wss": "wss://…", "nativeCurrency": "ETH" }
///   ],
///   "window_size": 10
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivevmConfig {
    /// Configured chains, in display order.
    pub chains: Vec<Chain>,
    /// Default analytics window for new viewers, in blocks.
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Per-subscriber event queue capacity.
    #[serde(default = "default_sink_capacity")]
    pub sink_capacity: usize,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_window_size() -> usize {
    DEFAULT_WINDOW_SIZE
}

fn default_sink_capacity() -> usize {
    256
}

impl LivevmConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Build the chain registry described by this config.
    pub fn registry(&self) -> Result<ChainRegistry, ConfigError> {
        Ok(ChainRegistry::new(self.chains.clone())?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        ChainRegistry::new(self.chains.clone())?;
        Ok(())
    }
}

/// Log level per component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Global default level: "trace" | "debug" | "info" | "warn" | "error"
    #[serde(default = "default_level")]
    pub level: String,
    /// Override per component: crate name → level
    #[serde(default)]
    pub components: HashMap<String, String>,
    /// Emit JSON structured logs instead of human-readable text
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            components: HashMap::new(),
            json: false,
        }
    }
}

impl LogConfig {
    /// `EnvFilter` directive string, e.g. `"info,livevm_session=debug"`.
    pub fn directives(&self) -> String {
        let mut directives = self.level.clone();
        let mut components: Vec<_> = self.components.iter().collect();
        components.sort();
        for (component, level) in components {
            directives.push_str(&format!(",{}={}", component.replace('-', "_"), level));
        }
        directives
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "chains": [
            {"wss": "wss://base.example", "name": "Base", "nativeCurrency": "ETH", "id": "8453"},
            {"wss": "wss://gnosis.example", "name": "Gnosis", "nativeCurrency": "xDAI", "id": "100"}
        ]
    }"#;

    #[test]
    fn defaults_applied() {
        let cfg = LivevmConfig::from_json_str(SAMPLE).unwrap();
        assert_eq!(cfg.chains.len(), 2);
        assert_eq!(cfg.window_size, 10);
        assert_eq!(cfg.sink_capacity, 256);
        assert_eq!(cfg.log.level, "info");
        assert!(!cfg.log.json);
        assert_eq!(cfg.registry().unwrap().len(), 2);
    }

    #[test]
    fn zero_window_rejected() {
        let json = r#"{"chains":[{"wss":"w","name":"n","nativeCurrency":"c","id":"1"}],"window_size":0}"#;
        assert!(matches!(
            LivevmConfig::from_json_str(json),
            Err(ConfigError::ZeroWindow)
        ));
    }

    #[test]
    fn duplicate_chain_rejected() {
        let json = r#"{"chains":[
            {"wss":"w","name":"a","nativeCurrency":"c","id":"1"},
            {"wss":"w","name":"b","nativeCurrency":"c","id":"1"}
        ]}"#;
        assert!(matches!(
            LivevmConfig::from_json_str(json),
            Err(ConfigError::Registry(_))
        ));
    }

    #[test]
    fn missing_file() {
        let err = LivevmConfig::from_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn log_directives() {
        let mut log = LogConfig::default();
        log.components.insert("livevm-session".into(), "debug".into());
        assert_eq!(log.directives(), "info,livevm_session=debug");
    }
}
