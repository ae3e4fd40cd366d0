use std::collections::HashMap;
use std::path::Path;

use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub sync: SyncConfig,
    pub providers: Vec<ProviderInstanceConfig>,
    /// Per-player settings, keyed by player id.
    pub players: HashMap<String, PlayerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub http_port: u16,
    /// Host name advertised in stream urls handed to players. Falls back to
    /// `host` when empty.
    pub stream_host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 8095,
            stream_host: String::new(),
        }
    }
}

impl ServerConfig {
    /// Base url players use to reach the stream endpoint.
    #[must_use]
    pub fn stream_base_url(&self) -> String {
        let host = if self.stream_host.is_empty() {
            &self.host
        } else {
            &self.stream_host
        };
        format!("http://{}:{}", host, self.http_port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite url, e.g. `sqlite://harmonia.db` or `sqlite::memory:`.
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://harmonia.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "pretty" or "json".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between periodic full provider syncs.
    pub interval_seconds: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 3 * 3600,
        }
    }
}

/// A configured provider instance.
///
/// `instance_id` is stable and configuration-assigned; `domain` names the
/// provider family (multiple instances may share a domain).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInstanceConfig {
    pub instance_id: String,
    pub domain: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Values for the provider's declared config entries, keyed by entry key.
    #[serde(default)]
    pub values: HashMap<String, serde_json::Value>,
}

const fn default_enabled() -> bool {
    true
}

impl ProviderInstanceConfig {
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(serde_json::Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(serde_json::Value::as_bool)
    }
}

/// Per-player settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub enabled: bool,
    /// Overrides the driver-reported name when set.
    pub name: Option<String>,
    /// Id of an external power control bound to this player.
    pub power_control: Option<String>,
    /// Id of an external volume control bound to this player.
    pub volume_control: Option<String>,
    pub crossfade_duration: u32,
    pub volume_normalization: bool,
    /// Target loudness (LUFS) for replay-gain correction.
    pub target_volume: f64,
    /// Gain applied when a track has no measured loudness yet.
    pub fallback_gain_correct: f64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: None,
            power_control: None,
            volume_control: None,
            crossfade_duration: 0,
            volume_normalization: true,
            target_volume: -14.0,
            fallback_gain_correct: -6.0,
        }
    }
}

impl Config {
    /// Load configuration from an optional file with environment overrides
    /// (prefix `HARMONIA_`, `__` as separator).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        builder
            .add_source(Environment::with_prefix("HARMONIA").separator("__"))
            .build()?
            .try_deserialize()
    }

    #[must_use]
    pub fn player_config(&self, player_id: &str) -> PlayerConfig {
        self.players.get(player_id).cloned().unwrap_or_default()
    }
}

/// Type of a provider/player config entry value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigEntryType {
    Bool,
    String,
    /// Encrypted at rest by the configuration store.
    SecureString,
    Int,
    Float,
    Label,
    Action,
    PlayerId,
}

/// One selectable value for a config entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigValueOption {
    pub text: String,
    pub value: serde_json::Value,
}

/// Typed description of a single configuration key a provider (or the
/// player manager) exposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub key: String,
    #[serde(rename = "type")]
    pub entry_type: ConfigEntryType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ConfigValueOption>,
    #[serde(default)]
    pub hidden: bool,
}

impl ConfigEntry {
    pub fn new(key: impl Into<String>, entry_type: ConfigEntryType) -> Self {
        Self {
            key: key.into(),
            entry_type,
            required: false,
            default_value: None,
            options: Vec::new(),
            hidden: false,
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn with_default(mut self, value: serde_json::Value) -> Self {
        self.default_value = Some(value);
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: Vec<ConfigValueOption>) -> Self {
        self.options = options;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.http_port, 8095);
        assert_eq!(config.sync.interval_seconds, 3 * 3600);
        assert!(config.player_config("unknown").volume_normalization);
    }

    #[test]
    fn test_stream_base_url_prefers_stream_host() {
        let mut server = ServerConfig::default();
        server.host = "0.0.0.0".to_string();
        server.stream_host = "192.168.1.5".to_string();
        assert_eq!(server.stream_base_url(), "http://192.168.1.5:8095");
    }
}
