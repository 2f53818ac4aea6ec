use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use super::ConfigError;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub auth: AuthConfig,
    pub bridge: BridgeConfig,
    pub stoat: StoatConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub mappings: MappingsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub discord_token: String,
    #[serde(default)]
    pub stoat_token: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BridgeConfig {
    /// Our own Discord application id, for loop detection.
    #[serde(default)]
    pub discord_bot_id: String,
    /// Our own Stoat account id, for loop detection.
    #[serde(default)]
    pub stoat_bot_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoatConfig {
    #[serde(default)]
    pub base_url: String,
    /// Websocket events endpoint. Derived from `base_url` when absent.
    #[serde(default)]
    pub ws_url: Option<String>,
}

impl StoatConfig {
    pub fn api_url(&self) -> String {
        format!("{}/api", self.base_url.trim_end_matches('/'))
    }

    pub fn autumn_url(&self) -> String {
        format!("{}/autumn", self.base_url.trim_end_matches('/'))
    }

    pub fn events_url(&self) -> String {
        if let Some(url) = &self.ws_url {
            return url.clone();
        }
        let base = self.base_url.trim_end_matches('/');
        let ws = base
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        format!("{}/events", ws)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IdentityConfig {
    /// Static fallback avatar when neither a channel override nor the
    /// author's profile provides one.
    #[serde(default = "default_avatar")]
    pub default_avatar: String,
    /// Per-destination-channel avatar overrides. Takes precedence over the
    /// author's profile avatar.
    #[serde(default)]
    pub channel_avatars: HashMap<String, String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            default_avatar: default_avatar(),
            channel_avatars: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MappingsConfig {
    #[serde(default = "default_mapping_file")]
    pub file: String,
}

impl Default for MappingsConfig {
    fn default() -> Self {
        Self {
            file: default_mapping_file(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
    #[serde(default = "default_mapping_retention_days")]
    pub mapping_retention_days: i64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            http_timeout_ms: default_http_timeout_ms(),
            mapping_retention_days: default_mapping_retention_days(),
        }
    }
}

impl LimitsConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.discord_token.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "auth.discord_token cannot be empty".to_string(),
            ));
        }

        if self.auth.stoat_token.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "auth.stoat_token cannot be empty".to_string(),
            ));
        }

        if self.bridge.discord_bot_id.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "bridge.discord_bot_id cannot be empty".to_string(),
            ));
        }

        if self.bridge.stoat_bot_id.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "bridge.stoat_bot_id cannot be empty".to_string(),
            ));
        }

        if Url::parse(&self.stoat.base_url).is_err() {
            return Err(ConfigError::InvalidConfig(
                "stoat.base_url must be a valid URL".to_string(),
            ));
        }

        if self.limits.http_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "limits.http_timeout_ms must be non-zero".to_string(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("DISCORD_TOKEN") {
            self.auth.discord_token = value;
        }
        if let Ok(value) = std::env::var("STOAT_BOT_TOKEN") {
            self.auth.stoat_token = value;
        }
        if let Ok(value) = std::env::var("STOAT_BASE_URL") {
            self.stoat.base_url = value;
        }
        if let Ok(value) = std::env::var("DISCORD_BOT_ID") {
            self.bridge.discord_bot_id = value;
        }
        if let Ok(value) = std::env::var("STOAT_BOT_ID") {
            self.bridge.stoat_bot_id = value;
        }
    }
}

fn default_avatar() -> String {
    "https://i.imgur.com/ykjd3JO.jpeg".to_string()
}

fn default_mapping_file() -> String {
    "channel_mapping.yaml".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_http_timeout_ms() -> u64 {
    30000
}

fn default_mapping_retention_days() -> i64 {
    30
}
