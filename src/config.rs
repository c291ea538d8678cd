//! Configuration management for MediaDeck GW
//!
//! Handles loading and parsing of the YAML configuration file. All fields
//! have defaults matching the stock deck firmware, so a missing file is not
//! an error.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
}

/// Serial device discovery and connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SerialConfig {
    /// Substring to look for in enumerated port names (case-sensitive)
    #[serde(default = "default_match_keyword")]
    pub match_keyword: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Discovery scan interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Keywords the deck sends, one per line
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProtocolConfig {
    #[serde(default = "default_keyword_play")]
    pub play: String,
    #[serde(default = "default_keyword_previous")]
    pub previous: String,
    #[serde(default = "default_keyword_next")]
    pub next: String,
    /// Toggles between player and volume mappings
    #[serde(default = "default_keyword_mode")]
    pub mode_toggle: String,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            match_keyword: default_match_keyword(),
            baud_rate: default_baud_rate(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            play: default_keyword_play(),
            previous: default_keyword_previous(),
            next: default_keyword_next(),
            mode_toggle: default_keyword_mode(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            protocol: ProtocolConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    ///
    /// A missing file yields the built-in defaults; a present but malformed
    /// file is an error.
    pub async fn load(path: &str) -> Result<Self> {
        let contents = match fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read config file: {}", path));
            }
        };

        let config: AppConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the dispatcher cannot work with
    pub fn validate(&self) -> Result<()> {
        let keywords = [
            ("protocol.play", &self.protocol.play),
            ("protocol.previous", &self.protocol.previous),
            ("protocol.next", &self.protocol.next),
            ("protocol.mode_toggle", &self.protocol.mode_toggle),
        ];
        for (field, value) in keywords {
            if value.is_empty() {
                anyhow::bail!("Config field '{}' must not be empty", field);
            }
        }
        if self.serial.match_keyword.is_empty() {
            anyhow::bail!("Config field 'serial.match_keyword' must not be empty");
        }
        if self.serial.poll_interval_ms == 0 {
            anyhow::bail!("Config field 'serial.poll_interval_ms' must be > 0");
        }
        Ok(())
    }
}

// Default value functions
fn default_match_keyword() -> String { "usbserial".to_string() }
fn default_baud_rate() -> u32 { 9600 }
fn default_poll_interval_ms() -> u64 { 1000 }
fn default_keyword_play() -> String { "PLAY".to_string() }
fn default_keyword_previous() -> String { "PREVIOUS".to_string() }
fn default_keyword_next() -> String { "NEXT".to_string() }
fn default_keyword_mode() -> String { "MODE".to_string() }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.serial.match_keyword, "usbserial");
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.serial.poll_interval_ms, 1000);
        assert_eq!(config.protocol.play, "PLAY");
        assert_eq!(config.protocol.previous, "PREVIOUS");
        assert_eq!(config.protocol.next, "NEXT");
        assert_eq!(config.protocol.mode_toggle, "MODE");
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "serial:\n  match_keyword: wchusb\n";
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.serial.match_keyword, "wchusb");
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.protocol.play, "PLAY");
    }

    #[test]
    fn test_validate_rejects_empty_keyword() {
        let mut config = AppConfig::default();
        config.protocol.play = String::new();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.serial.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonexistent.yaml");
        let config = AppConfig::load(path.to_str().unwrap()).await.unwrap();
        assert_eq!(config.serial.match_keyword, "usbserial");
    }

    #[tokio::test]
    async fn test_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let path_str = path.to_str().unwrap();

        let mut config = AppConfig::default();
        config.serial.match_keyword = "ttyACM".to_string();
        config.serial.baud_rate = 115200;
        let yaml = serde_yaml::to_string(&config).unwrap();
        tokio::fs::write(&path, yaml).await.unwrap();

        let loaded = AppConfig::load(path_str).await.unwrap();
        assert_eq!(loaded.serial.match_keyword, "ttyACM");
        assert_eq!(loaded.serial.baud_rate, 115200);
        assert_eq!(loaded.protocol.next, "NEXT");
    }

    #[tokio::test]
    async fn test_load_malformed_yaml_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        tokio::fs::write(&path, "serial: [not, a, map]")
            .await
            .unwrap();
        assert!(AppConfig::load(path.to_str().unwrap()).await.is_err());
    }
}
