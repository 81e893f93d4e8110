use serde::{Deserialize, Serialize};
use serde_yml;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Unable to parse config file: {0}")]
    Parse(#[from] serde_yml::Error),
    #[error("Invalid value {value:?} for {name}")]
    InvalidValue { name: String, value: String },
    #[error("Missing required setting {0}")]
    Missing(&'static str),
}

fn p1_port_default() -> u16 { return 2000 }
fn p1_read_interval_default() -> u64 { return 5 }
fn p1_read_timeout_default() -> u64 { return 10 }
fn p1_reset_limit_default() -> usize { return 10 }

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct P1Config {
    #[serde(default)]
    pub host: String,
    #[serde(default="p1_port_default")]
    pub port: u16,
    /// Seconds between two reads
    #[serde(default="p1_read_interval_default")]
    pub read_interval: u64,
    /// Seconds a read may take before it is abandoned
    #[serde(default="p1_read_timeout_default")]
    pub read_timeout: u64,
    /// Number of telegram starts accepted before a terminator has to show up
    #[serde(default="p1_reset_limit_default")]
    pub reset_limit: usize,
    /// Accept telegrams ending in a bare `!` (DSMR 2.2 / 3.0 meters send no CRC)
    #[serde(default)]
    pub allow_missing_checksum: bool,
}

impl P1Config {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.read_interval)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout)
    }
}

impl Default for P1Config {
    fn default() -> Self {
        P1Config {
            host: String::new(),
            port: p1_port_default(),
            read_interval: p1_read_interval_default(),
            read_timeout: p1_read_timeout_default(),
            reset_limit: p1_reset_limit_default(),
            allow_missing_checksum: false,
        }
    }
}

fn mqtt_port_default() -> u16 { return 1883 }
fn mqtt_client_name_default() -> String { return "p12mqtt".to_string() }
fn mqtt_topic_default() -> String { return "p12mqtt/telegram".to_string() }
fn mqtt_keep_alive_default() -> u64 { return 60 }

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct MqttConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default="mqtt_port_default")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub pass: String,
    #[serde(default="mqtt_client_name_default")]
    pub client_name: String,
    #[serde(default="mqtt_topic_default")]
    pub topic: String,
    #[serde(default="mqtt_keep_alive_default")]
    pub keep_alive: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        MqttConfig {
            host: String::new(),
            port: mqtt_port_default(),
            user: String::new(),
            pass: String::new(),
            client_name: mqtt_client_name_default(),
            topic: mqtt_topic_default(),
            keep_alive: mqtt_keep_alive_default(),
        }
    }
}

fn log_level_default() -> String { return "info".to_string() }

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub p1: P1Config,
    #[serde(default)]
    pub mqtt: MqttConfig,
    /// Path of a JSON field table replacing the builtin one
    #[serde(default)]
    pub obis_table: Option<String>,
    #[serde(default="log_level_default")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            p1: P1Config::default(),
            mqtt: MqttConfig::default(),
            obis_table: None,
            log_level: log_level_default(),
        }
    }
}

/* Places searched for the config file, first hit wins */
const CONFIG_PATHS: [&str; 2] = ["config/p12mqtt.yaml", "p12mqtt.yaml"];

impl Config {
    /// Reads the config file (if any), applies the environment and validates the result.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("P12MQTT_CONFIG")
            .ok()
            .map(PathBuf::from)
            .or_else(|| CONFIG_PATHS.iter().map(PathBuf::from).find(|p| p.exists()));

        let mut config = match path {
            Some(p) => Self::from_file(&p)?,
            None => Config::default(),
        };

        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        return Ok(config);
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let c: Config = serde_yml::from_str(contents)?;
        return Ok(c);
    }

    /// Overrides settings with the environment variables used by existing P1 deployments.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("P1_ADDRESS") { self.p1.host = v; }
        if let Some(v) = lookup("P1_PORT") { self.p1.port = parse_env("P1_PORT", &v)?; }
        if let Some(v) = lookup("INTERVAL") { self.p1.read_interval = parse_env("INTERVAL", &v)?; }
        if let Some(v) = lookup("MQTT_BROKER") { self.mqtt.host = v; }
        if let Some(v) = lookup("MQTT_PORT") { self.mqtt.port = parse_env("MQTT_PORT", &v)?; }
        if let Some(v) = lookup("MQTT_TOPIC") { self.mqtt.topic = v; }
        if let Some(v) = lookup("MQTT_USER") { self.mqtt.user = v; }
        if let Some(v) = lookup("MQTT_PASSWORD") { self.mqtt.pass = v; }
        if let Some(v) = lookup("LOG_LEVEL") {
            if !v.is_empty() {
                self.log_level = v.to_lowercase();
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.p1.host.is_empty() {
            return Err(ConfigError::Missing("p1.host"));
        }
        if self.mqtt.host.is_empty() {
            return Err(ConfigError::Missing("mqtt.host"));
        }
        if self.mqtt.topic.is_empty() {
            return Err(ConfigError::Missing("mqtt.topic"));
        }
        if self.p1.read_interval == 0 {
            return Err(invalid("p1.read_interval", self.p1.read_interval));
        }
        if self.p1.read_timeout == 0 {
            return Err(invalid("p1.read_timeout", self.p1.read_timeout));
        }
        if self.p1.reset_limit == 0 {
            return Err(invalid("p1.reset_limit", self.p1.reset_limit));
        }
        Ok(())
    }
}

fn invalid<T: ToString>(name: &str, value: T) -> ConfigError {
    ConfigError::InvalidValue { name: name.to_string(), value: value.to_string() }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| invalid(name, value))
}
