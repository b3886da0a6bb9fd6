//! Bridge configuration, loaded from a TOML file.
//!
//! Every field is optional in the file; missing values fall back to the
//! defaults documented on [`MqttConfig`]. The configuration is read once at
//! startup and treated as immutable for the lifetime of a connection.

use crate::error::BridgeError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Wire protocol towards the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Clear-text TCP.
    #[default]
    Mqtt,
    /// TLS.
    Mqtts,
}

/// The `[mqtt]` section of the configuration file.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Wire protocol. Defaults to clear-text `mqtt`.
    pub protocol: Protocol,
    /// Broker host. Defaults to `localhost`.
    pub host: String,
    /// Broker port. Defaults to 1883.
    pub port: u16,
    /// Client id announced to the broker.
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Client certificate, PEM file.
    pub cert: Option<PathBuf>,
    /// Client private key, PEM file.
    pub key: Option<PathBuf>,
    /// CA bundle used to verify the broker, PEM file.
    pub ca: Option<PathBuf>,
    /// Whether the broker certificate must verify. Defaults to true.
    pub reject_unauthorized: bool,
    /// QoS for outbound publishes. Left out of the publish options
    /// entirely when absent or zero.
    pub qos: Option<u8>,
    /// Retain flag for outbound publishes. Only `true` is forwarded.
    pub retain: Option<bool>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::Mqtt,
            host: "localhost".to_string(),
            port: 1883,
            client_id: "mqtt-bridge".to_string(),
            username: None,
            password: None,
            cert: None,
            key: None,
            ca: None,
            reject_unauthorized: true,
            qos: None,
            retain: None,
        }
    }
}

impl MqttConfig {
    /// Rejects values the transport would choke on later.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if let Some(qos) = self.qos {
            if qos > 2 {
                return Err(BridgeError::Config(format!(
                    "qos must be 0, 1 or 2, got {}",
                    qos
                )));
            }
        }
        if self.cert.is_some() != self.key.is_some() {
            return Err(BridgeError::Config(
                "cert and key must be configured together".to_string(),
            ));
        }
        Ok(())
    }
}

/// Top-level contents of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub mqtt: MqttConfig,
}

impl BridgeConfig {
    /// Loads and validates the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self, BridgeError> {
        let content = fs::read_to_string(path).map_err(|e| {
            BridgeError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            BridgeError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        config.mqtt.validate()?;
        Ok(config)
    }

    /// Default configuration file location: `mqtt-bridge.toml` in the
    /// working directory, falling back to the user config directory.
    pub fn default_path() -> PathBuf {
        let local = PathBuf::from("mqtt-bridge.toml");
        if local.exists() {
            return local;
        }
        dirs::config_dir()
            .map(|dir| dir.join("mqtt-bridge").join("config.toml"))
            .unwrap_or(local)
    }
}
