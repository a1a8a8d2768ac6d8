//! Configuration module for the RX868 relay
//!
//! The relay reads one static configuration record at startup. It is never
//! reloaded while the pipeline runs.
//!
//! # File Location
//!
//! The configuration file is resolved in this order:
//! - the path given with `--config`
//! - `relay.toml` in the working directory
//! - `relay.toml` in the platform config directory under `rx868-relay`
//!   (`~/.config/rx868-relay/` on Linux)
//!
//! # Example
//!
//! ```ignore
//! use rx868_relay::config::RelayConfig;
//!
//! let path = rx868_relay::config::resolve_config_path(None)?;
//! let config = RelayConfig::load(&path)?;
//! let broker = config.broker()?;
//! println!("publishing to {}:{}", broker.host, broker.port);
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{RelayError, Result};
use crate::types::PullPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Application identifier for config directories
pub const APP_ID: &str = "rx868-relay";

/// Configuration filename
pub const CONFIG_FILE: &str = "relay.toml";

/// Default topic prefix
pub const DEFAULT_TOPIC: &str = "weatherstation";

/// Default MQTT port when the broker address has none
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Default publish timeout in seconds
pub const DEFAULT_PUBLISH_TIMEOUT_SECS: u64 = 10;

/// Default sampling cadence in microseconds
pub const DEFAULT_SAMPLE_INTERVAL_US: u64 = 200;

/// Default dispatcher idle wait in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// BCM GPIO 27: receiver DATA
pub const DEFAULT_DATA_PIN: u32 = 27;

/// BCM GPIO 22: receiver EN
pub const DEFAULT_ENABLE_PIN: u32 = 22;

/// Minimum keep-alive accepted by the MQTT client
const MIN_KEEP_ALIVE_SECS: u64 = 5;

/// Upper bound for the sampling cadence
const MAX_SAMPLE_INTERVAL_US: u64 = 100_000;

// ==================== Config Path ====================

/// Get the platform config directory for the relay
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Resolve which configuration file to load
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    let local = PathBuf::from(CONFIG_FILE);
    if local.exists() {
        return Ok(local);
    }

    if let Some(path) = config_dir().map(|d| d.join(CONFIG_FILE)) {
        if path.exists() {
            return Ok(path);
        }
    }

    Err(RelayError::Config(format!(
        "No {} found in the working directory or {}",
        CONFIG_FILE,
        config_dir()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| "the config directory".to_string())
    )))
}

// ==================== Broker Address ====================

/// Host and port of the MQTT broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

impl BrokerAddress {
    /// Parse `tcp://host:port`, `mqtt://host:port` or `host[:port]`
    pub fn parse(address: &str) -> Result<Self> {
        let trimmed = address.trim();
        let rest = match trimmed.split_once("://") {
            Some(("tcp", rest)) | Some(("mqtt", rest)) => rest,
            Some((scheme, _)) => {
                return Err(RelayError::Config(format!(
                    "Unsupported broker scheme '{}' in '{}'",
                    scheme, address
                )))
            }
            None => trimmed,
        };
        let rest = rest.trim_end_matches('/');

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    RelayError::Config(format!("Invalid broker port in '{}'", address))
                })?;
                (host, port)
            }
            None => (rest, DEFAULT_MQTT_PORT),
        };

        if host.is_empty() {
            return Err(RelayError::Config(format!(
                "Missing broker host in '{}'",
                address
            )));
        }

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tcp://{}:{}", self.host, self.port)
    }
}

// ==================== Relay Config ====================

/// Complete relay configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub mqtt: MqttSettings,

    #[serde(default)]
    pub receiver: ReceiverSettings,

    #[serde(default)]
    pub dispatch: DispatchSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl RelayConfig {
    /// Load and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RelayError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::from_toml_str(&content)
            .map_err(|e| e.with_context(format!("Invalid configuration in {}", path.display())))
    }

    /// Parse and validate configuration text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| RelayError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check required options and value ranges
    pub fn validate(&self) -> Result<()> {
        let server = self.mqtt.server_address.as_deref().unwrap_or("").trim();
        let client_id = self.mqtt.client_id.as_deref().unwrap_or("").trim();
        if server.is_empty() || client_id.is_empty() {
            return Err(RelayError::Config(
                "Please set mqtt.server_address and mqtt.client_id".to_string(),
            ));
        }
        BrokerAddress::parse(server)?;

        let prefix = self.mqtt.topic_prefix();
        if prefix.is_empty() || prefix.contains(['+', '#']) {
            return Err(RelayError::Config(format!(
                "Invalid topic prefix '{}'",
                self.mqtt.topic
            )));
        }

        if self.mqtt.keep_alive_secs < MIN_KEEP_ALIVE_SECS {
            return Err(RelayError::Config(format!(
                "mqtt.keep_alive_secs must be at least {}",
                MIN_KEEP_ALIVE_SECS
            )));
        }

        if self.mqtt.publish_timeout_secs == 0 || self.mqtt.connect_timeout_secs == 0 {
            return Err(RelayError::Config(
                "MQTT timeouts must be greater than zero".to_string(),
            ));
        }

        if let Some(will) = &self.mqtt.last_will {
            if will.topic.trim().is_empty() {
                return Err(RelayError::Config(
                    "mqtt.last_will.topic must not be empty".to_string(),
                ));
            }
        }

        let receiver = &self.receiver;
        if receiver.data_pin == receiver.enable_pin {
            return Err(RelayError::Config(format!(
                "receiver.data_pin and receiver.enable_pin are both {}",
                receiver.data_pin
            )));
        }

        if receiver.sample_interval_us == 0 || receiver.sample_interval_us > MAX_SAMPLE_INTERVAL_US
        {
            return Err(RelayError::Config(format!(
                "receiver.sample_interval_us must be between 1 and {}",
                MAX_SAMPLE_INTERVAL_US
            )));
        }

        if let Some(DecoderSettings::Replay {
            every_pulses,
            frames,
        }) = &receiver.decoder
        {
            if *every_pulses == 0 || frames.is_empty() {
                return Err(RelayError::Config(
                    "replay decoder needs every_pulses > 0 and at least one frame".to_string(),
                ));
            }
        }

        if receiver.backend == PinBackendKind::Sysfs && receiver.pull != PullPolicy::Off {
            return Err(RelayError::Config(format!(
                "receiver.pull = {:?} cannot be applied by the sysfs backend; \
                 use backend = \"rpi\" or pull = \"off\"",
                receiver.pull
            )));
        }

        if receiver.backend == PinBackendKind::Simulated
            && receiver.simulation.pulses.iter().any(|[high, low]| *high == 0 || *low == 0)
        {
            return Err(RelayError::Config(
                "receiver.simulation.pulses entries must be non-zero".to_string(),
            ));
        }

        if self.dispatch.poll_interval_ms == 0 {
            return Err(RelayError::Config(
                "dispatch.poll_interval_ms must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Broker host and port
    pub fn broker(&self) -> Result<BrokerAddress> {
        let address = self
            .mqtt
            .server_address
            .as_deref()
            .ok_or_else(|| RelayError::Config("mqtt.server_address is not set".to_string()))?;
        BrokerAddress::parse(address)
    }

    /// Client identifier
    pub fn client_id(&self) -> &str {
        self.mqtt.client_id.as_deref().unwrap_or_default()
    }
}

impl fmt::Display for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "broker:    {}",
            self.mqtt.server_address.as_deref().unwrap_or("<unset>")
        )?;
        writeln!(f, "client id: {}", self.client_id())?;
        writeln!(f, "topic:     {}/<address>/<field>", self.mqtt.topic_prefix())?;
        writeln!(
            f,
            "qos:       {} (timeout {}s)",
            u8::from(self.mqtt.qos),
            self.mqtt.publish_timeout_secs
        )?;
        writeln!(
            f,
            "auth:      {}",
            match self.mqtt.credentials() {
                Some((user, _)) => format!("username '{}' (password hidden)", user),
                None => "none".to_string(),
            }
        )?;
        writeln!(
            f,
            "receiver:  data pin {}, enable pin {}, {:?} pull, {} us ticks, {:?} backend",
            self.receiver.data_pin,
            self.receiver.enable_pin,
            self.receiver.pull,
            self.receiver.sample_interval_us,
            self.receiver.backend
        )?;
        write!(
            f,
            "dispatch:  every {} ms",
            self.dispatch.poll_interval_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::QosLevel;

    const MINIMAL: &str = r#"
        [mqtt]
        server_address = "tcp://127.0.0.1:1883"
        client_id = "rx868relay"
    "#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = RelayConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.mqtt.topic, DEFAULT_TOPIC);
        assert_eq!(config.mqtt.qos, QosLevel::AtLeastOnce);
        assert_eq!(config.receiver.data_pin, DEFAULT_DATA_PIN);
        assert_eq!(config.dispatch.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert!(config.receiver.decoder.is_none());
        assert_eq!(config.client_id(), "rx868relay");
    }

    #[test]
    fn test_missing_server_address_is_rejected() {
        let err = RelayConfig::from_toml_str("[mqtt]\nclient_id = \"x\"\n").unwrap_err();
        assert!(err.to_string().contains("server_address"));
    }

    #[test]
    fn test_missing_client_id_is_rejected() {
        let err =
            RelayConfig::from_toml_str("[mqtt]\nserver_address = \"localhost\"\n").unwrap_err();
        assert!(err.to_string().contains("client_id"));
    }

    #[test]
    fn test_empty_file_is_rejected() {
        assert!(RelayConfig::from_toml_str("").is_err());
    }

    #[test]
    fn test_invalid_qos_is_rejected() {
        let text = format!("{}\nqos = 3\n", MINIMAL);
        assert!(RelayConfig::from_toml_str(&text).is_err());
    }

    #[test]
    fn test_full_config_parses() {
        let text = r#"
            [mqtt]
            server_address = "mqtt://broker.local"
            client_id = "relay-1"
            topic = "garden"
            qos = 2
            username = "relay"
            password = "secret"

            [mqtt.last_will]
            topic = "garden/status"
            retain = true

            [receiver]
            data_pin = 17
            enable_pin = 18
            pull = "up"
            gpio_base = 512

            [receiver.decoder]
            kind = "replay"
            every_pulses = 10
            frames = [
                { address = 42, sensor_type = 7, temperature = 12.5, humidity = 80.0, wind = 3.2, rain_sum = 117, rain_detect = true },
            ]

            [dispatch]
            poll_interval_ms = 50
            stats_interval_secs = 0
        "#;

        let config = RelayConfig::from_toml_str(text).unwrap();
        assert_eq!(config.mqtt.qos, QosLevel::ExactlyOnce);
        assert_eq!(config.mqtt.credentials(), Some(("relay", "secret")));
        let will = config.mqtt.last_will.as_ref().unwrap();
        assert_eq!(will.payload, "offline");
        assert!(will.retain);
        assert_eq!(config.receiver.gpio_base, 512);
        assert_eq!(
            config.broker().unwrap(),
            BrokerAddress {
                host: "broker.local".to_string(),
                port: DEFAULT_MQTT_PORT
            }
        );

        match config.receiver.decoder.as_ref().unwrap() {
            DecoderSettings::Replay {
                every_pulses,
                frames,
            } => {
                assert_eq!(*every_pulses, 10);
                assert_eq!(frames[0].address, 42);
                assert!(frames[0].rain_detect);
                assert_eq!(frames[0].pressure, 0);
            }
        }
    }

    #[test]
    fn test_broker_address_parsing() {
        let addr = BrokerAddress::parse("tcp://127.0.0.1:1883").unwrap();
        assert_eq!(addr.host, "127.0.0.1");
        assert_eq!(addr.port, 1883);

        let addr = BrokerAddress::parse("broker:8883").unwrap();
        assert_eq!(addr.port, 8883);

        assert!(BrokerAddress::parse("ssl://broker:8883").is_err());
        assert!(BrokerAddress::parse("tcp://:1883").is_err());
        assert!(BrokerAddress::parse("tcp://broker:notaport").is_err());
    }

    #[test]
    fn test_sysfs_backend_cannot_take_a_pull() {
        let config = RelayConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.receiver.backend, PinBackendKind::Rpi);
        assert_eq!(config.receiver.pull, PullPolicy::Down);

        let text = format!("{}\n[receiver]\nbackend = \"sysfs\"\n", MINIMAL);
        let err = RelayConfig::from_toml_str(&text).unwrap_err();
        assert!(err.to_string().contains("receiver.pull"));

        let text = format!(
            "{}\n[receiver]\nbackend = \"sysfs\"\npull = \"off\"\n",
            MINIMAL
        );
        assert!(RelayConfig::from_toml_str(&text).is_ok());
    }

    #[test]
    fn test_same_pins_rejected() {
        let text = format!("{}\n[receiver]\ndata_pin = 5\nenable_pin = 5\n", MINIMAL);
        assert!(RelayConfig::from_toml_str(&text).is_err());
    }

    #[test]
    fn test_wildcard_topic_rejected() {
        let text = r#"
            [mqtt]
            server_address = "localhost"
            client_id = "x"
            topic = "weather/#"
        "#;
        assert!(RelayConfig::from_toml_str(text).is_err());
    }

    #[test]
    fn test_empty_replay_decoder_rejected() {
        let text = format!(
            "{}\n[receiver.decoder]\nkind = \"replay\"\nframes = []\n",
            MINIMAL
        );
        assert!(RelayConfig::from_toml_str(&text).is_err());
    }

    #[test]
    fn test_display_hides_password() {
        let text = format!("{}\nusername = \"u\"\npassword = \"hunter2\"\n", MINIMAL);
        let config = RelayConfig::from_toml_str(&text).unwrap();
        let summary = config.to_string();
        assert!(summary.contains("username 'u'"));
        assert!(!summary.contains("hunter2"));
    }

    #[test]
    fn test_explicit_path_wins() {
        let path = resolve_config_path(Some(Path::new("/tmp/elsewhere.toml"))).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/elsewhere.toml"));
    }
}
