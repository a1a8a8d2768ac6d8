//! Settings sections of the relay configuration file
//!
//! Each `[section]` of `relay.toml` maps onto one struct here. Every field
//! except the broker address and client identifier has a default, so a minimal
//! configuration only needs:
//!
//! ```toml
//! [mqtt]
//! server_address = "tcp://127.0.0.1:1883"
//! client_id = "rx868relay"
//! ```
//!
//! # Main Types
//!
//! - [`MqttSettings`] - Broker connection, authentication and publish policy
//! - [`ReceiverSettings`] - GPIO pins, sampling cadence and decoder selection
//! - [`DispatchSettings`] - Dispatcher polling and statistics cadence
//! - [`LoggingSettings`] - Optional log file

use crate::types::{PullPolicy, QosLevel, SensorFrame};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::{
    DEFAULT_DATA_PIN, DEFAULT_ENABLE_PIN, DEFAULT_POLL_INTERVAL_MS, DEFAULT_PUBLISH_TIMEOUT_SECS,
    DEFAULT_SAMPLE_INTERVAL_US, DEFAULT_TOPIC,
};

/// Message bus settings (`[mqtt]`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttSettings {
    /// Broker address, e.g. `tcp://127.0.0.1:1883` (required)
    pub server_address: Option<String>,

    /// Client identifier presented to the broker (required)
    pub client_id: Option<String>,

    /// Topic prefix for all readings
    pub topic: String,

    /// Quality of service for readings
    pub qos: QosLevel,

    /// Maximum wait for one publish to complete
    pub publish_timeout_secs: u64,

    /// Maximum wait for the broker to accept the connection
    pub connect_timeout_secs: u64,

    /// MQTT keep-alive interval
    pub keep_alive_secs: u64,

    /// Username for authenticated connect
    pub username: Option<String>,

    /// Password for authenticated connect
    pub password: Option<String>,

    /// Message the broker publishes if the relay disappears
    pub last_will: Option<LastWillSettings>,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            server_address: None,
            client_id: None,
            topic: DEFAULT_TOPIC.to_string(),
            qos: QosLevel::default(),
            publish_timeout_secs: DEFAULT_PUBLISH_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_PUBLISH_TIMEOUT_SECS,
            keep_alive_secs: 30,
            username: None,
            password: None,
            last_will: None,
        }
    }
}

impl MqttSettings {
    /// Credentials, only when both username and password are set
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }

    /// Publish timeout as a Duration
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }

    /// Connect timeout as a Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Topic prefix without trailing separators
    pub fn topic_prefix(&self) -> &str {
        self.topic.trim_end_matches('/')
    }
}

/// Last-will message (`[mqtt.last_will]`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastWillSettings {
    pub topic: String,
    #[serde(default = "default_last_will_payload")]
    pub payload: String,
    #[serde(default)]
    pub qos: QosLevel,
    #[serde(default)]
    pub retain: bool,
}

fn default_last_will_payload() -> String {
    "offline".to_string()
}

/// Which Pin Interface implementation drives the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinBackendKind {
    /// Raspberry Pi GPIO through rppal; applies the configured pull
    #[default]
    Rpi,
    /// Linux sysfs GPIO (`/sys/class/gpio`); cannot apply a pull
    Sysfs,
    /// Simulated receiver line (requires the `mock-pins` feature)
    Simulated,
}

/// Receiver hardware settings (`[receiver]`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverSettings {
    /// Data output of the receiver module (BCM numbering)
    pub data_pin: u32,

    /// Enable input of the receiver module (BCM numbering)
    pub enable_pin: u32,

    /// Bias applied to the data pin
    pub pull: PullPolicy,

    /// Sampling cadence; one tick of the frame decoder
    pub sample_interval_us: u64,

    /// SCHED_FIFO priority for the sampler thread (0 keeps normal scheduling)
    pub realtime_priority: u8,

    /// Pin Interface implementation
    pub backend: PinBackendKind,

    /// Offset added to BCM numbers for sysfs (512 on recent Raspberry Pi kernels)
    pub gpio_base: u32,

    /// Frame decoder selection
    pub decoder: Option<DecoderSettings>,

    /// Pulse train replayed by the simulated backend
    pub simulation: SimulationSettings,
}

impl Default for ReceiverSettings {
    fn default() -> Self {
        Self {
            data_pin: DEFAULT_DATA_PIN,
            enable_pin: DEFAULT_ENABLE_PIN,
            pull: PullPolicy::Down,
            sample_interval_us: DEFAULT_SAMPLE_INTERVAL_US,
            realtime_priority: 50,
            backend: PinBackendKind::Rpi,
            gpio_base: 0,
            decoder: None,
            simulation: SimulationSettings::default(),
        }
    }
}

impl ReceiverSettings {
    /// Sampling cadence as a Duration
    pub fn sample_interval(&self) -> Duration {
        Duration::from_micros(self.sample_interval_us)
    }
}

/// Frame decoder selection (`[receiver.decoder]`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DecoderSettings {
    /// Bench decoder: reports the next configured frame every N pulses
    Replay {
        #[serde(default = "default_every_pulses")]
        every_pulses: u32,
        frames: Vec<SensorFrame>,
    },
}

fn default_every_pulses() -> u32 {
    64
}

/// Simulated receiver line (`[receiver.simulation]`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Repeating `[high_ticks, low_ticks]` pulses
    pub pulses: Vec<[u32; 2]>,

    /// Sleep for the requested delay (false runs the line as fast as possible)
    pub realtime: bool,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            pulses: vec![[4, 2], [2, 4]],
            realtime: true,
        }
    }
}

/// Dispatcher settings (`[dispatch]`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Idle wait between handoff slot polls
    pub poll_interval_ms: u64,

    /// Interval between statistics log lines (0 disables)
    pub stats_interval_secs: u64,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            stats_interval_secs: 60,
        }
    }
}

impl DispatchSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stats_interval(&self) -> Option<Duration> {
        (self.stats_interval_secs > 0).then(|| Duration::from_secs(self.stats_interval_secs))
    }
}

/// Log file settings (`[logging]`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Directory for a daily-rolling log file (stdout only when unset)
    pub directory: Option<PathBuf>,

    /// File name prefix inside `directory`
    pub file_prefix: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: None,
            file_prefix: "rx868relay.log".to_string(),
        }
    }
}
