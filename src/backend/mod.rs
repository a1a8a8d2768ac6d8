//! Backend module: the relay's external collaborators
//!
//! Everything the pipeline talks to sits behind a trait here, with the
//! concrete implementations the binary ships.
//!
//! # Seams
//!
//! - [`PinInterface`] - GPIO configuration, reads, writes and delays
//! - [`FrameDecoder`] - Stateful pulse-to-frame reconstruction
//! - [`BusClient`] - Message bus connect, publish and disconnect
//!
//! # Components
//!
//! - [`RppalPins`] - Raspberry Pi GPIO with input bias support
//! - [`SysfsPins`] - Linux sysfs GPIO for other boards
//! - [`MockPins`] - Simulated receiver line (feature-gated)
//! - [`ReplayDecoder`] - Bench decoder replaying configured frames
//! - [`MqttBus`] - MQTT client on rumqttc with acknowledgement tracking
//!
//! # Example
//!
//! ```ignore
//! use rx868_relay::backend::{BusClient, MqttBus};
//! use rx868_relay::config::RelayConfig;
//!
//! let config = RelayConfig::load("relay.toml")?;
//! let mut bus = MqttBus::from_config(&config)?;
//! bus.connect()?;
//! bus.publish("weatherstation/42/temperature", "21.3", config.mqtt.qos)?;
//! bus.disconnect()?;
//! ```

pub mod bus_trait;
pub mod decoder;
#[cfg(any(test, feature = "mock-pins"))]
pub mod mock_pins;
pub mod mqtt;
pub mod pin_trait;
#[cfg(target_os = "linux")]
pub mod rpi;
pub mod sysfs;

pub use bus_trait::BusClient;
#[cfg(test)]
pub use bus_trait::MockBusClient;
pub use decoder::{decoder_from_settings, FrameDecoder, ReplayDecoder};
#[cfg(any(test, feature = "mock-pins"))]
pub use mock_pins::MockPins;
pub use mqtt::{mqtt_options, AckTracker, MqttBus};
pub use pin_trait::PinInterface;
#[cfg(target_os = "linux")]
pub use rpi::RppalPins;
pub use sysfs::{SysfsPins, SYSFS_GPIO_ROOT};
