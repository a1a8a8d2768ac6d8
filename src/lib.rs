//! # rx868-relay: RX868 weather sensor relay
//!
//! Samples the data output of an RX868 868 MHz receiver module on a GPIO pin,
//! hands the pulse measurements to a frame decoder, and republishes every
//! decoded sensor reading to an MQTT broker under per-sensor topics:
//!
//! ```text
//! weatherstation/<address>/temperature
//! weatherstation/<address>/humidity
//! ...
//! ```
//!
//! ## Architecture
//!
//! - **Backend**: the collaborators behind traits (GPIO pins, frame decoder, MQTT)
//! - **Pipeline**: edge sampler thread, single-slot handoff, dispatcher, lifecycle
//! - **Config**: `relay.toml` loaded with serde and validated before startup
//!
//! The sampler never waits on the network: it runs on its own high-priority
//! thread and only ever overwrites the handoff slot.
//!
//! ## Example
//!
//! ```ignore
//! use rx868_relay::{
//!     backend::{decoder_from_settings, MqttBus, RppalPins},
//!     config::RelayConfig,
//!     pipeline::{install_signal_handler, Relay, RelayOptions},
//! };
//! use std::sync::Arc;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = RelayConfig::load("relay.toml")?;
//!
//!     let relay = Relay::new(
//!         Arc::new(RppalPins::new()?),
//!         decoder_from_settings(config.receiver.decoder.as_ref())?,
//!         MqttBus::from_config(&config)?,
//!         RelayOptions::from(&config),
//!     );
//!     install_signal_handler(relay.run_flag())?;
//!
//!     let report = relay.run()?;
//!     println!("{}", report);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod types;

// Re-export commonly used types
pub use backend::{BusClient, FrameDecoder, MqttBus, PinInterface, SysfsPins};
pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use pipeline::{Relay, RelayReport, RunFlag};
pub use types::{Field, Level, QosLevel, SensorFrame, SensorKind};
