//! Dispatcher: handoff slot to message bus
//!
//! Polls the [`HandoffSlot`] at a coarse cadence and publishes each decoded
//! frame as one message per valid field. Which fields are valid depends on the
//! sensor type (see [`SensorKind::fields`](crate::types::SensorKind::fields));
//! temperature always comes first.
//!
//! Publishing is sequential and each publish waits for its completion up to the
//! bus client's timeout. A failed or timed-out field is logged and skipped; the
//! remaining fields of the frame are still published.

use crate::backend::BusClient;
use crate::config::RelayConfig;
use crate::types::{Field, QosLevel, SensorFrame};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::handoff::HandoffSlot;
use super::lifecycle::RunFlag;
use super::sampler::SamplerCounters;

/// One message ready for the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub field: Field,
    pub topic: String,
    pub payload: String,
}

/// Topic for one field of a sensor
pub fn topic_for(prefix: &str, address: u32, field: Field) -> String {
    format!("{}/{}/{}", prefix, address, field.name())
}

/// Plan the messages for a frame, in publish order
pub fn outbound_messages(frame: &SensorFrame, prefix: &str) -> Vec<OutboundMessage> {
    frame
        .kind()
        .fields()
        .iter()
        .map(|&field| OutboundMessage {
            field,
            topic: topic_for(prefix, frame.address, field),
            payload: frame.value(field).to_string(),
        })
        .collect()
}

/// Dispatcher counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub frames: u64,
    pub messages_published: u64,
    pub publish_failures: u64,
    /// Failures that were unacknowledged publishes; included in `publish_failures`
    pub publish_timeouts: u64,
}

impl fmt::Display for DispatchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} frames, {} messages published, {} failed ({} timed out)",
            self.frames, self.messages_published, self.publish_failures, self.publish_timeouts
        )
    }
}

/// Dispatcher parameters
#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    pub topic_prefix: String,
    pub qos: QosLevel,
    pub poll_interval: Duration,
    /// None disables periodic statistics
    pub stats_interval: Option<Duration>,
}

impl From<&RelayConfig> for DispatcherOptions {
    fn from(config: &RelayConfig) -> Self {
        Self {
            topic_prefix: config.mqtt.topic_prefix().to_string(),
            qos: config.mqtt.qos,
            poll_interval: config.dispatch.poll_interval(),
            stats_interval: config.dispatch.stats_interval(),
        }
    }
}

/// Drains the handoff slot onto a [`BusClient`]
pub struct Dispatcher<B: BusClient> {
    bus: B,
    slot: Arc<HandoffSlot>,
    running: RunFlag,
    options: DispatcherOptions,
    sampler: Option<Arc<SamplerCounters>>,
    stats: DispatchStats,
    last_stats_time: Instant,
    last_read_errors: u64,
}

impl<B: BusClient> Dispatcher<B> {
    pub fn new(bus: B, slot: Arc<HandoffSlot>, running: RunFlag, options: DispatcherOptions) -> Self {
        Self {
            bus,
            slot,
            running,
            options,
            sampler: None,
            stats: DispatchStats::default(),
            last_stats_time: Instant::now(),
            last_read_errors: 0,
        }
    }

    /// Include sampler counters in the periodic statistics
    pub fn with_sampler_counters(mut self, counters: Arc<SamplerCounters>) -> Self {
        self.sampler = Some(counters);
        self
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Give back the bus client
    pub fn into_inner(self) -> B {
        self.bus
    }

    /// Poll until the running flag clears, then drain the slot once
    pub fn run(&mut self) -> DispatchStats {
        tracing::info!(
            "Dispatcher started: publishing under {}/<address>/<field>",
            self.options.topic_prefix
        );
        self.last_stats_time = Instant::now();

        while self.running.is_running() {
            self.poll_once();

            if let Some(interval) = self.options.stats_interval {
                if self.last_stats_time.elapsed() >= interval {
                    self.log_stats();
                    self.last_stats_time = Instant::now();
                }
            }

            std::thread::sleep(self.options.poll_interval);
        }

        if let Some(frame) = self.slot.try_take() {
            tracing::debug!("Dispatching frame decoded during shutdown");
            self.dispatch_frame(&frame);
        }

        tracing::info!("Dispatcher stopped: {}", self.stats);
        self.stats
    }

    /// Dispatch the pending frame, if any; returns whether there was one
    pub fn poll_once(&mut self) -> bool {
        match self.slot.try_take() {
            Some(frame) => {
                self.dispatch_frame(&frame);
                true
            }
            None => false,
        }
    }

    /// Publish every valid field of a frame; returns the number published
    pub fn dispatch_frame(&mut self, frame: &SensorFrame) -> usize {
        let messages = outbound_messages(frame, &self.options.topic_prefix);
        tracing::info!(
            "Frame from sensor {} (type {}): {:.1} °C",
            frame.address,
            frame.sensor_type,
            frame.temperature
        );
        self.stats.frames += 1;

        let mut published = 0;
        for message in &messages {
            match self
                .bus
                .publish(&message.topic, &message.payload, self.options.qos)
            {
                Ok(()) => {
                    tracing::debug!("Published {} = {}", message.topic, message.payload);
                    self.stats.messages_published += 1;
                    published += 1;
                }
                Err(e) if e.is_timeout() => {
                    tracing::warn!("No acknowledgement for {}: {}", message.topic, e);
                    self.stats.publish_failures += 1;
                    self.stats.publish_timeouts += 1;
                }
                Err(e) => {
                    tracing::error!("Failed to publish {}: {}", message.topic, e);
                    self.stats.publish_failures += 1;
                }
            }
        }
        published
    }

    fn log_stats(&mut self) {
        let slot = self.slot.stats();
        let Some(counters) = &self.sampler else {
            tracing::info!(
                "Stats: dispatch {}; slot {} published, {} overwritten",
                self.stats,
                slot.published,
                slot.overwritten
            );
            return;
        };

        let sampler = counters.snapshot();
        if sampler.read_errors > self.last_read_errors {
            tracing::warn!(
                "Stats: sampler {}; dispatch {}; slot {} overwritten ({} new read errors)",
                sampler,
                self.stats,
                slot.overwritten,
                sampler.read_errors - self.last_read_errors
            );
        } else {
            tracing::info!(
                "Stats: sampler {}; dispatch {}; slot {} overwritten",
                sampler,
                self.stats,
                slot.overwritten
            );
        }
        self.last_read_errors = sampler.read_errors;
    }
}
