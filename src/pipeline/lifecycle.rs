//! Lifecycle controller
//!
//! [`Relay`] owns the collaborators and runs the pipeline from hardware setup
//! to teardown:
//!
//! 1. configure the data pin (input, pull policy) and the enable pin (output)
//! 2. enable the receiver
//! 3. connect the message bus
//! 4. start the edge sampler thread
//! 5. run the dispatcher on the calling thread until the [`RunFlag`] clears
//! 6. join the sampler, disconnect the bus, disable the receiver, release pins
//!
//! The receiver is disabled on every exit path after step 2, including a
//! failed bus connect.

use crate::backend::{BusClient, FrameDecoder, PinInterface};
use crate::config::RelayConfig;
use crate::error::{Result, ResultExt};
use crate::types::{Level, PinDirection, PullPolicy};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::dispatcher::{DispatchStats, Dispatcher, DispatcherOptions};
use super::handoff::{HandoffSlot, HandoffStats};
use super::sampler::{EdgeSampler, SamplerCounters, SamplerOptions, SamplerStats};

/// Process-wide running flag shared by the sampler and the dispatcher
#[derive(Debug, Clone)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    /// A flag in the running state
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Request shutdown; true only for the call that changed the state
    pub fn stop(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Clear `flag` on SIGINT or SIGTERM
pub fn install_signal_handler(flag: RunFlag) -> Result<()> {
    ctrlc::set_handler(move || {
        if flag.stop() {
            tracing::info!("Shutdown requested");
        }
    })?;
    Ok(())
}

/// Relay parameters
#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub data_pin: u32,
    pub enable_pin: u32,
    pub pull: PullPolicy,
    pub sample_interval: Duration,
    pub realtime_priority: u8,
    pub dispatcher: DispatcherOptions,
}

impl From<&RelayConfig> for RelayOptions {
    fn from(config: &RelayConfig) -> Self {
        Self {
            data_pin: config.receiver.data_pin,
            enable_pin: config.receiver.enable_pin,
            pull: config.receiver.pull,
            sample_interval: config.receiver.sample_interval(),
            realtime_priority: config.receiver.realtime_priority,
            dispatcher: DispatcherOptions::from(config),
        }
    }
}

/// Final statistics of a relay run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelayReport {
    pub sampler: SamplerStats,
    pub handoff: HandoffStats,
    pub dispatch: DispatchStats,
    pub uptime: Duration,
}

impl fmt::Display for RelayReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ran {:.1}s; sampler: {}; handoff: {} published, {} overwritten; dispatch: {}",
            self.uptime.as_secs_f64(),
            self.sampler,
            self.handoff.published,
            self.handoff.overwritten,
            self.dispatch
        )
    }
}

/// Drives the enable pin low when dropped
struct ReceiverEnable {
    pins: Arc<dyn PinInterface>,
    pin: u32,
    active: bool,
}

impl ReceiverEnable {
    fn enable(pins: Arc<dyn PinInterface>, pin: u32) -> Result<Self> {
        // Armed before the write so a partial failure still ends low
        let guard = Self {
            pins,
            pin,
            active: true,
        };
        guard
            .pins
            .write_pin(pin, Level::High)
            .context("Failed to enable receiver")?;
        tracing::info!("Receiver enabled (pin {})", pin);
        Ok(guard)
    }

    fn disable(mut self) -> Result<()> {
        self.active = false;
        self.pins
            .write_pin(self.pin, Level::Low)
            .context("Failed to disable receiver")?;
        tracing::info!("Receiver disabled (pin {})", self.pin);
        Ok(())
    }
}

impl Drop for ReceiverEnable {
    fn drop(&mut self) {
        if self.active {
            match self.pins.write_pin(self.pin, Level::Low) {
                Ok(()) => tracing::info!("Receiver disabled (pin {})", self.pin),
                Err(e) => tracing::error!("Failed to disable receiver: {}", e),
            }
        }
    }
}

/// The assembled relay
pub struct Relay<B: BusClient> {
    pins: Arc<dyn PinInterface>,
    decoder: Box<dyn FrameDecoder>,
    bus: B,
    options: RelayOptions,
    running: RunFlag,
}

impl<B: BusClient> Relay<B> {
    pub fn new(
        pins: Arc<dyn PinInterface>,
        decoder: Box<dyn FrameDecoder>,
        bus: B,
        options: RelayOptions,
    ) -> Self {
        Self {
            pins,
            decoder,
            bus,
            options,
            running: RunFlag::new(),
        }
    }

    /// Use an externally owned running flag
    pub fn with_run_flag(mut self, running: RunFlag) -> Self {
        self.running = running;
        self
    }

    pub fn run_flag(&self) -> RunFlag {
        self.running.clone()
    }

    /// Run until the running flag clears
    ///
    /// Returns an error only for startup failures; problems during teardown
    /// are logged.
    pub fn run(self) -> Result<RelayReport> {
        let pins = Arc::clone(&self.pins);
        let result = self.run_pipeline();
        pins.release();
        result
    }

    fn run_pipeline(self) -> Result<RelayReport> {
        let Relay {
            pins,
            decoder,
            mut bus,
            options,
            running,
        } = self;
        let started = Instant::now();

        pins.configure_pin(options.data_pin, PinDirection::Input)
            .context("Failed to configure data pin")?;
        pins.set_pull(options.data_pin, options.pull)
            .context("Failed to set data pin pull")?;
        pins.configure_pin(options.enable_pin, PinDirection::Output)
            .context("Failed to configure enable pin")?;

        let receiver = ReceiverEnable::enable(Arc::clone(&pins), options.enable_pin)?;

        bus.connect().context("Failed to connect to message bus")?;

        let slot = Arc::new(HandoffSlot::new());
        let counters = Arc::new(SamplerCounters::new());
        let sampler = EdgeSampler::new(
            Arc::clone(&pins),
            decoder,
            Arc::clone(&slot),
            running.clone(),
            SamplerOptions {
                data_pin: options.data_pin,
                interval: options.sample_interval,
                priority: options.realtime_priority,
            },
        )
        .with_counters(Arc::clone(&counters));

        let sampler = match sampler.spawn() {
            Ok(handle) => handle,
            Err(e) => {
                if let Err(disconnect_err) = bus.disconnect() {
                    tracing::warn!("Disconnect after failed start: {}", disconnect_err);
                }
                return Err(e.with_context("Failed to start edge sampler"));
            }
        };

        let mut dispatcher = Dispatcher::new(bus, Arc::clone(&slot), running.clone(), options.dispatcher)
            .with_sampler_counters(Arc::clone(&counters));
        let dispatch = dispatcher.run();

        // The dispatcher only returns once the flag is clear
        running.stop();
        let sampler = sampler.join().unwrap_or_else(|_| {
            tracing::error!("Edge sampler thread panicked");
            counters.snapshot()
        });

        let mut bus = dispatcher.into_inner();
        if let Err(e) = bus.disconnect() {
            tracing::warn!("Disconnect from message bus failed: {}", e);
        }

        if let Err(e) = receiver.disable() {
            tracing::error!("{}", e);
        }

        Ok(RelayReport {
            sampler,
            handoff: slot.stats(),
            dispatch,
            uptime: started.elapsed(),
        })
    }
}
