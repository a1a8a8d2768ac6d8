//! Edge sampler
//!
//! Reads the receiver's data pin once per tick on a dedicated high-priority
//! thread and turns the level sequence into pulse measurements for the
//! [`FrameDecoder`]. A pulse runs from one rising edge to the next:
//!
//! ```text
//!        ┌──────┐          ┌───
//!  ──────┘      └──────────┘
//!        ^ edge      lo     ^ edge: decoder.pulse(len, lo)
//! ```
//!
//! The loop body does not allocate, log or block beyond the cadence delay.
//! Statistics are plain atomics read by the dispatcher.

use crate::backend::{FrameDecoder, PinInterface};
use crate::error::Result;
use crate::types::Level;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::handoff::HandoffSlot;
use super::lifecycle::RunFlag;
use super::realtime;

/// Thread name of the sampler
pub const SAMPLER_THREAD_NAME: &str = "edge-sampler";

/// Pulse measurement state between rising edges
#[derive(Debug, Clone, Default)]
pub struct EdgeTracker {
    len: u32,
    lo: u32,
    previous: Level,
}

impl EdgeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account one tick at `level`
    ///
    /// Returns `(len, lo)` of the pulse that ends on a rising edge. The edge
    /// tick is counted in the finished pulse and starts the next one.
    pub fn tick(&mut self, level: Level) -> Option<(u32, u32)> {
        self.len = self.len.saturating_add(1);
        if level.is_low() {
            self.lo = self.lo.saturating_add(1);
        }

        let rising = self.previous.is_low() && !level.is_low();
        self.previous = level;

        if rising {
            let pulse = (self.len, self.lo);
            self.len = 1;
            self.lo = 0;
            Some(pulse)
        } else {
            None
        }
    }
}

/// Live counters updated by the sampler thread
#[derive(Debug, Default)]
pub struct SamplerCounters {
    ticks: AtomicU64,
    pulses: AtomicU64,
    frames: AtomicU64,
    overruns: AtomicU64,
    max_lateness_us: AtomicU64,
    read_errors: AtomicU64,
}

impl SamplerCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SamplerStats {
        SamplerStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            pulses: self.pulses.load(Ordering::Relaxed),
            frames: self.frames.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            max_lateness_us: self.max_lateness_us.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
        }
    }

    fn record_overrun(&self, lateness: Duration) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(lateness.as_micros()).unwrap_or(u64::MAX);
        self.max_lateness_us.fetch_max(micros, Ordering::Relaxed);
    }
}

/// Snapshot of [`SamplerCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerStats {
    pub ticks: u64,
    pub pulses: u64,
    pub frames: u64,
    /// Ticks that started after their deadline had passed
    pub overruns: u64,
    pub max_lateness_us: u64,
    pub read_errors: u64,
}

impl fmt::Display for SamplerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ticks, {} pulses, {} frames, {} overruns (worst {} us late), {} read errors",
            self.ticks,
            self.pulses,
            self.frames,
            self.overruns,
            self.max_lateness_us,
            self.read_errors
        )
    }
}

/// Sampler parameters
#[derive(Debug, Clone)]
pub struct SamplerOptions {
    pub data_pin: u32,
    pub interval: Duration,
    /// SCHED_FIFO priority (0 keeps normal scheduling)
    pub priority: u8,
}

/// Fixed-cadence pin sampler feeding a frame decoder
pub struct EdgeSampler {
    pins: Arc<dyn PinInterface>,
    decoder: Box<dyn FrameDecoder>,
    slot: Arc<HandoffSlot>,
    running: RunFlag,
    counters: Arc<SamplerCounters>,
    options: SamplerOptions,
}

impl EdgeSampler {
    pub fn new(
        pins: Arc<dyn PinInterface>,
        decoder: Box<dyn FrameDecoder>,
        slot: Arc<HandoffSlot>,
        running: RunFlag,
        options: SamplerOptions,
    ) -> Self {
        Self {
            pins,
            decoder,
            slot,
            running,
            counters: Arc::new(SamplerCounters::new()),
            options,
        }
    }

    /// Share counters with an observer instead of creating new ones
    pub fn with_counters(mut self, counters: Arc<SamplerCounters>) -> Self {
        self.counters = counters;
        self
    }

    pub fn counters(&self) -> Arc<SamplerCounters> {
        Arc::clone(&self.counters)
    }

    /// Run the sampler on its own named thread
    pub fn spawn(self) -> Result<JoinHandle<SamplerStats>> {
        let handle = thread::Builder::new()
            .name(SAMPLER_THREAD_NAME.to_string())
            .spawn(move || self.run())?;
        Ok(handle)
    }

    /// Sample until the running flag clears
    pub fn run(mut self) -> SamplerStats {
        match realtime::request_fifo_priority(self.options.priority) {
            Ok(true) => tracing::debug!("Sampler running at SCHED_FIFO {}", self.options.priority),
            Ok(false) => {}
            Err(e) => tracing::warn!(
                "Could not raise sampler to SCHED_FIFO {}: {}; using normal priority",
                self.options.priority,
                e
            ),
        }

        tracing::info!(
            "Edge sampler started on pin {} ({} us ticks)",
            self.options.data_pin,
            self.options.interval.as_micros()
        );

        let mut tracker = EdgeTracker::new();
        let mut deadline = Instant::now();

        while self.running.is_running() {
            self.sample(&mut tracker);

            deadline += self.options.interval;
            let now = Instant::now();
            match deadline.checked_duration_since(now) {
                Some(remaining) => {
                    let micros = u64::try_from(remaining.as_micros()).unwrap_or(u64::MAX);
                    self.pins.delay_us(micros);
                }
                None => {
                    self.counters.record_overrun(now - deadline);
                    deadline = now;
                }
            }
        }

        let stats = self.counters.snapshot();
        tracing::info!("Edge sampler stopped: {}", stats);
        stats
    }

    fn sample(&mut self, tracker: &mut EdgeTracker) {
        // A failed read counts as low; it can at worst corrupt the current frame
        let level = match self.pins.read_pin(self.options.data_pin) {
            Ok(level) => level,
            Err(_) => {
                self.counters.read_errors.fetch_add(1, Ordering::Relaxed);
                Level::Low
            }
        };
        self.counters.ticks.fetch_add(1, Ordering::Relaxed);

        let Some((len, lo)) = tracker.tick(level) else {
            return;
        };
        self.counters.pulses.fetch_add(1, Ordering::Relaxed);

        if self.decoder.pulse(len, lo) {
            self.counters.frames.fetch_add(1, Ordering::Relaxed);
            self.slot.publish(self.decoder.current_frame());
        }
    }
}
