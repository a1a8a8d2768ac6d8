//! Mock Pin Implementation for Testing
//!
//! This module provides a simulated receiver line that can be used to run the
//! relay without hardware. The data pin replays a repeating pulse train, one
//! level per read, so the sampler sees exactly the ticks it would see on a
//! real line. Output writes are recorded for inspection.
//!
//! # Example
//!
//! ```ignore
//! use rx868_relay::backend::MockPins;
//!
//! // 4 ticks high, 2 ticks low, forever
//! let pins = MockPins::new(27).with_pulses(vec![(4, 2)]).with_realtime(false);
//! ```
//!
//! # Enabling
//!
//! Outside unit tests the mock is only available with the `mock-pins` feature:
//!
//! ```bash
//! cargo run --features mock-pins
//! ```

use crate::error::{RelayError, Result};
use crate::types::{Level, PinDirection, PullPolicy};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::pin_trait::PinInterface;

/// Position in the replayed pulse train
#[derive(Debug, Default)]
struct PulseTrain {
    pulses: Vec<(u32, u32)>,
    index: usize,
    tick: u32,
}

impl PulseTrain {
    fn next_level(&mut self) -> Level {
        let Some(&(high, low)) = self.pulses.get(self.index) else {
            return Level::Low;
        };

        let level = if self.tick < high {
            Level::High
        } else {
            Level::Low
        };

        self.tick += 1;
        if self.tick >= high + low {
            self.tick = 0;
            self.index = (self.index + 1) % self.pulses.len();
        }
        level
    }
}

#[derive(Debug, Default)]
struct MockState {
    train: PulseTrain,
    outputs: HashMap<u32, Level>,
    writes: Vec<(u32, Level)>,
    configured: Vec<(u32, PinDirection)>,
    pulls: Vec<(u32, PullPolicy)>,
    reads: u64,
    released: bool,
}

/// Simulated receiver implementing [`PinInterface`]
pub struct MockPins {
    data_pin: u32,
    realtime: bool,
    fail_reads: bool,
    fail_configure: Option<u32>,
    fail_pull: bool,
    state: Mutex<MockState>,
}

impl MockPins {
    /// Create a mock whose data line idles low
    pub fn new(data_pin: u32) -> Self {
        Self {
            data_pin,
            realtime: true,
            fail_reads: false,
            fail_configure: None,
            fail_pull: false,
            state: Mutex::new(MockState::default()),
        }
    }

    /// Replay `(high_ticks, low_ticks)` pulses on the data pin, repeating
    pub fn with_pulses(self, pulses: Vec<(u32, u32)>) -> Self {
        self.lock().train.pulses = pulses;
        self
    }

    /// Sleep for requested delays (false only yields)
    pub fn with_realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// Make every data read fail
    pub fn with_failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    /// Make configuring the given pin fail
    pub fn with_failing_configure(mut self, pin: u32) -> Self {
        self.fail_configure = Some(pin);
        self
    }

    /// Make every bias request fail, as on hardware without bias control
    pub fn with_failing_pull(mut self) -> Self {
        self.fail_pull = true;
        self
    }

    /// All writes in order
    pub fn writes(&self) -> Vec<(u32, Level)> {
        self.lock().writes.clone()
    }

    /// Current level of an output pin
    pub fn output_level(&self, pin: u32) -> Option<Level> {
        self.lock().outputs.get(&pin).copied()
    }

    /// Pins configured so far, in order
    pub fn configured(&self) -> Vec<(u32, PinDirection)> {
        self.lock().configured.clone()
    }

    /// Pull policies applied so far
    pub fn pulls(&self) -> Vec<(u32, PullPolicy)> {
        self.lock().pulls.clone()
    }

    /// Number of data pin reads
    pub fn reads(&self) -> u64 {
        self.lock().reads
    }

    /// Whether release() was called
    pub fn is_released(&self) -> bool {
        self.lock().released
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PinInterface for MockPins {
    fn configure_pin(&self, pin: u32, direction: PinDirection) -> Result<()> {
        if self.fail_configure == Some(pin) {
            return Err(RelayError::gpio(pin, "mock configure failure"));
        }
        self.lock().configured.push((pin, direction));
        Ok(())
    }

    fn set_pull(&self, pin: u32, policy: PullPolicy) -> Result<()> {
        if self.fail_pull {
            return Err(RelayError::gpio(pin, "bias not supported"));
        }
        self.lock().pulls.push((pin, policy));
        Ok(())
    }

    fn write_pin(&self, pin: u32, level: Level) -> Result<()> {
        let mut state = self.lock();
        state.outputs.insert(pin, level);
        state.writes.push((pin, level));
        Ok(())
    }

    fn read_pin(&self, pin: u32) -> Result<Level> {
        let mut state = self.lock();
        if pin != self.data_pin {
            return Ok(state.outputs.get(&pin).copied().unwrap_or_default());
        }
        state.reads += 1;
        if self.fail_reads {
            return Err(RelayError::read_failed(pin, std::io::ErrorKind::Other));
        }
        Ok(state.train.next_level())
    }

    fn delay_us(&self, micros: u64) {
        if self.realtime {
            std::thread::sleep(Duration::from_micros(micros));
        } else {
            std::thread::yield_now();
        }
    }

    fn release(&self) {
        self.lock().released = true;
    }
}
