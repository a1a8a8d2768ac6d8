//! Fake collaborators for driving the pipeline in integration tests

use rx868_relay::backend::{BusClient, FrameDecoder, PinInterface};
use rx868_relay::types::{Level, PinDirection, PullPolicy, QosLevel};
use rx868_relay::{RelayError, Result, SensorFrame};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// One publish seen by [`RecordingBus`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: String,
    pub qos: QosLevel,
}

/// Everything a [`RecordingBus`] observed, shared with the test
#[derive(Debug, Default)]
pub struct BusLog {
    pub connects: u32,
    pub disconnects: u32,
    pub published: Vec<Published>,
}

/// Bus client that records publishes and can fail selected topics
pub struct RecordingBus {
    log: Arc<Mutex<BusLog>>,
    refuse_connect: bool,
    timeout_topics: HashSet<String>,
}

impl RecordingBus {
    pub fn new() -> (Self, Arc<Mutex<BusLog>>) {
        let log = Arc::new(Mutex::new(BusLog::default()));
        let bus = Self {
            log: Arc::clone(&log),
            refuse_connect: false,
            timeout_topics: HashSet::new(),
        };
        (bus, log)
    }

    pub fn refusing_connect(mut self) -> Self {
        self.refuse_connect = true;
        self
    }

    /// Publishes to `topic` time out
    pub fn timing_out(mut self, topic: &str) -> Self {
        self.timeout_topics.insert(topic.to_string());
        self
    }
}

impl BusClient for RecordingBus {
    fn connect(&mut self) -> Result<()> {
        self.log.lock().unwrap().connects += 1;
        if self.refuse_connect {
            return Err(RelayError::Bus("connection refused".to_string()));
        }
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &str, qos: QosLevel) -> Result<()> {
        if self.timeout_topics.contains(topic) {
            return Err(RelayError::Timeout(format!("{} not acknowledged", topic)));
        }
        self.log.lock().unwrap().published.push(Published {
            topic: topic.to_string(),
            payload: payload.to_string(),
            qos,
        });
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.log.lock().unwrap().disconnects += 1;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct LineState {
    tick: u64,
    writes: Vec<(u32, Level)>,
    configured: Vec<(u32, PinDirection)>,
    pulls: Vec<(u32, PullPolicy)>,
    released: bool,
}

/// Pins with a square wave on the data line and recorded writes
///
/// The data line is high for `high` ticks then low for `low` ticks, forever.
/// Delays only yield so tests run as fast as the machine allows.
pub struct SquareWavePins {
    data_pin: u32,
    high: u64,
    low: u64,
    state: Mutex<LineState>,
}

impl SquareWavePins {
    pub fn new(data_pin: u32, high: u64, low: u64) -> Self {
        Self {
            data_pin,
            high,
            low,
            state: Mutex::new(LineState::default()),
        }
    }

    pub fn writes(&self) -> Vec<(u32, Level)> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn configured(&self) -> Vec<(u32, PinDirection)> {
        self.state.lock().unwrap().configured.clone()
    }

    pub fn pulls(&self) -> Vec<(u32, PullPolicy)> {
        self.state.lock().unwrap().pulls.clone()
    }

    pub fn ticks(&self) -> u64 {
        self.state.lock().unwrap().tick
    }

    pub fn is_released(&self) -> bool {
        self.state.lock().unwrap().released
    }
}

impl PinInterface for SquareWavePins {
    fn configure_pin(&self, pin: u32, direction: PinDirection) -> Result<()> {
        self.state.lock().unwrap().configured.push((pin, direction));
        Ok(())
    }

    fn set_pull(&self, pin: u32, policy: PullPolicy) -> Result<()> {
        self.state.lock().unwrap().pulls.push((pin, policy));
        Ok(())
    }

    fn write_pin(&self, pin: u32, level: Level) -> Result<()> {
        self.state.lock().unwrap().writes.push((pin, level));
        Ok(())
    }

    fn read_pin(&self, pin: u32) -> Result<Level> {
        if pin != self.data_pin {
            return Err(RelayError::read_failed(pin, std::io::ErrorKind::NotFound));
        }
        let mut state = self.state.lock().unwrap();
        let phase = state.tick % (self.high + self.low);
        state.tick += 1;
        Ok(if phase < self.high { Level::High } else { Level::Low })
    }

    fn delay_us(&self, _micros: u64) {
        std::thread::yield_now();
    }

    fn release(&self) {
        self.state.lock().unwrap().released = true;
    }
}

/// Decoder reporting a new frame on every pulse, numbered by pulse count
pub struct CountingDecoder {
    sensor_type: u8,
    pulses: u32,
}

impl CountingDecoder {
    pub fn new(sensor_type: u8) -> Self {
        Self {
            sensor_type,
            pulses: 0,
        }
    }
}

impl FrameDecoder for CountingDecoder {
    fn pulse(&mut self, _duration_ticks: u32, _low_ticks: u32) -> bool {
        self.pulses += 1;
        true
    }

    fn current_frame(&self) -> SensorFrame {
        SensorFrame::new(self.pulses, self.sensor_type, 20.0)
    }
}
