//! Raspberry Pi GPIO backend
//!
//! Uses `rppal` for direct register access through `/dev/gpiomem`. Unlike
//! sysfs this can apply input bias, so the data pin gets the configured pull
//! policy. Reads go through `InputPin::read`, which is a single register
//! access.
//!
//! Pins are claimed on `configure_pin` and handed back on `release`, which
//! restores the mode each pin had before the relay started.

use crate::error::{RelayError, Result};
use crate::types::{Level, PinDirection, PullPolicy};
use rppal::gpio::{self, Gpio, InputPin, OutputPin};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::pin_trait::PinInterface;

enum Line {
    Input(InputPin),
    Output(OutputPin),
}

/// rppal implementation of [`PinInterface`]
pub struct RppalPins {
    gpio: Gpio,
    lines: Mutex<HashMap<u32, Line>>,
}

impl RppalPins {
    /// Open the GPIO peripheral
    pub fn new() -> Result<Self> {
        let gpio = Gpio::new()
            .map_err(|e| RelayError::Config(format!("cannot open Raspberry Pi GPIO: {}", e)))?;
        Ok(Self {
            gpio,
            lines: Mutex::new(HashMap::new()),
        })
    }

    fn lines(&self) -> MutexGuard<'_, HashMap<u32, Line>> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim a pin, handing back any line we already hold for it first
    fn claim(&self, lines: &mut HashMap<u32, Line>, pin: u32) -> Result<gpio::Pin> {
        let bcm = bcm_number(pin)?;
        lines.remove(&pin);
        self.gpio.get(bcm).map_err(|e| gpio_error(pin, e))
    }
}

/// BCM pin numbers fit in a byte
fn bcm_number(pin: u32) -> Result<u8> {
    u8::try_from(pin).map_err(|_| RelayError::gpio(pin, "not a BCM pin number"))
}

fn gpio_error(pin: u32, error: gpio::Error) -> RelayError {
    RelayError::gpio(pin, error.to_string())
}

fn from_rppal(level: gpio::Level) -> Level {
    match level {
        gpio::Level::Low => Level::Low,
        gpio::Level::High => Level::High,
    }
}

fn to_rppal(level: Level) -> gpio::Level {
    match level {
        Level::Low => gpio::Level::Low,
        Level::High => gpio::Level::High,
    }
}

impl PinInterface for RppalPins {
    fn configure_pin(&self, pin: u32, direction: PinDirection) -> Result<()> {
        let mut lines = self.lines();
        let claimed = self.claim(&mut lines, pin)?;
        let line = match direction {
            PinDirection::Input => Line::Input(claimed.into_input()),
            PinDirection::Output => Line::Output(claimed.into_output_low()),
        };
        lines.insert(pin, line);

        tracing::debug!("Configured GPIO {} as {:?}", pin, direction);
        Ok(())
    }

    fn set_pull(&self, pin: u32, policy: PullPolicy) -> Result<()> {
        let mut lines = self.lines();
        if !matches!(lines.get(&pin), Some(Line::Input(_))) {
            return Err(RelayError::gpio(pin, "bias needs a pin configured as input"));
        }

        let claimed = self.claim(&mut lines, pin)?;
        let input = match policy {
            PullPolicy::Off => claimed.into_input(),
            PullPolicy::Down => claimed.into_input_pulldown(),
            PullPolicy::Up => claimed.into_input_pullup(),
        };
        lines.insert(pin, Line::Input(input));

        tracing::debug!("Applied {:?} bias to GPIO {}", policy, pin);
        Ok(())
    }

    fn write_pin(&self, pin: u32, level: Level) -> Result<()> {
        match self.lines().get_mut(&pin) {
            Some(Line::Output(output)) => {
                output.write(to_rppal(level));
                Ok(())
            }
            Some(Line::Input(_)) => Err(RelayError::gpio(pin, "cannot drive an input pin")),
            None => Err(RelayError::gpio(pin, "pin not configured")),
        }
    }

    fn read_pin(&self, pin: u32) -> Result<Level> {
        match self.lines().get(&pin) {
            Some(Line::Input(input)) => Ok(from_rppal(input.read())),
            Some(Line::Output(output)) => Ok(if output.is_set_high() {
                Level::High
            } else {
                Level::Low
            }),
            None => Err(RelayError::read_failed(pin, ErrorKind::NotFound)),
        }
    }

    fn release(&self) {
        let mut lines = self.lines();
        let count = lines.len();
        lines.clear();
        if count > 0 {
            tracing::debug!("Released {} GPIO line(s)", count);
        }
    }
}
