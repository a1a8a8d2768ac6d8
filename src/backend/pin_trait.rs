//! PinInterface trait for unified GPIO access
//!
//! This module provides a common trait for all pin implementations, enabling
//! both real hardware (Raspberry Pi GPIO or Linux sysfs) and a simulated
//! receiver line for testing.
//!
//! Methods take `&self` so one pin set can be shared between the sampler
//! thread, which only reads the data pin, and the lifecycle controller, which
//! only drives the enable pin.

use crate::error::Result;
use crate::types::{Level, PinDirection, PullPolicy};
use std::time::Duration;

/// Unified interface for the receiver's GPIO lines
///
/// Implementations must be `Send + Sync`; the data pin is read from the
/// high-priority sampler thread while the main thread owns the enable pin.
///
/// # Example
///
/// ```ignore
/// fn enable_receiver(pins: &dyn PinInterface, enable_pin: u32) -> Result<()> {
///     pins.configure_pin(enable_pin, PinDirection::Output)?;
///     pins.write_pin(enable_pin, Level::High)
/// }
/// ```
pub trait PinInterface: Send + Sync {
    /// Claim a pin and set its direction
    fn configure_pin(&self, pin: u32, direction: PinDirection) -> Result<()>;

    /// Set the input bias of a pin
    ///
    /// Implementations that cannot apply the requested bias return an error.
    fn set_pull(&self, pin: u32, policy: PullPolicy) -> Result<()>;

    /// Drive an output pin
    fn write_pin(&self, pin: u32, level: Level) -> Result<()>;

    /// Read the current level of a pin
    ///
    /// Called once per sampling tick; implementations must not allocate, and
    /// read failures use [`RelayError::ReadFailed`](crate::error::RelayError::ReadFailed).
    fn read_pin(&self, pin: u32) -> Result<Level>;

    /// Block the calling thread for roughly `micros` microseconds
    fn delay_us(&self, micros: u64) {
        std::thread::sleep(Duration::from_micros(micros));
    }

    /// Release any pins claimed by this interface
    fn release(&self) {}
}
