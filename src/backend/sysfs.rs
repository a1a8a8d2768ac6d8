//! Linux sysfs GPIO backend
//!
//! Drives the receiver through the legacy `/sys/class/gpio` interface:
//! pins are exported on demand, the direction is written once, and the
//! `value` file stays open so each sampling tick is a single positioned
//! read without allocation.
//!
//! Pin numbers are BCM numbers. Recent Raspberry Pi kernels register the
//! GPIO chip at base 512; set `gpio_base` accordingly.
//!
//! sysfs has no way to set input bias, so any pull other than `off` is
//! rejected. Configure the bias elsewhere (e.g. `gpio=27=ip,pd` in
//! `config.txt`) or use the `rpi` backend.

use crate::error::{RelayError, Result};
use crate::types::{Level, PinDirection, PullPolicy};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use super::pin_trait::PinInterface;

/// Default sysfs GPIO root
pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// How long to wait for udev to fix permissions after export
const EXPORT_SETTLE_TIMEOUT: Duration = Duration::from_millis(500);

/// An exported pin with its open value file
struct PinHandle {
    value: File,
    exported_by_us: bool,
}

/// sysfs implementation of [`PinInterface`]
pub struct SysfsPins {
    root: PathBuf,
    gpio_base: u32,
    pins: RwLock<HashMap<u32, PinHandle>>,
}

impl SysfsPins {
    /// Create a pin set using the default sysfs root
    pub fn new(gpio_base: u32) -> Self {
        Self::with_root(SYSFS_GPIO_ROOT, gpio_base)
    }

    /// Create a pin set rooted somewhere else (used by tests)
    pub fn with_root(root: impl Into<PathBuf>, gpio_base: u32) -> Self {
        Self {
            root: root.into(),
            gpio_base,
            pins: RwLock::new(HashMap::new()),
        }
    }

    fn gpio_number(&self, pin: u32) -> u32 {
        self.gpio_base + pin
    }

    fn pin_dir(&self, pin: u32) -> PathBuf {
        self.root.join(format!("gpio{}", self.gpio_number(pin)))
    }

    fn export(&self, pin: u32) -> Result<bool> {
        if self.pin_dir(pin).exists() {
            return Ok(false);
        }

        write_file(&self.root.join("export"), &self.gpio_number(pin).to_string())
            .map_err(|e| RelayError::gpio(pin, format!("export failed: {}", e)))?;

        // The direction file appears (and becomes writable) asynchronously
        let direction = self.pin_dir(pin).join("direction");
        let started = Instant::now();
        while OpenOptions::new().write(true).open(&direction).is_err() {
            if started.elapsed() > EXPORT_SETTLE_TIMEOUT {
                return Err(RelayError::gpio(pin, "direction file did not appear"));
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        Ok(true)
    }

    fn unexport(&self, pin: u32) {
        let path = self.root.join("unexport");
        if let Err(e) = write_file(&path, &self.gpio_number(pin).to_string()) {
            tracing::warn!("Failed to unexport GPIO {}: {}", pin, e);
        }
    }
}

impl PinInterface for SysfsPins {
    fn configure_pin(&self, pin: u32, direction: PinDirection) -> Result<()> {
        let exported_by_us = self.export(pin)?;
        let dir = self.pin_dir(pin);

        let direction_str = match direction {
            PinDirection::Input => "in",
            PinDirection::Output => "out",
        };
        write_file(&dir.join("direction"), direction_str)
            .map_err(|e| RelayError::gpio(pin, format!("set direction failed: {}", e)))?;

        let value = OpenOptions::new()
            .read(true)
            .write(direction == PinDirection::Output)
            .open(dir.join("value"))
            .map_err(|e| RelayError::gpio(pin, format!("open value failed: {}", e)))?;

        let mut pins = self.pins.write().unwrap_or_else(PoisonError::into_inner);
        let previous = pins.insert(
            pin,
            PinHandle {
                value,
                exported_by_us,
            },
        );
        if let Some(previous) = previous {
            // Reconfiguring keeps the original ownership of the export
            if let Some(handle) = pins.get_mut(&pin) {
                handle.exported_by_us |= previous.exported_by_us;
            }
        }

        tracing::debug!(
            "Configured GPIO {} (sysfs gpio{}) as {}",
            pin,
            self.gpio_number(pin),
            direction_str
        );
        Ok(())
    }

    fn set_pull(&self, pin: u32, policy: PullPolicy) -> Result<()> {
        match policy {
            PullPolicy::Off => Ok(()),
            _ => Err(RelayError::gpio(
                pin,
                format!(
                    "sysfs GPIO cannot apply {:?} bias; use backend = \"rpi\", or set pull = \"off\" \
                     and configure the bias in the device tree",
                    policy
                ),
            )),
        }
    }

    fn write_pin(&self, pin: u32, level: Level) -> Result<()> {
        let pins = self.pins.read().unwrap_or_else(PoisonError::into_inner);
        let handle = pins
            .get(&pin)
            .ok_or_else(|| RelayError::gpio(pin, "pin not configured"))?;

        let byte: &[u8] = match level {
            Level::Low => b"0",
            Level::High => b"1",
        };
        handle
            .value
            .write_at(byte, 0)
            .map_err(|e| RelayError::gpio(pin, format!("write failed: {}", e)))?;
        Ok(())
    }

    fn read_pin(&self, pin: u32) -> Result<Level> {
        let pins = self.pins.read().unwrap_or_else(PoisonError::into_inner);
        let handle = pins
            .get(&pin)
            .ok_or(RelayError::read_failed(pin, ErrorKind::NotFound))?;

        let mut buf = [0u8; 1];
        match handle.value.read_at(&mut buf, 0) {
            Ok(1) => Ok(Level::from_raw(buf[0].wrapping_sub(b'0'))),
            Ok(_) => Err(RelayError::read_failed(pin, ErrorKind::UnexpectedEof)),
            Err(e) => Err(RelayError::read_failed(pin, e.kind())),
        }
    }

    fn release(&self) {
        let mut pins = self.pins.write().unwrap_or_else(PoisonError::into_inner);
        for (pin, handle) in pins.drain() {
            drop(handle.value);
            if handle.exported_by_us {
                self.unexport(pin);
            }
        }
    }
}

fn write_file(path: &Path, content: &str) -> std::io::Result<()> {
    std::fs::write(path, content)
}
