//! Core data types for the RX868 relay
//!
//! This module contains the fundamental data structures that flow through
//! the pipeline, from the decoded radio frame down to the outbound message.
//!
//! # Main Types
//!
//! - [`SensorFrame`] - One decoded telemetry frame (a plain value)
//! - [`SensorKind`] - Interpretation of the frame's sensor type code
//! - [`Field`] - A published reading and its topic suffix
//! - [`FieldValue`] - A reading formatted for the wire
//! - [`Level`], [`PinDirection`], [`PullPolicy`] - GPIO vocabulary
//! - [`QosLevel`] - Message bus quality of service
//!
//! # Field Validity
//!
//! Not every field of a [`SensorFrame`] carries data. The sensor type decides
//! which fields are meaningful:
//!
//! | type | sensor                      | fields after temperature              |
//! |------|-----------------------------|---------------------------------------|
//! | 1    | thermo/hygro                | humidity                              |
//! | 4    | thermo/hygro/baro           | humidity, pressure                    |
//! | 7    | combi (wind and rain)       | humidity, wind, rain_sum, rain_detect |

use serde::{Deserialize, Serialize};
use std::fmt;

/// One decoded telemetry frame
///
/// Frames are copied out of the decoder on completion, so they never alias
/// decoder-internal buffers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorFrame {
    /// Transmitter address, stable across frames from the same device
    pub address: u32,
    /// Sensor type code (see [`SensorKind`])
    pub sensor_type: u8,
    /// Temperature in degrees Celsius
    pub temperature: f32,
    /// Relative humidity in percent
    #[serde(default)]
    pub humidity: f32,
    /// Barometric pressure in hPa
    #[serde(default)]
    pub pressure: i32,
    /// Wind speed in km/h
    #[serde(default)]
    pub wind: f32,
    /// Cumulative rain counter
    #[serde(default)]
    pub rain_sum: i32,
    /// Rain currently detected
    #[serde(default)]
    pub rain_detect: bool,
}

impl SensorFrame {
    /// Create a frame with only the always-valid fields set
    pub fn new(address: u32, sensor_type: u8, temperature: f32) -> Self {
        Self {
            address,
            sensor_type,
            temperature,
            humidity: 0.0,
            pressure: 0,
            wind: 0.0,
            rain_sum: 0,
            rain_detect: false,
        }
    }

    /// Interpret the sensor type code
    pub fn kind(&self) -> SensorKind {
        SensorKind::from_code(self.sensor_type)
    }

    /// Value of a field, formatted for publishing
    pub fn value(&self, field: Field) -> FieldValue {
        match field {
            Field::Temperature => FieldValue::Float(self.temperature),
            Field::Humidity => FieldValue::Float(self.humidity),
            Field::Wind => FieldValue::Float(self.wind),
            Field::Pressure => FieldValue::Integer(self.pressure as i64),
            Field::RainSum => FieldValue::Integer(self.rain_sum as i64),
            Field::RainDetect => FieldValue::Integer(self.rain_detect as i64),
        }
    }
}

/// Sensor family selected by the frame's type code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    /// Type 1: temperature and humidity
    ThermoHygro,
    /// Type 4: temperature, humidity and barometric pressure
    ThermoHygroBaro,
    /// Type 7: combi sensor with wind and rain
    Combi,
    /// Any other code; only temperature is trusted
    Other(u8),
}

impl SensorKind {
    /// Map a type code to a sensor kind
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => SensorKind::ThermoHygro,
            4 => SensorKind::ThermoHygroBaro,
            7 => SensorKind::Combi,
            other => SensorKind::Other(other),
        }
    }

    /// Fields published for this kind, in emission order
    pub fn fields(&self) -> &'static [Field] {
        match self {
            SensorKind::Combi => &[
                Field::Temperature,
                Field::Humidity,
                Field::Wind,
                Field::RainSum,
                Field::RainDetect,
            ],
            SensorKind::ThermoHygro => &[Field::Temperature, Field::Humidity],
            SensorKind::ThermoHygroBaro => &[Field::Temperature, Field::Humidity, Field::Pressure],
            SensorKind::Other(_) => &[Field::Temperature],
        }
    }
}

/// A reading published under `<prefix>/<address>/<name>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Temperature,
    Humidity,
    Wind,
    RainSum,
    RainDetect,
    Pressure,
}

impl Field {
    /// Topic suffix for this field
    pub fn name(&self) -> &'static str {
        match self {
            Field::Temperature => "temperature",
            Field::Humidity => "humidity",
            Field::Wind => "wind",
            Field::RainSum => "rain_sum",
            Field::RainDetect => "rain_detect",
            Field::Pressure => "pressure",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A reading value with its wire formatting
///
/// Floating-point readings are rendered with one decimal place, counters and
/// flags as plain integers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Float(f32),
    Integer(i64),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Float(v) => write!(f, "{:.1}", v),
            FieldValue::Integer(v) => write!(f, "{}", v),
        }
    }
}

/// Digital pin level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Level {
    #[default]
    Low,
    High,
}

impl Level {
    /// Map a raw reading; anything that is not zero counts as high
    ///
    /// Backends normalise to two levels here. A digital input only ever
    /// reports 0 or 1, and the edge tracker compares levels, so folding other
    /// values into `High` keeps a 1 to 2 change from counting as a rising edge.
    pub fn from_raw(raw: u8) -> Self {
        if raw == 0 {
            Level::Low
        } else {
            Level::High
        }
    }

    pub fn is_low(&self) -> bool {
        matches!(self, Level::Low)
    }
}

/// GPIO direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinDirection {
    Input,
    Output,
}

/// Input bias applied to a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullPolicy {
    Off,
    #[default]
    Down,
    Up,
}

/// Message bus quality of service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum QosLevel {
    AtMostOnce,
    #[default]
    AtLeastOnce,
    ExactlyOnce,
}

impl TryFrom<u8> for QosLevel {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(QosLevel::AtMostOnce),
            1 => Ok(QosLevel::AtLeastOnce),
            2 => Ok(QosLevel::ExactlyOnce),
            other => Err(format!("invalid QoS level {} (expected 0, 1 or 2)", other)),
        }
    }
}

impl From<QosLevel> for u8 {
    fn from(qos: QosLevel) -> u8 {
        match qos {
            QosLevel::AtMostOnce => 0,
            QosLevel::AtLeastOnce => 1,
            QosLevel::ExactlyOnce => 2,
        }
    }
}
