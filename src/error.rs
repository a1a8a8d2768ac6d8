//! Error handling for the RX868 relay
//!
//! This module defines the crate error type and a Result alias for use
//! throughout the relay.

use thiserror::Error;

/// Main error type for relay operations
#[derive(Error, Debug)]
pub enum RelayError {
    /// Errors related to configuration loading/validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to GPIO access
    #[error("GPIO error on pin {pin}: {message}")]
    Gpio { pin: u32, message: String },

    /// A single pin read failed; `Copy` fields only, so raising it never allocates
    #[error("GPIO read failed on pin {pin}: {kind}")]
    ReadFailed { pin: u32, kind: std::io::ErrorKind },

    /// Errors reported by the message bus client
    #[error("Bus error: {0}")]
    Bus(String),

    /// Timeout errors
    #[error("Timeout: {0}")]
    Timeout(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Signal handler installation errors
    #[error("Signal handler error: {0}")]
    Signal(#[from] ctrlc::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<RelayError>,
    },
}

impl RelayError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        RelayError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a GPIO error for a pin
    pub fn gpio(pin: u32, message: impl Into<String>) -> Self {
        RelayError::Gpio {
            pin,
            message: message.into(),
        }
    }

    /// Create a read error for a pin
    pub fn read_failed(pin: u32, kind: std::io::ErrorKind) -> Self {
        RelayError::ReadFailed { pin, kind }
    }

    /// True if this error (or the error it wraps) is a timeout
    pub fn is_timeout(&self) -> bool {
        match self {
            RelayError::Timeout(_) => true,
            RelayError::WithContext { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
