//! BusClient trait for the outbound message bus
//!
//! The dispatcher only needs to connect, publish a payload under a topic and
//! wait for its completion, and disconnect. Keeping that behind a trait lets
//! the pipeline run against a recording bus in tests.

use crate::error::Result;
use crate::types::QosLevel;

/// Message bus connection used by the dispatcher
///
/// `publish` blocks until the broker acknowledges the message according to
/// `qos`, or until the implementation's publish timeout elapses, in which case
/// it returns [`RelayError::Timeout`](crate::error::RelayError::Timeout).
#[cfg_attr(test, mockall::automock)]
pub trait BusClient: Send {
    /// Connect and authenticate; fails if the broker is unreachable
    fn connect(&mut self) -> Result<()>;

    /// Publish one message and wait for its completion
    fn publish(&mut self, topic: &str, payload: &str, qos: QosLevel) -> Result<()>;

    /// Disconnect; bounded and best effort
    fn disconnect(&mut self) -> Result<()>;
}
