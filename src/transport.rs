//! Device transport abstraction.

use crate::error::TransportError;
use crate::register::{Register, RegisterValue};

/// Handle to an open digital-input transition log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LogHandle(pub u32);

/// Status of a transition log at the moment it was queried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogStatus {
    /// Entries logged since the last read.
    pub pending: usize,
}

/// One sample recorded by the hardware each time a watched input bit changes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionLogEntry {
    /// Device time in seconds.
    pub timestamp: f64,
    /// Digital-input bitmask after the change.
    pub bitmask: u32,
}

impl TransitionLogEntry {
    /// Create an entry.
    pub fn new(timestamp: f64, bitmask: u32) -> Self {
        Self { timestamp, bitmask }
    }
}

/// Trait for the vendor transport a device session is built on.
///
/// Every call is a synchronous round-trip to the hardware. Implementations do not
/// cache; caching is the job of [`RegisterCache`](crate::RegisterCache).
pub trait DeviceTransport {
    /// Read one register from the device.
    fn read_register(&mut self, register: Register) -> Result<RegisterValue, TransportError>;

    /// Write one register on the device.
    fn write_register(
        &mut self,
        register: Register,
        value: &RegisterValue,
    ) -> Result<(), TransportError>;

    /// Allocate and start a digital-input transition log.
    fn open_log(
        &mut self,
        buffer_bytes: usize,
        sample_rate: u32,
    ) -> Result<LogHandle, TransportError>;

    /// Query how many entries are waiting in the log.
    fn log_status(&mut self, log: LogHandle) -> Result<LogStatus, TransportError>;

    /// Read up to `count` entries, oldest first.
    fn read_log(
        &mut self,
        log: LogHandle,
        count: usize,
    ) -> Result<Vec<TransitionLogEntry>, TransportError>;

    /// Stop logging and release the log.
    fn close_log(&mut self, log: LogHandle) -> Result<(), TransportError>;

    /// Current device time in seconds, on the same clock as log timestamps.
    fn device_time(&mut self) -> Result<f64, TransportError>;
}
