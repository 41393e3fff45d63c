//! Byte transport and timeout-bounded I/O.
//!
//! A [`Transport`] moves raw bytes over an already-open channel. The protocol
//! engine never calls it directly: [`BoundedIo`] moves the transport onto a
//! worker thread and bounds every read and write by a deadline proportional to
//! the number of bytes involved.
//!
//! Implementations:
//! - `serial`: a real port through the `serialport` crate
//! - `sim`: an in-memory cube speaking the device side of the protocol

use std::io;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub mod bounded;
pub mod error;
pub mod serial;
pub mod sim;

pub use bounded::BoundedIo;
pub use error::LinkError;
pub use serial::SerialTransport;
pub use sim::{Fault, SimulatedCube};

/// Raw byte channel to the cube.
///
/// `send` and `receive` must return periodically even when the line is
/// stalled, either having moved some bytes or with an
/// [`io::ErrorKind::TimedOut`] / [`io::ErrorKind::WouldBlock`] error meaning
/// "nothing yet". A `send` may accept only a prefix of `bytes`. `Ok(0)` from
/// `receive` means the peer has gone away.
pub trait Transport: Send + 'static {
    /// Write a prefix of `bytes`, returning how many were accepted.
    fn send(&mut self, bytes: &[u8]) -> io::Result<usize>;

    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Push accepted bytes out to the line.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Drop any bytes received but not yet read.
    fn discard_input(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Link settings.
///
/// Durations are plain milliseconds so the struct reads naturally from JSON.
///
/// # Examples
/// ```
/// use std::time::Duration;
///
/// use cubesync_core::LinkConfig;
///
/// let config = LinkConfig::default();
/// assert_eq!(config.deadline_for(64), Duration::from_secs(64));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Serial baud rate.
    pub baud_rate: u32,
    /// Time allowed per byte of a bounded read or write.
    pub byte_timeout_ms: u64,
    /// Time a new operation waits for a timed-out request to wind down.
    pub fence_timeout_ms: u64,
    /// How long a single transport read blocks before reporting "nothing yet".
    pub poll_interval_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            baud_rate: 38_400,
            byte_timeout_ms: 1_000,
            fence_timeout_ms: 2_000,
            poll_interval_ms: 50,
        }
    }
}

impl LinkConfig {
    pub fn byte_timeout(&self) -> Duration {
        Duration::from_millis(self.byte_timeout_ms)
    }

    pub fn fence_timeout(&self) -> Duration {
        Duration::from_millis(self.fence_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Deadline for moving `len` bytes; zero-length requests get one unit.
    pub fn deadline_for(&self, len: usize) -> Duration {
        let units = u32::try_from(len.max(1)).unwrap_or(u32::MAX);
        self.byte_timeout().saturating_mul(units)
    }
}

#[cfg(test)]
mod tests {
    use super::LinkConfig;
    use std::time::Duration;

    #[test]
    fn deadline_scales_with_length() {
        let config = LinkConfig {
            byte_timeout_ms: 10,
            ..LinkConfig::default()
        };
        assert_eq!(config.deadline_for(0), Duration::from_millis(10));
        assert_eq!(config.deadline_for(1), Duration::from_millis(10));
        assert_eq!(config.deadline_for(64), Duration::from_millis(640));
    }

    #[test]
    fn config_reads_partial_json() {
        let config: LinkConfig = serde_json::from_str(r#"{"baud_rate": 9600}"#).unwrap();
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.byte_timeout_ms, LinkConfig::default().byte_timeout_ms);
    }
}
