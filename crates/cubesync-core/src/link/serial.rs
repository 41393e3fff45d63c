//! Serial port transport.
//!
//! Opening the transport opens the port; dropping it closes the port. The
//! port is configured 8N1 with a short timeout (`poll_interval`) so the
//! bounded I/O worker regains control regularly to check for cancellation.
//! The port timeout applies to writes as well; the worker treats it as
//! "nothing yet" and keeps writing until its own deadline passes.

use std::io::{self, Read, Write};

use log::debug;
use serialport::{ClearBuffer, DataBits, Parity, SerialPort, SerialPortInfo, StopBits};

use super::error::LinkError;
use super::{LinkConfig, Transport};

pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    pub fn open(port_name: &str, config: &LinkConfig) -> Result<Self, LinkError> {
        let port = serialport::new(port_name, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(config.poll_interval())
            .open()?;
        debug!("opened {port_name} @ {} baud", config.baud_rate);
        Ok(Self { port })
    }
}

impl Transport for SerialTransport {
    fn send(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.port.write(bytes)
    }

    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}

/// Serial ports currently visible to the host.
pub fn available_ports() -> Result<Vec<SerialPortInfo>, LinkError> {
    Ok(serialport::available_ports()?)
}
