//! Device seam for the serial link
//!
//! The worker only talks to [`LinkPort`], and new ports come from a
//! [`PortOpener`], so tests can substitute in-memory ports that fail on demand.

use crate::config::SerialConfig;
use crate::error::LinkError;
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::debug;

/// An open, byte oriented device
pub trait LinkPort: Send {
    /// Device name for logging
    fn name(&self) -> &str;

    /// Number of received bytes waiting to be read
    fn bytes_to_read(&mut self) -> Result<u32, LinkError>;

    /// Read one byte, `None` if the read timed out
    fn read_byte(&mut self) -> Result<Option<u8>, LinkError>;

    fn write_byte(&mut self, byte: u8) -> Result<(), LinkError>;

    /// Discard anything buffered from before the port was opened
    fn clear_input(&mut self) -> Result<(), LinkError>;
}

/// Opens fresh [`LinkPort`] instances for the link worker
pub trait PortOpener: Send + Sync {
    fn port_name(&self) -> &str;

    fn open(&self) -> Result<Box<dyn LinkPort>, LinkError>;
}

/// Opens a real serial device through the `serialport` crate
#[derive(Debug, Clone)]
pub struct SerialPortOpener {
    path: String,
    baud_rate: u32,
    timeout: Duration,
}

impl SerialPortOpener {
    pub fn new(path: impl Into<String>, baud_rate: u32, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            timeout,
        }
    }

    pub fn from_config(config: &SerialConfig, timeout: Duration) -> Self {
        Self::new(config.port.clone(), config.baudrate, timeout)
    }
}

impl PortOpener for SerialPortOpener {
    fn port_name(&self) -> &str {
        &self.path
    }

    fn open(&self) -> Result<Box<dyn LinkPort>, LinkError> {
        debug!("Opening {} at {} baud", self.path, self.baud_rate);
        let port = serialport::new(self.path.as_str(), self.baud_rate)
            .timeout(self.timeout)
            .open()
            .map_err(|e| LinkError::open(self.path.clone(), e))?;

        Ok(Box::new(SerialDevice {
            name: self.path.clone(),
            port,
        }))
    }
}

struct SerialDevice {
    name: String,
    port: Box<dyn serialport::SerialPort>,
}

impl LinkPort for SerialDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn bytes_to_read(&mut self) -> Result<u32, LinkError> {
        Ok(self.port.bytes_to_read()?)
    }

    fn read_byte(&mut self) -> Result<Option<u8>, LinkError> {
        let mut buf = [0u8; 1];
        match self.port.read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buf[0])),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), LinkError> {
        self.port.write_all(&[byte])?;
        self.port.flush()?;
        Ok(())
    }

    fn clear_input(&mut self) -> Result<(), LinkError> {
        Ok(self.port.clear(serialport::ClearBuffer::Input)?)
    }
}
