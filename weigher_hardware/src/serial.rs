//! Real serial ports through the `serialport` crate.

use std::io::Read;
use std::time::Duration;

use serialport::{ClearBuffer, DataBits, Parity, SerialPort, StopBits};
use weigher_traits::{BoxError, LinkSettings, PortEnumerator, ScalePort};

use crate::error::HwError;

/// Enumerates the serial ports the OS reports.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialEnumerator;

impl SerialEnumerator {
    pub fn new() -> Self {
        Self
    }
}

impl PortEnumerator for SerialEnumerator {
    fn list(&self) -> Result<Vec<String>, BoxError> {
        let ports = serialport::available_ports().map_err(HwError::from)?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }

    fn open(&self, name: &str, settings: &LinkSettings) -> Result<Box<dyn ScalePort>, BoxError> {
        let port = serialport::new(name, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(settings.read_timeout)
            .open()
            .map_err(HwError::from)?;
        tracing::debug!(port = %name, baud = settings.baud_rate, "serial port opened");
        Ok(Box::new(SerialScalePort {
            name: name.to_owned(),
            port,
        }))
    }
}

pub struct SerialScalePort {
    name: String,
    port: Box<dyn SerialPort>,
}

impl ScalePort for SerialScalePort {
    fn name(&self) -> &str {
        &self.name
    }

    fn bytes_to_read(&mut self) -> Result<usize, BoxError> {
        let n = self.port.bytes_to_read().map_err(HwError::from)?;
        Ok(n as usize)
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, BoxError> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(Box::new(HwError::Io(e))),
        }
    }

    fn clear_input(&mut self) -> Result<(), BoxError> {
        self.port
            .clear(ClearBuffer::Input)
            .map_err(HwError::from)?;
        Ok(())
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), BoxError> {
        self.port.set_timeout(timeout).map_err(HwError::from)?;
        Ok(())
    }
}

impl Drop for SerialScalePort {
    fn drop(&mut self) {
        tracing::debug!(port = %self.name, "serial port closed");
    }
}
