use std::io::{Read, Write};
use std::time::Duration;

use async_trait::async_trait;
use serialport::{DataBits, Parity, SerialPort, SerialPortType, StopBits};

use super::{PortInfo, Result, SerialError};

/// Byte-level access to a half-duplex link.
///
/// [`super::SerialInterface`] drives the protocol on top of this; tests and the
/// simulator plug in their own implementations.
#[async_trait]
pub trait SerialPortIO: Send {
    /// Write `data`, returning how many bytes the port accepted
    async fn send_data(&mut self, data: &[u8]) -> Result<usize>;

    /// Number of received bytes waiting to be read
    fn bytes_to_read(&mut self) -> Result<usize>;

    /// Read bytes that are already available, at most `buf.len()`
    async fn read_data(&mut self, buf: &mut [u8]) -> Result<usize>;

    async fn flush(&mut self) -> Result<()>;
}

/// A physical port opened through `serialport` (8N1)
pub struct NativePort {
    port: Box<dyn SerialPort>,
}

impl NativePort {
    pub fn open(port_name: &str, baud_rate: u32, timeout: Duration) -> Result<Self> {
        let port = serialport::new(port_name, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(timeout)
            .open()
            .map_err(|e| SerialError::ConnectionFailed(format!("{}: {}", port_name, e)))?;

        Ok(Self { port })
    }
}

#[async_trait]
impl SerialPortIO for NativePort {
    async fn send_data(&mut self, data: &[u8]) -> Result<usize> {
        let written = self.port.write(data)?;
        Ok(written)
    }

    fn bytes_to_read(&mut self) -> Result<usize> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    async fn read_data(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(SerialError::IoError(e)),
        }
    }

    async fn flush(&mut self) -> Result<()> {
        self.port.flush()?;
        Ok(())
    }
}

/// Enumerate serial ports on this host
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let ports = serialport::available_ports()?;

    let infos = ports
        .into_iter()
        .map(|port| match port.port_type {
            SerialPortType::UsbPort(usb_info) => PortInfo {
                port_name: port.port_name,
                vid: Some(usb_info.vid),
                pid: Some(usb_info.pid),
                serial_number: usb_info.serial_number,
                manufacturer: usb_info.manufacturer,
                product: usb_info.product,
            },
            _ => PortInfo {
                port_name: port.port_name,
                vid: None,
                pid: None,
                serial_number: None,
                manufacturer: None,
                product: None,
            },
        })
        .collect();

    Ok(infos)
}
