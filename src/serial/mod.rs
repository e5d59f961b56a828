pub mod cancel;
pub mod interface;
pub mod port;
pub mod simulator;

pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use interface::{ConnectionState, SerialInterface, TransportOptions};
pub use port::{list_ports, NativePort, SerialPortIO};
pub use simulator::SimulatedDevice;

use serde::{Deserialize, Serialize};

pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Device status check command
pub const STATUS_COMMAND: u8 = 0x01;

/// A serial port visible to the host, as offered to the operator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortInfo {
    pub port_name: String,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Port is not open")]
    NotConnected,

    #[error("Communication timeout")]
    Timeout,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Incomplete write: {written} of {expected} bytes")]
    WriteIncomplete { written: usize, expected: usize },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialport error: {0}")]
    SerialportError(#[from] serialport::Error),
}

pub type Result<T> = std::result::Result<T, SerialError>;
