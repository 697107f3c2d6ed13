//! Serial port configuration and connection management
//!
//! Opens the port by name and exposes it to the monitor loop as a
//! [`ByteSource`] that hands back whatever bytes are waiting.

use crate::error::{MonitorError, Result};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{ErrorKind, Read};
use std::time::Duration;

/// Default baud rate when none is given on the command line
pub const DEFAULT_BAUD: u32 = 9600;

/// Upper bound on how long a single poll blocks waiting for the first byte
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Anything the monitor can pull bytes from.
///
/// `poll` appends the bytes available right now to `buf` and returns how
/// many were appended. It may block for a bounded time when nothing is
/// waiting; `Ok(0)` means the wait elapsed without data.
pub trait ByteSource {
    fn poll(&mut self, buf: &mut Vec<u8>) -> Result<usize>;
}

/// Configuration for serial port connection
#[derive(Debug, Clone)]
pub struct PortConfig {
    /// Serial port path (e.g., /dev/ttyUSB0, COM3)
    pub port_path: String,
    /// Baud rate (default: 9600)
    pub baud_rate: u32,
    /// Data bits (default: 8)
    pub data_bits: DataBits,
    /// Parity (default: None)
    pub parity: Parity,
    /// Stop bits (default: 1)
    pub stop_bits: StopBits,
    /// Flow control (always None)
    pub flow_control: FlowControl,
    /// Read timeout, the cadence of the monitor loop when the line is idle
    pub timeout: Duration,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            port_path: String::from("/dev/ttyUSB0"),
            baud_rate: DEFAULT_BAUD,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl PortConfig {
    /// Create a new configuration with 8N1 defaults
    pub fn new(port_path: &str) -> Self {
        Self {
            port_path: port_path.to_string(),
            ..Default::default()
        }
    }

    /// Set the baud rate
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the read timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// An open serial port. Closed when dropped.
pub struct SerialConnection {
    port: Box<dyn SerialPort>,
    config: PortConfig,
    scratch: Vec<u8>,
}

impl SerialConnection {
    /// Open a serial connection with the given configuration
    pub fn open(config: PortConfig) -> Result<Self> {
        let port = serialport::new(&config.port_path, config.baud_rate)
            .data_bits(config.data_bits)
            .parity(config.parity)
            .stop_bits(config.stop_bits)
            .flow_control(config.flow_control)
            .timeout(config.timeout)
            .open()
            .map_err(|source| MonitorError::OpenPort {
                port: config.port_path.clone(),
                source,
            })?;

        log::info!(
            "Opened {} at {} baud (read timeout {:?})",
            config.port_path,
            config.baud_rate,
            config.timeout
        );

        Ok(Self {
            port,
            config,
            scratch: Vec::new(),
        })
    }
}

impl ByteSource for SerialConnection {
    /// Read everything already buffered by the driver, or block up to the
    /// port timeout for a single byte when nothing is waiting.
    fn poll(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        let waiting = self.port.bytes_to_read().map_err(|e| MonitorError::Read(e.into()))?;
        let want = (waiting as usize).max(1);
        self.scratch.resize(want, 0);

        match self.port.read(&mut self.scratch) {
            Ok(n) => {
                buf.extend_from_slice(&self.scratch[..n]);
                Ok(n)
            }
            Err(ref e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(MonitorError::Read(e)),
        }
    }
}

impl Drop for SerialConnection {
    fn drop(&mut self) {
        log::debug!("Closing serial port {}", self.config.port_path);
    }
}
