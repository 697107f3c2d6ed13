//! Error kinds for the HEX monitor
//!
//! Timeouts and Ctrl+C are not errors; they end a session through
//! [`StopReason`](crate::serial::StopReason). Everything here is fatal.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    /// The serial port could not be opened
    #[error("failed to open serial port {port}: {source}")]
    OpenPort {
        port: String,
        #[source]
        source: serialport::Error,
    },

    /// The log file could not be created or truncated
    #[error("failed to create log file {}: {source}", .path.display())]
    CreateLog {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A read from the serial port failed for a reason other than timeout
    #[error("failed to read from serial port: {0}")]
    Read(#[source] io::Error),

    /// Writing a line or notice to the console or log file failed
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),

    /// The Ctrl+C listener could not be started
    #[error("failed to set Ctrl+C handler: {0}")]
    SignalHandler(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, MonitorError>;

impl MonitorError {
    /// True for failures that happen before the read loop starts
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            MonitorError::OpenPort { .. }
                | MonitorError::CreateLog { .. }
                | MonitorError::SignalHandler(_)
        )
    }
}
