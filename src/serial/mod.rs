//! Serial HEX monitoring
//!
//! This module provides functionality for:
//! - Opening a serial port and polling it for bytes
//! - Splitting the byte stream into lines by inter-byte silence
//! - Printing and logging each line as a timestamped hex dump

pub mod monitor;
pub mod port;
pub mod segmenter;
pub mod sink;

pub use monitor::{run_monitor, MonitorConfig};
pub use port::PortConfig;
