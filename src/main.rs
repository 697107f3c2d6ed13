//! Serial HEX Viewer
//!
//! Attaches to a serial port and prints everything it receives as hex,
//! one line per burst of bytes. A burst ends when the line stays silent
//! for longer than the line time. Each line carries a millisecond
//! timestamp and can be mirrored to a log file.
//!
//! # Usage
//!
//! ```bash
//! # Watch a port at 115200 baud
//! serial-hexlog /dev/ttyUSB0 -b 115200
//!
//! # Split lines on 50 ms of silence, log to a file, quit after 5 s idle
//! serial-hexlog COM3 -lt 0.05 -l capture.log -qt 5
//! ```

mod cli;
mod error;
mod interrupt;
mod serial;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use serial::port::{DEFAULT_BAUD, DEFAULT_READ_TIMEOUT};
use serial::{MonitorConfig, PortConfig};

/// Serial HEX Viewer with Timing and Logging
#[derive(Parser, Debug)]
#[command(name = "serial-hexlog")]
#[command(author = "Prasanna Gautam")]
#[command(version)]
#[command(about = "Serial HEX Viewer with Timing and Logging")]
struct Cli {
    /// Serial port name (e.g., COM1 OR /dev/ttyS0)
    port: String,

    /// Baud rate
    #[arg(short, long, default_value_t = DEFAULT_BAUD)]
    baudrate: u32,

    /// Silence in seconds that breaks the data to the next line (also -lt)
    #[arg(long = "line-time", value_name = "SECONDS", default_value = "0.01", value_parser = cli::parse_seconds)]
    line_time: Duration,

    /// Optional log file to save HEX output with timestamps
    #[arg(short, long)]
    logfile: Option<PathBuf>,

    /// Quit when no data is received for this many seconds (also -qt)
    #[arg(long = "quit-timeout", value_name = "SECONDS", value_parser = cli::parse_seconds)]
    quit_timeout: Option<Duration>,

    /// Enable verbose diagnostics on stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> MonitorConfig {
        MonitorConfig {
            port_config: PortConfig::new(&self.port)
                .with_baud_rate(self.baudrate)
                .with_timeout(DEFAULT_READ_TIMEOUT),
            line_gap: self.line_time,
            quit_timeout: self.quit_timeout,
            log_file: self.logfile,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse_from(cli::normalize_args(std::env::args_os()));

    // Initialize logger; stdout is reserved for the hex dump
    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let port = cli.port.clone();
    let config = cli.into_config();
    log::debug!("{:?}", config);

    let (reason, summary) = serial::run_monitor(config).map_err(|e| {
        let what = if e.is_startup() {
            "Could not start monitoring"
        } else {
            "Monitoring stopped on error for"
        };
        anyhow::Error::new(e).context(format!("{} {}", what, port))
    })?;

    log::info!(
        "Stopped ({:?}) after {} lines, {} bytes",
        reason,
        summary.lines,
        summary.bytes
    );

    Ok(())
}
