//! HEX line output
//!
//! Formats flushed lines as `[YYYY-MM-DD HH:MM:SS.mmm] 48 65 6C` and writes
//! them to the console and, when configured, to a log file.

use crate::error::{MonitorError, Result};
use chrono::{DateTime, Local};
use colored::Colorize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Timestamp layout shared by console and log file
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Render bytes as uppercase hex pairs separated by single spaces
pub fn hex_line(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{:02X}", byte));
    }
    out
}

/// Prefix a hex rendering with its emission timestamp
pub fn format_line(at: &DateTime<Local>, bytes: &[u8]) -> String {
    format!("[{}] {}", at.format(TIMESTAMP_FORMAT), hex_line(bytes))
}

/// Console plus optional log file.
///
/// Lines go to both; notices go to the console only.
pub struct LineSink<C: Write, L: Write> {
    console: C,
    log: Option<L>,
}

impl LineSink<std::io::Stdout, BufWriter<File>> {
    /// Stdout sink, with the log file created (or truncated) at `log_path`
    pub fn stdout(log_path: Option<&Path>) -> Result<Self> {
        let log = match log_path {
            Some(path) => {
                let file = File::create(path).map_err(|source| MonitorError::CreateLog {
                    path: path.to_path_buf(),
                    source,
                })?;
                log::info!("Logging to: {}", path.display());
                Some(BufWriter::new(file))
            }
            None => None,
        };

        Ok(Self::new(std::io::stdout(), log))
    }
}

impl<C: Write, L: Write> LineSink<C, L> {
    pub fn new(console: C, log: Option<L>) -> Self {
        Self { console, log }
    }

    /// Write one formatted line everywhere
    pub fn emit(&mut self, at: &DateTime<Local>, bytes: &[u8]) -> Result<()> {
        let line = format_line(at, bytes);

        writeln!(self.console, "{}", line)?;
        self.console.flush()?;

        if let Some(ref mut writer) = self.log {
            writeln!(writer, "{}", line)?;
            writer.flush()?;
        }

        Ok(())
    }

    /// Informational message for the console
    pub fn notice(&mut self, message: &str) -> Result<()> {
        writeln!(self.console, "{}", message.yellow())?;
        self.console.flush()?;
        Ok(())
    }

    /// Flush and release both outputs, reporting any late write error
    pub fn close(mut self) -> Result<()> {
        self.console.flush()?;
        if let Some(mut writer) = self.log.take() {
            writer.flush()?;
        }
        Ok(())
    }

    /// Split back into the underlying writers
    #[cfg(test)]
    pub fn into_parts(self) -> (C, Option<L>) {
        (self.console, self.log)
    }
}
