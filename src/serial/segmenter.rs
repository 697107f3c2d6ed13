//! Timing-based line segmentation
//!
//! Bytes are grouped into lines by silence: a gap longer than the line-gap
//! threshold between two reads closes the current line. The same machine
//! enforces the quit timeout, measured from session start until the first
//! byte arrives and from the most recent byte afterwards.

use std::time::{Duration, Instant};

/// Default silence that closes a line
pub const DEFAULT_LINE_GAP: Duration = Duration::from_millis(10);

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Quit timeout elapsed before any byte arrived
    NoData,
    /// Quit timeout elapsed after the last byte
    Quiet,
    /// Ctrl+C
    Interrupted,
}

/// Result of one poll iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Stop(StopReason),
}

/// What a single [`Segmenter::step`] produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    /// A completed line, flushed out of the buffer during this step
    pub line: Option<Vec<u8>>,
    pub outcome: Outcome,
}

impl Tick {
    fn proceed(line: Option<Vec<u8>>) -> Self {
        Self {
            line,
            outcome: Outcome::Continue,
        }
    }

    fn stop(line: Option<Vec<u8>>, reason: StopReason) -> Self {
        Self {
            line,
            outcome: Outcome::Stop(reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitingFirstByte { started: Instant },
    Accumulating { last_byte: Instant },
}

/// Session state for one monitoring run
#[derive(Debug)]
pub struct Segmenter {
    line_gap: Duration,
    quit_timeout: Option<Duration>,
    phase: Phase,
    buffer: Vec<u8>,
}

impl Segmenter {
    /// Start a session at `started`. A zero quit timeout counts as none.
    pub fn new(line_gap: Duration, quit_timeout: Option<Duration>, started: Instant) -> Self {
        Self {
            line_gap,
            quit_timeout: quit_timeout.filter(|t| !t.is_zero()),
            phase: Phase::AwaitingFirstByte { started },
            buffer: Vec::new(),
        }
    }

    /// Feed one poll's worth of bytes, all observed at `now`.
    ///
    /// At most one line is flushed per step: either the line closed by a
    /// gap before `data`, or the remainder on quiet timeout.
    pub fn step(&mut self, now: Instant, data: &[u8]) -> Tick {
        match self.phase {
            Phase::AwaitingFirstByte { started } => {
                if !data.is_empty() {
                    self.buffer.extend_from_slice(data);
                    self.phase = Phase::Accumulating { last_byte: now };
                    Tick::proceed(None)
                } else if self.timed_out(now, started) {
                    Tick::stop(None, StopReason::NoData)
                } else {
                    Tick::proceed(None)
                }
            }
            Phase::Accumulating { last_byte } => {
                if !data.is_empty() {
                    let line = if now.saturating_duration_since(last_byte) > self.line_gap {
                        self.take_line()
                    } else {
                        None
                    };
                    self.buffer.extend_from_slice(data);
                    self.phase = Phase::Accumulating { last_byte: now };
                    Tick::proceed(line)
                } else if self.timed_out(now, last_byte) {
                    Tick::stop(self.take_line(), StopReason::Quiet)
                } else {
                    Tick::proceed(None)
                }
            }
        }
    }

    /// Drain whatever is pending, for shutdown paths.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        self.take_line()
    }

    /// True once the first byte has been seen
    pub fn has_received(&self) -> bool {
        matches!(self.phase, Phase::Accumulating { .. })
    }

    /// Bytes received but not yet flushed
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    fn timed_out(&self, now: Instant, since: Instant) -> bool {
        self.quit_timeout
            .is_some_and(|limit| now.saturating_duration_since(since) > limit)
    }

    fn take_line(&mut self) -> Option<Vec<u8>> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }
}
