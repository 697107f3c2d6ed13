//! Serial HEX monitor loop
//!
//! Polls a [`ByteSource`], runs each poll through the [`Segmenter`] and
//! writes completed lines to a [`LineSink`]. Every way out of the loop
//! (quit timeout, Ctrl+C, read failure) converges on one shutdown path
//! that flushes the pending line and releases port and log file.

use crate::error::Result;
use crate::interrupt;
use crate::serial::port::{ByteSource, PortConfig, SerialConnection};
use crate::serial::segmenter::{Outcome, Segmenter, StopReason, DEFAULT_LINE_GAP};
use crate::serial::sink::LineSink;
use chrono::{DateTime, Local};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Configuration for serial monitoring
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Port configuration
    pub port_config: PortConfig,
    /// Silence that closes a line
    pub line_gap: Duration,
    /// Silence that ends the session; `None` waits forever
    pub quit_timeout: Option<Duration>,
    /// Log file path (optional)
    pub log_file: Option<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            port_config: PortConfig::default(),
            line_gap: DEFAULT_LINE_GAP,
            quit_timeout: None,
            log_file: None,
        }
    }
}

/// Source of time for the loop.
///
/// `now` drives gap and timeout decisions; `wall` stamps emitted lines.
pub trait Clock {
    fn now(&self) -> Instant;
    fn wall(&self) -> DateTime<Local>;
}

/// The real clocks
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Counters reported when a session ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub lines: usize,
    pub bytes: usize,
}

/// Console notice for each way a session can end
pub fn stop_notice(reason: StopReason, quit_timeout: Option<Duration>) -> String {
    let secs = quit_timeout.map(|t| t.as_secs_f64()).unwrap_or_default();
    match reason {
        StopReason::NoData => format!("No data received within {} seconds. Exiting.", secs),
        StopReason::Quiet => format!("No new data within {} seconds. Exiting.", secs),
        StopReason::Interrupted => "\nSerial monitoring stopped.".to_string(),
    }
}

/// Serial HEX monitor. Owns its source and sink until [`HexMonitor::run`]
/// returns.
pub struct HexMonitor<S: ByteSource, K: Clock, C: Write, L: Write> {
    source: S,
    clock: K,
    sink: LineSink<C, L>,
    segmenter: Segmenter,
    quit_timeout: Option<Duration>,
    interrupted: Arc<AtomicBool>,
    summary: Summary,
}

impl<S: ByteSource, K: Clock, C: Write, L: Write> HexMonitor<S, K, C, L> {
    /// Create a monitor; the session clock starts now.
    pub fn new(
        source: S,
        clock: K,
        sink: LineSink<C, L>,
        line_gap: Duration,
        quit_timeout: Option<Duration>,
    ) -> Self {
        let segmenter = Segmenter::new(line_gap, quit_timeout, clock.now());
        Self {
            source,
            clock,
            sink,
            segmenter,
            quit_timeout,
            interrupted: Arc::new(AtomicBool::new(false)),
            summary: Summary::default(),
        }
    }

    /// Get a clone of the interrupt flag for signal handling
    pub fn get_interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    /// Run until a timeout, Ctrl+C or a read failure.
    ///
    /// Consumes the monitor: the source and the sink are dropped (closed)
    /// before this returns, whichever way the loop ended.
    pub fn run(mut self) -> Result<(StopReason, Summary)> {
        let result = self.poll_loop();

        let result = match result {
            Ok(reason) => self.finish(reason).map(|()| reason),
            Err(e) => {
                if let Some(line) = self.segmenter.finish() {
                    if let Err(flush_err) = self.emit(&line) {
                        log::warn!("Could not flush pending line: {}", flush_err);
                    }
                }
                Err(e)
            }
        };

        let summary = self.summary;
        let closed = self.sink.close();
        log::debug!(
            "Session ended: {} lines, {} bytes received",
            summary.lines,
            summary.bytes
        );

        let reason = result?;
        closed?;
        Ok((reason, summary))
    }

    fn poll_loop(&mut self) -> Result<StopReason> {
        let mut chunk = Vec::new();

        loop {
            if self.interrupted.load(Ordering::SeqCst) {
                return Ok(StopReason::Interrupted);
            }

            chunk.clear();
            let n = self.source.poll(&mut chunk)?;
            let now = self.clock.now();
            self.summary.bytes += n;
            if n > 0 {
                log::trace!("Read {} bytes", n);
            }

            let was_waiting = !self.segmenter.has_received();
            let tick = self.segmenter.step(now, &chunk);
            if was_waiting && self.segmenter.has_received() {
                log::debug!("First data received");
            }
            if let Some(line) = tick.line {
                self.emit(&line)?;
            }

            if let Outcome::Stop(reason) = tick.outcome {
                return Ok(reason);
            }
        }
    }

    fn finish(&mut self, reason: StopReason) -> Result<()> {
        log::debug!(
            "Stopping: {:?} ({} bytes pending)",
            reason,
            self.segmenter.pending().len()
        );
        // Quiet timeout already handed back its remainder through the tick
        if let Some(line) = self.segmenter.finish() {
            self.emit(&line)?;
        }
        self.sink.notice(&stop_notice(reason, self.quit_timeout))
    }

    fn emit(&mut self, line: &[u8]) -> Result<()> {
        let at = self.clock.wall();
        self.sink.emit(&at, line)?;
        self.summary.lines += 1;
        Ok(())
    }
}

/// Open port and log file, then run the monitor with Ctrl+C handling
pub fn run_monitor(config: MonitorConfig) -> Result<(StopReason, Summary)> {
    let connection = SerialConnection::open(config.port_config.clone())?;
    let sink = LineSink::stdout(config.log_file.as_deref())?;

    let monitor = HexMonitor::new(
        connection,
        SystemClock,
        sink,
        config.line_gap,
        config.quit_timeout,
    );

    interrupt::install(monitor.get_interrupt_flag())?;

    monitor.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MonitorError;
    use chrono::TimeZone;
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::io;
    use std::rc::Rc;

    /// Shared simulated time; the source advances it, the clock reads it
    #[derive(Clone)]
    struct SimTime {
        base: Instant,
        wall_base: DateTime<Local>,
        elapsed: Rc<Cell<Duration>>,
    }

    impl SimTime {
        fn new() -> Self {
            Self {
                base: Instant::now(),
                wall_base: Local
                    .with_ymd_and_hms(2024, 1, 15, 10, 30, 0)
                    .single()
                    .expect("unambiguous local time"),
                elapsed: Rc::new(Cell::new(Duration::ZERO)),
            }
        }

        fn advance(&self, by: Duration) {
            self.elapsed.set(self.elapsed.get() + by);
        }
    }

    impl Clock for SimTime {
        fn now(&self) -> Instant {
            self.base + self.elapsed.get()
        }

        fn wall(&self) -> DateTime<Local> {
            let ms = self.elapsed.get().as_millis() as i64;
            self.wall_base + chrono::Duration::milliseconds(ms)
        }
    }

    enum Step {
        /// Time passes, then the bytes are available
        Bytes(u64, &'static [u8]),
        /// Ctrl+C arrives during this poll
        Interrupt,
        /// The port fails
        Fail,
    }

    /// Plays a script; once it runs out every poll idles for the port timeout
    struct ScriptedSource {
        time: SimTime,
        steps: VecDeque<Step>,
        interrupt: Option<Arc<AtomicBool>>,
        dropped: Rc<Cell<bool>>,
    }

    impl ScriptedSource {
        fn new(time: &SimTime, steps: Vec<Step>) -> Self {
            Self {
                time: time.clone(),
                steps: steps.into(),
                interrupt: None,
                dropped: Rc::new(Cell::new(false)),
            }
        }
    }

    impl ByteSource for ScriptedSource {
        fn poll(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
            match self.steps.pop_front() {
                Some(Step::Bytes(ms, bytes)) => {
                    self.time.advance(Duration::from_millis(ms));
                    buf.extend_from_slice(bytes);
                    Ok(bytes.len())
                }
                Some(Step::Interrupt) => {
                    if let Some(ref flag) = self.interrupt {
                        flag.store(true, Ordering::SeqCst);
                    }
                    Ok(0)
                }
                Some(Step::Fail) => Err(MonitorError::Read(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "device unplugged",
                ))),
                None => {
                    self.time.advance(Duration::from_secs(1));
                    Ok(0)
                }
            }
        }
    }

    impl Drop for ScriptedSource {
        fn drop(&mut self) {
            self.dropped.set(true);
        }
    }

    /// Log writer that records whether it was released
    struct TrackedLog {
        data: Rc<std::cell::RefCell<Vec<u8>>>,
        dropped: Rc<Cell<bool>>,
    }

    impl Write for TrackedLog {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.data.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Drop for TrackedLog {
        fn drop(&mut self) {
            self.dropped.set(true);
        }
    }

    /// Console writer shared with the test body
    #[derive(Clone, Default)]
    struct SharedConsole(Rc<std::cell::RefCell<Vec<u8>>>);

    impl Write for SharedConsole {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct Harness {
        console: SharedConsole,
        log: Rc<std::cell::RefCell<Vec<u8>>>,
        log_dropped: Rc<Cell<bool>>,
        port_dropped: Rc<Cell<bool>>,
        result: Result<(StopReason, Summary)>,
    }

    impl Harness {
        fn run(steps: Vec<Step>, line_gap_ms: u64, quit_timeout: Option<Duration>) -> Self {
            let time = SimTime::new();
            let mut source = ScriptedSource::new(&time, steps);
            let port_dropped = Rc::clone(&source.dropped);

            let console = SharedConsole::default();
            let log = Rc::new(std::cell::RefCell::new(Vec::new()));
            let log_dropped = Rc::new(Cell::new(false));
            let tracked = TrackedLog {
                data: Rc::clone(&log),
                dropped: Rc::clone(&log_dropped),
            };

            // The flag is created by the monitor, so wire it after construction
            let flag = Arc::new(AtomicBool::new(false));
            source.interrupt = Some(Arc::clone(&flag));
            let mut monitor = HexMonitor::new(
                source,
                time,
                LineSink::new(console.clone(), Some(tracked)),
                Duration::from_millis(line_gap_ms),
                quit_timeout,
            );
            monitor.interrupted = flag;

            let result = monitor.run();
            Self {
                console,
                log,
                log_dropped,
                port_dropped,
                result,
            }
        }

        fn console(&self) -> String {
            String::from_utf8(self.console.0.borrow().clone()).unwrap()
        }

        fn log(&self) -> String {
            String::from_utf8(self.log.borrow().clone()).unwrap()
        }

        /// Hex payloads of the emitted lines, timestamps stripped
        fn lines(&self) -> Vec<String> {
            self.log()
                .lines()
                .map(|l| l.split_once("] ").unwrap().1.to_string())
                .collect()
        }

        fn released(&self) -> bool {
            self.port_dropped.get() && self.log_dropped.get()
        }
    }

    #[test]
    fn test_gap_splits_first_byte_into_own_line() {
        let h = Harness::run(
            vec![Step::Bytes(0, &[0x01]), Step::Bytes(20, &[0x02])],
            10,
            Some(Duration::from_secs(2)),
        );

        let (reason, summary) = h.result.as_ref().unwrap();
        assert_eq!(*reason, StopReason::Quiet);
        assert_eq!(h.lines(), vec!["01", "02"]);
        assert_eq!(summary.lines, 2);
        assert_eq!(summary.bytes, 2);
    }

    #[test]
    fn test_no_data_timeout() {
        let h = Harness::run(vec![], 10, Some(Duration::from_secs(2)));

        let (reason, summary) = h.result.as_ref().unwrap();
        assert_eq!(*reason, StopReason::NoData);
        assert_eq!(summary.lines, 0);
        assert!(h.log().is_empty());
        assert!(h
            .console()
            .contains("No data received within 2 seconds. Exiting."));
        assert!(h.released());
    }

    #[test]
    fn test_quiet_timeout_flushes_then_notices() {
        let h = Harness::run(
            vec![Step::Bytes(0, &[0x48, 0x65])],
            10,
            Some(Duration::from_secs(2)),
        );

        assert_eq!(h.result.as_ref().unwrap().0, StopReason::Quiet);
        assert_eq!(h.lines(), vec!["48 65"]);

        let console = h.console();
        let line_at = console.find("48 65").unwrap();
        let notice_at = console.find("No new data within 2 seconds").unwrap();
        assert!(line_at < notice_at);
        assert!(h.released());
    }

    #[test]
    fn test_interrupt_flushes_pending_byte() {
        let h = Harness::run(
            vec![Step::Bytes(0, &[0xFF]), Step::Interrupt],
            10,
            None,
        );

        assert_eq!(h.result.as_ref().unwrap().0, StopReason::Interrupted);
        assert_eq!(h.lines(), vec!["FF"]);

        let console = h.console();
        let line_at = console.find("FF").unwrap();
        let notice_at = console.find("Serial monitoring stopped.").unwrap();
        assert!(line_at < notice_at);
        assert!(!console.contains("Exiting"));
        assert!(h.released());
    }

    #[test]
    fn test_interrupt_before_any_data() {
        let h = Harness::run(vec![Step::Interrupt], 10, None);

        assert_eq!(h.result.as_ref().unwrap().0, StopReason::Interrupted);
        assert!(h.lines().is_empty());
        assert!(h.console().contains("Serial monitoring stopped."));
    }

    #[test]
    fn test_read_failure_is_fatal_after_flush() {
        let h = Harness::run(
            vec![Step::Bytes(0, &[0x10, 0x20]), Step::Fail],
            10,
            None,
        );

        match h.result {
            Err(MonitorError::Read(ref e)) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            ref other => panic!("expected read failure, got {:?}", other.as_ref().map(|r| r.0)),
        }
        assert_eq!(h.lines(), vec!["10 20"]);
        assert!(!h.console().contains("stopped"));
        assert!(h.released());
    }

    #[test]
    fn test_bytes_within_gap_stay_on_one_line() {
        let h = Harness::run(
            vec![
                Step::Bytes(0, b"He"),
                Step::Bytes(5, b"ll"),
                Step::Bytes(10, b"o"),
                Step::Bytes(50, b"!"),
            ],
            10,
            Some(Duration::from_millis(500)),
        );

        assert_eq!(h.lines(), vec!["48 65 6C 6C 6F", "21"]);
    }

    #[test]
    fn test_console_lines_match_log() {
        let h = Harness::run(
            vec![
                Step::Bytes(0, &[0xAA, 0xBB]),
                Step::Bytes(100, &[0xCC]),
                Step::Bytes(1, &[0xDD]),
                Step::Bytes(300, &[0xEE]),
            ],
            10,
            Some(Duration::from_secs(1)),
        );

        let console = h.console();
        let console_lines: Vec<&str> = console.lines().filter(|l| l.starts_with('[')).collect();
        let log = h.log();
        let log_lines: Vec<&str> = log.lines().collect();
        assert_eq!(console_lines, log_lines);
        assert_eq!(h.lines(), vec!["AA BB", "CC DD", "EE"]);
        assert!(log_lines[0].starts_with("[2024-01-15 10:30:00.100] "));
    }

    #[test]
    fn test_stop_notices_are_distinct() {
        let t = Some(Duration::from_millis(2500));
        assert_eq!(
            stop_notice(StopReason::NoData, t),
            "No data received within 2.5 seconds. Exiting."
        );
        assert_eq!(
            stop_notice(StopReason::Quiet, t),
            "No new data within 2.5 seconds. Exiting."
        );
        assert!(stop_notice(StopReason::Interrupted, t).contains("Serial monitoring stopped."));
    }
}
