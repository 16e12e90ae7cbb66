//! Arm/measure loop over a TS stream.
//!
//! A reader thread cuts packets out of the input and timestamps every
//! packet carrying the watched PID. The main loop arms a measurement,
//! raises the trigger, and waits for the first hit after arming or for
//! the timeout.

use std::fmt;
use std::io::{self, Read, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};
use tslatency_protocol::{extract_pid, Pid, TsStreamBuffer};

use crate::clock::MonoTime;
use crate::config::WatchConfig;
use crate::error::LatencyError;
use crate::signal::StopFlag;
use crate::stats::LatencyStats;
use crate::trigger::EdgeTrigger;

/// Longest wait on the hit channel before re-checking the stop flag.
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// Messages from the reader thread.
#[derive(Debug)]
pub enum ReaderEvent {
    /// A packet with the watched PID was seen at this time.
    Hit(MonoTime),
    /// Input ended; `Some` on read error, `None` on EOF.
    End(Option<io::Error>),
}

/// Result of one armed measurement.
#[derive(Debug, Clone, PartialEq)]
pub enum Measurement {
    Detected {
        index: u64,
        pid: Pid,
        arm: MonoTime,
        hit: MonoTime,
    },
    TimedOut {
        index: u64,
        pid: Pid,
        timeout: Duration,
    },
}

impl Measurement {
    pub fn latency(&self) -> Option<Duration> {
        match self {
            Measurement::Detected { arm, hit, .. } => Some(hit.saturating_duration_since(*arm)),
            Measurement::TimedOut { .. } => None,
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Measurement::Detected {
                index,
                pid,
                arm,
                hit,
            } => {
                writeln!(f, "Measurement {}: PID {} detected", index, pid)?;
                writeln!(f, "  arm_time: {} (MONOTONIC_RAW)", arm)?;
                writeln!(f, "  hit_time: {} (MONOTONIC_RAW)", hit)?;
                write!(
                    f,
                    "  latency : {:.9} s",
                    hit.saturating_duration_since(*arm).as_secs_f64()
                )
            }
            Measurement::TimedOut {
                index,
                pid,
                timeout,
            } => write!(
                f,
                "Measurement {}: TIMEOUT after {:.1} s (no PID {})",
                index,
                timeout.as_secs_f64(),
                pid
            ),
        }
    }
}

/// Totals of a finished watch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchSummary {
    pub stats: LatencyStats,
    pub measurements: u64,
    pub timeouts: u64,
}

impl fmt::Display for WatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} measurements, {} timeouts, {}",
            self.measurements, self.timeouts, self.stats
        )
    }
}

/// Start the reader thread over `input`.
pub fn spawn_reader<R>(
    mut input: R,
    pid: Pid,
    read_chunk: usize,
    events: Sender<ReaderEvent>,
) -> io::Result<JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    thread::Builder::new()
        .name("ts-reader".to_string())
        .spawn(move || {
            let mut stream = TsStreamBuffer::new();
            let mut buf = vec![0u8; read_chunk.max(1)];

            loop {
                // Never read more than fits, so no unprocessed packet is dropped.
                let want = buf.len().min(stream.free_space()).max(1);
                let n = match input.read(&mut buf[..want]) {
                    Ok(0) => {
                        let _ = events.send(ReaderEvent::End(None));
                        break;
                    }
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        let _ = events.send(ReaderEvent::End(Some(e)));
                        break;
                    }
                };

                stream.push(&buf[..n]);
                while let Some(packet) = stream.next_packet() {
                    if extract_pid(&packet) == Ok(pid)
                        && events.send(ReaderEvent::Hit(MonoTime::now())).is_err()
                    {
                        return;
                    }
                }
            }

            debug!(
                "Reader finished ({} bytes skipped, {} bytes dropped)",
                stream.skipped_bytes(),
                stream.dropped_bytes()
            );
        })
}

/// Read the TS stream from `input` and run measurements on it.
pub fn run<R, T, W>(
    config: &WatchConfig,
    stop: &StopFlag,
    input: R,
    trigger: &mut T,
    out: &mut W,
) -> Result<WatchSummary, LatencyError>
where
    R: Read + Send + 'static,
    T: EdgeTrigger,
    W: Write,
{
    let (tx, rx) = mpsc::channel();
    let reader = spawn_reader(input, config.target_pid, config.read_chunk, tx)
        .map_err(LatencyError::Input)?;

    info!(
        "Starting arm/measure with {:.1} s timeout for PID {}",
        config.timeout.as_secs_f64(),
        config.target_pid
    );
    if !config.warmup.is_zero() {
        info!("Wait {:?} for the stream to settle...", config.warmup);
        if !stop.sleep(config.warmup) {
            return Ok(WatchSummary::default());
        }
    }

    let result = measure(config, stop, &rx, trigger, out);

    // A reader blocked on stdin cannot be woken; only join it once it is done.
    let reader_done = match &result {
        Ok((_, ended)) => *ended,
        Err(LatencyError::Input(_)) => true,
        Err(_) => false,
    };
    if reader_done {
        let _ = reader.join();
    }
    result.map(|(summary, _)| summary)
}

/// Run measurements until stopped, the count is reached or input ends.
///
/// Returns the summary and whether the input ended.
pub fn measure<T, W>(
    config: &WatchConfig,
    stop: &StopFlag,
    events: &Receiver<ReaderEvent>,
    trigger: &mut T,
    out: &mut W,
) -> Result<(WatchSummary, bool), LatencyError>
where
    T: EdgeTrigger,
    W: Write,
{
    let mut summary = WatchSummary::default();

    loop {
        if stop.is_stopped() || config.count.map_or(false, |max| summary.measurements >= max) {
            break;
        }

        // Hits seen before arming belong to no measurement.
        loop {
            match events.try_recv() {
                Ok(ReaderEvent::Hit(_)) => continue,
                Ok(ReaderEvent::End(err)) => return input_ended(summary, err),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return input_ended(summary, None),
            }
        }

        let index = summary.measurements + 1;
        let arm = MonoTime::now();
        trigger.raise();
        let outcome = wait_for_hit(events, arm, config.timeout, stop);
        trigger.lower();

        let measurement = match outcome {
            Wait::Hit(hit) => Measurement::Detected {
                index,
                pid: config.target_pid,
                arm,
                hit,
            },
            Wait::TimedOut => Measurement::TimedOut {
                index,
                pid: config.target_pid,
                timeout: config.timeout,
            },
            Wait::Stopped => break,
            Wait::Ended(err) => return input_ended(summary, err),
        };

        summary.measurements += 1;
        match measurement.latency() {
            Some(latency) => summary.stats.record(latency),
            None => summary.timeouts += 1,
        }
        writeln!(out, "{}", measurement).map_err(LatencyError::Output)?;

        if !stop.sleep(config.pause) {
            break;
        }
    }

    info!("Watch stopped: {}", summary);
    Ok((summary, false))
}

fn input_ended(
    summary: WatchSummary,
    err: Option<io::Error>,
) -> Result<(WatchSummary, bool), LatencyError> {
    match err {
        Some(e) => {
            error!("Input stream failed: {}", e);
            Err(LatencyError::Input(e))
        }
        None => {
            warn!("End of input");
            info!("Watch stopped: {}", summary);
            Ok((summary, true))
        }
    }
}

enum Wait {
    Hit(MonoTime),
    TimedOut,
    Stopped,
    Ended(Option<io::Error>),
}

fn wait_for_hit(
    events: &Receiver<ReaderEvent>,
    arm: MonoTime,
    timeout: Duration,
    stop: &StopFlag,
) -> Wait {
    loop {
        if stop.is_stopped() {
            return Wait::Stopped;
        }
        let elapsed = MonoTime::now().saturating_duration_since(arm);
        if elapsed >= timeout {
            return Wait::TimedOut;
        }

        match events.recv_timeout((timeout - elapsed).min(WAIT_SLICE)) {
            Ok(ReaderEvent::Hit(hit)) if hit >= arm => return Wait::Hit(hit),
            Ok(ReaderEvent::Hit(_)) => continue,
            Ok(ReaderEvent::End(err)) => return Wait::Ended(err),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return Wait::Ended(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use tslatency_protocol::TS_PACKET_SIZE;

    use crate::config::DEFAULT_READ_CHUNK;
    use crate::trigger::LogTrigger;

    fn packet(pid: u16) -> Vec<u8> {
        let mut packet = vec![0u8; TS_PACKET_SIZE];
        packet[0] = 0x47;
        packet[1] = (pid >> 8) as u8 & 0x1F;
        packet[2] = pid as u8;
        packet
    }

    fn test_config(timeout: Duration, count: Option<u64>) -> WatchConfig {
        WatchConfig {
            timeout,
            pause: Duration::ZERO,
            warmup: Duration::ZERO,
            count,
            ..Default::default()
        }
    }

    /// Returns its data in one read after a delay, then EOF.
    struct DelayedReader {
        delay: Duration,
        data: Cursor<Vec<u8>>,
        waited: bool,
    }

    impl Read for DelayedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.waited {
                thread::sleep(self.delay);
                self.waited = true;
            }
            self.data.read(buf)
        }
    }

    #[test]
    fn test_reader_reports_watched_pid_only() {
        let mut data = vec![0x00, 0x01];
        data.extend(packet(0x0404));
        data.extend(packet(0x0011));
        data.extend(packet(0x0404));

        let (tx, rx) = mpsc::channel();
        let handle = spawn_reader(Cursor::new(data), Pid::masked(0x0404), 100, tx).unwrap();
        handle.join().unwrap();

        let events: Vec<ReaderEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], ReaderEvent::Hit(_)));
        assert!(matches!(events[1], ReaderEvent::Hit(_)));
        assert!(matches!(events[2], ReaderEvent::End(None)));
    }

    /// Hands out at most `chunk` bytes per read.
    struct ChunkedReader {
        chunk: usize,
        data: Cursor<Vec<u8>>,
    }

    impl Read for ChunkedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.chunk);
            self.data.read(&mut buf[..n])
        }
    }

    #[test]
    fn test_reader_keeps_packet_across_full_reads() {
        let read_chunk = DEFAULT_READ_CHUNK;
        let mut data = vec![0x00];
        for _ in 0..63 {
            data.extend(packet(0x0011));
        }
        // Crosses the first read boundary.
        data.extend(packet(0x0404));
        for _ in 0..70 {
            data.extend(packet(0x0011));
        }
        assert!(data.len() > read_chunk);

        let input = ChunkedReader {
            chunk: read_chunk,
            data: Cursor::new(data),
        };
        let (tx, rx) = mpsc::channel();
        let handle = spawn_reader(input, Pid::masked(0x0404), read_chunk, tx).unwrap();
        handle.join().unwrap();

        let events: Vec<ReaderEvent> = rx.try_iter().collect();
        let hits = events
            .iter()
            .filter(|e| matches!(e, ReaderEvent::Hit(_)))
            .count();
        assert_eq!(hits, 1);
        assert!(matches!(events.last(), Some(ReaderEvent::End(None))));
    }

    #[test]
    fn test_detects_hit_after_arming() {
        let (tx, rx) = mpsc::channel();
        let feeder = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            tx.send(ReaderEvent::Hit(MonoTime::now())).unwrap();
            thread::sleep(Duration::from_millis(100));
            tx.send(ReaderEvent::End(None)).unwrap();
        });

        let mut trigger = LogTrigger::new();
        let mut out = Vec::new();
        let (summary, ended) = measure(
            &test_config(Duration::from_secs(5), None),
            &StopFlag::new(),
            &rx,
            &mut trigger,
            &mut out,
        )
        .unwrap();
        feeder.join().unwrap();

        assert!(ended);
        assert_eq!(summary.measurements, 1);
        assert_eq!(summary.timeouts, 0);
        assert!(summary.stats.min().unwrap() >= Duration::from_millis(10));
        assert!(!trigger.is_high());

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Measurement 1: PID 0x0404 detected\n"));
        assert!(text.contains("  arm_time: "));
        assert!(text.contains("  latency : 0."));
    }

    #[test]
    fn test_times_out_without_hit() {
        let (tx, rx) = mpsc::channel::<ReaderEvent>();
        let mut trigger = LogTrigger::new();
        let mut out = Vec::new();

        let (summary, ended) = measure(
            &test_config(Duration::from_millis(100), Some(2)),
            &StopFlag::new(),
            &rx,
            &mut trigger,
            &mut out,
        )
        .unwrap();
        drop(tx);

        assert!(!ended);
        assert_eq!(summary.measurements, 2);
        assert_eq!(summary.timeouts, 2);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Measurement 1: TIMEOUT after 0.1 s (no PID 0x0404)\n\
             Measurement 2: TIMEOUT after 0.1 s (no PID 0x0404)\n"
        );
    }

    #[test]
    fn test_stale_hits_are_ignored() {
        let (tx, rx) = mpsc::channel();
        tx.send(ReaderEvent::Hit(MonoTime::from_nanos(0))).unwrap();

        let mut trigger = LogTrigger::new();
        let mut out = Vec::new();
        let (summary, _) = measure(
            &test_config(Duration::from_millis(50), Some(1)),
            &StopFlag::new(),
            &rx,
            &mut trigger,
            &mut out,
        )
        .unwrap();
        drop(tx);

        assert_eq!(summary.timeouts, 1);
    }

    #[test]
    fn test_read_error_is_reported() {
        let (tx, rx) = mpsc::channel();
        tx.send(ReaderEvent::End(Some(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "gone",
        ))))
        .unwrap();

        let mut trigger = LogTrigger::new();
        let mut out = Vec::new();
        let result = measure(
            &test_config(Duration::from_secs(1), None),
            &StopFlag::new(),
            &rx,
            &mut trigger,
            &mut out,
        );
        assert!(matches!(result, Err(LatencyError::Input(_))));
    }

    #[test]
    fn test_run_over_stream() {
        let mut data = packet(0x0011);
        data.extend(packet(0x0404));
        let input = DelayedReader {
            delay: Duration::from_millis(100),
            data: Cursor::new(data),
            waited: false,
        };

        let mut trigger = LogTrigger::new();
        let mut out = Vec::new();
        let summary = run(
            &test_config(Duration::from_secs(5), None),
            &StopFlag::new(),
            input,
            &mut trigger,
            &mut out,
        )
        .unwrap();

        assert_eq!(summary.measurements, 1);
        assert_eq!(summary.stats.count(), 1);
        assert!(String::from_utf8(out)
            .unwrap()
            .starts_with("Measurement 1: PID 0x0404 detected"));
    }
}
