//! Arrival timing for forwarded TS packets.
//!
//! Each datagram is expected to carry one 188-byte TS packet. The time
//! spent blocked in the receive is reported together with the PID of the
//! packet that ended the wait.

use std::fmt;
use std::io::{self, Write};
use std::net::UdpSocket;
use std::time::Duration;

use log::{debug, info, trace, warn};
use tslatency_protocol::{extract_pid, Pid, ProtocolError, TsHeader, TS_PACKET_SIZE};

use crate::clock::MonoTime;
use crate::config::ReceiverConfig;
use crate::error::LatencyError;
use crate::signal::StopFlag;
use crate::stats::LatencyStats;

/// One timed datagram.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrivalReport {
    /// Taken right before blocking on the socket.
    pub start: MonoTime,
    /// Taken right after the datagram arrived.
    pub end: MonoTime,
    /// Datagram size; shown when it is not one TS packet.
    pub len: usize,
    pub pid: Result<Pid, ProtocolError>,
    pub target: Pid,
}

impl ArrivalReport {
    pub fn delta(&self) -> Duration {
        self.end.saturating_duration_since(self.start)
    }

    pub fn is_target(&self) -> bool {
        self.pid.as_ref().map_or(false, |pid| *pid == self.target)
    }
}

impl fmt::Display for ArrivalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.pid {
            Ok(pid) if self.len != TS_PACKET_SIZE => {
                write!(f, "PID {} ({} bytes)", pid, self.len)?
            }
            Ok(pid) => write!(f, "PID {}", pid)?,
            Err(e) => write!(f, "PID ? (malformed: {})", e)?,
        }
        write!(
            f,
            " received at {:.3}us, receive started at {:.3}us, delta {:.3}us",
            self.end.as_micros_f64(),
            self.start.as_micros_f64(),
            self.delta().as_nanos() as f64 / 1_000.0
        )?;
        if self.is_target() {
            write!(f, " [target]")?;
        }
        Ok(())
    }
}

/// Totals of a finished receiver run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiveSummary {
    pub stats: LatencyStats,
    /// Datagrams carrying the target PID.
    pub matched: u64,
    /// Datagrams too short to hold a PID.
    pub malformed: u64,
}

impl fmt::Display for ReceiveSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} target, {} malformed)",
            self.stats, self.matched, self.malformed
        )
    }
}

/// Wait out the warm-up, bind the listen address and time arrivals.
pub fn run<W: Write>(
    config: &ReceiverConfig,
    stop: &StopFlag,
    out: &mut W,
) -> Result<ReceiveSummary, LatencyError> {
    if !config.warmup.is_zero() {
        info!("Wait {:?} for the TS forwarder to be launched", config.warmup);
        if !stop.sleep(config.warmup) {
            return Ok(ReceiveSummary::default());
        }
    }

    let socket = UdpSocket::bind(config.listen).map_err(|source| LatencyError::Bind {
        addr: config.listen.to_string(),
        source,
    })?;
    run_on_socket(socket, config, stop, out)
}

/// Time arrivals on an already bound socket.
///
/// The first datagram only establishes the starting point and is not
/// reported.
pub fn run_on_socket<W: Write>(
    socket: UdpSocket,
    config: &ReceiverConfig,
    stop: &StopFlag,
    out: &mut W,
) -> Result<ReceiveSummary, LatencyError> {
    socket
        .set_read_timeout(Some(config.poll_interval))
        .map_err(LatencyError::Receive)?;
    let local = socket.local_addr().map_err(LatencyError::Receive)?;
    info!("Listening on {} for PID {}...", local, config.target_pid);

    let mut summary = ReceiveSummary::default();
    let mut buf = vec![0u8; config.recv_buffer];

    if receive(&socket, &mut buf, stop)?.is_none() {
        return Ok(summary);
    }
    debug!("First datagram received, timing starts");

    loop {
        if config.count.map_or(false, |max| summary.stats.count() >= max) {
            break;
        }

        let start = MonoTime::now();
        let Some(len) = receive(&socket, &mut buf, stop)? else {
            break;
        };
        let end = MonoTime::now();

        let payload = &buf[..len];
        let report = ArrivalReport {
            start,
            end,
            len,
            pid: extract_pid(payload),
            target: config.target_pid,
        };

        match &report.pid {
            Ok(_) => {
                if report.len != TS_PACKET_SIZE {
                    debug!("Datagram of {} bytes, expected {}", report.len, TS_PACKET_SIZE);
                } else if let Ok(header) = TsHeader::parse(payload) {
                    trace!(
                        "pid={} cc={} pusi={} tei={}",
                        header.pid,
                        header.continuity_counter,
                        header.payload_unit_start,
                        header.transport_error
                    );
                }
            }
            Err(e) => {
                warn!("Malformed datagram ({} bytes): {}", report.len, e);
                summary.malformed += 1;
            }
        }
        if report.is_target() {
            summary.matched += 1;
        }
        summary.stats.record(report.delta());

        writeln!(out, "{}", report).map_err(LatencyError::Output)?;
    }

    info!("Receiver stopped: {}", summary);
    Ok(summary)
}

/// Block until a datagram arrives or a stop is requested.
fn receive(
    socket: &UdpSocket,
    buf: &mut [u8],
    stop: &StopFlag,
) -> Result<Option<usize>, LatencyError> {
    loop {
        if stop.is_stopped() {
            return Ok(None);
        }
        match socket.recv_from(buf) {
            Ok((len, from)) => {
                trace!("{} bytes from {}", len, from);
                return Ok(Some(len));
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                continue
            }
            Err(e) => return Err(LatencyError::Receive(e)),
        }
    }
}
