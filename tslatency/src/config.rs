//! Configuration for the tslatency commands.
//!
//! Every knob has a built-in default. A TOML file (`--config`, or
//! `tslatency.toml` in the working directory) can override the defaults,
//! and command-line options override the file.
//!
//! ```toml
//! [sender]
//! target = "127.0.0.1:9005"
//! interval_ms = 10
//!
//! [receiver]
//! listen = "127.0.0.1:9006"
//! warmup_secs = 10.0
//! target_pid = 0x0404
//!
//! [watch]
//! timeout_secs = 20.0
//!
//! [logging]
//! log_dir = "logs"
//! retention_days = 7
//! ```

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;
use serde::Deserialize;
use tslatency_protocol::Pid;

use crate::error::LatencyError;

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "tslatency.toml";

pub const DEFAULT_SENDER_TARGET: &str = "127.0.0.1:9005";
pub const DEFAULT_SEND_INTERVAL: Duration = Duration::from_millis(10);

pub const DEFAULT_RECEIVER_LISTEN: &str = "127.0.0.1:9006";
pub const DEFAULT_WARMUP: Duration = Duration::from_secs(10);
pub const DEFAULT_TARGET_PID: u16 = 0x0404;
/// Large enough for any UDP payload the forwarder emits.
pub const DEFAULT_RECV_BUFFER: usize = 2048;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

pub const DEFAULT_WATCH_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_WATCH_PAUSE: Duration = Duration::from_secs(1);
pub const DEFAULT_READ_CHUNK: usize = 64 * tslatency_protocol::TS_PACKET_SIZE;

pub const DEFAULT_LOG_RETENTION_DAYS: u64 = 7;

/// Configuration file format.
#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct ConfigFile {
    #[serde(default)]
    pub sender: SenderSection,
    #[serde(default)]
    pub receiver: ReceiverSection,
    #[serde(default)]
    pub watch: WatchSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct SenderSection {
    pub target: Option<String>,
    pub interval_ms: Option<u64>,
    pub count: Option<u64>,
    pub duration_secs: Option<f64>,
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct ReceiverSection {
    pub listen: Option<String>,
    pub warmup_secs: Option<f64>,
    pub target_pid: Option<u16>,
    pub recv_buffer: Option<usize>,
    pub poll_interval_ms: Option<u64>,
    pub count: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct WatchSection {
    pub target_pid: Option<u16>,
    pub timeout_secs: Option<f64>,
    pub pause_secs: Option<f64>,
    pub warmup_secs: Option<f64>,
    pub read_chunk: Option<usize>,
    pub count: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct LoggingSection {
    pub log_dir: Option<String>,
    pub retention_days: Option<u64>,
    pub level: Option<String>,
}

impl SenderSection {
    /// Fill unset fields from `fallback`.
    pub fn or(self, fallback: SenderSection) -> SenderSection {
        SenderSection {
            target: self.target.or(fallback.target),
            interval_ms: self.interval_ms.or(fallback.interval_ms),
            count: self.count.or(fallback.count),
            duration_secs: self.duration_secs.or(fallback.duration_secs),
        }
    }
}

impl ReceiverSection {
    /// Fill unset fields from `fallback`.
    pub fn or(self, fallback: ReceiverSection) -> ReceiverSection {
        ReceiverSection {
            listen: self.listen.or(fallback.listen),
            warmup_secs: self.warmup_secs.or(fallback.warmup_secs),
            target_pid: self.target_pid.or(fallback.target_pid),
            recv_buffer: self.recv_buffer.or(fallback.recv_buffer),
            poll_interval_ms: self.poll_interval_ms.or(fallback.poll_interval_ms),
            count: self.count.or(fallback.count),
        }
    }
}

impl WatchSection {
    /// Fill unset fields from `fallback`.
    pub fn or(self, fallback: WatchSection) -> WatchSection {
        WatchSection {
            target_pid: self.target_pid.or(fallback.target_pid),
            timeout_secs: self.timeout_secs.or(fallback.timeout_secs),
            pause_secs: self.pause_secs.or(fallback.pause_secs),
            warmup_secs: self.warmup_secs.or(fallback.warmup_secs),
            read_chunk: self.read_chunk.or(fallback.read_chunk),
            count: self.count.or(fallback.count),
        }
    }
}

impl LoggingSection {
    /// Fill unset fields from `fallback`.
    pub fn or(self, fallback: LoggingSection) -> LoggingSection {
        LoggingSection {
            log_dir: self.log_dir.or(fallback.log_dir),
            retention_days: self.retention_days.or(fallback.retention_days),
            level: self.level.or(fallback.level),
        }
    }
}

/// Timestamp sender settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SenderConfig {
    /// Destination of the timestamp datagrams.
    pub target: SocketAddr,
    /// Pause after each datagram.
    pub interval: Duration,
    /// Stop after this many datagrams; `None` runs until interrupted.
    pub count: Option<u64>,
    /// Stop after this long; `None` runs until interrupted.
    pub duration: Option<Duration>,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            target: SocketAddr::from(([127, 0, 0, 1], 9005)),
            interval: DEFAULT_SEND_INTERVAL,
            count: None,
            duration: None,
        }
    }
}

impl TryFrom<SenderSection> for SenderConfig {
    type Error = LatencyError;

    fn try_from(section: SenderSection) -> Result<Self, Self::Error> {
        Ok(Self {
            target: resolve_addr(section.target.as_deref().unwrap_or(DEFAULT_SENDER_TARGET))?,
            interval: section
                .interval_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_SEND_INTERVAL),
            count: section.count.filter(|&n| n > 0),
            duration: optional_secs("sender.duration_secs", section.duration_secs)?,
        })
    }
}

/// TS arrival receiver settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiverConfig {
    /// Local address the forwarded TS packets arrive on.
    pub listen: SocketAddr,
    /// Delay before binding, for the forwarding process to come up.
    pub warmup: Duration,
    /// PID the measurement is interested in; matches are flagged.
    pub target_pid: Pid,
    /// Receive buffer size in bytes.
    pub recv_buffer: usize,
    /// How often a blocked receive checks for interrupt.
    pub poll_interval: Duration,
    /// Stop after this many timed datagrams.
    pub count: Option<u64>,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 9006)),
            warmup: DEFAULT_WARMUP,
            target_pid: Pid::masked(DEFAULT_TARGET_PID),
            recv_buffer: DEFAULT_RECV_BUFFER,
            poll_interval: DEFAULT_POLL_INTERVAL,
            count: None,
        }
    }
}

impl TryFrom<ReceiverSection> for ReceiverConfig {
    type Error = LatencyError;

    fn try_from(section: ReceiverSection) -> Result<Self, Self::Error> {
        let poll_interval = section
            .poll_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_POLL_INTERVAL);
        if poll_interval.is_zero() {
            return Err(LatencyError::ConfigValue(
                "receiver.poll_interval_ms must be positive".to_string(),
            ));
        }

        let recv_buffer = section.recv_buffer.unwrap_or(DEFAULT_RECV_BUFFER);
        if recv_buffer == 0 {
            return Err(LatencyError::ConfigValue(
                "receiver.recv_buffer must be positive".to_string(),
            ));
        }

        Ok(Self {
            listen: resolve_addr(section.listen.as_deref().unwrap_or(DEFAULT_RECEIVER_LISTEN))?,
            warmup: secs_or("receiver.warmup_secs", section.warmup_secs, DEFAULT_WARMUP)?,
            target_pid: Pid::new(section.target_pid.unwrap_or(DEFAULT_TARGET_PID))?,
            recv_buffer,
            poll_interval,
            count: section.count.filter(|&n| n > 0),
        })
    }
}

/// Arm/measure settings for a TS stream read from stdin.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchConfig {
    /// PID whose arrival ends a measurement.
    pub target_pid: Pid,
    /// Give up on a measurement after this long.
    pub timeout: Duration,
    /// Pause between measurements.
    pub pause: Duration,
    /// Delay before the first measurement.
    pub warmup: Duration,
    /// Bytes per read from the input stream.
    pub read_chunk: usize,
    /// Stop after this many measurements.
    pub count: Option<u64>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            target_pid: Pid::masked(DEFAULT_TARGET_PID),
            timeout: DEFAULT_WATCH_TIMEOUT,
            pause: DEFAULT_WATCH_PAUSE,
            warmup: DEFAULT_WARMUP,
            read_chunk: DEFAULT_READ_CHUNK,
            count: None,
        }
    }
}

impl TryFrom<WatchSection> for WatchConfig {
    type Error = LatencyError;

    fn try_from(section: WatchSection) -> Result<Self, Self::Error> {
        let timeout = secs_or("watch.timeout_secs", section.timeout_secs, DEFAULT_WATCH_TIMEOUT)?;
        if timeout.is_zero() {
            return Err(LatencyError::ConfigValue(
                "watch.timeout_secs must be positive".to_string(),
            ));
        }

        let read_chunk = section.read_chunk.unwrap_or(DEFAULT_READ_CHUNK);
        if read_chunk == 0 {
            return Err(LatencyError::ConfigValue(
                "watch.read_chunk must be positive".to_string(),
            ));
        }

        Ok(Self {
            target_pid: Pid::new(section.target_pid.unwrap_or(DEFAULT_TARGET_PID))?,
            timeout,
            pause: secs_or("watch.pause_secs", section.pause_secs, DEFAULT_WATCH_PAUSE)?,
            warmup: secs_or("watch.warmup_secs", section.warmup_secs, DEFAULT_WARMUP)?,
            read_chunk,
            count: section.count.filter(|&n| n > 0),
        })
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Directory for rotated log files; console only when unset.
    pub log_dir: Option<PathBuf>,
    pub retention_days: u64,
    /// Default filter when `RUST_LOG` is unset.
    pub level: Option<String>,
}

impl From<LoggingSection> for LoggingConfig {
    fn from(section: LoggingSection) -> Self {
        Self {
            log_dir: section.log_dir.map(PathBuf::from),
            retention_days: section.retention_days.unwrap_or(DEFAULT_LOG_RETENTION_DAYS),
            level: section.level,
        }
    }
}

/// Pick the config file: explicit path, else `tslatency.toml` if present.
pub fn find_config(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| {
        let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
        if default_path.exists() {
            Some(default_path)
        } else {
            None
        }
    })
}

pub fn load_config(path: &Path) -> Result<ConfigFile, LatencyError> {
    let contents = std::fs::read_to_string(path).map_err(|source| LatencyError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config(&contents).map_err(|source| LatencyError::ConfigParse {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Loaded config from {}: {:?}", path.display(), config);
    Ok(config)
}

pub fn parse_config(contents: &str) -> Result<ConfigFile, toml::de::Error> {
    toml::from_str(contents)
}

/// Resolve `host:port`, taking the first address.
pub fn resolve_addr(addr: &str) -> Result<SocketAddr, LatencyError> {
    addr.to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| LatencyError::InvalidAddress(addr.to_string()))
}

fn secs_or(name: &str, secs: Option<f64>, default: Duration) -> Result<Duration, LatencyError> {
    match secs {
        Some(secs) => Duration::try_from_secs_f64(secs)
            .map_err(|e| LatencyError::ConfigValue(format!("{} = {}: {}", name, secs, e))),
        None => Ok(default),
    }
}

/// Zero or negative means "no limit".
fn optional_secs(name: &str, secs: Option<f64>) -> Result<Option<Duration>, LatencyError> {
    match secs {
        Some(secs) if secs > 0.0 => secs_or(name, Some(secs), Duration::ZERO).map(Some),
        Some(secs) if secs.is_nan() => Err(LatencyError::ConfigValue(format!("{} = NaN", name))),
        _ => Ok(None),
    }
}
