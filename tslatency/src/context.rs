use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_num::maybe_hex;

use tslatency::config::{ReceiverSection, SenderSection, WatchSection};

#[derive(Debug, Parser)]
#[clap(name = "tslatency")]
#[clap(about = "Latency measurement tools for an MPEG-TS pipeline over UDP. ", long_about = None)]
#[clap(version)]
pub(crate) struct Cli {
    /// Configuration file path.{n}
    /// If not specified, `tslatency.toml` in the current directory
    /// is used when it exists.
    #[clap(short = 'f', long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable debug logging.
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Directory where rotated log files are written.{n}
    /// If not specified, logs go to stderr only.
    #[clap(long, global = true, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// Send `time=<ms>` UDP datagrams at a fixed interval.{n}
    /// Runs until interrupted unless a count or duration is given.
    #[clap(name = "send")]
    Send {
        /// Destination address (default: 127.0.0.1:9005).
        #[clap(short, long, value_name = "HOST:PORT")]
        target: Option<String>,

        /// Pause between datagrams in milliseconds (default: 10).
        #[clap(short, long, value_name = "ms")]
        interval: Option<u64>,

        /// Stop after this many datagrams.{n}
        /// 0 means unlimited.
        #[clap(short = 'n', long)]
        count: Option<u64>,

        /// Stop after this many seconds.{n}
        /// If the duration is 0.0 or negative, the sender
        /// continues until the user stops it.
        #[clap(short, long, value_name = "seconds", allow_negative_numbers = true)]
        duration: Option<f64>,
    },

    /// Time arrivals of UDP datagrams carrying TS packets.{n}
    /// Prints the time spent waiting for each datagram and the PID it carries.
    #[clap(name = "recv")]
    Recv {
        /// Local address to listen on (default: 127.0.0.1:9006).
        #[clap(short, long, value_name = "HOST:PORT")]
        listen: Option<String>,

        /// Seconds to wait before binding, for the TS forwarder to start (default: 10).
        #[clap(short, long, value_name = "seconds")]
        warmup: Option<f64>,

        /// PID to flag in the report, decimal or 0x-prefixed hex (default: 0x0404).
        #[clap(short, long, value_parser = maybe_hex::<u16>)]
        pid: Option<u16>,

        /// Stop after this many timed datagrams.{n}
        /// 0 means unlimited.
        #[clap(short = 'n', long)]
        count: Option<u64>,

        /// Receive buffer size in bytes (default: 2048).
        #[clap(long, value_name = "bytes")]
        recv_buffer: Option<usize>,

        /// How often a blocked receive checks for Ctrl+C, in milliseconds (default: 200).
        #[clap(long, value_name = "ms")]
        poll_interval: Option<u64>,
    },

    /// Arm/measure loop over a raw TS stream read from stdin.{n}
    /// Each measurement raises the trigger and waits for a packet
    /// with the watched PID, or gives up after the timeout.
    #[clap(name = "watch")]
    Watch {
        /// PID that ends a measurement, decimal or 0x-prefixed hex (default: 0x0404).
        #[clap(short, long, value_parser = maybe_hex::<u16>)]
        pid: Option<u16>,

        /// Timeout per measurement in seconds (default: 20).
        #[clap(short, long, value_name = "seconds")]
        timeout: Option<f64>,

        /// Pause between measurements in seconds (default: 1).
        #[clap(long, value_name = "seconds")]
        pause: Option<f64>,

        /// Seconds to wait before the first measurement (default: 10).
        #[clap(short, long, value_name = "seconds")]
        warmup: Option<f64>,

        /// Stop after this many measurements.{n}
        /// 0 means unlimited.
        #[clap(short = 'n', long)]
        count: Option<u64>,

        /// Bytes per read from stdin (default: 12032, 64 packets).
        #[clap(long, value_name = "bytes")]
        read_chunk: Option<usize>,
    },
}

impl Commands {
    pub fn sender_section(&self) -> Option<SenderSection> {
        match self {
            Commands::Send {
                target,
                interval,
                count,
                duration,
            } => Some(SenderSection {
                target: target.clone(),
                interval_ms: *interval,
                count: *count,
                duration_secs: *duration,
            }),
            _ => None,
        }
    }

    pub fn receiver_section(&self) -> Option<ReceiverSection> {
        match self {
            Commands::Recv {
                listen,
                warmup,
                pid,
                count,
                recv_buffer,
                poll_interval,
            } => Some(ReceiverSection {
                listen: listen.clone(),
                warmup_secs: *warmup,
                target_pid: *pid,
                recv_buffer: *recv_buffer,
                poll_interval_ms: *poll_interval,
                count: *count,
            }),
            _ => None,
        }
    }

    pub fn watch_section(&self) -> Option<WatchSection> {
        match self {
            Commands::Watch {
                pid,
                timeout,
                pause,
                warmup,
                count,
                read_chunk,
            } => Some(WatchSection {
                target_pid: *pid,
                timeout_secs: *timeout,
                pause_secs: *pause,
                warmup_secs: *warmup,
                read_chunk: *read_chunk,
                count: *count,
            }),
            _ => None,
        }
    }
}
