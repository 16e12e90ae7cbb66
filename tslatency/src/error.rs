use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tslatency_protocol::ProtocolError;

/// Errors surfaced by the tslatency commands.
#[derive(Error, Debug)]
pub enum LatencyError {
    #[error("Failed to bind UDP socket on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to send datagram to {addr}: {source}")]
    Send {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to receive datagram: {0}")]
    Receive(#[source] io::Error),

    #[error("Failed to read input stream: {0}")]
    Input(#[source] io::Error),

    #[error("Failed to write report: {0}")]
    Output(#[source] io::Error),

    #[error("Invalid address {0:?}")]
    InvalidAddress(String),

    #[error("Failed to read config file {path:?}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config file {path:?}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid config value: {0}")]
    ConfigValue(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Failed to install interrupt handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}
