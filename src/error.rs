//! Error types for the simulator.

use std::path::PathBuf;

use crate::wire::WireError;

/// All fatal errors a simulation run can produce.
///
/// Per-record feed anomalies (unknown order ids, implausible prices) are
/// absorbed with a warning and a counter bump instead; only conditions that
/// make continuing meaningless surface here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("failed to open {path}: {source}")]
    InputOpen {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to create {path}: {source}")]
    OutputCreate {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("wire format error: {0}")]
    Wire(#[from] WireError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("accounting invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, Error>;
