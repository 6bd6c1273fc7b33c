//! Error types for pingboard.
//!
//! Uses `thiserror` for ergonomic error definitions.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the ICMP probe engine itself.
///
/// Startup variants are fatal; `Receive` is routed to the engine's error
/// sink and never aborts a probe.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Raw socket error: {0}")]
    RawSocket(String),

    #[error("Unable to bind listener on {address}: {reason}")]
    Bind { address: String, reason: String },

    #[error("No usable interface addresses found")]
    NoInterfaces,

    #[error("Unable to receive on {address}: {reason}")]
    Receive { address: String, reason: String },

    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Terminal outcome of a probe that did not produce an echo reply.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("no response")]
    NoResponse,

    #[error("unable to send echo request: {0}")]
    SendFailed(String),

    #[error("probe engine stopped")]
    EngineStopped,
}

/// Result type alias for probes.
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Name resolution failure for a single hostname.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("failed to resolve hostname '{host}': {reason}")]
    Lookup { host: String, reason: String },

    #[error("no IP addresses found for hostname '{0}'")]
    NoAddresses(String),
}

/// Errors on the duplex message connection.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("message exceeds {0} bytes")]
    LineTooLong(usize),
}

/// Failure of one worker inside a session phase.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("could not write message: {0}")]
    Write(#[source] ConnectionError),

    #[error("worker panicked: {0}")]
    Panicked(String),
}

/// Errors that end a scan session.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("could not read token: {0}")]
    ReadHandshake(#[source] ConnectionError),

    #[error("could not read token: connection closed before handshake")]
    HandshakeClosed,

    #[error("could not read token: {0}")]
    InvalidHandshake(#[source] serde_json::Error),

    #[error("could not authenticate: invalid token")]
    InvalidToken,

    #[error("could not write schema message: {0}")]
    WriteSchema(#[source] ConnectionError),

    #[error("could not resolve hosts: {0}")]
    Resolve(#[source] WorkerError),

    #[error("could not ping hosts: {0}")]
    Ping(#[source] WorkerError),

    #[error("could not write close message: {0}")]
    WriteClose(#[source] ConnectionError),
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not determine configuration directory")]
    DirectoryNotFound,

    #[error("failed to read {path}: {reason}")]
    ReadFailed { path: PathBuf, reason: String },

    #[error("invalid configuration format: {0}")]
    InvalidFormat(String),

    #[error("invalid setting: {0}")]
    InvalidValue(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors surfaced by CLI subcommands.
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Target(#[from] crate::types::TargetError),

    #[error(transparent)]
    Schema(#[from] crate::types::SchemaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for CLI operations.
pub type CliResult<T> = Result<T, CliError>;
