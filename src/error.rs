use std::fmt::Display;
use std::str::Utf8Error;

use packed_struct::PackingError;

/// When things go awry
#[derive(Debug)]
pub enum YakDbError {
    /// A caller-supplied argument was rejected before anything was sent
    Parameter(String),
    /// The connection is not in the right state (socket role, endpoint count)
    /// for the requested operation
    ConnectionState(String),
    /// The server reply violated the wire protocol
    Protocol(String),
    /// Surfaced verbatim from the underlying transport
    Transport(String),
    IoError(std::io::Error),
    /// Failed to pack or unpack an entity or a wire structure
    PackingError(String),
    Utf8Error(Utf8Error),
}

impl From<std::io::Error> for YakDbError {
    fn from(error: std::io::Error) -> Self {
        YakDbError::IoError(error)
    }
}

impl From<PackingError> for YakDbError {
    fn from(error: PackingError) -> Self {
        YakDbError::PackingError(error.to_string())
    }
}

impl From<serde_json::Error> for YakDbError {
    fn from(error: serde_json::Error) -> Self {
        YakDbError::PackingError(error.to_string())
    }
}

impl From<Utf8Error> for YakDbError {
    fn from(error: Utf8Error) -> Self {
        YakDbError::Utf8Error(error)
    }
}

impl Display for YakDbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            YakDbError::Parameter(msg) => write!(f, "Parameter error: {msg}"),
            YakDbError::ConnectionState(msg) => write!(f, "Connection state error: {msg}"),
            YakDbError::Protocol(msg) => write!(f, "Protocol error: {msg}"),
            YakDbError::Transport(msg) => write!(f, "Transport error: {msg}"),
            YakDbError::IoError(err) => write!(f, "IO error: {err}"),
            YakDbError::PackingError(msg) => write!(f, "Packing error: {msg}"),
            YakDbError::Utf8Error(err) => write!(f, "UTF-8 error: {err}"),
        }
    }
}

impl std::error::Error for YakDbError {}

impl From<YakDbError> for std::io::Error {
    fn from(error: YakDbError) -> Self {
        match error {
            YakDbError::IoError(err) => err,
            _ => std::io::Error::other(format!("{error}")),
        }
    }
}
