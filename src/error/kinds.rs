use std::{fmt, io};

use crate::error::server::ServerError;

/// Crate-wide `Result` type using [`DriverError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, DriverError>;

/// Top-level error type for driver operations.
///
/// This type wraps more specific error kinds and provides a single
/// error type that can be used throughout the crate.
#[derive(Debug)]
pub enum DriverError {
    /// Byte-stream transport errors.
    Transport(TransportError),

    /// Command round-trip errors above the transport.
    Connection(ConnectionError),

    /// Cursor protocol-state errors.
    Cursor(CursorError),

    /// Wire message or reply shape errors.
    Protocol(ProtocolError),

    /// The server answered with `ok: 0`.
    Server(ServerError),

    /// Configuration errors.
    Config(ConfigError),

    /// I/O errors.
    Io(io::Error),

    /// Generic error with a free-form message.
    Generic(String),
}

/// Transport-specific errors.
#[derive(Debug)]
pub enum TransportError {
    /// Host/port could not be resolved to a socket address.
    InvalidAddress(String),

    /// TCP connect failed.
    ConnectFailed(String),

    /// TLS client configuration could not be built.
    TlsConfig(String),

    /// TLS handshake failed.
    HandshakeFailed(String),

    /// Writing to the stream failed.
    SendFailed(String),

    /// Reading from the stream failed.
    ReadFailed(String),

    /// Closing the stream failed.
    CloseFailed(String),

    /// The endpoint has no live stream for its variant.
    ClientNotInitialized,
}

/// Connection-specific errors.
#[derive(Debug)]
pub enum ConnectionError {
    /// The peer closed the connection before a full reply arrived.
    Closed,

    /// The connection's socket lock was poisoned by a panicking round trip.
    Poisoned,

    /// The blocking I/O worker did not complete.
    WorkerFailed(String),

    /// A reply answered a different request.
    ResponseMismatch { expected: i32, found: i32 },
}

/// Cursor protocol-state errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorError {
    /// The server-side cursor is exhausted or closed.
    Drained,
}

/// Wire message and reply decoding errors.
#[derive(Debug)]
pub enum ProtocolError {
    /// A command could not be encoded.
    Encode(String),

    /// A reply could not be decoded into the expected shape.
    Decode(String),

    /// A wire frame violated the message format.
    MalformedMessage(String),
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::Transport(e) => write!(f, "Transport error: {e}"),
            DriverError::Connection(e) => write!(f, "Connection error: {e}"),
            DriverError::Cursor(e) => write!(f, "{e}"),
            DriverError::Protocol(e) => write!(f, "Protocol error: {e}"),
            DriverError::Server(e) => write!(f, "{e}"),
            DriverError::Config(e) => write!(f, "Configuration error: {e}"),
            DriverError::Io(e) => write!(f, "I/O error: {e}"),
            DriverError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::InvalidAddress(addr) => write!(f, "Invalid address: {addr}"),
            TransportError::ConnectFailed(msg) => write!(f, "Failed to connect: {msg}"),
            TransportError::TlsConfig(msg) => write!(f, "Invalid TLS configuration: {msg}"),
            TransportError::HandshakeFailed(msg) => write!(f, "TLS handshake failed: {msg}"),
            TransportError::SendFailed(msg) => write!(f, "Send failed: {msg}"),
            TransportError::ReadFailed(msg) => write!(f, "Read failed: {msg}"),
            TransportError::CloseFailed(msg) => write!(f, "Close failed: {msg}"),
            TransportError::ClientNotInitialized => write!(f, "Client not initialized"),
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::Closed => write!(f, "Connection closed by peer"),
            ConnectionError::Poisoned => write!(f, "Connection lock poisoned"),
            ConnectionError::WorkerFailed(msg) => write!(f, "I/O worker failed: {msg}"),
            ConnectionError::ResponseMismatch { expected, found } => {
                write!(f, "Reply to request {found}, expected {expected}")
            }
        }
    }
}

impl fmt::Display for CursorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CursorError::Drained => write!(f, "Cannot get more: cursor drained"),
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Encode(msg) => write!(f, "Failed to encode command: {msg}"),
            ProtocolError::Decode(msg) => write!(f, "Failed to decode reply: {msg}"),
            ProtocolError::MalformedMessage(msg) => write!(f, "Malformed message: {msg}"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
        }
    }
}

impl std::error::Error for DriverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DriverError::Io(e) => Some(e),
            _ => None,
        }
    }
}
impl std::error::Error for TransportError {}
impl std::error::Error for ConnectionError {}
impl std::error::Error for CursorError {}
impl std::error::Error for ProtocolError {}
impl std::error::Error for ConfigError {}

/* ========================= Conversions to DriverError ========================= */

impl From<io::Error> for DriverError {
    fn from(err: io::Error) -> Self {
        DriverError::Io(err)
    }
}

impl From<TransportError> for DriverError {
    fn from(err: TransportError) -> Self {
        DriverError::Transport(err)
    }
}

impl From<ConnectionError> for DriverError {
    fn from(err: ConnectionError) -> Self {
        DriverError::Connection(err)
    }
}

impl From<CursorError> for DriverError {
    fn from(err: CursorError) -> Self {
        DriverError::Cursor(err)
    }
}

impl From<ProtocolError> for DriverError {
    fn from(err: ProtocolError) -> Self {
        DriverError::Protocol(err)
    }
}

impl From<ServerError> for DriverError {
    fn from(err: ServerError) -> Self {
        DriverError::Server(err)
    }
}

impl From<ConfigError> for DriverError {
    fn from(err: ConfigError) -> Self {
        DriverError::Config(err)
    }
}

impl From<bson::ser::Error> for DriverError {
    fn from(err: bson::ser::Error) -> Self {
        DriverError::Protocol(ProtocolError::Encode(err.to_string()))
    }
}

impl From<bson::de::Error> for DriverError {
    fn from(err: bson::de::Error) -> Self {
        DriverError::Protocol(ProtocolError::Decode(err.to_string()))
    }
}

impl From<String> for DriverError {
    fn from(msg: String) -> Self {
        DriverError::Generic(msg)
    }
}

impl From<&str> for DriverError {
    fn from(msg: &str) -> Self {
        DriverError::Generic(msg.to_owned())
    }
}

impl DriverError {
    /// True when this is the local "cursor drained" condition.
    pub fn is_cursor_drained(&self) -> bool {
        matches!(self, DriverError::Cursor(CursorError::Drained))
    }
}
