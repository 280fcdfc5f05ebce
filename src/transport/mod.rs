//! Byte-stream transport to a server
//!
//! This module provides:
//! - The [`Transport`] capability shared by every stream variant
//! - [`MongoSocket`], the closed set of variants (plaintext TCP or TLS),
//!   chosen once when connecting
//! - [`ReceiveBuffer`], the caller-owned buffer `receive` fills
//!
//! The transport is a blocking primitive. Callers that run on an async
//! runtime offload it (see `connection::MongoConnection`).

mod plain;
mod tls;

use std::io::{self, Read};
use std::net::{Ipv4Addr, SocketAddr, TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rustls::ClientConfig;
use tracing::debug;

use crate::error::{Result, TransportError};

pub use plain::PlainStream;
pub use tls::{TlsStream, client_config};

/// Bytes read by a single receive at most.
pub const DEFAULT_RECEIVE_CAPACITY: usize = u16::MAX as usize;

/// Uniform byte-stream operations over any stream variant.
pub trait Transport: Send {
    /// Write the whole buffer and flush.
    fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Read up to `buffer.capacity()` bytes, returning how many were read.
    ///
    /// `Ok(0)` means the peer ended the connection (orderly shutdown or
    /// reset) and the endpoint is now closed.
    fn receive(&mut self, buffer: &mut ReceiveBuffer) -> Result<usize>;

    /// Whether the stream is still open on both ends as far as we know.
    fn is_connected(&self) -> bool;

    /// Close the stream. The endpoint counts as closed afterwards even if
    /// this returns an error.
    fn close(&mut self) -> Result<()>;
}

/// Transport options
#[derive(Debug, Clone, Default)]
pub struct TransportConfig {
    /// Wrap the stream in TLS
    pub tls: bool,

    /// PEM bundle of trusted CA certificates, required for TLS
    pub tls_ca_file: Option<PathBuf>,

    /// TCP connect timeout per resolved address
    pub connect_timeout: Option<Duration>,

    /// Socket read timeout
    pub read_timeout: Option<Duration>,
}

/// A live connection, plaintext or TLS.
#[derive(Debug)]
pub enum MongoSocket {
    Plain(PlainStream),
    Tls(TlsStream),
}

impl MongoSocket {
    /// Resolve, connect and (for TLS) handshake.
    ///
    /// Either a ready socket is returned or nothing is left open.
    pub fn connect(host: &str, port: u16, config: &TransportConfig) -> Result<Self> {
        let tls_config = if config.tls {
            Some(load_tls_config(config)?)
        } else {
            None
        };

        let tcp = connect_tcp(host, port, config)?;
        match tls_config {
            Some(tls_config) => Ok(MongoSocket::Tls(TlsStream::handshake(tcp, host, tls_config)?)),
            None => Ok(MongoSocket::Plain(PlainStream::new(tcp)?)),
        }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, MongoSocket::Tls(_))
    }

    pub fn peer_addr(&self) -> SocketAddr {
        match self {
            MongoSocket::Plain(stream) => stream.peer_addr(),
            MongoSocket::Tls(stream) => stream.peer_addr(),
        }
    }
}

impl Transport for MongoSocket {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        match self {
            MongoSocket::Plain(stream) => stream.send(data),
            MongoSocket::Tls(stream) => stream.send(data),
        }
    }

    fn receive(&mut self, buffer: &mut ReceiveBuffer) -> Result<usize> {
        match self {
            MongoSocket::Plain(stream) => stream.receive(buffer),
            MongoSocket::Tls(stream) => stream.receive(buffer),
        }
    }

    fn is_connected(&self) -> bool {
        match self {
            MongoSocket::Plain(stream) => stream.is_connected(),
            MongoSocket::Tls(stream) => stream.is_connected(),
        }
    }

    fn close(&mut self) -> Result<()> {
        match self {
            MongoSocket::Plain(stream) => stream.close(),
            MongoSocket::Tls(stream) => stream.close(),
        }
    }
}

/// Caller-owned receive buffer with a fixed capacity and a used length.
#[derive(Debug, Clone)]
pub struct ReceiveBuffer {
    data: Box<[u8]>,
    used: usize,
}

impl ReceiveBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity].into_boxed_slice(),
            used: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes filled by the last receive.
    pub fn len(&self) -> usize {
        self.used
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.used]
    }

    fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn set_len(&mut self, used: usize) {
        self.used = used.min(self.data.len());
    }
}

impl Default for ReceiveBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_RECEIVE_CAPACITY)
    }
}

/// What a single read from the stream amounted to.
#[derive(Debug)]
pub(crate) enum ReadOutcome {
    Data(usize),
    /// Orderly shutdown (EOF) or reset by the peer.
    PeerClosed,
    Failed(io::Error),
}

/// Read once, retrying on `Interrupted`, and classify the result.
pub(crate) fn read_once<R: Read>(reader: &mut R, buffer: &mut ReceiveBuffer) -> ReadOutcome {
    loop {
        match reader.read(buffer.spare_mut()) {
            Ok(0) => return ReadOutcome::PeerClosed,
            Ok(n) => return ReadOutcome::Data(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::ConnectionReset => {
                return ReadOutcome::PeerClosed;
            }
            Err(e) => return ReadOutcome::Failed(e),
        }
    }
}

/// Resolve `host:port`. The literal host `localhost` maps straight to the
/// IPv4 loopback address.
pub fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>> {
    if host.eq_ignore_ascii_case("localhost") {
        return Ok(vec![SocketAddr::from((Ipv4Addr::LOCALHOST, port))]);
    }

    let addresses: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| TransportError::InvalidAddress(format!("{host}:{port}: {e}")))?
        .collect();

    if addresses.is_empty() {
        return Err(TransportError::InvalidAddress(format!("{host}:{port}: no addresses")).into());
    }
    Ok(addresses)
}

fn load_tls_config(config: &TransportConfig) -> Result<Arc<ClientConfig>> {
    let ca_file = config
        .tls_ca_file
        .as_ref()
        .ok_or_else(|| TransportError::TlsConfig("CA certificate file required".to_string()))?;
    let pem = std::fs::read(ca_file).map_err(|e| {
        TransportError::TlsConfig(format!("cannot read {}: {e}", ca_file.display()))
    })?;
    client_config(&pem)
}

fn connect_tcp(host: &str, port: u16, config: &TransportConfig) -> Result<TcpStream> {
    let mut last_error = None;

    for address in resolve(host, port)? {
        let attempt = match config.connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(&address, timeout),
            None => TcpStream::connect(address),
        };

        match attempt {
            Ok(stream) => {
                stream
                    .set_read_timeout(config.read_timeout)
                    .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
                debug!("Connected to {} ({})", address, if config.tls { "tls" } else { "plain" });
                return Ok(stream);
            }
            Err(e) => {
                debug!("Connect to {} failed: {}", address, e);
                last_error = Some(e);
            }
        }
    }

    let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
    Err(TransportError::ConnectFailed(format!("{host}:{port}: {reason}")).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct FailingReader(io::ErrorKind);

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::from(self.0))
        }
    }

    #[test]
    fn test_resolve_localhost_shortcut() {
        let addresses = resolve("LocalHost", 27017).unwrap();
        assert_eq!(addresses, vec![SocketAddr::from((Ipv4Addr::LOCALHOST, 27017))]);
    }

    #[test]
    fn test_resolve_ip_literal() {
        let addresses = resolve("127.0.0.1", 1).unwrap();
        assert_eq!(addresses[0].port(), 1);
    }

    #[test]
    fn test_read_once_classification() {
        let mut buffer = ReceiveBuffer::with_capacity(8);

        let mut data = Cursor::new(vec![1u8, 2, 3]);
        assert!(matches!(read_once(&mut data, &mut buffer), ReadOutcome::Data(3)));

        let mut empty = Cursor::new(Vec::<u8>::new());
        assert!(matches!(read_once(&mut empty, &mut buffer), ReadOutcome::PeerClosed));

        let mut reset = FailingReader(io::ErrorKind::ConnectionReset);
        assert!(matches!(read_once(&mut reset, &mut buffer), ReadOutcome::PeerClosed));

        let mut broken = FailingReader(io::ErrorKind::BrokenPipe);
        assert!(matches!(read_once(&mut broken, &mut buffer), ReadOutcome::Failed(_)));
    }

    #[test]
    fn test_receive_buffer_len_clamped() {
        let mut buffer = ReceiveBuffer::with_capacity(4);
        buffer.set_len(10);
        assert_eq!(buffer.len(), 4);
        assert_eq!(ReceiveBuffer::default().capacity(), DEFAULT_RECEIVE_CAPACITY);
    }

    #[test]
    fn test_connect_refused_fails_construction() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = MongoSocket::connect("127.0.0.1", port, &TransportConfig::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_tls_requires_ca_file() {
        let config = TransportConfig {
            tls: true,
            ..TransportConfig::default()
        };

        let err = MongoSocket::connect("127.0.0.1", 27017, &config).unwrap_err();
        assert!(err.to_string().contains("CA certificate file required"));
    }
}
