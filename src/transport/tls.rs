use std::fmt;
use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;

use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};
use tracing::{debug, info};

use super::{ReadOutcome, ReceiveBuffer, Transport, read_once};
use crate::error::{Result, TransportError};

/// Build a TLS client configuration trusting the CA certificates in `ca_pem`.
pub fn client_config(ca_pem: &[u8]) -> Result<Arc<ClientConfig>> {
    let certificates = CertificateDer::pem_slice_iter(ca_pem)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| TransportError::TlsConfig(format!("failed to parse certificates: {e}")))?;
    if certificates.is_empty() {
        return Err(TransportError::TlsConfig("no CA certificates found".to_string()).into());
    }

    let mut roots = RootCertStore::empty();
    for certificate in certificates {
        roots.add(certificate).map_err(|e| {
            TransportError::TlsConfig(format!("failed to add CA certificate: {e}"))
        })?;
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| TransportError::TlsConfig(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(Arc::new(config))
}

/// TLS client stream over TCP.
pub struct TlsStream {
    stream: Option<StreamOwned<ClientConnection, TcpStream>>,
    peer: SocketAddr,
}

impl TlsStream {
    /// Run the client handshake to completion over `tcp`.
    pub fn handshake(tcp: TcpStream, host: &str, config: Arc<ClientConfig>) -> Result<Self> {
        let peer = tcp
            .peer_addr()
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        let server_name = ServerName::try_from(host.to_owned())
            .map_err(|e| TransportError::HandshakeFailed(format!("invalid server name: {e}")))?;
        let connection = ClientConnection::new(config, server_name)
            .map_err(|e| TransportError::HandshakeFailed(e.to_string()))?;

        let mut stream = StreamOwned::new(connection, tcp);
        while stream.conn.is_handshaking() {
            stream
                .conn
                .complete_io(&mut stream.sock)
                .map_err(|e| TransportError::HandshakeFailed(e.to_string()))?;
        }
        debug!("TLS handshake with {} complete", peer);

        Ok(Self {
            stream: Some(stream),
            peer,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    fn stream_mut(&mut self) -> Result<&mut StreamOwned<ClientConnection, TcpStream>> {
        self.stream
            .as_mut()
            .ok_or_else(|| TransportError::ClientNotInitialized.into())
    }
}

impl Transport for TlsStream {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream_mut()?;
        stream
            .write_all(data)
            .and_then(|()| stream.flush())
            .map_err(|e| TransportError::SendFailed(e.to_string()).into())
    }

    fn receive(&mut self, buffer: &mut ReceiveBuffer) -> Result<usize> {
        let stream = self.stream_mut()?;
        let outcome = match read_once(stream, buffer) {
            // Peer dropped TCP without close_notify.
            ReadOutcome::Failed(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                ReadOutcome::PeerClosed
            }
            outcome => outcome,
        };

        match outcome {
            ReadOutcome::Data(n) => {
                buffer.set_len(n);
                Ok(n)
            }
            ReadOutcome::PeerClosed => {
                info!("TLS connection to {} closed by peer", self.peer);
                buffer.set_len(0);
                self.close()?;
                Ok(0)
            }
            ReadOutcome::Failed(e) => {
                buffer.set_len(0);
                Err(TransportError::ReadFailed(e.to_string()).into())
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };

        debug!("Closing TLS connection to {}", self.peer);
        stream.conn.send_close_notify();
        // Best effort: the peer may already be gone.
        let _ = stream.conn.complete_io(&mut stream.sock);

        match stream.sock.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(TransportError::CloseFailed(e.to_string()).into()),
        }
    }
}

impl fmt::Debug for TlsStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsStream")
            .field("peer", &self.peer)
            .field("connected", &self.stream.is_some())
            .finish()
    }
}
