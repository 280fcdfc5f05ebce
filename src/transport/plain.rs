use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};

use tracing::{debug, info};

use super::{ReadOutcome, ReceiveBuffer, Transport, read_once};
use crate::error::{Result, TransportError};

/// Plaintext TCP stream.
#[derive(Debug)]
pub struct PlainStream {
    stream: Option<TcpStream>,
    peer: SocketAddr,
}

impl PlainStream {
    pub fn new(stream: TcpStream) -> Result<Self> {
        let peer = stream
            .peer_addr()
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        stream
            .set_nodelay(true)
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        Ok(Self {
            stream: Some(stream),
            peer,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    fn stream_mut(&mut self) -> Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| TransportError::ClientNotInitialized.into())
    }
}

impl Transport for PlainStream {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream_mut()?;
        stream
            .write_all(data)
            .and_then(|()| stream.flush())
            .map_err(|e| TransportError::SendFailed(e.to_string()).into())
    }

    fn receive(&mut self, buffer: &mut ReceiveBuffer) -> Result<usize> {
        let stream = self.stream_mut()?;
        match read_once(stream, buffer) {
            ReadOutcome::Data(n) => {
                buffer.set_len(n);
                Ok(n)
            }
            ReadOutcome::PeerClosed => {
                info!("Connection to {} closed by peer", self.peer);
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
        let Some(stream) = self.stream.take() else {
            return Ok(());
        };

        debug!("Closing connection to {}", self.peer);
        match stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            // Already torn down by the peer.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(TransportError::CloseFailed(e.to_string()).into()),
        }
    }
}
