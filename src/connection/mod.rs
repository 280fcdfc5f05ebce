//! Command execution over a server connection
//!
//! This module provides:
//! - [`CommandExecutor`], the interface cursors run their sub-commands through
//! - [`MongoConnection`], an executor that frames commands as OP_MSG and
//!   drives them through a blocking [`MongoSocket`] on tokio's blocking pool
//!
//! One round trip is in flight per connection at a time.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bson::Document;
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::error::{ConnectionError, Result};
use crate::protocol::message::frame_length;
use crate::protocol::{Namespace, OpMsg, SessionId, Transaction};
use crate::transport::{MongoSocket, ReceiveBuffer, Transport, TransportConfig};

/// Executes command documents against a server.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `command` against `namespace`'s database and return the decoded
    /// reply body. Server-reported failures (`ok: 0`) are returned as replies;
    /// transport and framing failures are errors.
    async fn execute(
        &self,
        command: Document,
        namespace: &Namespace,
        transaction: Option<&Transaction>,
        session: Option<&SessionId>,
    ) -> Result<Document>;

    /// Runtime this executor's work and cleanup tasks run on.
    fn runtime(&self) -> Handle;
}

/// A single server connection.
pub struct MongoConnection {
    socket: Arc<Mutex<MongoSocket>>,
    runtime: Handle,
    next_request_id: AtomicI32,
    receive_capacity: usize,
    address: String,
}

impl MongoConnection {
    /// Connect to `host:port`, bound to the current runtime.
    ///
    /// # Arguments
    /// * `host` - Server host name or address
    /// * `port` - Server port
    /// * `config` - Plaintext/TLS selection and socket timeouts
    ///
    /// # Returns
    /// * `Result<Self>` - Ready connection or transport error
    pub async fn connect(host: &str, port: u16, config: TransportConfig) -> Result<Self> {
        let address = format!("{host}:{port}");
        let host = host.to_string();
        let socket = tokio::task::spawn_blocking(move || MongoSocket::connect(&host, port, &config))
            .await
            .map_err(|e| ConnectionError::WorkerFailed(e.to_string()))??;

        info!(
            "Connected to {} ({})",
            address,
            if socket.is_tls() { "tls" } else { "plain" }
        );
        Ok(Self::from_socket(socket, Handle::current(), address))
    }

    /// Wrap an already connected socket.
    pub fn from_socket(socket: MongoSocket, runtime: Handle, address: String) -> Self {
        Self {
            socket: Arc::new(Mutex::new(socket)),
            runtime,
            next_request_id: AtomicI32::new(1),
            receive_capacity: crate::transport::DEFAULT_RECEIVE_CAPACITY,
            address,
        }
    }

    /// Override the per-receive buffer capacity.
    pub fn with_receive_capacity(mut self, capacity: usize) -> Self {
        self.receive_capacity = capacity.max(1);
        self
    }

    /// Server address this connection was opened to.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Whether the underlying socket is still open.
    pub fn is_connected(&self) -> bool {
        self.socket
            .lock()
            .map(|socket| socket.is_connected())
            .unwrap_or(false)
    }

    /// Close the underlying socket.
    pub async fn close(&self) -> Result<()> {
        let socket = Arc::clone(&self.socket);
        tokio::task::spawn_blocking(move || {
            let mut socket = socket.lock().map_err(|_| ConnectionError::Poisoned)?;
            socket.close()
        })
        .await
        .map_err(|e| ConnectionError::WorkerFailed(e.to_string()))?
    }

    /// Add `$db`, session and transaction fields to a command body.
    fn build_body(
        mut command: Document,
        namespace: &Namespace,
        transaction: Option<&Transaction>,
        session: Option<&SessionId>,
    ) -> Document {
        command.insert("$db", namespace.database());
        if let Some(session) = session {
            command.insert("lsid", session.as_document().clone());
        }
        if let Some(transaction) = transaction {
            transaction.apply_to(&mut command);
        }
        command
    }
}

#[async_trait]
impl CommandExecutor for MongoConnection {
    async fn execute(
        &self,
        command: Document,
        namespace: &Namespace,
        transaction: Option<&Transaction>,
        session: Option<&SessionId>,
    ) -> Result<Document> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let name = command.keys().next().cloned().unwrap_or_default();
        let body = Self::build_body(command, namespace, transaction, session);
        let frame = OpMsg::request(request_id, body).encode()?;

        debug!(
            "Sending '{}' (request {}) to {} for {}",
            name, request_id, self.address, namespace
        );

        let socket = Arc::clone(&self.socket);
        let capacity = self.receive_capacity;
        let reply = tokio::task::spawn_blocking(move || {
            let mut socket = socket.lock().map_err(|_| ConnectionError::Poisoned)?;
            round_trip(&mut *socket, &frame, capacity)
        })
        .await
        .map_err(|e| ConnectionError::WorkerFailed(e.to_string()))??;

        let reply = OpMsg::decode(&reply)?;
        if reply.response_to != request_id {
            return Err(ConnectionError::ResponseMismatch {
                expected: request_id,
                found: reply.response_to,
            }
            .into());
        }

        debug!("Received reply to '{}' (request {})", name, request_id);
        Ok(reply.body)
    }

    fn runtime(&self) -> Handle {
        self.runtime.clone()
    }
}

/// Send one frame and read back exactly one reply frame.
fn round_trip<T: Transport + ?Sized>(
    transport: &mut T,
    frame: &[u8],
    capacity: usize,
) -> Result<Vec<u8>> {
    transport.send(frame)?;

    let mut buffer = ReceiveBuffer::with_capacity(capacity);
    let mut reply = Vec::new();
    loop {
        if let Some(length) = frame_length(&reply)? {
            if reply.len() >= length {
                reply.truncate(length);
                return Ok(reply);
            }
        }

        if transport.receive(&mut buffer)? == 0 {
            return Err(ConnectionError::Closed.into());
        }
        reply.extend_from_slice(buffer.as_slice());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DriverError;
    use crate::transport::PlainStream;
    use bson::doc;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread::{self, JoinHandle};

    /// Accepts one connection and answers each request with `reply(request)`.
    fn fake_server<F>(requests: usize, reply: F) -> (u16, JoinHandle<Vec<Document>>)
    where
        F: Fn(&Document) -> Document + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut seen = Vec::new();
            for _ in 0..requests {
                let request = read_frame(&mut socket);
                let mut response = OpMsg::request(request.request_id + 1000, reply(&request.body));
                response.response_to = request.request_id;
                socket.write_all(&response.encode().unwrap()).unwrap();
                seen.push(request.body);
            }
            seen
        });
        (port, handle)
    }

    fn read_frame(socket: &mut TcpStream) -> OpMsg {
        let mut prefix = [0u8; 4];
        socket.read_exact(&mut prefix).unwrap();
        let length = i32::from_le_bytes(prefix) as usize;
        let mut frame = prefix.to_vec();
        frame.resize(length, 0);
        socket.read_exact(&mut frame[4..]).unwrap();
        OpMsg::decode(&frame).unwrap()
    }

    #[tokio::test]
    async fn test_execute_round_trip() {
        let (port, server) = fake_server(1, |_| doc! { "ok": 1.0, "n": 3 });
        let connection = MongoConnection::connect("localhost", port, TransportConfig::default())
            .await
            .unwrap();

        let namespace = Namespace::new("shop", "orders");
        let session = SessionId::new(doc! { "id": "session-1" });
        let transaction = Transaction::new(4);
        let reply = connection
            .execute(
                doc! { "count": "orders" },
                &namespace,
                Some(&transaction),
                Some(&session),
            )
            .await
            .unwrap();
        assert_eq!(reply, doc! { "ok": 1.0, "n": 3 });

        let seen = server.join().unwrap();
        assert_eq!(seen[0].keys().next().map(String::as_str), Some("count"));
        assert_eq!(seen[0].get_str("$db").unwrap(), "shop");
        assert_eq!(seen[0].get_document("lsid").unwrap(), &doc! { "id": "session-1" });
        assert_eq!(seen[0].get_i64("txnNumber").unwrap(), 4);
    }

    #[tokio::test]
    async fn test_small_receive_capacity_reassembles_reply() {
        let (port, server) = fake_server(1, |_| {
            doc! { "ok": 1.0, "payload": "x".repeat(500) }
        });
        let connection = MongoConnection::connect("127.0.0.1", port, TransportConfig::default())
            .await
            .unwrap()
            .with_receive_capacity(7);

        let reply = connection
            .execute(doc! { "ping": 1 }, &Namespace::new("admin", "$cmd"), None, None)
            .await
            .unwrap();
        assert_eq!(reply.get_str("payload").unwrap().len(), 500);
        server.join().unwrap();
    }

    #[tokio::test]
    async fn test_peer_close_mid_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let _ = read_frame(&mut socket);
            socket.write_all(&100i32.to_le_bytes()).unwrap();
        });

        let connection = MongoConnection::connect("localhost", port, TransportConfig::default())
            .await
            .unwrap();
        let err = connection
            .execute(doc! { "ping": 1 }, &Namespace::new("admin", "$cmd"), None, None)
            .await
            .unwrap_err();
        server.join().unwrap();

        assert!(matches!(err, DriverError::Connection(ConnectionError::Closed)));
        assert!(!connection.is_connected());
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = MongoConnection::connect("localhost", port, TransportConfig::default()).await;
        assert!(matches!(result, Err(DriverError::Transport(_))));
    }

    #[tokio::test]
    async fn test_close() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let socket = MongoSocket::Plain(PlainStream::new(client).unwrap());
        let connection = MongoConnection::from_socket(socket, Handle::current(), "test".into());

        assert!(connection.is_connected());
        connection.close().await.unwrap();
        assert!(!connection.is_connected());
    }
}
