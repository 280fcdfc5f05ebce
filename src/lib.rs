//! mongowire library
//!
//! Core pieces of a MongoDB wire-protocol driver: a server-side cursor that
//! pages through query results with `getMore` and releases them with
//! `killCursors`, and the plaintext/TLS byte-stream transport underneath it.
//!
//! # Modules
//!
//! - `cli`: Command-line interface and argument parsing
//! - `config`: Configuration management
//! - `connection`: Command execution over a server connection
//! - `cursor`: Cursor retrieval, close and streaming
//! - `error`: Error types and handling
//! - `protocol`: Command documents, reply shapes and OP_MSG framing
//! - `transport`: Plaintext and TLS byte streams
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bson::doc;
//! use mongowire::{CommandExecutor, MongoConnection, MongoCursor, Namespace, TransportConfig};
//! use mongowire::protocol::FindCommand;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connection = Arc::new(
//!         MongoConnection::connect("localhost", 27017, TransportConfig::default()).await?,
//!     );
//!     let namespace: Namespace = "shop.orders".parse()?;
//!
//!     let find = FindCommand::new(namespace.collection(), doc! { "status": "open" });
//!     let reply = connection
//!         .execute(find.to_document()?, &namespace, None, None)
//!         .await?;
//!
//!     let mut cursor = MongoCursor::from_reply(reply, namespace, connection, None, None, None)?;
//!     while !cursor.is_drained() || cursor.has_pending_batch() {
//!         for document in cursor.get_more(100).await? {
//!             println!("{document}");
//!         }
//!     }
//!     cursor.close().await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod connection;
pub mod cursor;
pub mod error;
pub mod protocol;
pub mod transport;

// Re-export commonly used types
pub use config::Config;
pub use connection::{CommandExecutor, MongoConnection};
pub use cursor::{CloseSignal, CursorState, MongoCursor};
pub use error::{DriverError, Result};
pub use protocol::Namespace;
pub use transport::{MongoSocket, Transport, TransportConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
///
/// # Returns
/// * `&str` - Version string
pub fn version() -> &'static str {
    VERSION
}
