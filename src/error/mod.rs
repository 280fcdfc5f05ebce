//! Error handling for driver operations.
//!
//! This module provides:
//! - A single crate-wide error type, [`DriverError`], wrapping per-area kinds
//!   (transport, connection, cursor, protocol, configuration)
//! - Structured server error extraction from replies with `ok: 0`
//!
//! # Example
//!
//! ```rust
//! use mongowire::error::{CursorError, DriverError, Result};
//!
//! fn drained() -> Result<()> {
//!     Err(CursorError::Drained.into())
//! }
//!
//! assert!(drained().unwrap_err().is_cursor_drained());
//! ```

pub mod kinds;
pub mod server;

// Re-export commonly used types
pub use kinds::{
    ConfigError, ConnectionError, CursorError, DriverError, ProtocolError, Result, TransportError,
};
pub use server::{ServerError, check_reply, is_ok};
