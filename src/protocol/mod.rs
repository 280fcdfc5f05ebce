//! Wire-level value types shared by the connection and cursor layers
//!
//! This module contains:
//! - [`Namespace`]: database + collection identifier
//! - [`SessionId`] and [`Transaction`]: correlation passed through on commands
//! - [`ReadConcern`]: per-read consistency override
//! - Typed command documents and reply shapes (`commands`)
//! - OP_MSG framing (`message`)

pub mod commands;
pub mod message;

use std::fmt;
use std::str::FromStr;

use bson::{Bson, Document, doc};
use serde::{Deserialize, Serialize};

use crate::error::{DriverError, ProtocolError, Result};

pub use commands::{
    CursorReply, FindCommand, GetMoreCommand, GetMoreReply, KillCursorsCommand, ReplyCursor,
};
pub use message::OpMsg;

/// Fully-qualified collection identifier (`database.collection`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    database: String,
    collection: String,
}

impl Namespace {
    /// Create a namespace from its parts.
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }

    /// Database name
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Collection name
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Namespace administrative commands run against (`<db>.$cmd`).
    pub fn command_namespace(&self) -> Namespace {
        Namespace::new(self.database.clone(), "$cmd")
    }

    /// `database.collection`
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.database, self.collection)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

impl FromStr for Namespace {
    type Err = DriverError;

    /// Parse `db.coll`. Collection names may themselves contain dots.
    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('.') {
            Some((db, coll)) if !db.is_empty() && !coll.is_empty() => Ok(Namespace::new(db, coll)),
            _ => Err(ProtocolError::Decode(format!("invalid namespace '{s}'")).into()),
        }
    }
}

/// Logical session identifier (the `lsid` document sent with commands).
#[derive(Debug, Clone, PartialEq)]
pub struct SessionId(Document);

impl SessionId {
    pub fn new(lsid: Document) -> Self {
        Self(lsid)
    }

    pub fn as_document(&self) -> &Document {
        &self.0
    }
}

/// Transaction correlation attached to every command inside a transaction.
///
/// The driver core never interprets these values, it only copies them onto
/// outgoing commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transaction {
    number: i64,
    starting: bool,
}

impl Transaction {
    pub fn new(number: i64) -> Self {
        Self {
            number,
            starting: false,
        }
    }

    /// Mark the first command of the transaction.
    pub fn starting(mut self) -> Self {
        self.starting = true;
        self
    }

    pub fn number(&self) -> i64 {
        self.number
    }

    /// Append `txnNumber`, `autocommit` and (first command only)
    /// `startTransaction` to a command body.
    pub fn apply_to(&self, command: &mut Document) {
        command.insert("txnNumber", Bson::Int64(self.number));
        command.insert("autocommit", false);
        if self.starting {
            command.insert("startTransaction", true);
        }
    }
}

/// Read concern level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReadConcernLevel {
    Local,
    Majority,
    Linearizable,
    Available,
    Snapshot,
}

/// Read concern override sent with reads.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadConcern {
    pub level: ReadConcernLevel,
}

impl ReadConcern {
    pub fn new(level: ReadConcernLevel) -> Self {
        Self { level }
    }

    pub fn majority() -> Self {
        Self::new(ReadConcernLevel::Majority)
    }

    pub fn to_document(&self) -> Document {
        let level = match self.level {
            ReadConcernLevel::Local => "local",
            ReadConcernLevel::Majority => "majority",
            ReadConcernLevel::Linearizable => "linearizable",
            ReadConcernLevel::Available => "available",
            ReadConcernLevel::Snapshot => "snapshot",
        };
        doc! { "level": level }
    }
}
