//! Typed command documents and reply shapes for the cursor sub-protocol
//!
//! Commands serialize with their command name as the first field, which the
//! server requires.

use bson::Document;
use serde::{Deserialize, Serialize};

use super::ReadConcern;
use crate::error::{ProtocolError, Result, check_reply};

/// Encode a command struct into a BSON document, preserving field order.
pub fn encode_command<C: Serialize>(command: &C) -> Result<Document> {
    Ok(bson::to_document(command)?)
}

/// `getMore` request for the next batch of an open cursor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GetMoreCommand {
    #[serde(rename = "getMore")]
    pub cursor_id: i64,

    pub collection: String,

    #[serde(rename = "batchSize")]
    pub batch_size: i32,

    #[serde(rename = "maxTimeMS", skip_serializing_if = "Option::is_none")]
    pub max_time_ms: Option<i64>,

    #[serde(rename = "readConcern", skip_serializing_if = "Option::is_none")]
    pub read_concern: Option<ReadConcern>,
}

impl GetMoreCommand {
    pub fn new(cursor_id: i64, batch_size: i32, collection: impl Into<String>) -> Self {
        Self {
            cursor_id,
            collection: collection.into(),
            batch_size,
            max_time_ms: None,
            read_concern: None,
        }
    }

    pub fn to_document(&self) -> Result<Document> {
        encode_command(self)
    }
}

/// `killCursors` request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KillCursorsCommand {
    #[serde(rename = "killCursors")]
    pub collection: String,

    pub cursors: Vec<i64>,
}

impl KillCursorsCommand {
    pub fn new(cursors: Vec<i64>, collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            cursors,
        }
    }

    pub fn to_document(&self) -> Result<Document> {
        encode_command(self)
    }
}

/// `find` request that opens a cursor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FindCommand {
    pub find: String,

    pub filter: Document,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<Document>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub projection: Option<Document>,

    #[serde(rename = "batchSize", skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,

    #[serde(rename = "maxTimeMS", skip_serializing_if = "Option::is_none")]
    pub max_time_ms: Option<i64>,

    #[serde(rename = "readConcern", skip_serializing_if = "Option::is_none")]
    pub read_concern: Option<ReadConcern>,
}

impl FindCommand {
    pub fn new(collection: impl Into<String>, filter: Document) -> Self {
        Self {
            find: collection.into(),
            filter,
            sort: None,
            projection: None,
            batch_size: None,
            limit: None,
            max_time_ms: None,
            read_concern: None,
        }
    }

    pub fn to_document(&self) -> Result<Document> {
        encode_command(self)
    }
}

/// The `cursor` sub-document of a cursor-bearing reply.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReplyCursor {
    pub id: i64,

    #[serde(default)]
    pub ns: Option<String>,

    #[serde(rename = "firstBatch", default)]
    pub first_batch: Option<Vec<Document>>,

    #[serde(rename = "nextBatch", default)]
    pub next_batch: Option<Vec<Document>>,
}

/// A reply that opened a cursor (`find`, `aggregate`, `listCollections`, ...).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CursorReply {
    pub cursor: ReplyCursor,
}

impl CursorReply {
    /// Decode a cursor-opening reply, failing on `ok: 0` or a missing
    /// `cursor.firstBatch`.
    pub fn decode(reply: Document) -> Result<Self> {
        check_reply(&reply)?;
        let decoded: CursorReply = bson::from_document(reply)?;
        if decoded.cursor.first_batch.is_none() {
            return Err(ProtocolError::Decode("reply has no cursor.firstBatch".to_string()).into());
        }
        Ok(decoded)
    }
}

/// Decoded `getMore` reply.
#[derive(Debug, Clone, PartialEq)]
pub struct GetMoreReply {
    pub cursor_id: i64,
    pub next_batch: Vec<Document>,
}

impl GetMoreReply {
    /// Decode a `getMore` reply. A reply without `cursor.nextBatch` is a
    /// decode failure, never an empty batch.
    pub fn decode(reply: Document) -> Result<Self> {
        check_reply(&reply)?;
        let decoded: CursorReply = bson::from_document(reply)?;
        let next_batch = decoded.cursor.next_batch.ok_or_else(|| {
            ProtocolError::Decode("reply has no cursor.nextBatch".to_string())
        })?;

        Ok(Self {
            cursor_id: decoded.cursor.id,
            next_batch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DriverError;
    use crate::protocol::ReadConcernLevel;
    use bson::{Bson, doc};

    #[test]
    fn test_get_more_field_order() {
        let mut command = GetMoreCommand::new(123456789, 10, "orders");
        command.max_time_ms = Some(500);
        command.read_concern = Some(ReadConcern::new(ReadConcernLevel::Local));

        let document = command.to_document().unwrap();
        let keys: Vec<&str> = document.keys().map(String::as_str).collect();
        assert_eq!(keys, ["getMore", "collection", "batchSize", "maxTimeMS", "readConcern"]);
        assert_eq!(document.get("getMore"), Some(&Bson::Int64(123456789)));
        assert_eq!(document.get_document("readConcern").unwrap(), &doc! { "level": "local" });
    }

    #[test]
    fn test_get_more_omits_unset_overrides() {
        let document = GetMoreCommand::new(1, 5, "orders").to_document().unwrap();
        assert!(!document.contains_key("maxTimeMS"));
        assert!(!document.contains_key("readConcern"));
    }

    #[test]
    fn test_kill_cursors_document() {
        let document = KillCursorsCommand::new(vec![42], "orders").to_document().unwrap();
        assert_eq!(document, doc! { "killCursors": "orders", "cursors": [42i64] });
    }

    #[test]
    fn test_find_document() {
        let mut find = FindCommand::new("orders", doc! { "status": "open" });
        find.batch_size = Some(2);
        let document = find.to_document().unwrap();
        assert_eq!(
            document,
            doc! { "find": "orders", "filter": { "status": "open" }, "batchSize": 2 }
        );
    }

    #[test]
    fn test_get_more_reply_decode() {
        let reply = doc! {
            "cursor": { "id": 0i64, "ns": "shop.orders", "nextBatch": [{ "a": 1 }, { "b": 2 }] },
            "ok": 1.0,
        };
        let decoded = GetMoreReply::decode(reply).unwrap();
        assert_eq!(decoded.cursor_id, 0);
        assert_eq!(decoded.next_batch, vec![doc! { "a": 1 }, doc! { "b": 2 }]);
    }

    #[test]
    fn test_get_more_reply_missing_batch() {
        let reply = doc! { "cursor": { "id": 5i64, "firstBatch": [] }, "ok": 1.0 };
        let err = GetMoreReply::decode(reply).unwrap_err();
        assert!(matches!(err, DriverError::Protocol(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_get_more_reply_server_error() {
        let reply = doc! { "ok": 0.0, "errmsg": "cursor id 9 not found", "code": 43 };
        let err = GetMoreReply::decode(reply).unwrap_err();
        assert!(matches!(err, DriverError::Server(_)));
    }

    #[test]
    fn test_cursor_reply_decode_int32_id() {
        let reply = doc! { "cursor": { "id": 0, "firstBatch": [] }, "ok": 1 };
        let decoded = CursorReply::decode(reply).unwrap();
        assert_eq!(decoded.cursor.id, 0);
        assert_eq!(decoded.cursor.first_batch, Some(vec![]));
    }
}
