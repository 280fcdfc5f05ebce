//! Server-side cursor retrieval
//!
//! A [`MongoCursor`] tracks the id of a paginated server-side query result.
//! It hands out the batch the cursor was opened with, pulls later batches with
//! `getMore`, and releases the server cursor with `killCursors` either when
//! [`MongoCursor::close`] is called or, as a best-effort fallback, when the
//! cursor is dropped while still live.
//!
//! The id is single-writer state: `get_more` and `close` take `&mut self`, so
//! overlapping calls on one cursor need the caller's own synchronisation.

mod signal;
mod stream;


use std::sync::Arc;

use bson::Document;
use futures::future::BoxFuture;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::connection::CommandExecutor;
use crate::error::{ConnectionError, CursorError, DriverError, Result, check_reply};
use crate::protocol::{
    CursorReply, GetMoreCommand, GetMoreReply, KillCursorsCommand, Namespace, ReadConcern,
    ReplyCursor, SessionId, Transaction,
};

pub use signal::CloseSignal;
pub use stream::{BatchSource, CursorBatches};

/// Where a cursor is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// The opening batch has not been handed out yet.
    Fresh,
    /// The server holds more results.
    Live,
    /// No server-side cursor remains.
    Drained,
}

/// A server-side cursor.
pub struct MongoCursor {
    id: i64,
    initial_batch: Option<Vec<Document>>,
    namespace: Namespace,
    connection: Arc<dyn CommandExecutor>,
    hop_to: Option<Handle>,
    transaction: Option<Transaction>,
    session: Option<SessionId>,
    max_time_ms: Option<i64>,
    read_concern: Option<ReadConcern>,
    close_requested: bool,
    close_signal: CloseSignal,
}

impl MongoCursor {
    /// Create a cursor from the `cursor` sub-document of the reply that
    /// opened it.
    ///
    /// # Arguments
    /// * `reply` - Cursor sub-document (`id`, `firstBatch`)
    /// * `namespace` - Collection the cursor reads from
    /// * `connection` - Executor the cursor was opened on
    /// * `hop_to` - Runtime to run round trips on, if not the caller's
    /// * `session` - Session id copied onto every sub-command
    /// * `transaction` - Transaction copied onto every sub-command
    pub fn new(
        reply: ReplyCursor,
        namespace: Namespace,
        connection: Arc<dyn CommandExecutor>,
        hop_to: Option<Handle>,
        session: Option<SessionId>,
        transaction: Option<Transaction>,
    ) -> Self {
        // On a live cursor an empty opening batch is the same as none, so the
        // first call goes straight to the server. A drained cursor keeps it
        // and hands it out once.
        let initial_batch = reply
            .first_batch
            .filter(|batch| reply.id == 0 || !batch.is_empty());

        debug!(
            "Opened cursor {} on {} ({} documents in first batch)",
            reply.id,
            namespace,
            initial_batch.as_ref().map_or(0, Vec::len)
        );

        Self {
            id: reply.id,
            initial_batch,
            namespace,
            connection,
            hop_to,
            transaction,
            session,
            max_time_ms: None,
            read_concern: None,
            close_requested: false,
            close_signal: CloseSignal::new(),
        }
    }

    /// Decode a full cursor-opening reply (`find`, `aggregate`, ...) and
    /// create a cursor from it.
    pub fn from_reply(
        reply: Document,
        namespace: Namespace,
        connection: Arc<dyn CommandExecutor>,
        hop_to: Option<Handle>,
        session: Option<SessionId>,
        transaction: Option<Transaction>,
    ) -> Result<Self> {
        let reply = CursorReply::decode(reply)?;
        Ok(Self::new(
            reply.cursor,
            namespace,
            connection,
            hop_to,
            session,
            transaction,
        ))
    }

    /// Server cursor id, `0` once drained or closed.
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn is_drained(&self) -> bool {
        self.id == 0
    }

    /// Whether the opening batch is still waiting to be handed out.
    pub fn has_pending_batch(&self) -> bool {
        self.initial_batch.is_some()
    }

    pub fn state(&self) -> CursorState {
        if self.is_drained() {
            CursorState::Drained
        } else if self.has_pending_batch() {
            CursorState::Fresh
        } else {
            CursorState::Live
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn session(&self) -> Option<&SessionId> {
        self.session.as_ref()
    }

    pub fn transaction(&self) -> Option<&Transaction> {
        self.transaction.as_ref()
    }

    pub fn max_time_ms(&self) -> Option<i64> {
        self.max_time_ms
    }

    /// Server-side time limit sent with every following `getMore`.
    pub fn set_max_time_ms(&mut self, max_time_ms: Option<i64>) {
        self.max_time_ms = max_time_ms;
    }

    pub fn read_concern(&self) -> Option<ReadConcern> {
        self.read_concern
    }

    /// Read concern sent with every following `getMore`.
    pub fn set_read_concern(&mut self, read_concern: Option<ReadConcern>) {
        self.read_concern = read_concern;
    }

    pub fn hop_to(&self) -> Option<&Handle> {
        self.hop_to.as_ref()
    }

    /// Run `getMore` and `killCursors` round trips on `runtime`.
    pub fn set_hop_to(&mut self, runtime: Option<Handle>) {
        self.hop_to = runtime;
    }

    /// Signal that completes once a close of this cursor has concluded.
    pub fn close_signal(&self) -> CloseSignal {
        self.close_signal.clone()
    }

    /// Fetch the next batch of documents.
    ///
    /// The first call returns the opening batch without touching the
    /// network. Once the cursor is drained this fails with
    /// [`CursorError::Drained`], again without any I/O. A failed `getMore`
    /// leaves the cursor id untouched so the call can be repeated.
    ///
    /// With a hop runtime set, the `getMore` round trip runs on that runtime;
    /// the cursor id only moves once its reply is back and decoded.
    ///
    /// # Arguments
    /// * `batch_size` - Number of documents to ask the server for
    ///
    /// # Returns
    /// * `Result<Vec<Document>>` - The batch, in server order
    pub async fn get_more(&mut self, batch_size: i32) -> Result<Vec<Document>> {
        if let Some(batch) = self.initial_batch.take() {
            return Ok(batch);
        }

        if self.is_drained() {
            return Err(CursorError::Drained.into());
        }

        let mut command = GetMoreCommand::new(self.id, batch_size, self.namespace.collection());
        command.max_time_ms = self.max_time_ms;
        command.read_concern = self.read_concern;

        debug!(
            "getMore on cursor {} ({}, batch size {})",
            self.id, self.namespace, batch_size
        );

        let command = command.to_document()?;
        let connection = Arc::clone(&self.connection);
        let namespace = self.namespace.clone();
        let transaction = self.transaction;
        let session = self.session.clone();
        let round_trip = async move {
            connection
                .execute(command, &namespace, transaction.as_ref(), session.as_ref())
                .await
        };

        let reply = run_on(self.hop_to.as_ref(), round_trip).await?;
        let reply = GetMoreReply::decode(reply)?;

        self.id = reply.cursor_id;
        if self.is_drained() {
            debug!("Cursor on {} drained", self.namespace);
        }
        Ok(reply.next_batch)
    }

    /// Close the cursor.
    ///
    /// The cursor is marked drained before this returns, so any `get_more`
    /// issued afterwards fails locally even while the `killCursors` round
    /// trip is still pending. Closing an already drained cursor sends
    /// nothing. The close signal completes when the close that captured the
    /// live id concludes, whether or not the server acknowledged the kill;
    /// a repeated close does not complete it early.
    pub fn close(&mut self) -> BoxFuture<'static, Result<()>> {
        let cursor_id = std::mem::replace(&mut self.id, 0);
        let already_closing = std::mem::replace(&mut self.close_requested, true);
        let completes_signal = cursor_id != 0 || !already_closing;

        let closing = self.kill_cursor(cursor_id, completes_signal);
        let hop_to = self.hop_to.clone();
        let signal = self.close_signal.clone();
        Box::pin(async move {
            let result = run_on(hop_to.as_ref(), closing).await;
            // Covers a hop runtime that refused the task.
            if completes_signal {
                signal.notify();
            }
            result
        })
    }

    /// Build the `killCursors` round trip for `cursor_id`, completing the
    /// close signal when it finishes if `completes_signal` is set.
    fn kill_cursor(
        &self,
        cursor_id: i64,
        completes_signal: bool,
    ) -> BoxFuture<'static, Result<()>> {
        let connection = Arc::clone(&self.connection);
        let namespace = self.namespace.clone();
        let transaction = self.transaction;
        let session = self.session.clone();
        let signal = self.close_signal.clone();

        Box::pin(async move {
            let result = if cursor_id == 0 {
                Ok(())
            } else {
                info!("Killing cursor {} on {}", cursor_id, namespace);
                let command = KillCursorsCommand::new(vec![cursor_id], namespace.collection());
                async {
                    let reply = connection
                        .execute(
                            command.to_document()?,
                            &namespace,
                            transaction.as_ref(),
                            session.as_ref(),
                        )
                        .await?;
                    check_reply(&reply)?;
                    Ok::<(), DriverError>(())
                }
                .await
            };

            if completes_signal {
                signal.notify();
            }
            result
        })
    }
}

impl Drop for MongoCursor {
    fn drop(&mut self) {
        if self.close_requested {
            return;
        }

        if self.is_drained() {
            self.close_signal.notify();
            return;
        }

        let cursor_id = self.id;
        warn!(
            "Cursor {} on {} dropped without close, killing it in the background",
            cursor_id, self.namespace
        );
        let closing = self.kill_cursor(cursor_id, true);
        self.connection.runtime().spawn(async move {
            if let Err(e) = closing.await {
                debug!("Background close of cursor {} failed: {}", cursor_id, e);
            }
        });
    }
}

/// Run `task` on `target` when set, inline otherwise.
///
/// A task the target runtime never completes (shut down, panicked) is an
/// error; nothing it would have produced is observed.
async fn run_on<T, F>(target: Option<&Handle>, task: F) -> Result<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    match target {
        None => task.await,
        Some(runtime) => runtime
            .spawn(task)
            .await
            .map_err(|e| DriverError::from(ConnectionError::WorkerFailed(e.to_string())))?,
    }
}
