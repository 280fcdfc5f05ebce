//! Batch and document streaming over a cursor
//!
//! [`CursorBatches`] pulls whole batches until the cursor is exhausted;
//! [`MongoCursor::into_stream`] flattens those batches into a document stream.

use async_trait::async_trait;
use bson::Document;
use futures::stream::{self, Stream, TryStreamExt};
use tracing::debug;

use super::MongoCursor;
use crate::error::{DriverError, Result};

/// Source of document batches that can be closed early.
#[async_trait]
pub trait BatchSource: Send {
    /// Fetch the next batch of documents
    ///
    /// # Returns
    /// * `Result<Option<Vec<Document>>>` - Next batch of documents, or None if exhausted
    async fn next_batch(&mut self) -> Result<Option<Vec<Document>>>;

    /// Close the source and release server resources
    async fn close(&mut self) -> Result<()>;
}

/// Batch-at-a-time reader over a [`MongoCursor`].
pub struct CursorBatches {
    cursor: MongoCursor,
    batch_size: i32,
    total_fetched: u64,
}

impl CursorBatches {
    pub fn new(cursor: MongoCursor, batch_size: i32) -> Self {
        Self {
            cursor,
            batch_size,
            total_fetched: 0,
        }
    }

    pub fn cursor(&self) -> &MongoCursor {
        &self.cursor
    }

    pub fn cursor_mut(&mut self) -> &mut MongoCursor {
        &mut self.cursor
    }

    /// Documents handed out so far.
    pub fn total_fetched(&self) -> u64 {
        self.total_fetched
    }

    pub fn into_inner(self) -> MongoCursor {
        self.cursor
    }
}

#[async_trait]
impl BatchSource for CursorBatches {
    async fn next_batch(&mut self) -> Result<Option<Vec<Document>>> {
        if self.cursor.is_drained() && !self.cursor.has_pending_batch() {
            debug!(
                "Cursor on {} exhausted after {} documents",
                self.cursor.namespace(),
                self.total_fetched
            );
            return Ok(None);
        }

        let batch = self.cursor.get_more(self.batch_size).await?;
        self.total_fetched += batch.len() as u64;
        Ok(Some(batch))
    }

    async fn close(&mut self) -> Result<()> {
        self.cursor.close().await
    }
}

impl MongoCursor {
    /// Stream every remaining document, fetching `batch_size` at a time.
    ///
    /// Dropping the stream early drops the cursor, which kills a still-live
    /// server cursor in the background.
    pub fn into_stream(self, batch_size: i32) -> impl Stream<Item = Result<Document>> + Send {
        stream::try_unfold(CursorBatches::new(self, batch_size), |mut batches| async move {
            let batch = batches.next_batch().await?;
            Ok::<_, DriverError>(batch.map(|batch| (batch, batches)))
        })
        .map_ok(|batch| stream::iter(batch.into_iter().map(Ok::<Document, DriverError>)))
        .try_flatten()
    }
}
