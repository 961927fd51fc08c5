use aws_sdk_dynamodb::types::WriteRequest;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::Error;
use crate::sleeper::Sleeper;
use crate::table::StorageBackend;
use crate::table::helpers::{batch_processor, retry_config::Backoff};
use crate::table::types::Item;

/// Writes items to one table in BatchWriteItem sized chunks, retrying
/// unprocessed items and transient errors
#[derive(Debug, Clone)]
pub struct BatchWriter {
    backend: Arc<dyn StorageBackend>,
    table: String,
    sleeper: Arc<dyn Sleeper>,
}

impl BatchWriter {
    /// Writer into `table`, backing off through `sleeper`
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        table: impl Into<String>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            backend,
            table: table.into(),
            sleeper,
        }
    }

    /// Name of the target table
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Put every item, chunk by chunk
    ///
    /// Chunks before a failing chunk stay written.
    pub async fn write(&self, items: Vec<Item>) -> Result<(), Error> {
        if items.is_empty() {
            return Ok(());
        }

        debug!(table = %self.table, items = items.len(), "writing batch");

        for chunk in batch_processor::put_request_chunks(items)? {
            self.write_chunk(chunk).await?;
        }

        Ok(())
    }

    async fn write_chunk(&self, mut pending: Vec<WriteRequest>) -> Result<(), Error> {
        let mut backoff = Backoff::default();

        while !pending.is_empty() {
            let err = match self.backend.batch_write(&self.table, pending.clone()).await {
                Ok(unprocessed) => {
                    if !unprocessed.is_empty() {
                        debug!(
                            table = %self.table,
                            unprocessed = unprocessed.len(),
                            "resending unprocessed items"
                        );
                    }
                    pending = unprocessed;
                    backoff.reset();
                    continue;
                }
                Err(err) if err.is_transient() => err,
                Err(err) => return Err(err),
            };

            if backoff.exhausted() {
                return Err(Error::TooManyRetries {
                    table: self.table.clone(),
                    elapsed_ms: backoff.elapsed_ms(),
                    last: Box::new(err),
                });
            }

            let requested = match err {
                Error::Throttled { .. } => backoff.throttle_delay_ms(),
                _ => backoff.throughput_delay_ms(),
            };
            let slept = self.sleeper.sleep(requested).await;

            warn!(
                table = %self.table,
                attempt = backoff.attempt(),
                slept_ms = slept,
                error = %err,
                "batch write backing off"
            );

            backoff.record(slept);
        }

        Ok(())
    }
}
