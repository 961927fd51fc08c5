/// Backoff bookkeeping for batch write retries
pub(crate) mod retry_config {
    use std::time::Duration;

    /// Accumulated sleep after which transient errors stop being retried
    pub(crate) const MAX_RETRY_ELAPSED: Duration = Duration::from_secs(3 * 60);

    /// Unit of the linear throttling backoff
    pub(crate) const THROTTLE_UNIT: Duration = Duration::from_secs(1);

    /// Retry state of one chunk write
    ///
    /// Only time slept counts against the budget; resubmitting unprocessed
    /// items does not touch it.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct Backoff {
        attempt: u64,
        elapsed_ms: u64,
    }

    impl Backoff {
        pub(crate) fn attempt(&self) -> u64 {
            self.attempt
        }

        pub(crate) fn elapsed_ms(&self) -> u64 {
            self.elapsed_ms
        }

        /// Whether the accumulated sleep is past the ceiling
        pub(crate) fn exhausted(&self) -> bool {
            u128::from(self.elapsed_ms) > MAX_RETRY_ELAPSED.as_millis()
        }

        /// Requested sleep after a throughput-exceeded error
        ///
        /// Keyed by the time already slept, so delays roughly double.
        pub(crate) fn throughput_delay_ms(&self) -> u64 {
            self.elapsed_ms.saturating_add(self.attempt)
        }

        /// Requested sleep after a throttling error
        pub(crate) fn throttle_delay_ms(&self) -> u64 {
            (THROTTLE_UNIT.as_millis() as u64).saturating_mul(self.attempt)
        }

        /// Account for a sleep that actually happened
        pub(crate) fn record(&mut self, slept_ms: u64) {
            self.attempt += 1;
            self.elapsed_ms = self.elapsed_ms.saturating_add(slept_ms);
        }

        pub(crate) fn reset(&mut self) {
            *self = Self::default();
        }
    }
}

/// Batch processing utilities
pub(crate) mod batch_processor {
    use aws_sdk_dynamodb::types::{PutRequest, WriteRequest};

    use crate::Error;
    use crate::table::types::Item;

    /// Maximum number of requests DynamoDB accepts in one BatchWriteItem call
    pub(crate) const BATCH_WRITE_SIZE: usize = 25;

    /// Wrap items into put requests, split into BatchWriteItem sized chunks
    pub(crate) fn put_request_chunks(items: Vec<Item>) -> Result<Vec<Vec<WriteRequest>>, Error> {
        let mut chunks = Vec::with_capacity(items.len().div_ceil(BATCH_WRITE_SIZE));
        let mut current = Vec::with_capacity(BATCH_WRITE_SIZE.min(items.len()));

        for item in items {
            if current.len() == BATCH_WRITE_SIZE {
                chunks.push(std::mem::replace(
                    &mut current,
                    Vec::with_capacity(BATCH_WRITE_SIZE),
                ));
            }

            let put_request = PutRequest::builder().set_item(Some(item)).build()?;
            current.push(
                WriteRequest::builder()
                    .set_put_request(Some(put_request))
                    .build(),
            );
        }

        if !current.is_empty() {
            chunks.push(current);
        }

        Ok(chunks)
    }
}
