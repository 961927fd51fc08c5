mod batch;
pub(crate) mod dynamodb;
mod helpers;
pub mod memory;
mod scan;
mod types;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::WriteRequest;
use futures_util::stream::BoxStream;
use std::fmt;

use crate::Error;

pub use batch::BatchWriter;
pub use dynamodb::DynamoDbBackend;
pub use memory::MemoryBackend;
pub use scan::SegmentedReader;
pub use types::{Batch, Capacity, Item, Segment, TableDescription, TableStatus};

/// Maximum number of put requests sent in one `batch_write` call
pub const BATCH_WRITE_SIZE: usize = helpers::batch_processor::BATCH_WRITE_SIZE;

/// Pages of one scan, in scan order; the stream ends after the last page
pub type PageStream = BoxStream<'static, Result<Batch, Error>>;

/// The table operations the copy needs from a storage service
///
/// Errors from `batch_write` must be classified: throughput errors as
/// [`Error::ThroughputExceeded`], throttling as [`Error::Throttled`].
#[async_trait]
pub trait StorageBackend: fmt::Debug + Send + Sync {
    /// Current status and provisioned capacity of `table`
    async fn describe_table(&self, table: &str) -> Result<TableDescription, Error>;

    /// Request a new provisioned capacity; does not wait for it to apply
    async fn update_capacity(&self, table: &str, capacity: Capacity) -> Result<(), Error>;

    /// Scan `table`, or only `segment` of it when given
    fn scan_segment(&self, table: &str, segment: Option<Segment>) -> PageStream;

    /// Send at most [`BATCH_WRITE_SIZE`] requests, returning those left unprocessed
    async fn batch_write(
        &self,
        table: &str,
        requests: Vec<WriteRequest>,
    ) -> Result<Vec<WriteRequest>, Error>;
}
