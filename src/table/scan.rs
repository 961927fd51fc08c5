use futures_util::TryStreamExt;
use std::sync::Arc;
use tracing::debug;

use crate::Error;
use crate::pipeline::BatchSink;
use crate::table::StorageBackend;
use crate::table::types::Segment;

/// Scans one segment of a table and forwards every page as a batch
#[derive(Debug, Clone)]
pub struct SegmentedReader {
    backend: Arc<dyn StorageBackend>,
    table: String,
}

impl SegmentedReader {
    /// Reader over `table`
    pub fn new(backend: Arc<dyn StorageBackend>, table: impl Into<String>) -> Self {
        Self {
            backend,
            table: table.into(),
        }
    }

    /// Name of the scanned table
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Scan segment `segment_index` of `total_segments`, delivering pages in order
    ///
    /// A single segment scans the whole table. A failed page aborts the scan;
    /// pages already delivered stay delivered. If the sink reports a pipeline
    /// shutdown the scan stops early and returns `Ok`.
    pub async fn scan(
        &self,
        total_segments: u32,
        segment_index: u32,
        sink: &mut BatchSink,
    ) -> Result<(), Error> {
        if total_segments == 0 {
            return Err(Error::validation("totalSegments has to be greater than 0"));
        }
        if segment_index >= total_segments {
            return Err(Error::validation(format!(
                "segment {} is out of range for {} segments",
                segment_index, total_segments
            )));
        }

        let segment = Segment::for_reader(total_segments, segment_index);
        let mut pages = self.backend.scan_segment(&self.table, segment);
        let mut scanned = 0;

        while let Some(page) = pages.try_next().await? {
            scanned += page.len();
            debug!(
                table = %self.table,
                segment = segment_index,
                items = page.len(),
                "scanned page"
            );

            if !sink.deliver(page).await {
                debug!(
                    table = %self.table,
                    segment = segment_index,
                    "copy is shutting down, abandoning scan"
                );
                return Ok(());
            }
        }

        debug!(
            table = %self.table,
            segment = segment_index,
            total = scanned,
            "scanned segment"
        );
        Ok(())
    }
}
