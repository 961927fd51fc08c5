//! In-process [`StorageBackend`] with scriptable faults.
//!
//! Tables are keyed by a single partition attribute and puts overwrite by
//! key, like DynamoDB. Every call is recorded so tests can check exactly what
//! the copy asked of the backend.

use async_trait::async_trait;
use aws_sdk_dynamodb::types::WriteRequest;
use futures_util::StreamExt;
use futures_util::stream;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::Error;
use crate::error::Operation;
use crate::table::types::{Batch, Capacity, Item, Segment, TableDescription, TableStatus};
use crate::table::{PageStream, StorageBackend};

const DEFAULT_PAGE_SIZE: usize = 100;

/// Outcome forced onto a `batch_write` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteFault {
    /// Accept the call but hand back its last `n` requests as unprocessed
    Unprocessed(usize),
    /// Fail with a provisioned-throughput-exceeded error
    ThroughputExceeded,
    /// Fail with a throttling error
    Throttled,
    /// Fail with a non-retryable error carrying this message
    Fatal(String),
}

#[derive(Debug)]
struct MemoryTable {
    partition_key: String,
    items: BTreeMap<String, Item>,
    capacity: Option<Capacity>,
    settle_polls: usize,
    pending_polls: usize,
}

#[derive(Debug)]
struct ScanFault {
    after_pages: usize,
    message: String,
}

#[derive(Debug, Default)]
struct Calls {
    describes: usize,
    scans: usize,
    batch_writes: Vec<usize>,
    capacity_updates: Vec<(String, Capacity)>,
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, MemoryTable>,
    scan_faults: HashMap<(String, u32), ScanFault>,
    write_script: VecDeque<WriteFault>,
    sticky_write_fault: Option<WriteFault>,
    failing_updates: HashMap<String, usize>,
    failing_describes: HashSet<String>,
    calls: Calls,
}

/// In-memory table store implementing [`StorageBackend`]
#[derive(Debug)]
pub struct MemoryBackend {
    page_size: usize,
    state: Mutex<State>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(table: &str, operation: Operation) -> Error {
    Error::Backend {
        table: table.to_string(),
        operation,
        message: "Requested resource not found".to_string(),
    }
}

fn key_of(table: &MemoryTable, name: &str, item: &Item) -> Result<String, Error> {
    item.get(&table.partition_key)
        .map(|value| format!("{value:?}"))
        .ok_or_else(|| Error::Backend {
            table: name.to_string(),
            operation: Operation::BatchWriteItem,
            message: format!(
                "One of the required keys was not given a value: {}",
                table.partition_key
            ),
        })
}

fn segment_of(key: &str, total: u32) -> u32 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % u64::from(total)) as u32
}

impl MemoryBackend {
    /// Create an empty backend returning up to 100 items per scan page
    pub fn new() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            state: Mutex::new(State::default()),
        }
    }

    /// Set the number of items returned per scan page
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Add an empty table keyed by `partition_key`
    ///
    /// A `None` capacity models an on-demand table.
    pub fn with_table(
        self,
        name: impl Into<String>,
        partition_key: impl Into<String>,
        capacity: Option<Capacity>,
    ) -> Self {
        let _ = self.lock().tables.insert(
            name.into(),
            MemoryTable {
                partition_key: partition_key.into(),
                items: BTreeMap::new(),
                capacity,
                settle_polls: 0,
                pending_polls: 0,
            },
        );
        self
    }

    /// Report `Updating` for `polls` describe calls after each capacity change
    pub fn with_settle_polls(self, table: &str, polls: usize) -> Self {
        if let Some(entry) = self.lock().tables.get_mut(table) {
            entry.settle_polls = polls;
        }
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Put `item` into `table`, replacing any item with the same key
    pub fn insert(&self, table: &str, item: Item) -> Result<(), Error> {
        let mut state = self.lock();
        let entry = state
            .tables
            .get_mut(table)
            .ok_or_else(|| not_found(table, Operation::BatchWriteItem))?;
        let key = key_of(entry, table, &item)?;
        let _ = entry.items.insert(key, item);
        Ok(())
    }

    /// All items of `table`, ordered by key
    pub fn items(&self, table: &str) -> Vec<Item> {
        self.lock()
            .tables
            .get(table)
            .map(|entry| entry.items.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of items stored in `table`
    pub fn len(&self, table: &str) -> usize {
        self.lock()
            .tables
            .get(table)
            .map_or(0, |entry| entry.items.len())
    }

    /// Whether `table` holds no items
    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }

    /// Current provisioned capacity of `table`
    pub fn capacity(&self, table: &str) -> Option<Capacity> {
        self.lock().tables.get(table).and_then(|entry| entry.capacity)
    }

    /// Make the scan of one segment fail after yielding `after_pages` pages
    ///
    /// Unsegmented scans are segment 0.
    pub fn fail_scan(
        &self,
        table: &str,
        segment: u32,
        after_pages: usize,
        message: impl Into<String>,
    ) {
        let _ = self.lock().scan_faults.insert(
            (table.to_string(), segment),
            ScanFault {
                after_pages,
                message: message.into(),
            },
        );
    }

    /// Force the outcome of the next `batch_write` call not yet scripted
    pub fn push_write_fault(&self, fault: WriteFault) {
        self.lock().write_script.push_back(fault);
    }

    /// Force the outcome of every `batch_write` call once the script is exhausted
    pub fn fail_writes_always(&self, fault: WriteFault) {
        self.lock().sticky_write_fault = Some(fault);
    }

    /// Make capacity updates of `table` fail
    pub fn fail_capacity_update(&self, table: &str) {
        self.fail_capacity_update_after(table, 0);
    }

    /// Accept `accepted` more capacity updates of `table`, then fail the rest
    pub fn fail_capacity_update_after(&self, table: &str, accepted: usize) {
        let _ = self
            .lock()
            .failing_updates
            .insert(table.to_string(), accepted);
    }

    /// Make describe calls on `table` fail
    pub fn fail_describe(&self, table: &str) {
        let _ = self.lock().failing_describes.insert(table.to_string());
    }

    /// Number of describe calls received
    pub fn describe_calls(&self) -> usize {
        self.lock().calls.describes
    }

    /// Number of scans started
    pub fn scan_calls(&self) -> usize {
        self.lock().calls.scans
    }

    /// Request count of every `batch_write` call, in call order
    pub fn batch_write_sizes(&self) -> Vec<usize> {
        self.lock().calls.batch_writes.clone()
    }

    /// Every accepted capacity update, in call order
    pub fn capacity_updates(&self) -> Vec<(String, Capacity)> {
        self.lock().calls.capacity_updates.clone()
    }

    fn pages(&self, table: &str, segment: Option<Segment>) -> Vec<Result<Batch, Error>> {
        let mut state = self.lock();
        state.calls.scans += 1;

        let Some(entry) = state.tables.get(table) else {
            return vec![Err(not_found(table, Operation::Scan))];
        };

        let matching: Vec<Item> = entry
            .items
            .iter()
            .filter(|(key, _)| segment.is_none_or(|s| segment_of(key, s.total) == s.index))
            .map(|(_, item)| item.clone())
            .collect();

        let mut pages: Vec<Result<Batch, Error>> = if matching.is_empty() {
            vec![Ok(Vec::new())]
        } else {
            matching
                .chunks(self.page_size)
                .map(|page| Ok(page.to_vec()))
                .collect()
        };

        let index = segment.map_or(0, |s| s.index);
        if let Some(fault) = state.scan_faults.get(&(table.to_string(), index)) {
            pages.truncate(fault.after_pages);
            pages.push(Err(Error::Backend {
                table: table.to_string(),
                operation: Operation::Scan,
                message: fault.message.clone(),
            }));
        }

        pages
    }

    fn next_write_fault(state: &mut State) -> Option<WriteFault> {
        state
            .write_script
            .pop_front()
            .or_else(|| state.sticky_write_fault.clone())
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn describe_table(&self, table: &str) -> Result<TableDescription, Error> {
        let mut state = self.lock();
        state.calls.describes += 1;

        if state.failing_describes.contains(table) {
            return Err(Error::Backend {
                table: table.to_string(),
                operation: Operation::DescribeTable,
                message: "describe failure".to_string(),
            });
        }

        let entry = state
            .tables
            .get_mut(table)
            .ok_or_else(|| not_found(table, Operation::DescribeTable))?;

        let status = if entry.pending_polls > 0 {
            entry.pending_polls -= 1;
            TableStatus::Updating
        } else {
            TableStatus::Active
        };

        Ok(TableDescription {
            status,
            capacity: entry.capacity,
        })
    }

    async fn update_capacity(&self, table: &str, capacity: Capacity) -> Result<(), Error> {
        capacity.validate()?;

        let mut state = self.lock();
        if let Some(accepted) = state.failing_updates.get_mut(table) {
            if *accepted > 0 {
                *accepted -= 1;
            } else {
                return Err(Error::Backend {
                    table: table.to_string(),
                    operation: Operation::UpdateTable,
                    message: "update failure".to_string(),
                });
            }
        }

        let entry = state
            .tables
            .get_mut(table)
            .ok_or_else(|| not_found(table, Operation::UpdateTable))?;
        if entry.pending_polls > 0 {
            return Err(Error::Backend {
                table: table.to_string(),
                operation: Operation::UpdateTable,
                message: "ResourceInUseException: table is being updated".to_string(),
            });
        }
        entry.capacity = Some(capacity);
        entry.pending_polls = entry.settle_polls;

        state
            .calls
            .capacity_updates
            .push((table.to_string(), capacity));
        Ok(())
    }

    fn scan_segment(&self, table: &str, segment: Option<Segment>) -> PageStream {
        stream::iter(self.pages(table, segment)).boxed()
    }

    async fn batch_write(
        &self,
        table: &str,
        mut requests: Vec<WriteRequest>,
    ) -> Result<Vec<WriteRequest>, Error> {
        let mut state = self.lock();
        state.calls.batch_writes.push(requests.len());

        let unprocessed = match Self::next_write_fault(&mut state) {
            None => Vec::new(),
            Some(WriteFault::Unprocessed(count)) => {
                let keep = requests.len().saturating_sub(count);
                requests.split_off(keep)
            }
            Some(WriteFault::ThroughputExceeded) => {
                return Err(Error::ThroughputExceeded {
                    table: table.to_string(),
                    message: "The level of configured provisioned throughput for the table was exceeded"
                        .to_string(),
                });
            }
            Some(WriteFault::Throttled) => {
                return Err(Error::Throttled {
                    table: table.to_string(),
                    message: "Rate of requests exceeds the allowed throughput".to_string(),
                });
            }
            Some(WriteFault::Fatal(message)) => {
                return Err(Error::Backend {
                    table: table.to_string(),
                    operation: Operation::BatchWriteItem,
                    message,
                });
            }
        };

        let entry = state
            .tables
            .get_mut(table)
            .ok_or_else(|| not_found(table, Operation::BatchWriteItem))?;

        let mut puts = Vec::with_capacity(requests.len());
        let mut deletes = Vec::new();
        for request in requests {
            if let Some(put) = request.put_request {
                puts.push((key_of(entry, table, &put.item)?, put.item));
            } else if let Some(delete) = request.delete_request {
                deletes.push(key_of(entry, table, &delete.key)?);
            }
        }

        for (key, item) in puts {
            let _ = entry.items.insert(key, item);
        }
        for key in deletes {
            let _ = entry.items.remove(&key);
        }

        Ok(unprocessed)
    }
}
