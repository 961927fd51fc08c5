use aws_sdk_dynamodb::types::{AttributeValue, TableStatus as SdkTableStatus};
use std::collections::HashMap;
use std::fmt;

use crate::Error;

/// A DynamoDB item, relayed untouched from source to target
pub type Item = HashMap<String, AttributeValue>;

/// Items of one scan page, the unit handed from readers to writers
pub type Batch = Vec<Item>;

/// Provisioned throughput of a table
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Capacity {
    /// Read capacity units
    pub read: i64,
    /// Write capacity units
    pub write: i64,
}

impl Capacity {
    /// Create a capacity from read and write units
    pub fn new(read: i64, write: i64) -> Self {
        Self { read, write }
    }

    /// Reject capacities the backend would refuse to apply
    pub fn validate(&self) -> Result<(), Error> {
        if self.read <= 0 || self.write <= 0 {
            return Err(Error::validation(format!(
                "invalid update capacity read {}, write {}: capacity units must be greater than 0",
                self.read, self.write
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "read: {}, write: {}", self.read, self.write)
    }
}

/// Lifecycle status of a table
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TableStatus {
    /// Table is being created
    Creating,
    /// Table settings (such as capacity) are being changed
    Updating,
    /// Table is ready for use
    Active,
    /// Table is being deleted
    Deleting,
    /// Table is being archived
    Archiving,
    /// Table has been archived
    Archived,
    /// The table's KMS key is not accessible
    InaccessibleEncryptionCredentials,
    /// Any status this crate does not know about
    Unknown(String),
}

impl TableStatus {
    /// Whether operations can resume on the table
    pub fn is_active(&self) -> bool {
        matches!(self, TableStatus::Active)
    }
}

impl From<&SdkTableStatus> for TableStatus {
    fn from(status: &SdkTableStatus) -> Self {
        match status {
            SdkTableStatus::Creating => TableStatus::Creating,
            SdkTableStatus::Updating => TableStatus::Updating,
            SdkTableStatus::Active => TableStatus::Active,
            SdkTableStatus::Deleting => TableStatus::Deleting,
            SdkTableStatus::Archiving => TableStatus::Archiving,
            SdkTableStatus::Archived => TableStatus::Archived,
            SdkTableStatus::InaccessibleEncryptionCredentials => {
                TableStatus::InaccessibleEncryptionCredentials
            }
            other => TableStatus::Unknown(other.as_str().to_string()),
        }
    }
}

/// What the copy needs to know about a table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableDescription {
    /// Current status
    pub status: TableStatus,
    /// Provisioned capacity, `None` for on-demand tables
    pub capacity: Option<Capacity>,
}

/// One backend-partitioned slice of a table's keyspace
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment {
    /// Total number of segments the table is split into
    pub total: u32,
    /// Index of this segment, `0..total`
    pub index: u32,
}

impl Segment {
    /// Scan parameters for reader `index` out of `total`
    ///
    /// A single segment means a plain, unsegmented scan.
    pub fn for_reader(total: u32, index: u32) -> Option<Self> {
        (total > 1).then_some(Self { total, index })
    }
}
