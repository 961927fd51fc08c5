use aws_sdk_dynamodb::error::BuildError;
use std::error::Error as StdError;
use std::fmt;
use tokio::task::JoinError;

/// DynamoDB operation that produced a backend error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// DescribeTable
    DescribeTable,
    /// UpdateTable (capacity change)
    UpdateTable,
    /// Scan (one page of one segment)
    Scan,
    /// BatchWriteItem
    BatchWriteItem,
    /// CreateTable
    CreateTable,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::DescribeTable => "DescribeTable",
            Operation::UpdateTable => "UpdateTable",
            Operation::Scan => "Scan",
            Operation::BatchWriteItem => "BatchWriteItem",
            Operation::CreateTable => "CreateTable",
        };
        f.write_str(name)
    }
}

/// Broad classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input, rejected before any backend call
    Validation,
    /// Throughput exceeded or throttled; worth retrying with backoff
    TransientBackend,
    /// Any other backend failure, or a transient one past its retry ceiling
    FatalBackend,
    /// A copy worker died without reporting a result
    Pipeline,
}

/// Table copy error
#[derive(Debug)]
pub enum Error {
    /// Invalid input (zero segments, zero workers, non-positive capacity)
    Validation(String),
    /// The table's provisioned throughput was exceeded
    ThroughputExceeded {
        /// Table the request was sent to
        table: String,
        /// Backend error message
        message: String,
    },
    /// The request was throttled by the service
    Throttled {
        /// Table the request was sent to
        table: String,
        /// Backend error message
        message: String,
    },
    /// Non-retryable backend failure
    Backend {
        /// Table the request was sent to
        table: String,
        /// Operation that failed
        operation: Operation,
        /// Backend error message
        message: String,
    },
    /// Transient errors kept coming after the backoff ceiling was reached
    TooManyRetries {
        /// Table the writes were sent to
        table: String,
        /// Total time slept before giving up, in milliseconds
        elapsed_ms: u64,
        /// The last transient error observed
        last: Box<Error>,
    },
    /// DynamoDB request builder error
    Build(BuildError),
    /// A pipeline worker panicked or was cancelled
    Worker(JoinError),
    /// The copy failed and restoring the original capacity failed as well
    Restore {
        /// Error of the elevate or copy step
        operation: Box<Error>,
        /// Error of the restore step
        restore: Box<Error>,
    },
}

impl Error {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::ThroughputExceeded { .. } | Error::Throttled { .. } => {
                ErrorKind::TransientBackend
            }
            Error::Backend { .. } | Error::TooManyRetries { .. } | Error::Build(_) => {
                ErrorKind::FatalBackend
            }
            Error::Worker(_) => ErrorKind::Pipeline,
            Error::Restore { operation, .. } => operation.kind(),
        }
    }

    /// Check if the error is worth retrying with backoff
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::TransientBackend
    }

    /// Check if the error was raised before reaching the backend
    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }
}

macro_rules! impl_from_error {
    ($name:ident, $variant:ident) => {
        impl From<$name> for Error {
            fn from(e: $name) -> Self {
                Error::$variant(e)
            }
        }
    };
}

impl_from_error!(BuildError, Build);
impl_from_error!(JoinError, Worker);

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Validation(message) => write!(f, "invalid input: {}", message),
            Error::ThroughputExceeded { table, message } => {
                write!(f, "provisioned throughput exceeded on table {}: {}", table, message)
            }
            Error::Throttled { table, message } => {
                write!(f, "request throttled on table {}: {}", table, message)
            }
            Error::Backend {
                table,
                operation,
                message,
            } => write!(f, "DynamoDB {} failed on table {}: {}", operation, table, message),
            Error::TooManyRetries {
                table,
                elapsed_ms,
                last,
            } => write!(
                f,
                "too many batch write retries to table {} after {} ms: {}",
                table, elapsed_ms, last
            ),
            Error::Build(e) => write!(f, "DynamoDB request builder error: {}", e),
            Error::Worker(e) => write!(f, "copy worker did not complete: {}", e),
            Error::Restore { operation, restore } => write!(
                f,
                "{}; restoring original capacity also failed: {}",
                operation, restore
            ),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::TooManyRetries { last, .. } => Some(last.as_ref()),
            Error::Build(e) => Some(e),
            Error::Worker(e) => Some(e),
            Error::Restore { restore, .. } => Some(restore.as_ref()),
            _ => None,
        }
    }
}
