use async_trait::async_trait;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::types::{
    BillingMode, ProvisionedThroughput, ProvisionedThroughputDescription, WriteRequest,
};
use aws_smithy_types_convert::stream::PaginationStreamExt;
use aws_types::SdkConfig;
use futures_util::{StreamExt, TryStreamExt};
use std::error::Error as StdError;
use std::fmt;
use tracing::debug;

use crate::Error;
use crate::error::Operation;
use crate::table::types::{Capacity, Segment, TableDescription, TableStatus};
use crate::table::{PageStream, StorageBackend};

const THROUGHPUT_EXCEEDED: &str = "ProvisionedThroughputExceededException";
const THROTTLING: &str = "ThrottlingException";

/// [`StorageBackend`] backed by the AWS DynamoDB SDK
#[derive(Debug, Clone)]
pub struct DynamoDbBackend {
    client: DynamoDbClient,
}

impl DynamoDbBackend {
    /// Wrap an existing client
    pub fn new(client: DynamoDbClient) -> Self {
        Self { client }
    }

    /// Build a client from a loaded AWS configuration
    pub fn from_conf(config: &SdkConfig) -> Self {
        Self::new(DynamoDbClient::new(config))
    }

    /// The underlying SDK client
    pub fn client(&self) -> &DynamoDbClient {
        &self.client
    }
}

/// Map an SDK error onto the copy's error classes
pub(crate) fn classify<E, R>(table: &str, operation: Operation, err: SdkError<E, R>) -> Error
where
    E: ProvideErrorMetadata + StdError + Send + Sync + 'static,
    R: fmt::Debug,
{
    let message = DisplayErrorContext(&err).to_string();
    let table = table.to_string();

    match err.code() {
        Some(THROUGHPUT_EXCEEDED) => Error::ThroughputExceeded { table, message },
        Some(THROTTLING) => Error::Throttled { table, message },
        _ => Error::Backend {
            table,
            operation,
            message,
        },
    }
}

#[async_trait]
impl StorageBackend for DynamoDbBackend {
    async fn describe_table(&self, table: &str) -> Result<TableDescription, Error> {
        let output = self
            .client
            .describe_table()
            .table_name(table)
            .send()
            .await
            .map_err(|e| classify(table, Operation::DescribeTable, e))?;

        let description = output.table.ok_or_else(|| Error::Backend {
            table: table.to_string(),
            operation: Operation::DescribeTable,
            message: "response did not include a table description".to_string(),
        })?;

        let status = description
            .table_status()
            .map(TableStatus::from)
            .unwrap_or_else(|| TableStatus::Unknown(String::new()));

        let on_demand = description
            .billing_mode_summary()
            .and_then(|summary| summary.billing_mode())
            .is_some_and(|mode| *mode == BillingMode::PayPerRequest);

        let capacity = if on_demand {
            None
        } else {
            description
                .provisioned_throughput()
                .and_then(provisioned_capacity)
        };

        Ok(TableDescription { status, capacity })
    }

    async fn update_capacity(&self, table: &str, capacity: Capacity) -> Result<(), Error> {
        capacity.validate()?;

        let throughput = ProvisionedThroughput::builder()
            .read_capacity_units(capacity.read)
            .write_capacity_units(capacity.write)
            .build()?;

        let _ = self
            .client
            .update_table()
            .table_name(table)
            .provisioned_throughput(throughput)
            .send()
            .await
            .map_err(|e| classify(table, Operation::UpdateTable, e))?;

        Ok(())
    }

    fn scan_segment(&self, table: &str, segment: Option<Segment>) -> PageStream {
        let owned_table = table.to_string();
        let segment_index = segment.map(|s| s.index as i32);

        debug!(table, ?segment, "starting scan");

        self.client
            .scan()
            .table_name(table)
            .set_segment(segment_index)
            .set_total_segments(segment.map(|s| s.total as i32))
            .into_paginator()
            .send()
            .into_stream_03x()
            .map_err(move |e| classify(&owned_table, Operation::Scan, e))
            .map_ok(|page| page.items.unwrap_or_default())
            .boxed()
    }

    async fn batch_write(
        &self,
        table: &str,
        requests: Vec<WriteRequest>,
    ) -> Result<Vec<WriteRequest>, Error> {
        let output = self
            .client
            .batch_write_item()
            .request_items(table, requests)
            .send()
            .await
            .map_err(|e| classify(table, Operation::BatchWriteItem, e))?;

        Ok(output
            .unprocessed_items
            .and_then(|mut unprocessed| unprocessed.remove(table))
            .unwrap_or_default())
    }
}

/// Capacity to manage, or `None` when either half is missing or zero
fn provisioned_capacity(throughput: &ProvisionedThroughputDescription) -> Option<Capacity> {
    match (
        throughput.read_capacity_units(),
        throughput.write_capacity_units(),
    ) {
        (Some(read), Some(write)) if read > 0 && write > 0 => Some(Capacity::new(read, write)),
        _ => None,
    }
}
