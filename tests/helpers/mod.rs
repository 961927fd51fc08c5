/// Test helpers and fixtures for copy integration tests
///
/// This module provides common test utilities, fixtures, and helper functions
/// used across all integration tests.
pub mod fixtures;

#[allow(unused_imports)]
pub use dynamo_copy::setup;

// Re-export common fixtures
#[allow(unused_imports)]
pub use fixtures::*;

use aws_sdk_dynamodb::Client as DynamoDbClient;
use dynamo_copy::table::Capacity;
use dynamo_copy::{CapacityNegotiator, DynamoDbBackend, RandomSleeper};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Shared LocalStack backend
static TEST_BACKEND: OnceCell<DynamoDbBackend> = OnceCell::const_new();

/// DynamoDB backend for tests (idempotent)
///
/// Points at LocalStack when AWS_PROFILE=localstack.
#[allow(dead_code)]
pub async fn test_backend() -> &'static DynamoDbBackend {
    TEST_BACKEND
        .get_or_init(|| async { dynamo_copy::dynamodb_backend(None, None).await })
        .await
}

/// DynamoDB client for tests
#[allow(dead_code)]
pub async fn test_client() -> &'static DynamoDbClient {
    test_backend().await.client()
}

/// Generate a unique table name for isolation
#[allow(dead_code)]
pub fn unique_table_name(prefix: &str) -> String {
    format!("{}_{}", prefix, rusty_ulid::generate_ulid_string())
}

/// Create a table keyed by [`PARTITION_KEY`] and wait until it is active
#[allow(dead_code)]
pub async fn setup_table(name: &str, capacity: Capacity) -> Result<(), dynamo_copy::Error> {
    let backend = test_backend().await;
    setup::table(backend.client(), name, PARTITION_KEY, capacity).await?;

    CapacityNegotiator::new(Arc::new(backend.clone()), Arc::new(RandomSleeper))
        .wait_until_active(name)
        .await
}
