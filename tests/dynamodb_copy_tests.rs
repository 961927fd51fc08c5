/// DynamoDB copy tests
///
/// Run against LocalStack: `AWS_PROFILE=localstack cargo test -- --ignored`
use dynamo_copy::table::{BatchWriter, Capacity, StorageBackend, TableStatus};
use dynamo_copy::{
    CapacityNegotiator, CopyConfig, DynamoCopy, Error, Provisioning, RandomSleeper, TableHandle,
};
use futures_util::TryStreamExt;
use serial_test::serial;
use std::sync::Arc;

mod helpers;
use helpers::*;

async fn fill(table: &str, count: usize) {
    let backend = Arc::new(test_backend().await.clone());
    BatchWriter::new(backend, table, Arc::new(RandomSleeper))
        .write(user_items(count))
        .await
        .unwrap();
}

async fn scan_all(table: &str) -> Vec<dynamo_copy::table::Item> {
    let mut items: Vec<_> = test_backend()
        .await
        .scan_segment(table, None)
        .try_concat()
        .await
        .unwrap();
    items.sort_by_key(|item| format!("{:?}", item[PARTITION_KEY]));
    items
}

/// Test describing a freshly created table
#[tokio::test]
#[serial]
#[ignore = "requires LocalStack"]
async fn test_describe_table() {
    let name = unique_table_name("describe");
    setup_table(&name, Capacity::new(3, 4)).await.unwrap();

    let description = test_backend().await.describe_table(&name).await.unwrap();

    assert_eq!(description.status, TableStatus::Active);
    assert_eq!(description.capacity, Some(Capacity::new(3, 4)));
}

/// Test that creating an existing table is not an error
#[tokio::test]
#[serial]
#[ignore = "requires LocalStack"]
async fn test_setup_table_is_idempotent() {
    let name = unique_table_name("idempotent");
    setup_table(&name, Capacity::new(1, 1)).await.unwrap();
    setup_table(&name, Capacity::new(1, 1)).await.unwrap();
}

/// Test describing a missing table
#[tokio::test]
#[serial]
#[ignore = "requires LocalStack"]
async fn test_describe_missing_table() {
    let err = test_backend()
        .await
        .describe_table(&unique_table_name("missing"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Backend { .. }));
    assert!(err.to_string().contains("DescribeTable"));
}

/// Test capacity update and wait for the table to settle
#[tokio::test]
#[serial]
#[ignore = "requires LocalStack"]
async fn test_capacity_update() {
    let name = unique_table_name("capacity");
    setup_table(&name, Capacity::new(1, 1)).await.unwrap();
    let backend = Arc::new(test_backend().await.clone());

    CapacityNegotiator::new(backend.clone(), Arc::new(RandomSleeper))
        .apply(&name, Capacity::new(5, 7))
        .await
        .unwrap();

    let description = backend.describe_table(&name).await.unwrap();
    assert_eq!(description.capacity, Some(Capacity::new(5, 7)));
}

/// Test that segmented scans together cover the table once
#[tokio::test]
#[serial]
#[ignore = "requires LocalStack"]
async fn test_batch_write_and_segmented_scan() {
    let name = unique_table_name("scan");
    setup_table(&name, Capacity::new(5, 5)).await.unwrap();
    fill(&name, 60).await;

    let backend = test_backend().await;
    let mut segmented = Vec::new();
    for index in 0..3 {
        let pages: Vec<_> = backend
            .scan_segment(&name, dynamo_copy::table::Segment::for_reader(3, index))
            .try_concat()
            .await
            .unwrap();
        segmented.extend(pages);
    }

    assert_eq!(segmented.len(), 60);
    assert_eq!(scan_all(&name).await, user_items(60));
}

/// Test the whole copy between two tables
#[tokio::test]
#[serial]
#[ignore = "requires LocalStack"]
async fn test_copy_table() {
    let source = unique_table_name("copy_source");
    let target = unique_table_name("copy_target");
    setup_table(&source, Capacity::new(2, 2)).await.unwrap();
    setup_table(&target, Capacity::new(3, 3)).await.unwrap();
    fill(&source, 120).await;

    let backend = Arc::new(test_backend().await.clone());
    let copy = DynamoCopy::new(
        CopyConfig::new(10, 20, 3, 2),
        TableHandle::new(backend.clone(), &source),
        TableHandle::new(backend.clone(), &target),
        Arc::new(RandomSleeper),
    );

    copy.run().await.unwrap();

    assert_eq!(scan_all(&target).await, scan_all(&source).await);
    assert_eq!(
        copy.fetch_provisioning().await.unwrap(),
        Provisioning::new(Some(Capacity::new(2, 2)), Some(Capacity::new(3, 3)))
    );
}
