//! Common test fixtures
//!
//! Items with a mix of attribute types, and in-memory source/target tables
//! pre-filled with them.
#![allow(dead_code)]

use aws_sdk_dynamodb::types::AttributeValue;
use dynamo_copy::MemoryBackend;
use dynamo_copy::table::{Capacity, Item};
use std::collections::HashMap;
use std::sync::Arc;

pub const SOURCE_TABLE: &str = "tests_copy_source";
pub const TARGET_TABLE: &str = "tests_copy_target";
pub const PARTITION_KEY: &str = "user_id";

/// A user record with string, number, boolean, list and map attributes
pub fn user_item(index: usize) -> Item {
    HashMap::from([
        (
            PARTITION_KEY.to_string(),
            AttributeValue::S(format!("user-{index:06}")),
        ),
        (
            "email".to_string(),
            AttributeValue::S(format!("user{index}@example.com")),
        ),
        ("age".to_string(), AttributeValue::N((18 + index % 60).to_string())),
        ("active".to_string(), AttributeValue::Bool(index % 2 == 0)),
        (
            "tags".to_string(),
            AttributeValue::L(vec![
                AttributeValue::S("copy".into()),
                AttributeValue::N(index.to_string()),
            ]),
        ),
        (
            "address".to_string(),
            AttributeValue::M(HashMap::from([(
                "city".to_string(),
                AttributeValue::S("Lisbon".into()),
            )])),
        ),
    ])
}

/// `count` user items
pub fn user_items(count: usize) -> Vec<Item> {
    (0..count).map(user_item).collect()
}

/// In-memory source holding `items` users and an empty target
pub fn memory_tables(
    items: usize,
    page_size: usize,
    source_capacity: Option<Capacity>,
    target_capacity: Option<Capacity>,
) -> (Arc<MemoryBackend>, Arc<MemoryBackend>) {
    let source = MemoryBackend::new()
        .with_page_size(page_size)
        .with_table(SOURCE_TABLE, PARTITION_KEY, source_capacity);
    for item in user_items(items) {
        source.insert(SOURCE_TABLE, item).unwrap();
    }

    let target = MemoryBackend::new().with_table(TARGET_TABLE, PARTITION_KEY, target_capacity);

    (Arc::new(source), Arc::new(target))
}
