use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, KeySchemaElement, KeyType, ProvisionedThroughput, ScalarAttributeType,
};
use tracing::debug;

use crate::error::{Error, Operation};
use crate::table::Capacity;
use crate::table::dynamodb::classify;

/// Create a provisioned table with a string partition key
///
/// An existing table with the same name is left as it is.
pub async fn table(
    client: &DynamoDbClient,
    name: &str,
    partition_key: &str,
    capacity: Capacity,
) -> Result<(), Error> {
    capacity.validate()?;

    let result = client
        .create_table()
        .table_name(name)
        .key_schema(
            KeySchemaElement::builder()
                .attribute_name(partition_key)
                .key_type(KeyType::Hash)
                .build()?,
        )
        .attribute_definitions(
            AttributeDefinition::builder()
                .attribute_name(partition_key)
                .attribute_type(ScalarAttributeType::S)
                .build()?,
        )
        .provisioned_throughput(
            ProvisionedThroughput::builder()
                .read_capacity_units(capacity.read)
                .write_capacity_units(capacity.write)
                .build()?,
        )
        .send()
        .await;

    match result {
        Ok(_) => Ok(()),
        // Table already exists
        Err(e)
            if e
                .as_service_error()
                .is_some_and(|service_error| service_error.is_resource_in_use_exception()) =>
        {
            debug!(table = name, "table already exists");
            Ok(())
        }
        Err(e) => Err(classify(name, Operation::CreateTable, e)),
    }
}
