//! # DynamoDB Table Copy
//!
//! Copies every item of a DynamoDB table into another table:
//! - Raises the source read and target write capacity for the transfer
//! - Scans the source in parallel segments
//! - Writes through a pool of batch writers fed by a bounded queue
//! - Retries unprocessed items, throughput and throttling errors with backoff
//! - Restores the original capacity afterwards, even when the copy fails
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dynamo_copy::{CopyConfig, DynamoCopy, Error, RandomSleeper, TableHandle};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let source = Arc::new(dynamo_copy::dynamodb_backend(None, None).await);
//!     let target = Arc::new(dynamo_copy::dynamodb_backend(Some("backup"), None).await);
//!
//!     let copy = DynamoCopy::new(
//!         CopyConfig::new(500, 500, 4, 8),
//!         TableHandle::new(source, "users"),
//!         TableHandle::new(target, "users-copy"),
//!         Arc::new(RandomSleeper),
//!     );
//!
//!     copy.run().await
//! }
//! ```
#![deny(
    warnings,
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    unused_allocation,
    unused_comparisons,
    unused_parens,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results,
    deprecated,
    unknown_lints,
    unreachable_code,
    unused_mut
)]

mod config;
mod error;
mod orchestrator;
mod pipeline;
mod provisioning;
mod sleeper;

/// Storage backends and the table level copy primitives
pub mod table;

/// Table setup utilities for testing
pub mod setup;

pub use config::CopyConfig;
pub use error::{Error, ErrorKind, Operation};
pub use orchestrator::{DynamoCopy, TableHandle};
pub use pipeline::{BatchSink, CopyPipeline};
pub use provisioning::{CapacityNegotiator, Provisioning, needs_update};
pub use sleeper::{MAX_JITTER_MS, NoDelaySleeper, RandomSleeper, Sleeper};
pub use table::{DynamoDbBackend, MemoryBackend, StorageBackend};

// Re-export aws-config types for configuration
pub use aws_config::{BehaviorVersion, Region, SdkConfig};

use aws_config::ConfigLoader;
use aws_config::sts::AssumeRoleProvider;
use aws_types::sdk_config::{RetryConfig, TimeoutConfig};
use std::time::Duration;

/// Load the AWS configuration used for one side of the copy
///
/// It configures:
/// - Adaptive retry mode with 3 max attempts
/// - Exponential backoff starting at 1 second
/// - Connect timeout: 3 seconds
/// - Read timeout: 20 seconds
/// - Operation timeout: 60 seconds
/// - The named credentials `profile`, when given
/// - Credentials of the assumed `role_arn`, when given, for cross-account copies
/// - LocalStack support via AWS_PROFILE=localstack
pub async fn aws_config_defaults(profile: Option<&str>, role_arn: Option<&str>) -> SdkConfig {
    let base = config_loader(profile).load().await;

    let Some(role_arn) = role_arn.filter(|role_arn| !role_arn.is_empty()) else {
        return base;
    };

    let credentials = AssumeRoleProvider::builder(role_arn)
        .session_name(ROLE_SESSION_NAME)
        .configure(&base)
        .build()
        .await;

    config_loader(profile)
        .credentials_provider(credentials)
        .load()
        .await
}

/// STS session name used when assuming a role
const ROLE_SESSION_NAME: &str = "dynamo-copy";

fn config_loader(profile: Option<&str>) -> ConfigLoader {
    let timeout_config = TimeoutConfig::builder()
        .connect_timeout(Duration::from_secs(3))
        .read_timeout(Duration::from_secs(20))
        .operation_timeout(Duration::from_secs(60))
        .build();

    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .retry_config(
            RetryConfig::adaptive()
                .with_max_attempts(3)
                .with_initial_backoff(Duration::from_secs(1)),
        )
        .timeout_config(timeout_config);

    if let Some(profile) = profile.filter(|profile| !profile.is_empty()) {
        loader = loader.profile_name(profile);
    }

    if std::env::var("AWS_PROFILE").unwrap_or_default() == "localstack" {
        loader = loader.endpoint_url("http://127.0.0.1:4566");
    }

    loader
}

/// [`DynamoDbBackend`] configured by [`aws_config_defaults`]
pub async fn dynamodb_backend(
    profile: Option<&str>,
    role_arn: Option<&str>,
) -> DynamoDbBackend {
    DynamoDbBackend::from_conf(&aws_config_defaults(profile, role_arn).await)
}
