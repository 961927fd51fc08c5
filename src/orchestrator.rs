//! Top-level copy: raise capacity, copy every item, restore capacity.

use futures_util::future::{join, try_join};
use std::sync::Arc;
use tracing::{info, warn};

use crate::Error;
use crate::config::CopyConfig;
use crate::pipeline::CopyPipeline;
use crate::provisioning::{CapacityNegotiator, Provisioning, needs_update};
use crate::sleeper::Sleeper;
use crate::table::{BatchWriter, Capacity, SegmentedReader, StorageBackend};

/// A table name together with the backend holding it
#[derive(Debug, Clone)]
pub struct TableHandle {
    backend: Arc<dyn StorageBackend>,
    name: String,
}

impl TableHandle {
    /// Table `name` stored in `backend`
    pub fn new(backend: Arc<dyn StorageBackend>, name: impl Into<String>) -> Self {
        Self {
            backend,
            name: name.into(),
        }
    }

    /// Table name
    pub fn name(&self) -> &str {
        &self.name
    }

    async fn capacity(&self) -> Result<Option<Capacity>, Error> {
        Ok(self.backend.describe_table(&self.name).await?.capacity)
    }
}

/// Copies a source table into a target table with temporarily raised capacity
#[derive(Debug, Clone)]
pub struct DynamoCopy {
    config: CopyConfig,
    source: TableHandle,
    target: TableHandle,
    sleeper: Arc<dyn Sleeper>,
}

impl DynamoCopy {
    /// Copy from `source` into `target`, backing off and polling through `sleeper`
    pub fn new(
        config: CopyConfig,
        source: TableHandle,
        target: TableHandle,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            config,
            source,
            target,
            sleeper,
        }
    }

    /// Current capacity of both tables
    pub async fn fetch_provisioning(&self) -> Result<Provisioning, Error> {
        let (source, target) = try_join(self.source.capacity(), self.target.capacity()).await?;
        Ok(Provisioning::new(source, target))
    }

    /// Raise each table to `requested` where that increases its capacity
    ///
    /// Both tables are negotiated to completion even when one of them fails,
    /// so neither is left mid-update. Returns the provisioning in effect
    /// afterwards.
    pub async fn update_provisioning(&self, requested: Provisioning) -> Result<Provisioning, Error> {
        let current = self.fetch_provisioning().await?;

        let outcomes = join(
            self.negotiate(&self.source, current.source, requested.source, needs_update),
            self.negotiate(&self.target, current.target, requested.target, needs_update),
        )
        .await;

        both_sides(outcomes)
    }

    /// Put each table back to `original` where its capacity differs
    pub async fn restore_provisioning(&self, original: Provisioning) -> Result<Provisioning, Error> {
        let current = self.fetch_provisioning().await?;

        let outcomes = join(
            self.negotiate(&self.source, current.source, original.source, |current, original| {
                current != original
            }),
            self.negotiate(&self.target, current.target, original.target, |current, original| {
                current != original
            }),
        )
        .await;

        both_sides(outcomes)
    }

    /// Copy every item with the given numbers of reader and writer tasks
    pub async fn copy(&self, reader_count: usize, writer_count: usize) -> Result<(), Error> {
        let pipeline = CopyPipeline::new(
            SegmentedReader::new(self.source.backend.clone(), self.source.name()),
            BatchWriter::new(
                self.target.backend.clone(),
                self.target.name(),
                self.sleeper.clone(),
            ),
        );

        pipeline.run(reader_count, writer_count).await
    }

    /// Raise capacity, copy, then restore the original capacity
    ///
    /// The restore is attempted even if raising capacity or copying failed.
    /// When both the copy and the restore fail, both errors are returned as
    /// [`Error::Restore`].
    pub async fn run(&self) -> Result<(), Error> {
        self.config.validate()?;

        let original = self.fetch_provisioning().await?;
        let elevated = self.config.provisioning(original);
        let (reader_count, writer_count) = self.config.workers();

        info!(
            source = self.source.name(),
            target = self.target.name(),
            ?original,
            ?elevated,
            "starting table copy"
        );

        let outcome = match self.update_provisioning(elevated).await {
            Ok(_) => self.copy(reader_count, writer_count).await,
            Err(err) => Err(err),
        };
        if let Err(err) = &outcome {
            warn!(error = %err, "copy failed, restoring original capacity");
        }

        let restored = self.restore_provisioning(original).await;

        match (outcome, restored) {
            (Ok(()), Ok(_)) => {
                info!(
                    source = self.source.name(),
                    target = self.target.name(),
                    "table copy finished"
                );
                Ok(())
            }
            (Ok(()), Err(restore)) => Err(restore),
            (Err(operation), Ok(_)) => Err(operation),
            (Err(operation), Err(restore)) => Err(Error::Restore {
                operation: Box::new(operation),
                restore: Box::new(restore),
            }),
        }
    }

    async fn negotiate(
        &self,
        table: &TableHandle,
        current: Option<Capacity>,
        desired: Option<Capacity>,
        should_apply: impl Fn(Capacity, Capacity) -> bool,
    ) -> Result<Option<Capacity>, Error> {
        match (current, desired) {
            (Some(current), Some(desired)) if should_apply(current, desired) => {
                CapacityNegotiator::new(table.backend.clone(), self.sleeper.clone())
                    .apply(table.name(), desired)
                    .await?;
                Ok(Some(desired))
            }
            (current, _) => Ok(current),
        }
    }
}

/// Source and target outcomes of one negotiation round
///
/// With two failures the source error is returned and the target one logged.
fn both_sides(
    outcomes: (Result<Option<Capacity>, Error>, Result<Option<Capacity>, Error>),
) -> Result<Provisioning, Error> {
    match outcomes {
        (Ok(source), Ok(target)) => Ok(Provisioning::new(source, target)),
        (Err(err), Ok(_)) | (Ok(_), Err(err)) => Err(err),
        (Err(source), Err(target)) => {
            warn!(error = %target, "target capacity change failed as well");
            Err(source)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sleeper::NoDelaySleeper;
    use crate::table::MemoryBackend;
    use crate::table::memory::WriteFault;
    use async_trait::async_trait;
    use aws_sdk_dynamodb::types::AttributeValue;
    use std::collections::HashMap;

    /// Sleeper that hands control back to the runtime on every sleep
    #[derive(Debug)]
    struct YieldingSleeper;

    #[async_trait]
    impl Sleeper for YieldingSleeper {
        async fn sleep(&self, millis: u64) -> u64 {
            tokio::task::yield_now().await;
            millis
        }
    }

    struct Fixture {
        source: Arc<MemoryBackend>,
        target: Arc<MemoryBackend>,
    }

    impl Fixture {
        fn new(source_capacity: Option<Capacity>, target_capacity: Option<Capacity>) -> Self {
            let source = MemoryBackend::new()
                .with_page_size(4)
                .with_table("src", "id", source_capacity)
                .with_settle_polls("src", 2);
            for i in 0..10 {
                source
                    .insert(
                        "src",
                        HashMap::from([("id".to_string(), AttributeValue::S(format!("id-{i}")))]),
                    )
                    .unwrap();
            }
            let target = MemoryBackend::new()
                .with_table("dst", "id", target_capacity)
                .with_settle_polls("dst", 1);

            Self {
                source: Arc::new(source),
                target: Arc::new(target),
            }
        }

        fn copy(&self, config: CopyConfig) -> DynamoCopy {
            DynamoCopy::new(
                config,
                TableHandle::new(self.source.clone(), "src"),
                TableHandle::new(self.target.clone(), "dst"),
                Arc::new(NoDelaySleeper::new()),
            )
        }
    }

    #[tokio::test]
    async fn test_fetch_provisioning() {
        let fixture = Fixture::new(Some(Capacity::new(5, 6)), None);

        let provisioning = fixture
            .copy(CopyConfig::new(0, 0, 1, 1))
            .fetch_provisioning()
            .await
            .unwrap();

        assert_eq!(provisioning, Provisioning::new(Some(Capacity::new(5, 6)), None));
    }

    #[tokio::test]
    async fn test_update_provisioning_only_raises() {
        let fixture = Fixture::new(Some(Capacity::new(5, 5)), Some(Capacity::new(5, 5)));
        let copy = fixture.copy(CopyConfig::new(0, 0, 1, 1));

        let updated = copy
            .update_provisioning(Provisioning::new(
                Some(Capacity::new(50, 5)),
                Some(Capacity::new(1, 1)),
            ))
            .await
            .unwrap();

        assert_eq!(
            updated,
            Provisioning::new(Some(Capacity::new(50, 5)), Some(Capacity::new(5, 5)))
        );
        assert_eq!(fixture.source.capacity_updates().len(), 1);
        assert!(fixture.target.capacity_updates().is_empty());
    }

    #[tokio::test]
    async fn test_restore_provisioning_lowers_changed_tables() {
        let fixture = Fixture::new(Some(Capacity::new(50, 5)), Some(Capacity::new(5, 5)));
        let copy = fixture.copy(CopyConfig::new(0, 0, 1, 1));

        let restored = copy
            .restore_provisioning(Provisioning::new(
                Some(Capacity::new(5, 5)),
                Some(Capacity::new(5, 5)),
            ))
            .await
            .unwrap();

        assert_eq!(
            restored,
            Provisioning::new(Some(Capacity::new(5, 5)), Some(Capacity::new(5, 5)))
        );
        assert_eq!(
            fixture.source.capacity_updates(),
            vec![("src".to_string(), Capacity::new(5, 5))]
        );
        assert!(fixture.target.capacity_updates().is_empty());
    }

    #[tokio::test]
    async fn test_run_raises_copies_and_restores() {
        let fixture = Fixture::new(Some(Capacity::new(5, 5)), Some(Capacity::new(5, 5)));

        fixture
            .copy(CopyConfig::new(100, 200, 2, 2))
            .run()
            .await
            .unwrap();

        assert_eq!(fixture.target.items("dst"), fixture.source.items("src"));
        assert_eq!(
            fixture.source.capacity_updates(),
            vec![
                ("src".to_string(), Capacity::new(100, 5)),
                ("src".to_string(), Capacity::new(5, 5)),
            ]
        );
        assert_eq!(
            fixture.target.capacity_updates(),
            vec![
                ("dst".to_string(), Capacity::new(5, 200)),
                ("dst".to_string(), Capacity::new(5, 5)),
            ]
        );
    }

    #[tokio::test]
    async fn test_run_leaves_on_demand_tables_alone() {
        let fixture = Fixture::new(None, None);

        fixture
            .copy(CopyConfig::new(100, 200, 1, 1))
            .run()
            .await
            .unwrap();

        assert_eq!(fixture.target.len("dst"), 10);
        assert!(fixture.source.capacity_updates().is_empty());
        assert!(fixture.target.capacity_updates().is_empty());
    }

    #[tokio::test]
    async fn test_copy_failure_still_restores() {
        let fixture = Fixture::new(Some(Capacity::new(5, 5)), Some(Capacity::new(5, 5)));
        fixture
            .target
            .fail_writes_always(WriteFault::Fatal("item too large".into()));

        let err = fixture
            .copy(CopyConfig::new(100, 200, 1, 1))
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Backend { .. }));
        assert!(err.to_string().contains("item too large"));
        assert_eq!(fixture.source.capacity("src"), Some(Capacity::new(5, 5)));
        assert_eq!(fixture.target.capacity("dst"), Some(Capacity::new(5, 5)));
    }

    #[tokio::test]
    async fn test_elevate_failure_skips_copy_and_restores() {
        let fixture = Fixture::new(Some(Capacity::new(5, 5)), Some(Capacity::new(5, 5)));
        fixture.target.fail_capacity_update("dst");

        let err = fixture
            .copy(CopyConfig::new(100, 200, 1, 1))
            .run()
            .await
            .unwrap_err();

        assert!(err.to_string().contains("UpdateTable"));
        assert!(fixture.target.is_empty("dst"));
        assert_eq!(fixture.source.capacity("src"), Some(Capacity::new(5, 5)));
    }

    #[tokio::test]
    async fn test_copy_and_restore_failures_are_both_reported() {
        let fixture = Fixture::new(Some(Capacity::new(5, 5)), Some(Capacity::new(5, 5)));
        fixture
            .target
            .fail_writes_always(WriteFault::Fatal("item too large".into()));
        fixture.source.fail_capacity_update_after("src", 1);

        let err = fixture
            .copy(CopyConfig::new(100, 0, 1, 1))
            .run()
            .await
            .unwrap_err();

        let (operation, restore) = match err {
            Error::Restore { operation, restore } => (operation, restore),
            other => panic!("expected a restore error, got {other:?}"),
        };
        assert!(operation.to_string().contains("item too large"));
        assert!(restore.to_string().contains("UpdateTable"));
        assert_eq!(fixture.source.capacity("src"), Some(Capacity::new(100, 5)));
    }

    #[tokio::test]
    async fn test_failed_elevation_lets_other_table_settle() {
        let source = Arc::new(
            MemoryBackend::new()
                .with_table("src", "id", Some(Capacity::new(5, 5)))
                .with_settle_polls("src", 5),
        );
        let target =
            Arc::new(MemoryBackend::new().with_table("dst", "id", Some(Capacity::new(5, 5))));
        target.fail_capacity_update("dst");
        let copy = DynamoCopy::new(
            CopyConfig::new(100, 200, 1, 1),
            TableHandle::new(source.clone(), "src"),
            TableHandle::new(target.clone(), "dst"),
            Arc::new(YieldingSleeper),
        );

        let err = copy
            .update_provisioning(Provisioning::new(
                Some(Capacity::new(100, 5)),
                Some(Capacity::new(5, 200)),
            ))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("UpdateTable failed on table dst"));

        // One fetch, then five polls while updating and one once active
        assert_eq!(source.describe_calls(), 7);
        let description = source.describe_table("src").await.unwrap();
        assert!(description.status.is_active());
        assert_eq!(description.capacity, Some(Capacity::new(100, 5)));
    }

    #[tokio::test]
    async fn test_failed_elevation_restores_the_raised_table() {
        let source = Arc::new(
            MemoryBackend::new()
                .with_table("src", "id", Some(Capacity::new(5, 5)))
                .with_settle_polls("src", 5),
        );
        let target =
            Arc::new(MemoryBackend::new().with_table("dst", "id", Some(Capacity::new(5, 5))));
        target.fail_capacity_update("dst");

        let err = DynamoCopy::new(
            CopyConfig::new(100, 200, 1, 1),
            TableHandle::new(source.clone(), "src"),
            TableHandle::new(target.clone(), "dst"),
            Arc::new(YieldingSleeper),
        )
        .run()
        .await
        .unwrap_err();

        assert!(err.to_string().contains("UpdateTable"));
        assert!(target.is_empty("dst"));
        assert_eq!(
            source.capacity_updates(),
            vec![
                ("src".to_string(), Capacity::new(100, 5)),
                ("src".to_string(), Capacity::new(5, 5)),
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_workers_leave_capacity_untouched() {
        let fixture = Fixture::new(Some(Capacity::new(5, 5)), Some(Capacity::new(5, 5)));

        let err = fixture
            .copy(CopyConfig::new(100, 200, 0, 1))
            .run()
            .await
            .unwrap_err();

        assert!(err.is_validation());
        assert_eq!(fixture.source.describe_calls(), 0);
        assert!(fixture.source.capacity_updates().is_empty());
        assert!(fixture.target.capacity_updates().is_empty());
    }
}
