use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, instrument};

use crate::{
    daemon::storage::{
        document_storage::{save_document, update_document, DocumentStorage},
        entities::AggregateData,
        favicon::FaviconLookup,
        AGGREGATE_KEY,
    },
    domain::is_trackable,
    utils::clock::Clock,
};

use super::{module::EventProcessor, StoreOp};

/// Bridges [ProcessingModule](super::ProcessingModule) and [DocumentStorage]. Each operation
/// reads the current aggregate document, applies the change and writes the whole document back
/// under the storage's update lock. Nothing is cached between operations, so a failed write costs
/// only that operation.
pub struct AggregateWriter<S> {
    storage: S,
    favicons: Box<dyn FaviconLookup>,
    clock: Arc<dyn Clock>,
}

impl<S: DocumentStorage> AggregateWriter<S> {
    pub fn new(storage: S, favicons: Box<dyn FaviconLookup>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            favicons,
            clock,
        }
    }
}

impl<S: DocumentStorage> EventProcessor for AggregateWriter<S> {
    #[instrument(skip_all, fields(kind = operation.kind()))]
    async fn process_next(&mut self, operation: StoreOp) -> Result<()> {
        let now = self.clock.time();
        let favicons = &*self.favicons;
        match operation {
            StoreOp::ApplyTimeDelta {
                domain,
                amount,
                day,
                hour,
            } => {
                if !is_trackable(Some(&domain)) {
                    debug!("Skipping time for untrackable {domain}");
                    return Ok(());
                }
                update_document(&self.storage, AGGREGATE_KEY, |data: &mut AggregateData| {
                    data.apply_time_delta(&domain, amount, day, hour, now, favicons)
                })
                .await
            }
            StoreOp::RecordVisit { domain, day } => {
                if !is_trackable(Some(&domain)) {
                    debug!("Skipping visit to untrackable {domain}");
                    return Ok(());
                }
                update_document(&self.storage, AGGREGATE_KEY, |data: &mut AggregateData| {
                    data.record_visit(&domain, day, now, favicons);
                    Ok(())
                })
                .await
            }
            StoreOp::ClearAll => {
                save_document(&self.storage, AGGREGATE_KEY, &AggregateData::cleared(now)).await
            }
            StoreOp::Import(export) => {
                let data = AggregateData::from_export(export.data, now);
                save_document(&self.storage, AGGREGATE_KEY, &data).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use chrono::{NaiveDate, TimeDelta};
    use futures::future::join_all;
    use serde_json::json;
    use tempfile::tempdir;
    use tokio::sync::mpsc;

    use crate::{
        daemon::{
            processing::{ProcessingModule, StoreHandle, StoreOp},
            storage::{
                document_storage::{
                    load_document, save_document,
                    test_storages::{FlakyDocumentStorage, MemoryDocumentStorage},
                    DocumentStorage, FileDocumentStorage,
                },
                entities::{
                    tests::assert_consistent, ActivityState, AggregateData, ExportEnvelope,
                },
                favicon::DomainFavicon,
                AGGREGATE_KEY, TRACKING_KEY,
            },
        },
        domain::TrackedDomain,
        utils::clock::test_clocks::{test_start, ManualClock},
    };

    use super::AggregateWriter;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2018, 7, 4).unwrap()
    }

    fn module<S: DocumentStorage>(
        storage: S,
    ) -> (StoreHandle, ProcessingModule<AggregateWriter<S>>, ManualClock) {
        let clock = ManualClock::new(test_start());
        let (sender, receiver) = mpsc::channel(4);
        let writer = AggregateWriter::new(
            storage,
            Box::new(DomainFavicon::default()),
            Arc::new(clock.clone()),
        );
        (
            StoreHandle::new(sender),
            ProcessingModule::new(receiver, writer),
            clock,
        )
    }

    #[tokio::test]
    async fn test_concurrent_visits_are_not_lost() -> Result<()> {
        let storage = Arc::new(MemoryDocumentStorage::default());
        let (store, processor, _) = module(storage.clone());
        let domain = TrackedDomain::from("a.com");

        let (results, processed) = tokio::join!(
            async move {
                let first = store.clone();
                let second = store.clone();
                let submissions = vec![
                    first.record_visit(domain.clone(), day()),
                    second.record_visit(domain.clone(), day()),
                    store.record_visit(domain.clone(), day()),
                ];
                join_all(submissions).await
            },
            processor.run()
        );
        processed?;
        for result in results {
            result?;
        }

        let data: AggregateData = load_document(&storage, AGGREGATE_KEY).await?;
        let a = TrackedDomain::from("a.com");
        assert_eq!(data.sites[&a].visit_count, 3);
        assert_eq!(data.daily_stats[&day()][&a].visit_count, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_interleaved_time_and_visits() -> Result<()> {
        let storage = Arc::new(MemoryDocumentStorage::default());
        let (store, processor, _) = module(storage.clone());
        let a = TrackedDomain::from("a.com");
        let b = TrackedDomain::from("b.com");

        let (results, processed) = tokio::join!(
            {
                let (a, b) = (a.clone(), b.clone());
                async move {
                    let time = |domain: &TrackedDomain, seconds, hour| StoreOp::ApplyTimeDelta {
                        domain: domain.clone(),
                        amount: TimeDelta::seconds(seconds),
                        day: day(),
                        hour,
                    };
                    let visit = |domain: &TrackedDomain| StoreOp::RecordVisit {
                        domain: domain.clone(),
                        day: day(),
                    };
                    let operations = vec![
                        time(&a, 30, 9),
                        visit(&b),
                        time(&b, 12, 9),
                        time(&a, 30, 10),
                        visit(&a),
                    ];
                    join_all(operations.into_iter().map(|op| store.submit(op))).await
                }
            },
            processor.run()
        );
        processed?;
        for result in results {
            result?;
        }

        let data: AggregateData = load_document(&storage, AGGREGATE_KEY).await?;
        assert_eq!(data.sites[&a].total_time, TimeDelta::seconds(60));
        assert_eq!(data.sites[&a].visit_count, 1);
        assert_eq!(data.sites[&b].total_time, TimeDelta::seconds(12));
        assert_eq!(data.hourly_stats[&day()][&9u32].time, TimeDelta::seconds(42));
        assert_eq!(data.last_updated, Some(test_start()));
        assert_consistent(&data);
        Ok(())
    }

    #[tokio::test]
    async fn test_untrackable_domains_are_skipped() -> Result<()> {
        let storage = Arc::new(MemoryDocumentStorage::default());
        let (store, processor, _) = module(storage.clone());

        let (result, processed) = tokio::join!(
            async move {
                store
                    .record_visit(TrackedDomain::from("printer.local"), day())
                    .await
            },
            processor.run()
        );
        result?;
        processed?;
        assert_eq!(storage.get(AGGREGATE_KEY).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_clear_all_keeps_tracking_state() -> Result<()> {
        let storage = Arc::new(MemoryDocumentStorage::default());
        let tracking = ActivityState {
            current_domain_url: Some("https://a.com".into()),
            last_sample_timestamp: Some(test_start()),
            user_present: true,
            active_tab_id: None,
        };
        save_document(&storage, TRACKING_KEY, &tracking).await?;
        let (store, processor, clock) = module(storage.clone());

        let (result, processed) = tokio::join!(
            async move {
                store
                    .record_visit(TrackedDomain::from("a.com"), day())
                    .await?;
                clock.advance(TimeDelta::minutes(5));
                store.clear_all().await
            },
            processor.run()
        );
        result?;
        processed?;

        let data: AggregateData = load_document(&storage, AGGREGATE_KEY).await?;
        assert!(data.sites.is_empty());
        assert!(data.daily_stats.is_empty());
        assert!(data.hourly_stats.is_empty());
        assert_eq!(data.last_updated, Some(test_start() + TimeDelta::minutes(5)));

        let restored: ActivityState = load_document(&storage, TRACKING_KEY).await?;
        assert_eq!(restored, tracking);
        Ok(())
    }

    #[tokio::test]
    async fn test_import_replaces_contents() -> Result<()> {
        let storage = Arc::new(MemoryDocumentStorage::default());
        let mut exported = AggregateData::default();
        exported.apply_time_delta(
            &TrackedDomain::from("b.com"),
            TimeDelta::seconds(90),
            day(),
            11,
            test_start(),
            &DomainFavicon::default(),
        )?;
        let envelope = ExportEnvelope::new(exported.clone(), test_start());
        let (store, processor, _) = module(storage.clone());

        let (result, processed) = tokio::join!(
            async move {
                store
                    .record_visit(TrackedDomain::from("a.com"), day())
                    .await?;
                store.import(envelope).await
            },
            processor.run()
        );
        result?;
        processed?;

        let data: AggregateData = load_document(&storage, AGGREGATE_KEY).await?;
        assert_eq!(data.sites, exported.sites);
        assert_eq!(data.daily_stats, exported.daily_stats);
        assert_eq!(data.hourly_stats, exported.hourly_stats);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_write_is_reported_and_writer_continues() -> Result<()> {
        let storage = Arc::new(FlakyDocumentStorage::default());
        let (store, processor, _) = module(storage.clone());
        let a = TrackedDomain::from("a.com");

        let flaky = storage.clone();
        let (results, processed) = tokio::join!(
            async move {
                flaky.set_failing(true);
                let failed = store.record_visit(a.clone(), day()).await;
                flaky.set_failing(false);
                let succeeded = store.record_visit(a.clone(), day()).await;
                (failed, succeeded)
            },
            processor.run()
        );
        processed?;
        assert!(results.0.is_err());
        results.1?;

        let data: AggregateData = load_document(&storage, AGGREGATE_KEY).await?;
        assert_eq!(data.sites[&TrackedDomain::from("a.com")].visit_count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_aggregate_is_not_overwritten() -> Result<()> {
        let storage = Arc::new(MemoryDocumentStorage::default());
        storage.set(AGGREGATE_KEY, json!({"sites": []})).await?;
        let (store, processor, _) = module(storage.clone());

        let (result, processed) = tokio::join!(
            async move {
                store
                    .record_visit(TrackedDomain::from("a.com"), day())
                    .await
            },
            processor.run()
        );
        processed?;
        assert!(result.is_err());
        assert_eq!(
            storage.get(AGGREGATE_KEY).await?,
            Some(json!({"sites": []}))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_writers_sharing_a_directory_do_not_lose_updates() -> Result<()> {
        let dir = tempdir()?;
        let (host, host_processor, _) = module(FileDocumentStorage::new(dir.path().to_owned())?);
        let (cli, cli_processor, _) = module(FileDocumentStorage::new(dir.path().to_owned())?);
        let a = TrackedDomain::from("a.com");

        let visits = |store: StoreHandle, domain: TrackedDomain| async move {
            for _ in 0..10 {
                store.record_visit(domain.clone(), day()).await?;
            }
            anyhow::Ok(())
        };
        let (host_visits, cli_visits, host_processed, cli_processed) = tokio::join!(
            visits(host, a.clone()),
            visits(cli, a.clone()),
            host_processor.run(),
            cli_processor.run()
        );
        host_visits?;
        cli_visits?;
        host_processed?;
        cli_processed?;

        let storage = FileDocumentStorage::new(dir.path().to_owned())?;
        let data: AggregateData = load_document(&storage, AGGREGATE_KEY).await?;
        assert_eq!(data.sites[&a].visit_count, 20);
        assert_eq!(data.daily_stats[&day()][&a].visit_count, 20);
        Ok(())
    }

    #[tokio::test]
    async fn test_overflowing_time_is_reported() -> Result<()> {
        let storage = Arc::new(MemoryDocumentStorage::default());
        let stored = json!({
            "sites": {
                "a.com": {
                    "totalTime": i64::MAX,
                    "visitCount": 3,
                    "firstSeen": "2018-07-04T00:00:00Z"
                }
            }
        });
        storage.set(AGGREGATE_KEY, stored).await?;
        let (store, processor, _) = module(storage.clone());

        let ((overflowed, visited), processed) = tokio::join!(
            async move {
                let overflowed = store
                    .apply_time_delta(TrackedDomain::from("a.com"), TimeDelta::seconds(30), day(), 9)
                    .await;
                let visited = store.record_visit(TrackedDomain::from("b.com"), day()).await;
                (overflowed, visited)
            },
            processor.run()
        );
        processed?;
        assert!(overflowed.is_err());
        visited?;

        let data: AggregateData = load_document(&storage, AGGREGATE_KEY).await?;
        assert_eq!(data.sites[&TrackedDomain::from("a.com")].visit_count, 3);
        assert_eq!(data.sites[&TrackedDomain::from("b.com")].visit_count, 1);
        assert!(data.hourly_stats.is_empty());
        Ok(())
    }
}
