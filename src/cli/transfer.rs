use std::{path::Path, sync::Arc};

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc;
use tracing::info;

use crate::{
    daemon::{
        create_processor,
        processing::{StoreHandle, StoreOp},
        storage::{
            document_storage::{load_document, DocumentStorage},
            entities::{ActivityState, AggregateData, ExportEnvelope},
            AGGREGATE_KEY, TRACKING_KEY,
        },
        HostSettings,
    },
    utils::clock::Clock,
};

/// Runs a single operation through the same writer the host uses. A host running at the same
/// time keeps its own queue, the file lock only keeps the two from interleaving a replace.
async fn apply_offline<S: DocumentStorage>(
    storage: S,
    operation: StoreOp,
    clock: Arc<dyn Clock>,
) -> Result<()> {
    let (sender, receiver) = mpsc::channel(1);
    let store = StoreHandle::new(sender);
    let processor = create_processor(storage, receiver, &HostSettings::default(), clock);

    let (result, processed) = tokio::join!(
        async move { store.submit(operation).await },
        processor.run()
    );
    processed?;
    result
}

pub async fn export_data(
    storage: &impl DocumentStorage,
    clock: &dyn Clock,
) -> Result<ExportEnvelope> {
    let data: AggregateData = load_document(storage, AGGREGATE_KEY).await?;
    Ok(ExportEnvelope::new(data, clock.time()))
}

/// Writes the export to `output`, or to stdout when there is none.
pub async fn process_export_command(
    storage: &impl DocumentStorage,
    output: Option<&Path>,
    clock: &dyn Clock,
) -> Result<()> {
    let envelope = export_data(storage, clock).await?;
    let contents = serde_json::to_string_pretty(&envelope)?;
    match output {
        Some(output) => {
            tokio::fs::write(output, contents.as_bytes())
                .await
                .with_context(|| format!("Failed to write export to {output:?}"))?;
            info!("Exported {} sites to {output:?}", envelope.data.sites.len());
        }
        None => println!("{contents}"),
    }
    Ok(())
}

/// Replaces all statistics with the contents of an export file.
pub async fn process_import_command<S: DocumentStorage>(
    storage: S,
    file: &Path,
    clock: Arc<dyn Clock>,
) -> Result<()> {
    let contents = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {file:?}"))?;
    let envelope: ExportEnvelope = serde_json::from_slice(&contents)
        .with_context(|| format!("File {file:?} isn't an export"))?;
    let sites = envelope.data.sites.len();

    apply_offline(storage, StoreOp::Import(Box::new(envelope)), clock).await?;
    println!("Imported {sites} sites");
    Ok(())
}

pub async fn process_clear_command<S: DocumentStorage>(
    storage: S,
    confirmed: bool,
    clock: Arc<dyn Clock>,
) -> Result<()> {
    if !confirmed {
        bail!("Clearing removes all collected statistics, pass --yes to confirm");
    }
    apply_offline(storage, StoreOp::ClearAll, clock).await?;
    println!("Cleared all statistics");
    Ok(())
}

/// Prints what the host currently believes is being viewed.
pub async fn process_status_command(storage: &impl DocumentStorage) -> Result<()> {
    let state: ActivityState = load_document(storage, TRACKING_KEY).await?;
    let data: AggregateData = load_document(storage, AGGREGATE_KEY).await?;

    println!(
        "Viewing\t{}",
        state.current_domain_url.as_deref().unwrap_or("nothing")
    );
    if let Some(tab) = state.active_tab_id {
        println!("Tab\t{tab}");
    }
    println!(
        "Present\t{}",
        if state.user_present { "yes" } else { "no" }
    );
    match state.last_sample_timestamp {
        Some(sample) => println!("Sampled\t{}", sample.to_rfc3339()),
        None => println!("Sampled\tnever"),
    }
    match data.last_updated {
        Some(updated) => println!("Updated\t{}", updated.to_rfc3339()),
        None => println!("Updated\tnever"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use chrono::{NaiveDate, TimeDelta};
    use tempfile::tempdir;

    use crate::{
        daemon::storage::{
            document_storage::{load_document, save_document, FileDocumentStorage},
            entities::{AggregateData, ExportEnvelope},
            favicon::DomainFavicon,
            AGGREGATE_KEY,
        },
        domain::TrackedDomain,
        utils::clock::test_clocks::{test_start, ManualClock},
    };

    use super::{
        export_data, process_clear_command, process_export_command, process_import_command,
        process_status_command,
    };

    fn sample() -> AggregateData {
        let mut data = AggregateData::default();
        data.apply_time_delta(
            &TrackedDomain::from("a.com"),
            TimeDelta::seconds(42),
            NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(),
            11,
            test_start(),
            &DomainFavicon::default(),
        )
        .unwrap();
        data
    }

    #[tokio::test]
    async fn test_export_then_import_into_another_profile() -> Result<()> {
        let dir = tempdir()?;
        let clock = ManualClock::new(test_start());
        let source = FileDocumentStorage::new(dir.path().join("source"))?;
        save_document(&source, AGGREGATE_KEY, &sample()).await?;

        let export_file = dir.path().join("export.json");
        process_export_command(&source, Some(export_file.as_path()), &clock).await?;
        let envelope: ExportEnvelope = serde_json::from_slice(&std::fs::read(&export_file)?)?;
        assert_eq!(envelope.export_date, test_start());

        let target = Arc::new(FileDocumentStorage::new(dir.path().join("target"))?);
        clock.advance(TimeDelta::hours(2));
        process_import_command(target.clone(), &export_file, Arc::new(clock.clone())).await?;

        let imported: AggregateData = load_document(&target, AGGREGATE_KEY).await?;
        let original = sample();
        assert_eq!(imported.sites, original.sites);
        assert_eq!(imported.daily_stats, original.daily_stats);
        assert_eq!(imported.hourly_stats, original.hourly_stats);
        assert_eq!(imported.last_updated, Some(test_start() + TimeDelta::hours(2)));
        Ok(())
    }

    #[tokio::test]
    async fn test_import_rejects_other_files() -> Result<()> {
        let dir = tempdir()?;
        let storage = Arc::new(FileDocumentStorage::new(dir.path().join("data"))?);
        save_document(&storage, AGGREGATE_KEY, &sample()).await?;
        let file = dir.path().join("notes.json");
        std::fs::write(&file, r#"{"hello": "world"}"#)?;

        let clock = Arc::new(ManualClock::new(test_start()));
        assert!(process_import_command(storage.clone(), &file, clock).await.is_err());

        let data: AggregateData = load_document(&storage, AGGREGATE_KEY).await?;
        assert_eq!(data, sample());
        Ok(())
    }

    #[tokio::test]
    async fn test_clear_requires_confirmation() -> Result<()> {
        let dir = tempdir()?;
        let storage = Arc::new(FileDocumentStorage::new(dir.path().to_owned())?);
        save_document(&storage, AGGREGATE_KEY, &sample()).await?;
        let clock = ManualClock::new(test_start());

        assert!(
            process_clear_command(storage.clone(), false, Arc::new(clock.clone()))
                .await
                .is_err()
        );
        let data: AggregateData = load_document(&storage, AGGREGATE_KEY).await?;
        assert_eq!(data.sites.len(), 1);

        process_clear_command(storage.clone(), true, Arc::new(clock.clone())).await?;
        let data: AggregateData = load_document(&storage, AGGREGATE_KEY).await?;
        assert!(data.sites.is_empty());
        assert_eq!(export_data(&storage, &clock).await?.data.sites.len(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_status_on_fresh_directory() -> Result<()> {
        let dir = tempdir()?;
        let storage = FileDocumentStorage::new(dir.path().to_owned())?;
        process_status_command(&storage).await
    }
}
