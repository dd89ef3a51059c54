use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use collection::{channel::NativeMessagingChannel, dispatcher::SignalDispatcher};
use processing::{aggregate_writer::AggregateWriter, ProcessingModule, StoreCommand, StoreHandle};
use storage::{
    document_storage::{DocumentStorage, FileDocumentStorage},
    favicon::{DomainFavicon, DEFAULT_FAVICON_TEMPLATE},
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracking::{
    heartbeat::{HeartbeatAccumulator, DEFAULT_HEARTBEAT_PERIOD},
    tracker::ActivityTracker,
};

use crate::utils::clock::{Clock, DefaultClock};

pub mod args;
pub mod collection;
pub mod processing;
pub mod shutdown;
pub mod storage;
pub mod tracking;

const DEFAULT_IDLE_DETECTION: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct HostSettings {
    pub heartbeat: Duration,
    /// Only forwarded to the browser, which does the idle detection.
    pub idle_detection: Duration,
    pub favicon_template: String,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            heartbeat: DEFAULT_HEARTBEAT_PERIOD,
            idle_detection: DEFAULT_IDLE_DETECTION,
            favicon_template: DEFAULT_FAVICON_TEMPLATE.into(),
        }
    }
}

/// Represents the starting point for the host. Talks to the browser over stdin and stdout until
/// the browser goes away.
pub async fn start_daemon(dir: PathBuf, settings: HostSettings) -> Result<()> {
    let storage = Arc::new(FileDocumentStorage::new(dir.join("data"))?);
    let channel = NativeMessagingChannel::new(tokio::io::stdin(), tokio::io::stdout());

    run_host(channel, storage, Arc::new(DefaultClock), &settings).await
}

/// Wires the dispatcher, the heartbeat and the aggregate writer together and runs them until
/// shutdown. Both producers hold a [StoreHandle], so once they stop the writer drains what is
/// left in its queue and stops as well.
pub async fn run_host<S, R, W>(
    channel: NativeMessagingChannel<R, W>,
    storage: S,
    clock: Arc<dyn Clock>,
    settings: &HostSettings,
) -> Result<()>
where
    S: DocumentStorage + Clone,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!("Starting host with {:?}", settings);
    let shutdown_token = CancellationToken::new();
    let (sender, receiver) = mpsc::channel::<StoreCommand>(10);
    let store = StoreHandle::new(sender);

    let tracker = Arc::new(ActivityTracker::restore(storage.clone(), clock.clone()).await);

    let heartbeat = HeartbeatAccumulator::new(
        tracker.clone(),
        store.clone(),
        settings.heartbeat,
        shutdown_token.clone(),
        clock.clone(),
    );

    let dispatcher = SignalDispatcher::new(
        channel,
        tracker,
        store,
        storage.clone(),
        settings,
        shutdown_token.clone(),
        clock.clone(),
    );

    let processor = create_processor(storage, receiver, settings, clock);

    let (_, dispatch_result, heartbeat_result, processing_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token),
        dispatcher.run(),
        heartbeat.run(),
        processor.run(),
    );

    if let Err(dispatch_result) = dispatch_result {
        error!("Dispatcher got an error {:?}", dispatch_result);
    }

    if let Err(heartbeat_result) = heartbeat_result {
        error!("Heartbeat got an error {:?}", heartbeat_result);
    }

    if let Err(processing_result) = processing_result {
        error!("Processing module got an error {:?}", processing_result);
    }

    info!("Host stopped");
    Ok(())
}

pub fn create_processor<S: DocumentStorage>(
    storage: S,
    receiver: mpsc::Receiver<StoreCommand>,
    settings: &HostSettings,
    clock: Arc<dyn Clock>,
) -> ProcessingModule<AggregateWriter<S>> {
    let favicons = DomainFavicon::new(settings.favicon_template.clone());
    ProcessingModule::new(receiver, AggregateWriter::new(storage, Box::new(favicons), clock))
}
