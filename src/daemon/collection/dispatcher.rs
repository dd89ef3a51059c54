use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::{
    daemon::{
        processing::StoreHandle,
        storage::{
            document_storage::{load_document, DocumentStorage},
            entities::{AggregateData, ExportEnvelope},
            AGGREGATE_KEY,
        },
        tracking::tracker::ActivityTracker,
        HostSettings,
    },
    domain::trackable_domain,
    utils::{clock::Clock, time::local_bucket},
};

use super::{
    channel::NativeMessagingChannel,
    signal::{HostMessage, HostReply},
};

/// Turns browser messages into tracker updates and store operations, and answers queries.
/// Messages are handled one at a time in arrival order.
pub struct SignalDispatcher<S, R, W> {
    channel: NativeMessagingChannel<R, W>,
    tracker: Arc<ActivityTracker<S>>,
    store: StoreHandle,
    storage: S,
    hello: HostReply,
    shutdown: CancellationToken,
    clock: Arc<dyn Clock>,
}

impl<S, R, W> SignalDispatcher<S, R, W>
where
    S: DocumentStorage,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(
        channel: NativeMessagingChannel<R, W>,
        tracker: Arc<ActivityTracker<S>>,
        store: StoreHandle,
        storage: S,
        settings: &HostSettings,
        shutdown: CancellationToken,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            channel,
            tracker,
            store,
            storage,
            hello: HostReply::Hello {
                version: env!("CARGO_PKG_VERSION").into(),
                heartbeat_secs: settings.heartbeat.as_secs(),
                idle_detection_secs: settings.idle_detection.as_secs(),
            },
            shutdown,
            clock,
        }
    }

    /// Executes the message loop. The browser closing the channel shuts the whole host down.
    pub async fn run(mut self) -> Result<()> {
        let hello = self.hello.clone();
        self.channel.send(&hello).await?;

        loop {
            let message = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                message = self.channel.recv() => message
            };

            match message {
                Ok(Some(message)) => {
                    let span = info_span!("Handling message", kind = message.name());
                    if let Err(e) = self.handle(message).instrument(span).await {
                        error!("Failed to reply to the browser {e:?}");
                        self.shutdown.cancel();
                        return Err(e);
                    }
                }
                Ok(None) => {
                    info!("Browser closed the channel");
                    self.shutdown.cancel();
                    return Ok(());
                }
                Err(e) => {
                    error!("Channel to the browser failed {e:?}");
                    self.shutdown.cancel();
                    return Err(e);
                }
            }
        }
    }

    /// Applies a message. Only a failure to talk back to the browser is returned as an error.
    async fn handle(&mut self, message: HostMessage) -> Result<()> {
        let operation = message.name();
        match message {
            HostMessage::TabActivated { url, tab_id } => {
                self.tracker.set_active_resource(url, tab_id).await;
            }
            HostMessage::TabNavigated { tab_id, url } => {
                if let Some(domain) = trackable_domain(&url) {
                    let (day, _) = local_bucket(self.clock.time());
                    if let Err(e) = self.store.record_visit(domain, day).await {
                        error!("Failed to record visit {e:?}");
                    }
                }
                self.tracker.navigate(tab_id, url).await;
            }
            HostMessage::WindowFocusChanged {
                has_focus,
                url,
                tab_id,
            } => {
                self.tracker.set_window_focus(has_focus, url, tab_id).await;
            }
            HostMessage::PresenceChanged { state } => {
                self.tracker.set_presence(state.is_present()).await;
            }
            HostMessage::GetStatus => {
                let state = self.tracker.snapshot().await;
                self.channel.send(&HostReply::Status { state }).await?;
            }
            HostMessage::GetData => {
                let reply = match self.load_aggregate().await {
                    Ok(data) => HostReply::Data { data },
                    Err(e) => failure(operation, e),
                };
                self.channel.send(&reply).await?;
            }
            HostMessage::Export => {
                let reply = match self.load_aggregate().await {
                    Ok(data) => HostReply::Export {
                        export: ExportEnvelope::new(data, self.clock.time()),
                    },
                    Err(e) => failure(operation, e),
                };
                self.channel.send(&reply).await?;
            }
            HostMessage::Import { export } => {
                let result = match serde_json::from_value::<ExportEnvelope>(export) {
                    Ok(export) => self.store.import(export).await,
                    Err(e) => Err(anyhow::Error::new(e).context("Export isn't readable")),
                };
                self.acknowledge(operation, result).await?;
            }
            HostMessage::ClearAll => {
                let result = self.store.clear_all().await;
                self.acknowledge(operation, result).await?;
            }
        }
        Ok(())
    }

    async fn load_aggregate(&self) -> Result<AggregateData> {
        load_document(&self.storage, AGGREGATE_KEY).await
    }

    async fn acknowledge(&mut self, operation: &str, result: Result<()>) -> Result<()> {
        let reply = match result {
            Ok(()) => HostReply::Ack {
                operation: operation.into(),
            },
            Err(e) => failure(operation, e),
        };
        self.channel.send(&reply).await
    }
}

fn failure(operation: &str, e: anyhow::Error) -> HostReply {
    warn!("Operation {operation} failed {e:?}");
    HostReply::Error {
        operation: operation.into(),
        message: format!("{e:#}"),
    }
}
