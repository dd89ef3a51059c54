use anyhow::{anyhow, Result};
use chrono::{NaiveDate, TimeDelta};
use module::EventProcessor;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::domain::TrackedDomain;

use super::storage::entities::ExportEnvelope;

pub mod aggregate_writer;
pub mod module;

/// A write against the aggregate document.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
    ApplyTimeDelta {
        domain: TrackedDomain,
        amount: TimeDelta,
        day: NaiveDate,
        hour: u32,
    },
    RecordVisit {
        domain: TrackedDomain,
        day: NaiveDate,
    },
    ClearAll,
    Import(Box<ExportEnvelope>),
}

impl StoreOp {
    pub fn kind(&self) -> &'static str {
        match self {
            StoreOp::ApplyTimeDelta { .. } => "apply time delta",
            StoreOp::RecordVisit { .. } => "record visit",
            StoreOp::ClearAll => "clear all",
            StoreOp::Import(_) => "import",
        }
    }
}

pub struct StoreCommand {
    pub operation: StoreOp,
    pub completion: oneshot::Sender<Result<()>>,
}

/// Submits operations to the aggregate writer and waits for them to be committed. Cloned into
/// every component that writes statistics; the writer stops once all handles are dropped.
#[derive(Clone)]
pub struct StoreHandle {
    sender: mpsc::Sender<StoreCommand>,
}

impl StoreHandle {
    pub fn new(sender: mpsc::Sender<StoreCommand>) -> Self {
        Self { sender }
    }

    /// Resolves once the operation is written, with the outcome of the write.
    pub async fn submit(&self, operation: StoreOp) -> Result<()> {
        let (completion, done) = oneshot::channel();
        self.sender
            .send(StoreCommand {
                operation,
                completion,
            })
            .await
            .map_err(|_| anyhow!("Aggregate writer is no longer running"))?;
        done.await
            .map_err(|_| anyhow!("Aggregate writer stopped before committing"))?
    }

    pub async fn apply_time_delta(
        &self,
        domain: TrackedDomain,
        amount: TimeDelta,
        day: NaiveDate,
        hour: u32,
    ) -> Result<()> {
        self.submit(StoreOp::ApplyTimeDelta {
            domain,
            amount,
            day,
            hour,
        })
        .await
    }

    pub async fn record_visit(&self, domain: TrackedDomain, day: NaiveDate) -> Result<()> {
        self.submit(StoreOp::RecordVisit { domain, day }).await
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.submit(StoreOp::ClearAll).await
    }

    pub async fn import(&self, export: ExportEnvelope) -> Result<()> {
        self.submit(StoreOp::Import(Box::new(export))).await
    }
}

/// Represents the single writer of aggregate data. Operations from all handles are queued and
/// applied strictly one after another, so two read-modify-write cycles never overlap.
pub struct ProcessingModule<Processor> {
    receiver: mpsc::Receiver<StoreCommand>,
    processor: Processor,
}

impl<P: EventProcessor> ProcessingModule<P> {
    pub fn new(receiver: mpsc::Receiver<StoreCommand>, processor: P) -> Self {
        Self {
            receiver,
            processor,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        while let Some(StoreCommand {
            operation,
            completion,
        }) = self.receiver.recv().await
        {
            debug!("Processing operation {:?}", operation);
            let kind = operation.kind();
            let result = self.processor.process_next(operation).await;
            match &result {
                Ok(_) => info!("Committed {kind}"),
                Err(e) => error!("Error committing {kind}: {e:?}"),
            }
            // The submitter may have given up waiting, the write stands either way.
            let _ = completion.send(result);
        }

        self.receiver.close();
        Ok(())
    }
}
