use super::{ChargingOrchestrator, StationSnapshot};
use crate::error::{ChargeShareError, Result};
use crate::station::DataResponse;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

/// One telemetry sample addressed by station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryUpdate {
    pub client_id: String,
    pub data: DataResponse,
}

#[derive(Debug)]
enum WorkerMessage {
    Update(TelemetryUpdate),
    Shutdown,
}

/// Cloneable front end of the orchestrator worker
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    tx: mpsc::Sender<WorkerMessage>,
    snapshots: broadcast::Sender<StationSnapshot>,
}

impl OrchestratorHandle {
    /// Queue a sample, waiting for room when the queue is full
    pub async fn submit(&self, update: TelemetryUpdate) -> Result<()> {
        self.tx
            .send(WorkerMessage::Update(update))
            .await
            .map_err(|_| ChargeShareError::queue("Orchestrator worker has stopped"))
    }

    /// Queue a sample without waiting
    pub fn try_submit(&self, update: TelemetryUpdate) -> Result<()> {
        self.tx
            .try_send(WorkerMessage::Update(update))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    ChargeShareError::queue("Orchestrator queue is full")
                }
                mpsc::error::TrySendError::Closed(_) => {
                    ChargeShareError::queue("Orchestrator worker has stopped")
                }
            })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StationSnapshot> {
        self.snapshots.subscribe()
    }

    /// Snapshots as a stream; snapshots missed by a slow reader are skipped
    pub fn snapshot_stream(&self) -> impl Stream<Item = StationSnapshot> + Send + 'static {
        BroadcastStream::new(self.snapshots.subscribe()).filter_map(|res| res.ok())
    }

    /// Stop the worker after the samples already queued
    pub async fn shutdown(&self) -> Result<()> {
        self.tx
            .send(WorkerMessage::Shutdown)
            .await
            .map_err(|_| ChargeShareError::queue("Orchestrator worker has stopped"))
    }
}

impl ChargingOrchestrator {
    /// Move the orchestrator onto its own task.
    ///
    /// The task ends on [`OrchestratorHandle::shutdown`] or once every
    /// handle has been dropped.
    pub fn spawn(self, queue_capacity: usize) -> (OrchestratorHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let handle = OrchestratorHandle {
            tx,
            snapshots: self.snapshot_tx.clone(),
        };
        let task = tokio::spawn(self.run(rx));
        (handle, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<WorkerMessage>) {
        self.logger.info("Starting orchestrator worker");
        while let Some(message) = rx.recv().await {
            match message {
                WorkerMessage::Update(update) => {
                    self.on_incoming_data_update(&update.client_id, update.data)
                        .await;
                }
                WorkerMessage::Shutdown => break,
            }
        }
        self.logger.info("Orchestrator worker stopped");
    }
}
