//! Background generation worker
//!
//! A single task drains a queue of batches one prompt at a time, so the
//! operator surface never waits on a subprocess. Progress is reported on an
//! event channel. Batches submitted while one is running queue behind it.

use crate::error::{MediaError, Result};
use crate::executor::{GenerationOrchestrator, GenerationOutcome};
use crate::models::{PromptRecord, PromptType};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Progress reported by the worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    Queued {
        batch_id: Uuid,
        size: usize,
    },
    Started {
        batch_id: Uuid,
        /// 1-based position within the batch
        position: usize,
        total: usize,
        prompt_id: i64,
        prompt_type: PromptType,
    },
    Succeeded {
        batch_id: Uuid,
        prompt_id: i64,
        files: Vec<String>,
    },
    Skipped {
        batch_id: Uuid,
        prompt_id: i64,
    },
    Failed {
        batch_id: Uuid,
        prompt_id: i64,
        message: String,
    },
    BatchComplete {
        batch_id: Uuid,
        succeeded: usize,
        failed: usize,
        skipped: usize,
    },
}

#[derive(Debug)]
struct Batch {
    id: Uuid,
    prompts: Vec<PromptRecord>,
}

/// Handle to the background worker task
#[derive(Debug)]
pub struct GenerationWorker {
    batches: mpsc::UnboundedSender<Batch>,
    events: mpsc::UnboundedSender<WorkerEvent>,
    handle: JoinHandle<()>,
}

impl GenerationWorker {
    /// Spawn the worker. Returns the handle and the event stream.
    pub fn spawn(
        orchestrator: GenerationOrchestrator,
    ) -> (Self, mpsc::UnboundedReceiver<WorkerEvent>) {
        let (batch_tx, batch_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(run(orchestrator, batch_rx, event_tx.clone()));
        info!("Generation worker started");

        (
            Self {
                batches: batch_tx,
                events: event_tx,
                handle,
            },
            event_rx,
        )
    }

    /// Queue prompts for generation. Returns the batch id.
    pub fn submit(&self, prompts: Vec<PromptRecord>) -> Result<Uuid> {
        let batch = Batch {
            id: Uuid::new_v4(),
            prompts,
        };
        let (id, size) = (batch.id, batch.prompts.len());

        self.batches
            .send(batch)
            .map_err(|_| MediaError::Other("Generation worker has stopped".to_string()))?;

        let _ = self.events.send(WorkerEvent::Queued { batch_id: id, size });
        debug!(batch_id = %id, size, "Batch queued");
        Ok(id)
    }

    /// Stop accepting batches, finish the queued ones, then stop
    pub async fn shutdown(self) -> Result<()> {
        drop(self.batches);
        drop(self.events);
        self.handle
            .await
            .map_err(|e| MediaError::Other(format!("Generation worker panicked: {}", e)))
    }
}

async fn run(
    orchestrator: GenerationOrchestrator,
    mut batches: mpsc::UnboundedReceiver<Batch>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) {
    let emit = |event: WorkerEvent| {
        let _ = events.send(event);
    };

    while let Some(batch) = batches.recv().await {
        let total = batch.prompts.len();
        let (mut succeeded, mut failed, mut skipped) = (0, 0, 0);
        info!(batch_id = %batch.id, total, "Processing batch");

        for (index, prompt) in batch.prompts.iter().enumerate() {
            emit(WorkerEvent::Started {
                batch_id: batch.id,
                position: index + 1,
                total,
                prompt_id: prompt.id,
                prompt_type: prompt.prompt_type,
            });

            match orchestrator.generate(prompt).await {
                Ok(GenerationOutcome::Generated { files, .. }) => {
                    succeeded += 1;
                    emit(WorkerEvent::Succeeded {
                        batch_id: batch.id,
                        prompt_id: prompt.id,
                        files,
                    });
                }
                Ok(GenerationOutcome::Skipped) => {
                    skipped += 1;
                    emit(WorkerEvent::Skipped {
                        batch_id: batch.id,
                        prompt_id: prompt.id,
                    });
                }
                Ok(GenerationOutcome::Failed { message }) => {
                    failed += 1;
                    emit(WorkerEvent::Failed {
                        batch_id: batch.id,
                        prompt_id: prompt.id,
                        message,
                    });
                }
                Err(e) => {
                    failed += 1;
                    error!(prompt_id = prompt.id, error = %e, "Error processing prompt");
                    emit(WorkerEvent::Failed {
                        batch_id: batch.id,
                        prompt_id: prompt.id,
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(batch_id = %batch.id, succeeded, failed, skipped, "Batch complete");
        emit(WorkerEvent::BatchComplete {
            batch_id: batch.id,
            succeeded,
            failed,
            skipped,
        });
    }

    info!("Generation worker stopped");
}
