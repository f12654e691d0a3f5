use crate::job::TrainingJobId;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started { job_id: TrainingJobId, samples: usize, epochs: u32 },
    Epoch { job_id: TrainingJobId, epoch: u32, total: u32, loss: f64, accuracy: f64 },
    Finished { job_id: TrainingJobId },
}

pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}

/// Forwards progress to `tracing`.
#[derive(Debug, Default)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { job_id, samples, epochs } => {
                info!(%job_id, samples, epochs, "Training started");
            }
            ProgressEvent::Epoch { job_id, epoch, total, loss, accuracy } => {
                info!(%job_id, epoch, total, loss, accuracy, "Epoch {epoch}/{total}");
            }
            ProgressEvent::Finished { job_id } => info!(%job_id, "Training finished"),
        }
    }
}

/// Keeps every event; used by tests.
#[derive(Debug, Default)]
pub struct RecordingProgressSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgressSink {
    #[must_use]
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl ProgressSink for RecordingProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
