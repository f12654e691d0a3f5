//! Stage event reporting.
//!
//! The orchestrator reports every stage boundary to a [`StageObserver`]. The
//! default observer writes the familiar start/completion markers through
//! `tracing`; tests inject a [`RecordingObserver`].

use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, error, info};

/// Stage boundary events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageEvent {
    /// A stage is about to run.
    Started {
        /// Stage name.
        name: String,
        /// 1-based position in the pipeline.
        ordinal: usize,
        /// Number of stages in the run.
        total: usize,
    },
    /// A stage returned successfully.
    Completed {
        /// Stage name.
        name: String,
        /// 1-based position in the pipeline.
        ordinal: usize,
        /// Wall-clock duration.
        elapsed: Duration,
    },
    /// A stage returned an error; the run stops here.
    Failed {
        /// Stage name.
        name: String,
        /// 1-based position in the pipeline.
        ordinal: usize,
        /// Error message.
        error: String,
        /// Debug rendering of the error, including its source chain.
        details: String,
    },
    /// A stage was not run because an earlier one failed.
    Skipped {
        /// Stage name.
        name: String,
        /// 1-based position in the pipeline.
        ordinal: usize,
    },
}

impl StageEvent {
    /// Name of the stage the event refers to.
    #[must_use]
    pub fn stage_name(&self) -> &str {
        match self {
            Self::Started { name, .. }
            | Self::Completed { name, .. }
            | Self::Failed { name, .. }
            | Self::Skipped { name, .. } => name,
        }
    }
}

/// Receives stage events.
pub trait StageObserver: Send + Sync {
    /// Called synchronously at each stage boundary.
    fn on_event(&self, event: &StageEvent);
}

/// Start marker for a stage.
#[must_use]
pub fn started_marker(name: &str) -> String {
    format!(">>>>>> Stage {name} started <<<<<<")
}

/// Completion marker for a stage.
#[must_use]
pub fn completed_marker(name: &str) -> String {
    format!(">>>>>> Stage {name} completed <<<<<<")
}

/// Logs stage events through `tracing`.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl StageObserver for TracingObserver {
    fn on_event(&self, event: &StageEvent) {
        match event {
            StageEvent::Started { name, ordinal, total } => {
                info!(stage = %name, ordinal, total, "{}", started_marker(name));
            }
            StageEvent::Completed { name, ordinal, elapsed } => {
                info!(
                    stage = %name,
                    ordinal,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "{}",
                    completed_marker(name)
                );
            }
            StageEvent::Failed { name, ordinal, error, details } => {
                error!(stage = %name, ordinal, error = %error, details = %details, "Stage {name} failed");
            }
            StageEvent::Skipped { name, ordinal } => {
                debug!(stage = %name, ordinal, "Stage skipped");
            }
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<StageEvent>>,
}

impl RecordingObserver {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events seen so far.
    #[must_use]
    pub fn events(&self) -> Vec<StageEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// The log lines a tracing observer would have emitted as markers.
    #[must_use]
    pub fn markers(&self) -> Vec<String> {
        self.events()
            .iter()
            .filter_map(|event| match event {
                StageEvent::Started { name, .. } => Some(started_marker(name)),
                StageEvent::Completed { name, .. } => Some(completed_marker(name)),
                _ => None,
            })
            .collect()
    }
}

impl StageObserver for RecordingObserver {
    fn on_event(&self, event: &StageEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markers() {
        assert_eq!(started_marker("Training Stage"), ">>>>>> Stage Training Stage started <<<<<<");
        assert_eq!(completed_marker("Training Stage"), ">>>>>> Stage Training Stage completed <<<<<<");
    }

    #[test]
    fn test_recording_observer_keeps_order() {
        let recorder = RecordingObserver::new();
        recorder.on_event(&StageEvent::Started { name: "a".into(), ordinal: 1, total: 1 });
        recorder.on_event(&StageEvent::Completed { name: "a".into(), ordinal: 1, elapsed: Duration::ZERO });

        assert_eq!(recorder.events().len(), 2);
        assert_eq!(recorder.markers(), vec![started_marker("a"), completed_marker("a")]);
        assert_eq!(recorder.events()[0].stage_name(), "a");
    }
}
