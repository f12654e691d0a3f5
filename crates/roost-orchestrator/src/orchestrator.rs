//! Fail-fast sequential stage execution.

use crate::error::{OrchestrationError, Result};
use crate::lifecycle::StageStatus;
use crate::observer::{StageEvent, StageObserver, TracingObserver};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A named, zero-argument unit of pipeline work.
///
/// Stages share state only through what they persist.
pub trait Stage<E> {
    /// Stage name used in logs and reports.
    fn name(&self) -> &str;

    /// Runs the stage to completion.
    fn run(&mut self) -> std::result::Result<(), E>;
}

/// A stage backed by a closure.
pub struct FnStage<F> {
    name: String,
    run: F,
}

impl<F> FnStage<F> {
    /// Wraps `run` under `name`.
    pub fn new(name: impl Into<String>, run: F) -> Self {
        Self { name: name.into(), run }
    }
}

impl<E, F> Stage<E> for FnStage<F>
where
    F: FnMut() -> std::result::Result<(), E>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self) -> std::result::Result<(), E> {
        (self.run)()
    }
}

/// Outcome of one stage in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    /// Stage name.
    pub name: String,
    /// 1-based position.
    pub ordinal: usize,
    /// Final status.
    pub status: StageStatus,
    /// Wall-clock duration, zero for stages that did not run.
    pub elapsed: Duration,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Per-stage outcomes, in order.
    pub stages: Vec<StageReport>,
}

impl RunReport {
    /// Total wall-clock time across stages.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.stages.iter().map(|s| s.elapsed).sum()
    }
}

struct Slot<'a, E> {
    stage: Box<dyn Stage<E> + 'a>,
    status: StageStatus,
    elapsed: Duration,
}

/// Runs stages in registration order and stops at the first failure.
///
/// The failing stage's error is returned unchanged; later stages are marked
/// skipped and never invoked. There are no retries.
pub struct StageOrchestrator<'a, E> {
    slots: Vec<Slot<'a, E>>,
    observer: Arc<dyn StageObserver>,
}

impl<E> fmt::Debug for StageOrchestrator<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageOrchestrator")
            .field("stages", &self.stage_names())
            .finish_non_exhaustive()
    }
}

impl<E> Default for StageOrchestrator<'_, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, E> StageOrchestrator<'a, E> {
    /// Creates an empty orchestrator that logs through `tracing`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_observer(Arc::new(TracingObserver))
    }

    /// Creates an empty orchestrator reporting to `observer`.
    #[must_use]
    pub fn with_observer(observer: Arc<dyn StageObserver>) -> Self {
        Self { slots: Vec::new(), observer }
    }

    /// Appends a stage. Names must be non-empty and unique.
    pub fn add_stage(&mut self, stage: Box<dyn Stage<E> + 'a>) -> Result<&mut Self> {
        let name = stage.name();
        if name.trim().is_empty() {
            return Err(OrchestrationError::EmptyStageName);
        }
        if self.slots.iter().any(|s| s.stage.name() == name) {
            return Err(OrchestrationError::DuplicateStage(name.to_string()));
        }
        self.slots.push(Slot { stage, status: StageStatus::Pending, elapsed: Duration::ZERO });
        Ok(self)
    }

    /// Appends a closure-backed stage.
    pub fn add_fn<F>(&mut self, name: impl Into<String>, run: F) -> Result<&mut Self>
    where
        F: FnMut() -> std::result::Result<(), E> + 'a,
        E: 'a,
    {
        self.add_stage(Box::new(FnStage::new(name, run)))
    }

    /// Stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.stage.name()).collect()
    }

    /// Number of registered stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no stages are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Status of every stage after the most recent run.
    #[must_use]
    pub fn statuses(&self) -> Vec<(&str, StageStatus)> {
        self.slots.iter().map(|s| (s.stage.name(), s.status)).collect()
    }

    fn set_status(slot: &mut Slot<'a, E>, to: StageStatus) {
        if !slot.status.can_transition_to(to) {
            warn!(stage = %slot.stage.name(), from = %slot.status, to = %to, "Unexpected stage transition");
        }
        slot.status = to;
    }

    fn report(&self, started_at: DateTime<Utc>) -> RunReport {
        let stages = self
            .slots
            .iter()
            .enumerate()
            .map(|(i, s)| StageReport {
                name: s.stage.name().to_string(),
                ordinal: i + 1,
                status: s.status,
                elapsed: s.elapsed,
            })
            .collect();
        RunReport { started_at, stages }
    }
}

impl<E> StageOrchestrator<'_, E>
where
    E: fmt::Display + fmt::Debug,
{
    /// Runs every stage in order.
    pub fn run(&mut self) -> std::result::Result<RunReport, E> {
        let started_at = Utc::now();
        let total = self.slots.len();
        for slot in &mut self.slots {
            slot.status = StageStatus::Pending;
            slot.elapsed = Duration::ZERO;
        }
        debug!(stages = total, "Starting pipeline run");

        for index in 0..total {
            if let Err(err) = self.run_slot(index, total) {
                for (offset, slot) in self.slots[index + 1..].iter_mut().enumerate() {
                    Self::set_status(slot, StageStatus::Skipped);
                    self.observer.on_event(&StageEvent::Skipped {
                        name: slot.stage.name().to_string(),
                        ordinal: index + offset + 2,
                    });
                }
                return Err(err);
            }
        }
        Ok(self.report(started_at))
    }

    /// Runs the single stage called `name`, or returns `None` if there is none.
    pub fn run_stage(&mut self, name: &str) -> Option<std::result::Result<StageReport, E>> {
        let index = self.slots.iter().position(|s| s.stage.name() == name)?;
        let total = self.slots.len();
        let slot = &mut self.slots[index];
        slot.status = StageStatus::Pending;
        slot.elapsed = Duration::ZERO;

        Some(self.run_slot(index, total).map(|()| {
            let slot = &self.slots[index];
            StageReport {
                name: slot.stage.name().to_string(),
                ordinal: index + 1,
                status: slot.status,
                elapsed: slot.elapsed,
            }
        }))
    }

    fn run_slot(&mut self, index: usize, total: usize) -> std::result::Result<(), E> {
        let ordinal = index + 1;
        let slot = &mut self.slots[index];
        let name = slot.stage.name().to_string();

        Self::set_status(slot, StageStatus::Running);
        self.observer.on_event(&StageEvent::Started { name: name.clone(), ordinal, total });

        let start = Instant::now();
        let outcome = slot.stage.run();
        slot.elapsed = start.elapsed();

        match outcome {
            Ok(()) => {
                Self::set_status(slot, StageStatus::Completed);
                self.observer.on_event(&StageEvent::Completed { name, ordinal, elapsed: slot.elapsed });
                Ok(())
            }
            Err(err) => {
                Self::set_status(slot, StageStatus::Failed);
                self.observer.on_event(&StageEvent::Failed {
                    name,
                    ordinal,
                    error: err.to_string(),
                    details: format!("{err:?}"),
                });
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::RecordingObserver;
    use std::cell::Cell;

    #[test]
    fn test_rejects_duplicate_and_empty_names() {
        let mut orchestrator: StageOrchestrator<'_, String> = StageOrchestrator::new();
        orchestrator.add_fn("a", || Ok(())).unwrap();
        assert_eq!(
            orchestrator.add_fn("a", || Ok(())).unwrap_err(),
            OrchestrationError::DuplicateStage("a".to_string())
        );
        assert_eq!(orchestrator.add_fn("  ", || Ok(())).unwrap_err(), OrchestrationError::EmptyStageName);
        assert_eq!(orchestrator.len(), 1);
    }

    #[test]
    fn test_runs_in_order() {
        let order = std::cell::RefCell::new(Vec::new());
        let recorder = Arc::new(RecordingObserver::new());
        let mut orchestrator: StageOrchestrator<'_, String> = StageOrchestrator::with_observer(recorder.clone());
        orchestrator
            .add_fn("one", || {
                order.borrow_mut().push(1);
                Ok(())
            })
            .unwrap()
            .add_fn("two", || {
                order.borrow_mut().push(2);
                Ok(())
            })
            .unwrap();

        let report = orchestrator.run().unwrap();
        assert_eq!(*order.borrow(), vec![1, 2]);
        assert!(report.stages.iter().all(|s| s.status == StageStatus::Completed));
        assert_eq!(recorder.markers().len(), 4);
    }

    #[test]
    fn test_run_stage_by_name() {
        let calls = Cell::new(0);
        let mut orchestrator: StageOrchestrator<'_, String> =
            StageOrchestrator::with_observer(Arc::new(RecordingObserver::new()));
        orchestrator
            .add_fn("first", || Err("never".to_string()))
            .unwrap()
            .add_fn("second", || {
                calls.set(calls.get() + 1);
                Ok(())
            })
            .unwrap();

        let report = orchestrator.run_stage("second").unwrap().unwrap();
        assert_eq!(report.ordinal, 2);
        assert_eq!(calls.get(), 1);
        assert!(orchestrator.run_stage("missing").is_none());
    }

    #[test]
    fn test_empty_pipeline_succeeds() {
        let mut orchestrator: StageOrchestrator<'_, String> = StageOrchestrator::default();
        let report = orchestrator.run().unwrap();
        assert!(report.stages.is_empty());
        assert_eq!(report.elapsed(), Duration::ZERO);
    }
}
