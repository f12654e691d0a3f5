//! Sequential, fail-fast pipeline stages for Roost.
//!
//! A pipeline is an ordered list of named stages. Each stage runs to
//! completion before the next one starts; the first error ends the run and is
//! handed back to the caller untouched. Stage boundaries are reported to an
//! injected [`StageObserver`] (tracing-backed by default).

pub mod error;
pub mod lifecycle;
pub mod observer;
pub mod orchestrator;

pub use error::{OrchestrationError, Result};
pub use lifecycle::StageStatus;
pub use observer::{RecordingObserver, StageEvent, StageObserver, TracingObserver, completed_marker, started_marker};
pub use orchestrator::{FnStage, RunReport, Stage, StageOrchestrator, StageReport};
