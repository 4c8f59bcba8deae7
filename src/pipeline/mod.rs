//! Pipeline orchestration.
//!
//! The orchestrator sequences Init → Mine → Preprocess → Train → Activate,
//! strictly ordered with no cycles and no skipping. State is threaded between
//! stages only through the persisted configuration store and the filesystem;
//! control flows top-down through the orchestrator, which owns the decision
//! to continue, abort, or recover after each stage.
//!
//! The orchestrator is generic over a [`StageExecutor`] capability: the forge
//! command chains stages out-of-process by re-invoking the current executable
//! (each child is waited on synchronously), while tests drive the same state
//! machine with an in-memory executor.

pub mod orchestrator;
pub mod train;

pub use orchestrator::{PipelineOrchestrator, ProcessExecutor, StageExecutor};
pub use train::{run_train_stage, TrainOutcome};
