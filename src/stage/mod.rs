//! Pipeline stages and the runner that invokes them.
//!
//! A stage is one isolated unit of work whose only inputs are the persisted
//! configuration record and stage-specific arguments, and whose only outputs
//! are filesystem side effects plus a success payload or a classified error.
//! [`StageRunner`] captures the outcome without interpreting it; deciding what
//! a failure means is the classifier's job.

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::collab::{Activator, Miner, Preprocessor, Trainer};
use crate::config::ConfigStore;
use crate::error::StageError;
use crate::registry::ModelSave;

/// The five pipeline stages, strictly ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StageId {
    Init,
    Mine,
    Preprocess,
    Train,
    Activate,
}

impl StageId {
    /// All stages in pipeline order.
    pub const ALL: [StageId; 5] = [
        StageId::Init,
        StageId::Mine,
        StageId::Preprocess,
        StageId::Train,
        StageId::Activate,
    ];

    /// The stage that follows this one, if any.
    pub fn next(self) -> Option<StageId> {
        let position = Self::ALL.iter().position(|s| *s == self)?;
        Self::ALL.get(position + 1).copied()
    }

    /// CLI subcommand name for this stage.
    pub fn command_name(self) -> &'static str {
        match self {
            StageId::Init => "init",
            StageId::Mine => "mine",
            StageId::Preprocess => "preprocess",
            StageId::Train => "train",
            StageId::Activate => "activate",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command_name())
    }
}

/// Stage-specific arguments, resolved by the caller before entry.
#[derive(Debug, Clone, Default)]
pub struct StageArgs {
    /// Session subtree the stage operates on.
    pub session_path: Option<PathBuf>,
    /// Whether the stage runs inside the unattended forge chain.
    pub forge: bool,
}

/// Success payload of a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutput {
    /// No payload beyond filesystem side effects.
    Done,
    /// A produced directory (mined data, packaged bundle).
    Path(PathBuf),
    /// A deployable model reference.
    ModelRef(String),
}

/// One pipeline stage behind a uniform interface.
///
/// The orchestrator can invoke implementations in-process through this trait
/// or out-of-process through the launch adapter in [`crate::pipeline`]; the
/// sequencing logic is identical either way.
#[async_trait]
pub trait Stage: Send + Sync {
    fn id(&self) -> StageId;

    async fn run(
        &self,
        store: &mut ConfigStore,
        args: &StageArgs,
    ) -> Result<StageOutput, StageError>;
}

/// Outcome of one stage invocation, captured for the classifier.
#[derive(Debug)]
pub struct StageReport {
    pub id: StageId,
    pub outcome: Result<StageOutput, StageError>,
    pub duration: Duration,
}

/// Invokes a stage and records its terminal outcome.
pub struct StageRunner;

impl StageRunner {
    /// Run one stage to completion, forwarding its error untouched.
    pub async fn run(
        stage: &dyn Stage,
        store: &mut ConfigStore,
        args: &StageArgs,
    ) -> StageReport {
        let started = Instant::now();
        info!(stage = %stage.id(), "running stage");
        let outcome = stage.run(store, args).await;
        let duration = started.elapsed();
        debug!(stage = %stage.id(), ?duration, "stage finished");
        StageReport {
            id: stage.id(),
            outcome,
            duration,
        }
    }
}

/// Scrapes raw chat history through the Miner collaborator.
pub struct MineStage {
    miner: Box<dyn Miner>,
}

impl MineStage {
    pub fn new(miner: Box<dyn Miner>) -> Self {
        Self { miner }
    }
}

#[async_trait]
impl Stage for MineStage {
    fn id(&self) -> StageId {
        StageId::Mine
    }

    async fn run(
        &self,
        store: &mut ConfigStore,
        _args: &StageArgs,
    ) -> Result<StageOutput, StageError> {
        let data_path = self.miner.mine(store).await?;
        Ok(StageOutput::Path(data_path))
    }
}

/// Cleans and packages mined data through the Preprocessor collaborator.
pub struct PreprocessStage {
    preprocessor: Box<dyn Preprocessor>,
}

impl PreprocessStage {
    pub fn new(preprocessor: Box<dyn Preprocessor>) -> Self {
        Self { preprocessor }
    }
}

#[async_trait]
impl Stage for PreprocessStage {
    fn id(&self) -> StageId {
        StageId::Preprocess
    }

    async fn run(
        &self,
        store: &mut ConfigStore,
        args: &StageArgs,
    ) -> Result<StageOutput, StageError> {
        let session = args
            .session_path
            .as_deref()
            .ok_or_else(|| StageError::Path(PathBuf::from("<session>")))?;
        let cleaned = self.preprocessor.clean(session).await?;
        let packaged = self.preprocessor.package(&cleaned, store).await?;
        Ok(StageOutput::Path(packaged))
    }
}

/// Trains a model through the Trainer collaborator.
///
/// Failure handling (rename-required halt, out-of-memory handoff) lives in
/// [`crate::pipeline::run_train_stage`]; this stage only reports the raw
/// outcome.
pub struct TrainStage {
    trainer: Box<dyn Trainer>,
}

impl TrainStage {
    pub fn new(trainer: Box<dyn Trainer>) -> Self {
        Self { trainer }
    }
}

#[async_trait]
impl Stage for TrainStage {
    fn id(&self) -> StageId {
        StageId::Train
    }

    async fn run(
        &self,
        store: &mut ConfigStore,
        args: &StageArgs,
    ) -> Result<StageOutput, StageError> {
        let session = args
            .session_path
            .as_deref()
            .ok_or_else(|| StageError::Path(PathBuf::from("<session>")))?;
        let model_url = self.trainer.train(session, store).await?;
        Ok(StageOutput::ModelRef(model_url))
    }
}

/// Runs the conversational agent with a selected model save.
///
/// The save is resolved by the caller before entry; the stage itself runs
/// until the agent process is externally terminated.
pub struct ActivateStage {
    activator: Box<dyn Activator>,
    save: ModelSave,
}

impl ActivateStage {
    pub fn new(activator: Box<dyn Activator>, save: ModelSave) -> Self {
        Self { activator, save }
    }
}

#[async_trait]
impl Stage for ActivateStage {
    fn id(&self) -> StageId {
        StageId::Activate
    }

    async fn run(
        &self,
        store: &mut ConfigStore,
        _args: &StageArgs,
    ) -> Result<StageOutput, StageError> {
        self.activator.activate(&self.save, store).await?;
        Ok(StageOutput::Done)
    }
}
