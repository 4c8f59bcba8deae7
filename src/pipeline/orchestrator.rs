//! The stage-sequencing state machine.

use std::path::PathBuf;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

use crate::error::StageError;
use crate::stage::StageId;

/// Executes one stage to a terminal outcome on behalf of the orchestrator.
#[async_trait]
pub trait StageExecutor: Send {
    async fn execute(&mut self, id: StageId) -> Result<(), StageError>;
}

/// Chains stages as separate invocations of the current executable.
///
/// Every stage except `init` is passed `--forge-pipeline` so its artifact
/// resolution succeeds deterministically from persisted state with no
/// interactive fallback. Stdio is inherited; the child is waited on before
/// anything else happens.
pub struct ProcessExecutor {
    exe: PathBuf,
}

impl ProcessExecutor {
    /// Executor re-invoking the currently running binary.
    pub fn current() -> Result<Self, StageError> {
        let exe = std::env::current_exe()
            .map_err(|e| StageError::Other(anyhow!("resolving current executable: {e}")))?;
        Ok(Self { exe })
    }
}

#[async_trait]
impl StageExecutor for ProcessExecutor {
    async fn execute(&mut self, id: StageId) -> Result<(), StageError> {
        let mut command = Command::new(&self.exe);
        command.arg(id.command_name());
        if id != StageId::Init {
            command.arg("--forge-pipeline");
        }

        let status = command
            .status()
            .await
            .map_err(|e| StageError::Other(anyhow!("launching stage {id}: {e}")))?;

        if status.success() {
            Ok(())
        } else {
            Err(StageError::Other(anyhow!(
                "stage {id} failed with status {status}"
            )))
        }
    }
}

/// Sequences the five stages, aborting on the first failure.
///
/// Partial progress is never rolled back: whatever the last completed write
/// left on disk stays there for inspection or for resuming individual stages
/// directly.
pub struct PipelineOrchestrator<E: StageExecutor> {
    executor: E,
}

impl<E: StageExecutor> PipelineOrchestrator<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    /// Access the executor, e.g. to inspect what a test run invoked.
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Run all stages in order. The first failure aborts the run.
    pub async fn run(&mut self) -> Result<(), StageError> {
        let total = StageId::ALL.len();
        for (position, id) in StageId::ALL.iter().enumerate() {
            info!(stage = %id, step = position + 1, total, "starting stage");
            self.executor.execute(*id).await?;
            info!(stage = %id, "stage completed");
        }
        Ok(())
    }
}
