//! Process-backed collaborator implementations.
//!
//! Each collaborator is an external program resolved from an environment
//! variable with a conventional default. The launch adapter waits on the
//! child synchronously and never proceeds on a non-zero exit: classified
//! failures arrive through the reserved exit-code band, the success payload
//! (a produced path or model locator) is the last non-empty stdout line, and
//! everything else is reported verbatim as unclassified.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::config::ConfigStore;
use crate::error::StageError;
use crate::registry::ModelSave;

use super::{Activator, Miner, Preprocessor, Trainer};

/// Environment variable overriding the miner program.
pub const MINER_ENV: &str = "MIMICFORGE_MINER";
/// Environment variable overriding the preprocessor program.
pub const PREPROCESSOR_ENV: &str = "MIMICFORGE_PREPROCESSOR";
/// Environment variable overriding the trainer program.
pub const TRAINER_ENV: &str = "MIMICFORGE_TRAINER";
/// Environment variable overriding the activator program.
pub const ACTIVATOR_ENV: &str = "MIMICFORGE_ACTIVATOR";

/// Resolve a collaborator program from its override variable.
fn program(env_var: &str, default: &str) -> OsString {
    std::env::var_os(env_var).unwrap_or_else(|| OsString::from(default))
}

/// Launch a collaborator, wait for its exit, and map the outcome.
async fn invoke(program: &OsString, args: &[OsString]) -> Result<String, StageError> {
    debug!(program = %program.to_string_lossy(), "launching collaborator");
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| {
            anyhow!(
                "failed to launch collaborator {}: {e}",
                program.to_string_lossy()
            )
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    if output.status.success() {
        let payload = stdout
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("")
            .trim()
            .to_string();
        return Ok(payload);
    }

    let context = stderr.trim().to_string();
    match output.status.code() {
        Some(code) => match StageError::from_exit_code(code, &context) {
            Some(classified) => Err(classified),
            None => Err(StageError::Other(anyhow!(
                "collaborator {} exited with code {code}: {context}",
                program.to_string_lossy()
            ))),
        },
        None => Err(StageError::Other(anyhow!(
            "collaborator {} terminated by signal",
            program.to_string_lossy()
        ))),
    }
}

fn config_arg(store: &ConfigStore) -> OsString {
    store.path().as_os_str().to_os_string()
}

/// External scraping process (`mimicforge-miner`).
pub struct ProcessMiner {
    program: OsString,
}

impl ProcessMiner {
    pub fn from_env() -> Self {
        Self {
            program: program(MINER_ENV, "mimicforge-miner"),
        }
    }
}

#[async_trait]
impl Miner for ProcessMiner {
    async fn mine(&self, store: &ConfigStore) -> Result<PathBuf, StageError> {
        let args = vec![OsString::from("--config"), config_arg(store)];
        let payload = invoke(&self.program, &args).await?;
        if payload.is_empty() {
            return Err(StageError::Data(
                "miner reported no output directory".to_string(),
            ));
        }
        Ok(PathBuf::from(payload))
    }
}

/// External cleaning/packaging process (`mimicforge-preprocessor`).
pub struct ProcessPreprocessor {
    program: OsString,
}

impl ProcessPreprocessor {
    pub fn from_env() -> Self {
        Self {
            program: program(PREPROCESSOR_ENV, "mimicforge-preprocessor"),
        }
    }
}

#[async_trait]
impl Preprocessor for ProcessPreprocessor {
    async fn clean(&self, session: &Path) -> Result<PathBuf, StageError> {
        let args = vec![OsString::from("clean"), session.as_os_str().to_os_string()];
        let payload = invoke(&self.program, &args).await?;
        if payload.is_empty() {
            return Err(StageError::Data(
                "preprocessor reported no cleaned-data directory".to_string(),
            ));
        }
        Ok(PathBuf::from(payload))
    }

    async fn package(&self, cleaned: &Path, store: &ConfigStore) -> Result<PathBuf, StageError> {
        let args = vec![
            OsString::from("package"),
            cleaned.as_os_str().to_os_string(),
            OsString::from("--config"),
            config_arg(store),
        ];
        let payload = invoke(&self.program, &args).await?;
        if payload.is_empty() {
            return Err(StageError::Data(
                "preprocessor reported no training bundle".to_string(),
            ));
        }
        Ok(PathBuf::from(payload))
    }
}

/// External training process (`mimicforge-trainer`).
pub struct ProcessTrainer {
    program: OsString,
}

impl ProcessTrainer {
    pub fn from_env() -> Self {
        Self {
            program: program(TRAINER_ENV, "mimicforge-trainer"),
        }
    }
}

#[async_trait]
impl Trainer for ProcessTrainer {
    async fn train(&self, session: &Path, store: &ConfigStore) -> Result<String, StageError> {
        let args = vec![
            session.as_os_str().to_os_string(),
            OsString::from("--config"),
            config_arg(store),
        ];
        let payload = invoke(&self.program, &args).await?;
        if payload.is_empty() {
            return Err(StageError::Data(
                "trainer reported no model locator".to_string(),
            ));
        }
        Ok(payload)
    }
}

/// External runtime agent (`mimicforge-activator`); runs until terminated.
pub struct ProcessActivator {
    program: OsString,
}

impl ProcessActivator {
    pub fn from_env() -> Self {
        Self {
            program: program(ACTIVATOR_ENV, "mimicforge-activator"),
        }
    }
}

#[async_trait]
impl Activator for ProcessActivator {
    async fn activate(&self, save: &ModelSave, store: &ConfigStore) -> Result<(), StageError> {
        // The agent converses until externally terminated; inherit stdio so
        // its output reaches the operator directly.
        let status = Command::new(&self.program)
            .arg("--model-url")
            .arg(&save.url)
            .arg("--context-length")
            .arg(save.context_length.to_string())
            .arg("--config")
            .arg(config_arg(store))
            .status()
            .await
            .map_err(|e| {
                anyhow!(
                    "failed to launch collaborator {}: {e}",
                    self.program.to_string_lossy()
                )
            })?;

        if status.success() {
            return Ok(());
        }
        match status.code().and_then(|c| StageError::from_exit_code(c, "activator")) {
            Some(classified) => Err(classified),
            None => Err(StageError::Other(anyhow!(
                "activator exited with status {status}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, ConfigStore) {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::initialize(dir.path()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_payload_is_last_nonempty_stdout_line() {
        let payload = invoke(
            &OsString::from("sh"),
            &[
                OsString::from("-c"),
                OsString::from("echo progress; echo /tmp/out; echo"),
            ],
        )
        .await
        .unwrap();
        assert_eq!(payload, "/tmp/out");
    }

    #[tokio::test]
    async fn test_reserved_exit_code_is_classified() {
        let err = invoke(
            &OsString::from("sh"),
            &[
                OsString::from("-c"),
                OsString::from("echo 'gpu out of memory' >&2; exit 16"),
            ],
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "resource-exhaustion");
    }

    #[tokio::test]
    async fn test_unreserved_exit_code_is_unclassified() {
        let err = invoke(
            &OsString::from("sh"),
            &[OsString::from("-c"), OsString::from("exit 3")],
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "unclassified");
    }

    #[tokio::test]
    async fn test_miner_rejects_empty_payload() {
        let (_dir, config) = store();
        let miner = ProcessMiner {
            program: OsString::from("true"),
        };
        let err = miner.mine(&config).await.unwrap_err();
        assert_eq!(err.kind(), "data");
    }
}
