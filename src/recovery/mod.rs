//! Recovery handoff for out-of-memory training failures.
//!
//! When local compute cannot finish training, the stage's work is exported as
//! a package a human can complete on external compute: an environment file
//! with the credentials and model name, a copy of the training bundle, and a
//! static instructions artifact. Every step is idempotent so materializing
//! twice leaves the same directory contents as materializing once.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;
use walkdir::WalkDir;

use crate::config::{ConfigStore, HUGGINGFACE};
use crate::error::StageError;
use crate::session::TRAINING_DATA_DIR;

/// Directory under the session holding the handoff package.
pub const HANDOFF_DIR: &str = "colab";
/// Environment file written into the handoff package.
pub const ENV_FILE: &str = ".env";
/// Instructions artifact written into the handoff package.
pub const INSTRUCTIONS_FILE: &str = "README.md";

const INSTRUCTIONS: &str = include_str!("../../assets/colab_instructions.md");

/// Materialize the handoff package under `session_path/colab`.
///
/// Returns the handoff directory. Re-running overwrites the copied bundle
/// rather than duplicating or erroring.
pub fn materialize(session_path: &Path, store: &ConfigStore) -> Result<PathBuf, StageError> {
    let handoff = session_path.join(HANDOFF_DIR);
    fs::create_dir_all(&handoff).map_err(|e| {
        StageError::Other(anyhow::anyhow!(
            "creating handoff directory {}: {e}",
            handoff.display()
        ))
    })?;

    write_env_file(&handoff, store)?;
    copy_training_bundle(session_path, &handoff)?;
    fs::write(handoff.join(INSTRUCTIONS_FILE), INSTRUCTIONS)
        .map_err(|e| StageError::Other(anyhow::anyhow!("writing instructions: {e}")))?;

    info!(path = %handoff.display(), "recovery handoff materialized");
    Ok(handoff)
}

/// Write the credentials and model name needed to resume externally.
fn write_env_file(handoff: &Path, store: &ConfigStore) -> Result<(), StageError> {
    let api_key = store.read_required(HUGGINGFACE, "api_key")?;
    let model_name = store.read_required(HUGGINGFACE, "model_name")?;
    let contents = format!("HUGGINGFACE_API_KEY={api_key}\nMODEL_NAME={model_name}\n");
    fs::write(handoff.join(ENV_FILE), contents)
        .map_err(|e| StageError::Other(anyhow::anyhow!("writing handoff env file: {e}")))?;
    Ok(())
}

/// Copy the training bundle contents into the handoff directory, overwriting.
fn copy_training_bundle(session_path: &Path, handoff: &Path) -> Result<(), StageError> {
    let bundle = session_path.join(TRAINING_DATA_DIR);
    if !bundle.is_dir() {
        return Err(StageError::Path(bundle));
    }

    for entry in WalkDir::new(&bundle) {
        let entry =
            entry.map_err(|e| StageError::Data(format!("walking training bundle: {e}")))?;
        let relative = entry
            .path()
            .strip_prefix(&bundle)
            .map_err(|e| StageError::Data(format!("walking training bundle: {e}")))?;
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = handoff.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .map_err(|e| StageError::Other(anyhow::anyhow!("copying bundle: {e}")))?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| StageError::Other(anyhow::anyhow!("copying bundle: {e}")))?;
            }
            fs::copy(entry.path(), &target)
                .map_err(|e| StageError::Other(anyhow::anyhow!("copying bundle: {e}")))?;
        }
    }
    Ok(())
}
