//! Model save registry.
//!
//! An append-only record of completed training runs, serialized as a JSON
//! array inside the `huggingface.model_saves` configuration value. Ordering
//! is append order and selection by index is stable across runs.

use serde::{Deserialize, Serialize};

use crate::config::{ConfigStore, HUGGINGFACE};
use crate::error::StageError;

/// Key under `[huggingface]` holding the serialized save list.
pub const MODEL_SAVES_KEY: &str = "model_saves";

/// One completed training run: a deployable artifact and its parameters.
///
/// Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSave {
    /// Locator of the deployed model artifact.
    pub url: String,
    /// Number of prior messages used as generation context.
    pub context_length: u32,
    /// Path of the training session the model was built from.
    pub data_path: String,
}

/// List all recorded saves in append order.
///
/// A missing or blank value is an empty registry; a malformed value is the
/// classified data error.
pub fn list(store: &ConfigStore) -> Result<Vec<ModelSave>, StageError> {
    let raw = store.read(HUGGINGFACE, MODEL_SAVES_KEY, "[]");
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&raw)
        .map_err(|e| StageError::Data(format!("malformed {MODEL_SAVES_KEY}: {e}")))
}

/// Append a save and write the registry back through the store.
pub fn append(store: &mut ConfigStore, save: ModelSave) -> Result<(), StageError> {
    let mut saves = list(store)?;
    saves.push(save);
    let serialized = serde_json::to_string(&saves)
        .map_err(|e| StageError::Data(format!("serializing {MODEL_SAVES_KEY}: {e}")))?;
    store.write(HUGGINGFACE, &[(MODEL_SAVES_KEY, &serialized)])?;
    Ok(())
}

/// Select a save by index, re-reading the list first.
///
/// Callers must not cache indices across writes; the list is re-fetched here
/// so the bounds check always runs against current state.
pub fn select(store: &ConfigStore, index: usize) -> Result<ModelSave, StageError> {
    let saves = list(store)?;
    let len = saves.len();
    saves
        .into_iter()
        .nth(index)
        .ok_or(StageError::Index { index, len })
}
