//! Session path resolution.
//!
//! A session is a filesystem subtree rooted at `data_path/guild/session`.
//! Stages never hold a live handle to it; each one re-resolves the path from
//! the configuration store or an explicitly passed argument.

use std::path::{Path, PathBuf};

use crate::config::{ConfigStore, DISCORD, GENERAL};
use crate::error::StageError;
use crate::prompt::{self, ValueSource};

/// Directory under the session holding the packaged training bundle.
pub const TRAINING_DATA_DIR: &str = "training_data";

/// Compute the configured session directory from persisted state.
pub fn session_dir(store: &ConfigStore) -> Result<PathBuf, StageError> {
    let data_path = store.read_required(GENERAL, "data_path")?;
    let guild = store.read_required(DISCORD, "guild")?;
    let session = store.read_required(GENERAL, "session")?;
    Ok(PathBuf::from(data_path).join(guild).join(session))
}

/// Resolve the session path a stage should operate on.
///
/// An explicit path that exists wins. Otherwise the configured session
/// directory is offered through the validation loop with a path-exists
/// predicate; interactive sources re-prompt until satisfied, non-interactive
/// sources fail fast, which makes an unresolved artifact in unattended mode a
/// fatal misconfiguration.
pub fn resolve_session_path(
    store: &ConfigStore,
    explicit: Option<&Path>,
    source: &mut dyn ValueSource,
) -> Result<PathBuf, StageError> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
    }

    let default = session_dir(store)?;
    let resolved = prompt::resolve(
        source,
        "Path to the session data",
        default.display().to_string(),
        prompt::path_exists,
    )
    .map_err(|_| StageError::Path(default))?;
    Ok(PathBuf::from(resolved))
}
