//! Deployment exports.
//!
//! Turns a selected model save into a production environment file under the
//! session's `deploy/` directory, so the runtime agent can be hosted without
//! access to the configuration store.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use tracing::info;

use crate::config::{ConfigStore, DISCORD, HUGGINGFACE};
use crate::error::StageError;
use crate::registry::ModelSave;

/// Directory under the session holding the deployment export.
pub const DEPLOY_DIR: &str = "deploy";
/// Environment file written into the deployment export.
pub const ENV_FILE: &str = ".env";

/// Hub repository id of a save: the last two segments of its locator.
pub fn model_id(save: &ModelSave) -> String {
    let segments: Vec<&str> = save
        .url
        .trim_end_matches('/')
        .rsplit('/')
        .take(2)
        .collect();
    segments.into_iter().rev().collect::<Vec<_>>().join("/")
}

/// Write `deploy/.env` for the selected save under the given session.
///
/// Returns the path of the written file.
pub fn write_deploy_env(
    session_path: &Path,
    store: &ConfigStore,
    save: &ModelSave,
) -> Result<PathBuf, StageError> {
    let discord_key = store.read_required(DISCORD, "api_key")?;
    let huggingface_key = store.read_required(HUGGINGFACE, "api_key")?;

    let deploy = session_path.join(DEPLOY_DIR);
    fs::create_dir_all(&deploy).map_err(|e| {
        StageError::Other(anyhow!("creating deploy directory {}: {e}", deploy.display()))
    })?;

    let env_path = deploy.join(ENV_FILE);
    let contents = format!(
        "DISCORD_API_KEY={discord_key}\nHUGGINGFACE_API_KEY={huggingface_key}\nCONTEXT_LENGTH={}\nMODEL_ID={}\n",
        save.context_length,
        model_id(save),
    );
    fs::write(&env_path, contents)
        .map_err(|e| StageError::Other(anyhow!("writing deploy env file: {e}")))?;

    info!(path = %env_path.display(), "deployment environment written");
    Ok(env_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn save(url: &str) -> ModelSave {
        ModelSave {
            url: url.to_string(),
            context_length: 4,
            data_path: "/d/g/s".to_string(),
        }
    }

    #[test]
    fn test_model_id_is_last_two_segments() {
        let s = save("https://huggingface.co/user/mimic-3");
        assert_eq!(model_id(&s), "user/mimic-3");

        let s = save("https://huggingface.co/user/mimic-3/");
        assert_eq!(model_id(&s), "user/mimic-3");
    }

    #[test]
    fn test_write_deploy_env_contents() {
        let config_dir = TempDir::new().unwrap();
        let mut store = ConfigStore::initialize(config_dir.path()).unwrap();
        store.write(DISCORD, &[("api_key", "dk")]).unwrap();
        store.write(HUGGINGFACE, &[("api_key", "hk")]).unwrap();
        let session = TempDir::new().unwrap();

        let env_path = write_deploy_env(
            session.path(),
            &store,
            &save("https://huggingface.co/user/mimic-3"),
        )
        .unwrap();

        let contents = fs::read_to_string(env_path).unwrap();
        assert!(contents.contains("DISCORD_API_KEY=dk"));
        assert!(contents.contains("HUGGINGFACE_API_KEY=hk"));
        assert!(contents.contains("CONTEXT_LENGTH=4"));
        assert!(contents.contains("MODEL_ID=user/mimic-3"));
    }

    #[test]
    fn test_missing_credentials_is_config_error() {
        let config_dir = TempDir::new().unwrap();
        let store = ConfigStore::initialize(config_dir.path()).unwrap();
        let session = TempDir::new().unwrap();

        let err = write_deploy_env(
            session.path(),
            &store,
            &save("https://huggingface.co/user/mimic-3"),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "config");
    }
}
