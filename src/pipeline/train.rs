//! Training-stage outcome handling.
//!
//! Training is the one stage with recoverable failures. On success a model
//! save is appended; on a classified out-of-memory failure the work is handed
//! off to external compute and, in forge mode, the pipeline resumes from a
//! human-confirmed checkpoint. A naming conflict always halts — the operator
//! must reconfigure before retrying.

use std::path::{Path, PathBuf};

use anyhow::anyhow;
use tracing::warn;

use crate::classify::{classify, Verdict};
use crate::collab::Trainer;
use crate::config::{ConfigStore, HUGGINGFACE, TRAINING};
use crate::error::StageError;
use crate::prompt::{self, ValueSource};
use crate::recovery;
use crate::registry::{self, ModelSave};
use crate::stage::{StageArgs, StageOutput, StageRunner, TrainStage};

/// Terminal result of the training stage.
#[derive(Debug)]
pub enum TrainOutcome {
    /// Training completed locally; the save is already appended.
    Trained(ModelSave),
    /// Out-of-memory handoff, confirmed complete by the operator; the save
    /// derived from the configured model name is already appended.
    HandedOff { handoff: PathBuf, save: ModelSave },
}

/// Run the training stage and resolve its failure modes.
///
/// `confirm_source` backs the blocking "external training finished?"
/// checkpoint in forge mode; it is never consulted otherwise.
pub async fn run_train_stage(
    store: &mut ConfigStore,
    session: &Path,
    trainer: Box<dyn Trainer>,
    forge: bool,
    confirm_source: &mut dyn ValueSource,
) -> Result<TrainOutcome, StageError> {
    let stage = TrainStage::new(trainer);
    let args = StageArgs {
        session_path: Some(session.to_path_buf()),
        forge,
    };
    let report = StageRunner::run(&stage, store, &args).await;

    let error = match report.outcome {
        Ok(StageOutput::ModelRef(url)) => {
            let save = build_save(store, session, url)?;
            registry::append(store, save.clone())?;
            return Ok(TrainOutcome::Trained(save));
        }
        Ok(other) => {
            return Err(StageError::Other(anyhow!(
                "trainer returned unexpected payload: {other:?}"
            )))
        }
        Err(error) => error,
    };

    match classify(report.id, &error) {
        Verdict::Fatal | Verdict::RenameRequired => Err(error),
        Verdict::Recoverable => {
            let handoff = recovery::materialize(session, store)?;
            warn!(
                path = %handoff.display(),
                "training handed off to external compute"
            );
            if !forge {
                // Resumption is a later invocation of the training stage's
                // success path; this run halts with the original failure.
                return Err(error);
            }

            let finished = prompt::confirm(
                confirm_source,
                "External training finished (continue forge)?",
                true,
            )
            .map_err(|e| StageError::Other(anyhow!("handoff confirmation: {e}")))?;
            if !finished {
                return Err(error);
            }

            let model_name = store.read_required(HUGGINGFACE, "model_name")?;
            let save = build_save(store, session, hub_url(&model_name))?;
            registry::append(store, save.clone())?;
            Ok(TrainOutcome::HandedOff { handoff, save })
        }
    }
}

/// Locator of the artifact the operator publishes under the configured name.
///
/// The name may carry its hub namespace (`user/model`); no verification that
/// anything exists at the location is performed.
fn hub_url(model_name: &str) -> String {
    format!("https://huggingface.co/{model_name}")
}

fn build_save(
    store: &ConfigStore,
    session: &Path,
    url: String,
) -> Result<ModelSave, StageError> {
    let raw = store.read_required(TRAINING, "context_length")?;
    let context_length: u32 = raw
        .trim()
        .parse()
        .map_err(|_| StageError::Data(format!("invalid training context_length: {raw}")))?;
    Ok(ModelSave {
        url,
        context_length,
        data_path: session.display().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GENERAL;
    use crate::prompt::{DefaultSource, ScriptedSource};
    use async_trait::async_trait;
    use std::fs;
    use tempfile::TempDir;

    enum Script {
        Succeed(&'static str),
        Oom,
        Conflict,
    }

    struct FixedTrainer(Script);

    #[async_trait]
    impl Trainer for FixedTrainer {
        async fn train(&self, _session: &Path, _store: &ConfigStore) -> Result<String, StageError> {
            match &self.0 {
                Script::Succeed(url) => Ok((*url).to_string()),
                Script::Oom => Err(StageError::ResourceExhaustion("gpu oom".to_string())),
                Script::Conflict => Err(StageError::NamingConflict("taken".to_string())),
            }
        }
    }

    fn seeded_store(dir: &TempDir) -> ConfigStore {
        let mut store = ConfigStore::initialize(dir.path()).unwrap();
        store
            .write(GENERAL, &[("session", "s1"), ("data_path", "/d")])
            .unwrap();
        store
            .write(
                HUGGINGFACE,
                &[("api_key", "hf_key"), ("model_name", "user/mimic-3")],
            )
            .unwrap();
        store.write(TRAINING, &[("context_length", "2")]).unwrap();
        store
    }

    fn session_with_bundle() -> TempDir {
        let session = TempDir::new().unwrap();
        let bundle = session.path().join(crate::session::TRAINING_DATA_DIR);
        fs::create_dir_all(&bundle).unwrap();
        fs::write(bundle.join("train.csv"), "a,b").unwrap();
        session
    }

    #[tokio::test]
    async fn test_success_appends_save() {
        let dir = TempDir::new().unwrap();
        let mut store = seeded_store(&dir);
        let session = TempDir::new().unwrap();
        let trainer = Box::new(FixedTrainer(Script::Succeed("https://huggingface.co/user/mimic-3")));

        let outcome = run_train_stage(
            &mut store,
            session.path(),
            trainer,
            false,
            &mut DefaultSource::new(),
        )
        .await
        .unwrap();

        match outcome {
            TrainOutcome::Trained(save) => {
                assert_eq!(save.context_length, 2);
                assert_eq!(save.data_path, session.path().display().to_string());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(registry::list(&store).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_naming_conflict_halts_without_side_effects() {
        let dir = TempDir::new().unwrap();
        let mut store = seeded_store(&dir);
        let before = fs::read(store.path()).unwrap();
        let session = session_with_bundle();

        let err = run_train_stage(
            &mut store,
            session.path(),
            Box::new(FixedTrainer(Script::Conflict)),
            true,
            &mut ScriptedSource::new(["y"]),
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), "naming-conflict");
        assert!(registry::list(&store).unwrap().is_empty());
        assert_eq!(fs::read(store.path()).unwrap(), before);
        assert!(!session.path().join(recovery::HANDOFF_DIR).exists());
    }

    #[tokio::test]
    async fn test_oom_in_forge_confirmed_appends_derived_save() {
        let dir = TempDir::new().unwrap();
        let mut store = seeded_store(&dir);
        let session = session_with_bundle();

        let outcome = run_train_stage(
            &mut store,
            session.path(),
            Box::new(FixedTrainer(Script::Oom)),
            true,
            &mut ScriptedSource::new(["y"]),
        )
        .await
        .unwrap();

        match outcome {
            TrainOutcome::HandedOff { handoff, save } => {
                assert!(handoff.join(recovery::ENV_FILE).exists());
                assert_eq!(save.url, "https://huggingface.co/user/mimic-3");
                assert_eq!(save.context_length, 2);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(registry::list(&store).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_oom_in_forge_declined_aborts() {
        let dir = TempDir::new().unwrap();
        let mut store = seeded_store(&dir);
        let session = session_with_bundle();

        let err = run_train_stage(
            &mut store,
            session.path(),
            Box::new(FixedTrainer(Script::Oom)),
            true,
            &mut ScriptedSource::new(["n"]),
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), "resource-exhaustion");
        assert!(registry::list(&store).unwrap().is_empty());
        // The handoff package itself stays on disk for the operator.
        assert!(session.path().join(recovery::HANDOFF_DIR).exists());
    }

    #[tokio::test]
    async fn test_oom_outside_forge_halts_after_materializing() {
        let dir = TempDir::new().unwrap();
        let mut store = seeded_store(&dir);
        let session = session_with_bundle();

        let err = run_train_stage(
            &mut store,
            session.path(),
            Box::new(FixedTrainer(Script::Oom)),
            false,
            &mut DefaultSource::new(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), "resource-exhaustion");
        assert!(session
            .path()
            .join(recovery::HANDOFF_DIR)
            .join(recovery::ENV_FILE)
            .exists());
        assert!(registry::list(&store).unwrap().is_empty());
    }
}
