//! Collaborator interfaces.
//!
//! Scraping, preprocessing, training and the runtime agent are external
//! collaborators; the pipeline specifies them only at their interface. Each
//! one receives the persisted configuration (or a path derived from it) and
//! reports either a success payload or a classified [`StageError`] — never a
//! panic across the stage boundary.

pub mod process;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::config::ConfigStore;
use crate::error::StageError;
use crate::registry::ModelSave;

pub use process::{ProcessActivator, ProcessMiner, ProcessPreprocessor, ProcessTrainer};

/// Scrapes raw chat history for the configured guild and target user.
#[async_trait]
pub trait Miner: Send + Sync {
    /// Produce the raw-data directory for the configured session.
    async fn mine(&self, store: &ConfigStore) -> Result<PathBuf, StageError>;
}

/// Cleans mined data and packages it into a training-ready bundle.
#[async_trait]
pub trait Preprocessor: Send + Sync {
    /// Normalize raw mined data; returns the cleaned-data directory.
    async fn clean(&self, session: &Path) -> Result<PathBuf, StageError>;

    /// Package cleaned data for training; returns the bundle directory.
    async fn package(&self, cleaned: &Path, store: &ConfigStore) -> Result<PathBuf, StageError>;
}

/// Fine-tunes and uploads a model from a packaged training bundle.
#[async_trait]
pub trait Trainer: Send + Sync {
    /// Train on the session's bundle; returns the deployed model locator.
    async fn train(&self, session: &Path, store: &ConfigStore) -> Result<String, StageError>;
}

/// Runs the conversational agent with a trained model, indefinitely.
#[async_trait]
pub trait Activator: Send + Sync {
    async fn activate(&self, save: &ModelSave, store: &ConfigStore) -> Result<(), StageError>;
}
