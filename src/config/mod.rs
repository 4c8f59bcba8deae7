//! Persisted configuration store for the pipeline.
//!
//! The store is a sectioned key=value file (`config.toml`) under the
//! application path. It is the only channel of communication between stages:
//! every stage loads it from disk at entry and never receives another stage's
//! state in memory. Writes are atomic (temp file + fsync + rename) so a crash
//! mid-write never leaves a partially-written file readable as valid.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::error::StageError;

/// File name of the persisted configuration record.
pub const CONFIG_FILE: &str = "config.toml";

/// Section holding the session identifier and the data root.
pub const GENERAL: &str = "general";
/// Section holding the chat-platform collaborator credentials.
pub const DISCORD: &str = "discord";
/// Section holding the model-hub collaborator credentials and model saves.
pub const HUGGINGFACE: &str = "huggingface";
/// Section holding training parameters.
pub const TRAINING: &str = "training";

/// Errors that can occur while loading or persisting the store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Durable section/key/value store backing one pipeline run.
///
/// Sections and keys are kept in sorted order so that writing the same
/// content twice produces a byte-identical file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl ConfigStore {
    /// Create an empty, section-less store at `app_path/config.toml` and
    /// persist it, creating the application directory if needed.
    pub fn initialize(app_path: &Path) -> Result<Self, StoreError> {
        let store = Self {
            path: app_path.join(CONFIG_FILE),
            sections: BTreeMap::new(),
        };
        store.persist()?;
        Ok(store)
    }

    /// Load the store from `app_path/config.toml`.
    ///
    /// A missing file yields an empty store; reads then fall back to the
    /// caller-supplied defaults rather than failing.
    pub fn load(app_path: &Path) -> Result<Self, StoreError> {
        let path = app_path.join(CONFIG_FILE);
        let sections = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            if contents.trim().is_empty() {
                BTreeMap::new()
            } else {
                toml::from_str(&contents)?
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, sections })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a value, returning `default` when the section or key is absent.
    pub fn read(&self, section: &str, key: &str, default: &str) -> String {
        self.try_read(section, key)
            .map(str::to_string)
            .unwrap_or_else(|| default.to_string())
    }

    /// Read a value if present.
    pub fn try_read(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|s| s.get(key))
            .map(String::as_str)
    }

    /// Read a value that every stage depends on.
    ///
    /// A missing key is the classified missing-configuration error, never a
    /// panic.
    pub fn read_required(&self, section: &str, key: &str) -> Result<String, StageError> {
        self.try_read(section, key)
            .map(str::to_string)
            .ok_or_else(|| StageError::Config {
                section: section.to_string(),
                key: key.to_string(),
            })
    }

    /// Merge key/value pairs into a section, creating it if absent, and
    /// persist the whole store atomically.
    pub fn write(&mut self, section: &str, pairs: &[(&str, &str)]) -> Result<(), StoreError> {
        let entry = self.sections.entry(section.to_string()).or_default();
        for (key, value) in pairs {
            entry.insert((*key).to_string(), (*value).to_string());
        }
        self.persist()
    }

    /// Raw contents of the persisted file, for the `config` command.
    pub fn raw_contents(&self) -> Result<String, StoreError> {
        Ok(fs::read_to_string(&self.path)?)
    }

    /// Serialize and write the store via temp file + fsync + atomic rename.
    fn persist(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let serialized = toml::to_string_pretty(&self.sections)?;

        let tmp_path = self.path.with_extension("toml.tmp");
        let mut tmp_file = File::create(&tmp_path)?;
        tmp_file.write_all(serialized.as_bytes())?;
        tmp_file.sync_all()?;
        drop(tmp_file);

        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_initialize_creates_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::initialize(dir.path()).unwrap();
        assert!(store.path().exists());
        assert_eq!(store.read("general", "session", "fallback"), "fallback");
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::load(dir.path()).unwrap();
        assert_eq!(store.read("discord", "api_key", ""), "");
    }

    #[test]
    fn test_write_creates_missing_parent_dir() {
        let dir = TempDir::new().unwrap();
        let app_path = dir.path().join("nested").join("app");
        let mut store = ConfigStore::load(&app_path).unwrap();
        store.write("general", &[("session", "run-1")]).unwrap();
        assert!(app_path.join(CONFIG_FILE).exists());
    }

    #[test]
    fn test_write_merges_into_section() {
        let dir = TempDir::new().unwrap();
        let mut store = ConfigStore::initialize(dir.path()).unwrap();
        store.write("general", &[("session", "run-1")]).unwrap();
        store.write("general", &[("data_path", "/tmp/data")]).unwrap();

        let reloaded = ConfigStore::load(dir.path()).unwrap();
        assert_eq!(reloaded.read("general", "session", ""), "run-1");
        assert_eq!(reloaded.read("general", "data_path", ""), "/tmp/data");
    }

    #[test]
    fn test_idempotent_writes_are_byte_identical() {
        let dir = TempDir::new().unwrap();
        let mut store = ConfigStore::initialize(dir.path()).unwrap();

        store
            .write("general", &[("session", "run-1"), ("data_path", "/d")])
            .unwrap();
        let first = fs::read(store.path()).unwrap();

        store
            .write("general", &[("data_path", "/d"), ("session", "run-1")])
            .unwrap();
        let second = fs::read(store.path()).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_read_required_missing_key_is_classified() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::initialize(dir.path()).unwrap();
        let err = store.read_required("discord", "api_key").unwrap_err();
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let mut store = ConfigStore::initialize(dir.path()).unwrap();
        store.write("general", &[("session", "s")]).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
