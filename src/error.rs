//! Error types for mimicforge pipeline stages.
//!
//! Every failure a stage can report maps onto one variant of [`StageError`],
//! so the failure classifier can pattern-match exhaustively instead of
//! comparing sentinel codes. Classified errors also cross the collaborator
//! process boundary as a reserved exit-code band (see [`StageError::exit_code`]).

use std::path::PathBuf;

use thiserror::Error;

/// First exit code of the band reserved for classified collaborator failures.
const EXIT_CODE_BASE: i32 = 10;

/// Classified failure taxonomy shared by all pipeline stages.
#[derive(Debug, Error)]
pub enum StageError {
    /// A required configuration key is missing or the store is unreadable.
    #[error("configuration error: missing [{section}] {key}")]
    Config { section: String, key: String },

    /// A required directory or file is absent.
    #[error("path error: {} does not exist", .0.display())]
    Path(PathBuf),

    /// Mined or training data is malformed or unreadable.
    #[error("data error: {0}")]
    Data(String),

    /// A collaborator API key is missing or was rejected.
    #[error("credential error: {0}")]
    Credential(String),

    /// The target guild (server) or its channels could not be reached.
    #[error("guild resolution error: {0}")]
    GuildResolution(String),

    /// The configured model name collides with an existing remote artifact.
    #[error("naming conflict: {0}")]
    NamingConflict(String),

    /// Local compute ran out of memory during training.
    #[error("resource exhaustion: {0}")]
    ResourceExhaustion(String),

    /// A model save or menu selection was outside the current bounds.
    #[error("index error: {index} out of range (have {len})")]
    Index { index: usize, len: usize },

    /// The configuration store itself failed to load or persist.
    #[error("configuration store error: {0}")]
    Store(#[from] crate::config::StoreError),

    /// Unclassified error, reported verbatim.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StageError {
    /// Short name of the taxonomy kind, used in operator-facing messages.
    pub fn kind(&self) -> &'static str {
        match self {
            StageError::Config { .. } => "config",
            StageError::Path(_) => "path",
            StageError::Data(_) => "data",
            StageError::Credential(_) => "credential",
            StageError::GuildResolution(_) => "guild-resolution",
            StageError::NamingConflict(_) => "naming-conflict",
            StageError::ResourceExhaustion(_) => "resource-exhaustion",
            StageError::Index { .. } => "index",
            StageError::Store(_) => "config",
            StageError::Other(_) => "unclassified",
        }
    }

    /// Exit code a collaborator process uses to report this classified failure.
    ///
    /// `Store` and `Other` have no reserved code; they surface as a generic
    /// non-zero exit and are reconstructed as unclassified.
    pub fn exit_code(&self) -> i32 {
        match self {
            StageError::Config { .. } | StageError::Store(_) => EXIT_CODE_BASE,
            StageError::Path(_) => EXIT_CODE_BASE + 1,
            StageError::Data(_) => EXIT_CODE_BASE + 2,
            StageError::Credential(_) => EXIT_CODE_BASE + 3,
            StageError::GuildResolution(_) => EXIT_CODE_BASE + 4,
            StageError::NamingConflict(_) => EXIT_CODE_BASE + 5,
            StageError::ResourceExhaustion(_) => EXIT_CODE_BASE + 6,
            StageError::Index { .. } => EXIT_CODE_BASE + 7,
            StageError::Other(_) => 1,
        }
    }

    /// Reconstruct a classified failure from a collaborator exit code.
    ///
    /// Returns `None` for codes outside the reserved band; the caller reports
    /// those verbatim as unclassified failures.
    pub fn from_exit_code(code: i32, context: &str) -> Option<StageError> {
        match code - EXIT_CODE_BASE {
            0 => Some(StageError::Config {
                section: "unknown".to_string(),
                key: context.to_string(),
            }),
            1 => Some(StageError::Path(PathBuf::from(context))),
            2 => Some(StageError::Data(context.to_string())),
            3 => Some(StageError::Credential(context.to_string())),
            4 => Some(StageError::GuildResolution(context.to_string())),
            5 => Some(StageError::NamingConflict(context.to_string())),
            6 => Some(StageError::ResourceExhaustion(context.to_string())),
            7 => Some(StageError::Index { index: 0, len: 0 }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_reconstruct_same_kind() {
        let errors = [
            StageError::Path(PathBuf::from("/missing")),
            StageError::Data("bad csv".to_string()),
            StageError::Credential("rejected".to_string()),
            StageError::GuildResolution("no guild".to_string()),
            StageError::NamingConflict("taken".to_string()),
            StageError::ResourceExhaustion("oom".to_string()),
        ];

        for err in &errors {
            let rebuilt = StageError::from_exit_code(err.exit_code(), "ctx")
                .expect("reserved band code should reconstruct");
            assert_eq!(rebuilt.kind(), err.kind());
        }
    }

    #[test]
    fn test_unreserved_codes_are_unclassified() {
        assert!(StageError::from_exit_code(1, "boom").is_none());
        assert!(StageError::from_exit_code(42, "boom").is_none());
    }

    #[test]
    fn test_display_names_taxonomy_kind() {
        let err = StageError::NamingConflict("mimic-1".to_string());
        assert!(err.to_string().contains("naming conflict"));

        let err = StageError::Index { index: 2, len: 1 };
        assert!(err.to_string().contains("index"));
        assert!(err.to_string().contains("2"));
    }
}
