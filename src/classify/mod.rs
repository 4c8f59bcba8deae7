//! Failure classification.
//!
//! A pure mapping from a stage's raw error to the action the orchestrator
//! takes next. Only the training stage has recoverable classes; everything
//! else is fatal. The classifier performs no side effects — materializing the
//! recovery handoff belongs to [`crate::recovery`].

use crate::error::StageError;
use crate::stage::StageId;

/// What the orchestrator should do with a failed stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Report and abort the run.
    Fatal,
    /// Halt; the operator must reconfigure the model name before retrying.
    RenameRequired,
    /// Hand the stage's work off to external compute and resume afterwards.
    Recoverable,
}

/// Classify a stage failure.
pub fn classify(stage: StageId, error: &StageError) -> Verdict {
    match (stage, error) {
        (StageId::Train, StageError::NamingConflict(_)) => Verdict::RenameRequired,
        (StageId::Train, StageError::ResourceExhaustion(_)) => Verdict::Recoverable,
        _ => Verdict::Fatal,
    }
}

/// Dedicated remediation message for errors that have one.
///
/// Guild resolution failures get a connectivity hint instead of the generic
/// taxonomy message; naming conflicts point the operator at `set`.
pub fn remediation(error: &StageError) -> Option<&'static str> {
    match error {
        StageError::GuildResolution(_) => {
            Some("Make sure the bot is invited to the guild and currently connected.")
        }
        StageError::NamingConflict(_) => {
            Some("Change the model name, e.g. `mimicforge set --model_name NEW_NAME`, then retry.")
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_train_naming_conflict_requires_rename() {
        let err = StageError::NamingConflict("mimic-1".to_string());
        assert_eq!(classify(StageId::Train, &err), Verdict::RenameRequired);
    }

    #[test]
    fn test_train_oom_is_recoverable() {
        let err = StageError::ResourceExhaustion("cuda oom".to_string());
        assert_eq!(classify(StageId::Train, &err), Verdict::Recoverable);
    }

    #[test]
    fn test_oom_outside_train_is_fatal() {
        let err = StageError::ResourceExhaustion("oom".to_string());
        assert_eq!(classify(StageId::Mine, &err), Verdict::Fatal);
        assert_eq!(classify(StageId::Preprocess, &err), Verdict::Fatal);
    }

    #[test]
    fn test_everything_else_is_fatal() {
        let errors = [
            StageError::Path(PathBuf::from("/missing")),
            StageError::Data("bad".to_string()),
            StageError::Credential("rejected".to_string()),
            StageError::Index { index: 2, len: 1 },
        ];
        for err in &errors {
            assert_eq!(classify(StageId::Train, err), Verdict::Fatal);
        }
    }

    #[test]
    fn test_guild_resolution_has_dedicated_message() {
        let err = StageError::GuildResolution("unreachable".to_string());
        assert!(remediation(&err).unwrap().contains("connected"));

        let err = StageError::Data("bad".to_string());
        assert!(remediation(&err).is_none());
    }
}
