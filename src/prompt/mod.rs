//! Interactive validation loops for stage entry.
//!
//! A prompt repeatedly collects a candidate value until it coerces to the
//! required type and satisfies a predicate. The input source is injected as a
//! capability: interactive runs read the terminal, unattended (forge) runs
//! use [`DefaultSource`], which yields the supplied default exactly once so a
//! bad default fails fast instead of hanging the pipeline.

use std::collections::VecDeque;
use std::fmt::Display;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

/// Errors that can occur while obtaining candidate values.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("IO error reading input: {0}")]
    Io(#[from] io::Error),

    /// A non-interactive source ran out of values before the predicate held.
    #[error("no valid value for '{0}' in non-interactive mode")]
    Exhausted(String),
}

/// A source of candidate values for one prompt loop.
pub trait ValueSource {
    /// Produce the next candidate, or fail if the source is exhausted.
    fn next_value(&mut self, description: &str, default: &str) -> Result<String, PromptError>;
}

/// Terminal-backed source: prints the prompt and reads one line from stdin.
///
/// An empty line means "accept the default".
pub struct InteractiveSource;

impl ValueSource for InteractiveSource {
    fn next_value(&mut self, description: &str, default: &str) -> Result<String, PromptError> {
        let mut err = io::stderr();
        write!(err, "{description} [{default}]: ")?;
        err.flush()?;

        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            Ok(default.to_string())
        } else {
            Ok(trimmed.to_string())
        }
    }
}

/// Non-interactive source: yields the default once, then reports exhaustion.
#[derive(Debug, Default)]
pub struct DefaultSource {
    spent: bool,
}

impl DefaultSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ValueSource for DefaultSource {
    fn next_value(&mut self, description: &str, default: &str) -> Result<String, PromptError> {
        if self.spent {
            return Err(PromptError::Exhausted(description.to_string()));
        }
        self.spent = true;
        Ok(default.to_string())
    }
}

/// Scripted source for deterministic tests: yields queued values in order.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    values: VecDeque<String>,
}

impl ScriptedSource {
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

impl ValueSource for ScriptedSource {
    fn next_value(&mut self, description: &str, _default: &str) -> Result<String, PromptError> {
        self.values
            .pop_front()
            .ok_or_else(|| PromptError::Exhausted(description.to_string()))
    }
}

/// Collect a value until it coerces to `T` and satisfies `valid`.
///
/// Coercion and predicate failures emit a diagnostic and retry with the same
/// default; they are never surfaced as run-level errors. The loop has no
/// retry cap in interactive mode; non-interactive sources terminate it by
/// exhausting instead.
pub fn resolve<T, S, P>(
    source: &mut S,
    description: &str,
    default: T,
    valid: P,
) -> Result<T, PromptError>
where
    T: FromStr + Display,
    S: ValueSource + ?Sized,
    P: Fn(&T) -> bool,
{
    let default_str = default.to_string();
    loop {
        let raw = source.next_value(description, &default_str)?;
        match raw.trim().parse::<T>() {
            Ok(value) if valid(&value) => return Ok(value),
            Ok(value) => eprintln!("Invalid value '{value}' for {description}."),
            Err(_) => eprintln!("Invalid input '{}' for {description}.", raw.trim()),
        }
    }
}

/// Yes/no confirmation through the same source mechanism.
pub fn confirm<S>(source: &mut S, description: &str, default: bool) -> Result<bool, PromptError>
where
    S: ValueSource + ?Sized,
{
    let default_str = if default { "y" } else { "n" };
    loop {
        let raw = source.next_value(description, default_str)?;
        match raw.trim().to_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            other => eprintln!("Invalid input '{other}'. Enter y or n."),
        }
    }
}

/// Predicate: the value names an existing path on disk.
pub fn path_exists(value: &String) -> bool {
    Path::new(value).exists()
}

/// Predicate: positive integer.
pub fn positive(value: &u32) -> bool {
    *value >= 1
}

/// Predicate: strictly exceeds `min`.
pub fn exceeds(min: u32) -> impl Fn(&u32) -> bool {
    move |value| *value > min
}

/// Predicate: decimal strictly between 0 and 1.
pub fn proper_fraction(value: &f64) -> bool {
    *value > 0.0 && *value < 1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_valid_candidate_returns_immediately() {
        let mut source = ScriptedSource::new(["3"]);
        let value = resolve(&mut source, "context length", 2u32, positive).unwrap();
        assert_eq!(value, 3);
        assert!(source.values.is_empty());
    }

    #[test]
    fn test_exactly_one_retry_on_invalid_then_valid() {
        let mut source = ScriptedSource::new(["0", "4"]);
        let value = resolve(&mut source, "context length", 2u32, positive).unwrap();
        assert_eq!(value, 4);
    }

    #[test]
    fn test_coercion_failure_is_locally_recovered() {
        let mut source = ScriptedSource::new(["not-a-number", "5"]);
        let value = resolve(&mut source, "context length", 2u32, positive).unwrap();
        assert_eq!(value, 5);
    }

    #[test]
    fn test_default_source_resolves_on_first_iteration() {
        let mut source = DefaultSource::new();
        let value = resolve(&mut source, "test fraction", 0.1f64, proper_fraction).unwrap();
        assert!((value - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn test_default_source_fails_fast_on_bad_default() {
        let mut source = DefaultSource::new();
        let err = resolve(&mut source, "test fraction", 2.0f64, proper_fraction).unwrap_err();
        assert!(matches!(err, PromptError::Exhausted(_)));
    }

    #[test]
    fn test_exceeds_predicate() {
        let above = exceeds(2);
        assert!(above(&3));
        assert!(!above(&2));
    }

    #[test]
    fn test_confirm_accepts_yes_and_no() {
        let mut source = ScriptedSource::new(["maybe", "yes"]);
        assert!(confirm(&mut source, "continue", false).unwrap());

        let mut source = ScriptedSource::new(["N"]);
        assert!(!confirm(&mut source, "continue", true).unwrap());
    }

    #[test]
    fn test_confirm_default_source_uses_default() {
        let mut source = DefaultSource::new();
        assert!(confirm(&mut source, "continue", true).unwrap());
    }
}
