//! Error types.
//!
//! The taxonomy follows the engine's boundaries:
//!
//! - [`ConfigError`]: the rule document could not be read, parsed or written,
//!   or one of its rules failed validation.
//! - [`ValidationErrors`]: a rule create/update was rejected; carries one
//!   [`FieldError`] per offending field and is never partially applied.
//! - [`EngineInputError`]: the caller handed the engine a malformed track list.
//! - [`StoreError`] / [`EngineError`]: the union types returned by the store
//!   and the engine façade.
//!
//! Unsafe (but syntactically valid) patterns are *not* errors; they surface as a
//! [`PatternCheck`](crate::PatternCheck) with `safe == false`.

use crate::RuleKind;
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The rule document could not be loaded or persisted.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read rule document {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write rule document {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse rule document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("rule id '{0}' appears more than once in the rule document")]
    DuplicateId(String),

    #[error("rule '{id}' in the rule document is invalid: {errors}")]
    InvalidRule {
        id: String,
        #[source]
        errors: ValidationErrors,
    },
}

/// A rule record whose `action` does not have the shape its `type` requires.
#[derive(Debug, Error)]
#[error("rule '{id}': action does not match type '{kind}': {source}")]
pub struct ActionShapeError {
    pub id: String,
    pub kind: RuleKind,
    #[source]
    pub source: serde_json::Error,
}

/// One field-level validation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

/// Structured list of validation failures for a rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Error)]
#[error("rule validation failed: {}", join_field_errors(.errors))]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    /// Return `Ok(())` when nothing was recorded, `Err(self)` otherwise.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() { Ok(()) } else { Err(self) }
    }

    /// True when at least one message targets `field`.
    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors.iter().map(|e| format!("{}: {}", e.field, e.message)).collect::<Vec<_>>().join("; ")
}

/// The caller supplied tracks the engine refuses to coerce.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineInputError {
    #[error("tracks must be a JSON array, got {found}")]
    NotAList { found: &'static str },

    #[error("track at index {index} is not a JSON object")]
    TrackNotObject { index: usize },

    #[error("track '{track_id}' (index {index}) has no numeric `_relevance_score`")]
    MissingScore { index: usize, track_id: String },
}

/// Failures of [`RuleStore`](crate::RuleStore) operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error("no rule with id '{0}'")]
    UnknownRule(String),

    #[error("rule '{0}' is not in the active set")]
    NotActive(String),

    #[error("rule '{0}' is not in the disabled set")]
    NotDisabled(String),
}

/// Failures of the [`Engine`](crate::Engine) façade.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Input(#[from] EngineInputError),

    #[error("rule matching exceeded its {budget:?} budget after {elapsed:?} ({evaluated} rules evaluated)")]
    MatchBudgetExceeded { budget: Duration, elapsed: Duration, evaluated: usize },
}
