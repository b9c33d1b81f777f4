//! Configuration errors.
//!
//! Everything here is raised while decoding conditions or building the
//! tree/environment, never mid-search. Per-candidate outcomes are
//! [`Verdict`](crate::types::Verdict)s, not errors.

use thiserror::Error;

/// Failure to decode a hex-encoded condition.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConditionError {
    #[error("malformed hex at byte {0}")]
    MalformedHex(usize),

    #[error("payload of {got} bytes is shorter than the required {need}")]
    Truncated { got: usize, need: usize },

    #[error("condition id {0} is out of range")]
    SaveOutOfRange(i32),

    #[error("unknown filter type {0}")]
    UnknownKind(u16),
}

/// Failure to set up a condition tree or evaluation environment.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("condition {save}: {reason}")]
    BiomeFilter { save: i32, reason: String },

    #[error("condition {save}: filter '{name}' has been retired, re-save the condition")]
    RetiredKind { save: i32, name: &'static str },

    #[error("condition id {0} is reserved or out of range")]
    InvalidSave(i32),

    #[error("condition id {0} is used more than once")]
    DuplicateSave(i32),

    #[error("condition {0} is part of a reference cycle")]
    Cycle(i32),

    #[error("missing script for condition {save} (hash {hash:016x})")]
    MissingScript { save: i32, hash: u64 },

    #[error("condition {save}:\n{message}")]
    ScriptLoad { save: i32, message: String },

    #[error("condition {save} depends on condition {dep}, which is not enabled")]
    MissingDependency { save: i32, dep: i32 },
}
