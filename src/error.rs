//! Typed failure states surfaced to callers
//!
//! Most of the crate propagates `anyhow::Error`. The types here are the
//! ones a caller needs to match on: conditions that stop a run before it
//! starts, and malformed settings lines.

use std::path::PathBuf;
use thiserror::Error;

/// A condition that prevents a pipeline run (or one of its stages) from starting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionError {
    #[error("primer3 executable not found: {}", .0.display())]
    Primer3Missing(PathBuf),

    #[error("primer3 thermodynamic parameters directory not found: {}", .0.display())]
    ThermodynamicParametersMissing(PathBuf),

    #[error("input file not found: {}", .0.display())]
    InputMissing(PathBuf),

    #[error("input file is locked by another process: {}", .0.display())]
    InputLocked(PathBuf),

    #[error("repeat annotation file required to merge results: {}", .0.display())]
    RepeatFileMissing(PathBuf),
}

/// A settings line that could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}: '{text}'")]
pub struct SettingsError {
    pub line: usize,
    pub text: String,
    pub message: String,
}

impl SettingsError {
    pub fn new(line: usize, text: &str, message: impl Into<String>) -> Self {
        Self {
            line,
            text: text.to_string(),
            message: message.into(),
        }
    }
}
