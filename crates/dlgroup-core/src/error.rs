//! Task failure taxonomy.
//!
//! Validation and safety failures abort startup before any destructive I/O
//! and become the task's terminal result. Handler failures never leave the
//! handler chain that produced them.

use std::path::PathBuf;
use thiserror::Error;

use crate::result_code::ResultCode;

/// Fatal failure of a single task. Sibling tasks are unaffected.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("content mismatch: expected {field} {expected:?}, got {actual:?}")]
    ContentMismatch {
        field: &'static str,
        expected: String,
        actual: String,
    },

    #[error("refusing to write {path:?}: {reason}")]
    SafetyViolation { path: PathBuf, reason: String },

    #[error("resource not found {count} times (limit {limit})")]
    FileNotFoundExceeded { count: u32, limit: u32 },

    #[error("incompatible resume state in {path:?}: {reason}")]
    ResumeInconsistency { path: PathBuf, reason: String },

    #[error("could not find a free name for {path:?} after {tries} attempts")]
    RenameExhausted { path: PathBuf, tries: u32 },

    #[error("no URI to fetch {path:?} from")]
    NoUri { path: PathBuf },

    #[error("storage error: {0}")]
    Storage(String),
}

impl TaskError {
    pub fn result_code(&self) -> ResultCode {
        match self {
            TaskError::ContentMismatch { .. } => ResultCode::ContentMismatch,
            TaskError::SafetyViolation { .. } => ResultCode::UnsafeDestination,
            TaskError::FileNotFoundExceeded { .. } => ResultCode::MaxFileNotFound,
            TaskError::ResumeInconsistency { .. } => ResultCode::CannotResume,
            TaskError::RenameExhausted { .. } => ResultCode::FileRenamingFailed,
            TaskError::NoUri { .. } => ResultCode::ResourceNotFound,
            TaskError::Storage(_) => ResultCode::FileIoError,
        }
    }

    pub(crate) fn storage(err: anyhow::Error) -> Self {
        TaskError::Storage(format!("{:#}", err))
    }
}

/// Failure reported by one pre/post-processing handler.
#[derive(Debug, Error)]
#[error("handler {handler} failed: {message}")]
pub struct HandlerError {
    pub handler: &'static str,
    pub message: String,
}

impl HandlerError {
    pub fn new(handler: &'static str, message: impl Into<String>) -> Self {
        Self {
            handler,
            message: message.into(),
        }
    }
}
