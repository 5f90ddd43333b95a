//! Terminal result codes reported for a task and for each URI attempt.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultCode {
    Finished,
    UnknownError,
    TimeOut,
    ResourceNotFound,
    MaxFileNotFound,
    TooSlow,
    NetworkProblem,
    /// Still running when the result was taken (halted or paused).
    InProgress,
    CannotResume,
    ContentMismatch,
    UnsafeDestination,
    FileRenamingFailed,
    FileIoError,
}

impl ResultCode {
    /// Stable numeric code, suitable for process exit statuses.
    pub fn code(self) -> u8 {
        match self {
            ResultCode::Finished => 0,
            ResultCode::UnknownError => 1,
            ResultCode::TimeOut => 2,
            ResultCode::ResourceNotFound => 3,
            ResultCode::MaxFileNotFound => 4,
            ResultCode::TooSlow => 5,
            ResultCode::NetworkProblem => 6,
            ResultCode::InProgress => 7,
            ResultCode::CannotResume => 8,
            ResultCode::ContentMismatch => 9,
            ResultCode::UnsafeDestination => 10,
            ResultCode::FileRenamingFailed => 11,
            ResultCode::FileIoError => 12,
        }
    }

    pub fn is_finished(self) -> bool {
        self == ResultCode::Finished
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResultCode::Finished => "finished",
            ResultCode::UnknownError => "unknown error",
            ResultCode::TimeOut => "timeout",
            ResultCode::ResourceNotFound => "resource not found",
            ResultCode::MaxFileNotFound => "too many not-found responses",
            ResultCode::TooSlow => "too slow",
            ResultCode::NetworkProblem => "network problem",
            ResultCode::InProgress => "in progress",
            ResultCode::CannotResume => "cannot resume",
            ResultCode::ContentMismatch => "content mismatch",
            ResultCode::UnsafeDestination => "unsafe destination",
            ResultCode::FileRenamingFailed => "file renaming failed",
            ResultCode::FileIoError => "file I/O error",
        };
        f.write_str(s)
    }
}
