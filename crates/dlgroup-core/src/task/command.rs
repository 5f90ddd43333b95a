//! Work items a task hands to the engine's executor.

use std::time::Duration;

use crate::result_code::ResultCode;
use crate::segmenter::Segment;

use super::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// First connection of a transfer whose length is still unknown; it
    /// reads from offset 0 and reports the length once the server sends it.
    Initiate,
    /// Fetch one piece-aligned byte range.
    FetchSegment,
}

/// One unit of transfer work. The executor borrows the task's pieces and
/// destination for the duration of the command and reports back through
/// `DownloadTask::finish_command`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferCommand {
    pub task_id: TaskId,
    pub kind: CommandKind,
    pub uri: String,
    pub piece: usize,
    pub segment: Segment,
    /// Non-chunked protocol (HTTP/FTP) connection.
    pub streaming: bool,
    /// How long the command may wait for progress; enforced by the executor.
    pub timeout: Duration,
}

impl TransferCommand {
    pub(crate) fn is_streaming_uri(uri: &str) -> bool {
        let scheme = uri.split_once("://").map(|(s, _)| s.to_ascii_lowercase());
        matches!(scheme.as_deref(), Some("http" | "https" | "ftp" | "sftp"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The command's range (or, for an unknown length, the whole stream of
    /// `bytes` bytes) was written.
    Completed { bytes: u64 },
    Failed { code: ResultCode },
    /// The server reported the resource missing.
    NotFound,
}
