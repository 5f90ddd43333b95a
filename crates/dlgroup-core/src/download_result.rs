//! Summary record produced when a task leaves the directory.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::result_code::ResultCode;
use crate::task::TaskId;
use crate::uri_selector::UriResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadResult {
    pub id: TaskId,
    pub result: ResultCode,
    pub path: Option<PathBuf>,
    pub total_length: Option<u64>,
    pub completed_length: u64,
    pub in_memory: bool,
    pub uri_results: Vec<UriResult>,
    pub error_message: Option<String>,
    /// 0 for tasks nobody spawned.
    pub parent_id: TaskId,
    pub child_ids: Vec<TaskId>,
}

impl DownloadResult {
    pub fn is_success(&self) -> bool {
        self.result.is_finished()
    }
}
