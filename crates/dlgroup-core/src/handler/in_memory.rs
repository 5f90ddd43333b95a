use crate::error::HandlerError;
use crate::task::DownloadTask;

use super::{HandlerOutcome, PreDownloadHandler};

/// Switches tasks whose destination basename ends with one of `suffixes`
/// to in-memory downloads. Matching is case-insensitive.
#[derive(Debug, Clone)]
pub struct InMemoryPreHandler {
    suffixes: Vec<String>,
}

impl InMemoryPreHandler {
    pub fn new(suffixes: Vec<String>) -> Self {
        Self {
            suffixes: suffixes.into_iter().map(|s| s.to_ascii_lowercase()).collect(),
        }
    }

    pub(super) fn matches(suffixes: &[String], basename: &str) -> bool {
        let name = basename.to_ascii_lowercase();
        suffixes.iter().any(|s| !s.is_empty() && name.ends_with(s.as_str()))
    }
}

impl PreDownloadHandler for InMemoryPreHandler {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    fn apply(&self, task: &mut DownloadTask) -> Result<HandlerOutcome, HandlerError> {
        let Some(basename) = task.context().first_file().map(|f| f.basename()) else {
            return Ok(HandlerOutcome::NotApplicable);
        };
        if !Self::matches(&self.suffixes, &basename) {
            return Ok(HandlerOutcome::NotApplicable);
        }
        tracing::debug!(task = task.id(), %basename, "downloading to memory");
        task.mark_in_memory_download();
        Ok(HandlerOutcome::Applied)
    }
}
