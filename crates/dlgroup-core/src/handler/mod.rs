//! Pluggable pre- and post-download processing.
//!
//! Pre-download handlers may reconfigure a task before it starts (e.g.
//! switch it to an in-memory download); the first one that applies ends the
//! chain. Post-download handlers inspect finished content and may spawn
//! follow-up tasks; all of them run. A handler error is logged by the task
//! and never fails it.

mod in_memory;
mod uri_list;

use serde::Serialize;

use crate::error::HandlerError;
use crate::task::{DownloadTask, Spawner, TaskId};

pub use in_memory::InMemoryPreHandler;
pub use uri_list::{parse_uri_list, UriListPostHandler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    Applied,
    NotApplicable,
}

pub trait PreDownloadHandler {
    fn name(&self) -> &'static str;
    fn apply(&self, task: &mut DownloadTask) -> Result<HandlerOutcome, HandlerError>;
}

pub trait PostDownloadHandler {
    fn name(&self) -> &'static str;
    fn apply(&self, task: &DownloadTask, spawner: &mut Spawner<'_>) -> Result<HandlerOutcome, HandlerError>;
}

/// Provenance shared by every task spawned from the same source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpawnMetadata {
    pub origin_task: TaskId,
    pub origin_uri: Option<String>,
    pub handler: &'static str,
}
