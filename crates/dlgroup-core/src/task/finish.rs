//! Completion, post-processing and teardown.

use std::rc::Rc;

use crate::config::TaskConfig;
use crate::context::DownloadContext;
use crate::download_result::DownloadResult;
use crate::error::TaskError;
use crate::handler::{HandlerOutcome, SpawnMetadata};
use crate::result_code::ResultCode;

use super::id::TaskIdCounter;
use super::state::TaskPhase;
use super::transfer::WriteTarget;
use super::{DownloadTask, TaskId};

/// Creates follow-up tasks on behalf of a post-download handler. Spawned
/// tasks get fresh ids and point back at the task that produced them.
pub struct Spawner<'a> {
    ids: &'a mut TaskIdCounter,
    parent: TaskId,
    spawned: Vec<DownloadTask>,
}

impl<'a> Spawner<'a> {
    pub(crate) fn new(ids: &'a mut TaskIdCounter, parent: TaskId) -> Self {
        Self {
            ids,
            parent,
            spawned: Vec::new(),
        }
    }

    pub fn spawn(
        &mut self,
        config: TaskConfig,
        context: DownloadContext,
        metadata: Rc<SpawnMetadata>,
    ) -> TaskId {
        let mut task = DownloadTask::new(self.ids, config, context);
        task.belongs_to(self.parent);
        task.set_metadata(metadata);
        let id = task.id();
        self.spawned.push(task);
        id
    }

    pub fn len(&self) -> usize {
        self.spawned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spawned.is_empty()
    }

    fn truncate(&mut self, len: usize) {
        self.spawned.truncate(len);
    }

    fn into_tasks(self) -> Vec<DownloadTask> {
        self.spawned
    }
}

impl DownloadTask {
    /// Every piece has been received, whether the target is a file or a
    /// memory buffer. False until the piece store exists.
    pub fn download_finished(&self) -> bool {
        self.transfer
            .as_ref()
            .is_some_and(|t| t.pieces().all_pieces_done())
    }

    /// Finished and no command is still outstanding.
    pub fn all_download_finished(&self) -> bool {
        self.num_command == 0 && self.download_finished()
    }

    /// Nothing more will happen to this task: it failed, finished, or was
    /// halted, and all of its commands have drained.
    pub fn is_terminal(&self) -> bool {
        self.num_command == 0
            && (self.failed
                || self.all_download_finished()
                || (self.is_halt_requested() && self.phase != TaskPhase::Done))
    }

    /// Run every post-download handler against the finished content and
    /// return the tasks they spawned. A failing handler is logged and its
    /// partial output dropped; the others still run.
    pub fn post_download_processing(&mut self, ids: &mut TaskIdCounter) -> Vec<DownloadTask> {
        if !self.download_finished() {
            tracing::debug!(task = self.id, "not finished; skipping post-processing");
            return Vec::new();
        }
        self.phase = TaskPhase::Finishing;
        let handlers = std::mem::take(&mut self.post_handlers);
        let mut spawner = Spawner::new(ids, self.id);
        for handler in &handlers {
            let mark = spawner.len();
            match handler.apply(self, &mut spawner) {
                Ok(HandlerOutcome::Applied) => tracing::debug!(
                    task = self.id,
                    handler = handler.name(),
                    spawned = spawner.len() - mark,
                    "post-download handler applied"
                ),
                Ok(HandlerOutcome::NotApplicable) => {}
                Err(e) => {
                    tracing::warn!(task = self.id, error = %e, "post-download handler failed");
                    spawner.truncate(mark);
                }
            }
        }
        self.post_handlers = handlers;
        let children = spawner.into_tasks();
        self.child_ids.extend(children.iter().map(DownloadTask::id));
        children
    }

    /// Finished beats everything; otherwise the most recently recorded URI
    /// outcome; otherwise unknown.
    pub fn download_result(&self) -> ResultCode {
        if self.download_finished() {
            return ResultCode::Finished;
        }
        self.uri_results
            .last()
            .map(|r| r.code)
            .unwrap_or(ResultCode::UnknownError)
    }

    pub fn create_download_result(&self) -> DownloadResult {
        DownloadResult {
            id: self.id,
            result: self.download_result(),
            path: self.context.first_file_path().map(ToOwned::to_owned),
            total_length: self.total_length(),
            completed_length: self.completed_length(),
            in_memory: self.in_memory_download,
            uri_results: self.uri_results.clone(),
            error_message: self.error_message.clone(),
            parent_id: self.parent_id,
            child_ids: self.child_ids.clone(),
        }
    }

    /// Tear the task down and report how it ended. Finished downloads drop
    /// their control file; unfinished ones persist progress for a later
    /// resume.
    pub fn finalize(&mut self) -> DownloadResult {
        if self.download_finished() {
            if let Err(e) = self.remove_control_file() {
                tracing::warn!(task = self.id, error = %e, "could not remove control file");
            }
            if let Err(e) = self.apply_last_modified_time_to_local_files() {
                tracing::warn!(task = self.id, error = %e, "could not apply remote time");
            }
        } else if let Err(e) = self.save_control_file() {
            tracing::warn!(task = self.id, error = %e, "could not save control file");
        }
        self.close_file();
        self.release_runtime_resource();
        self.phase = TaskPhase::Done;
        let result = self.create_download_result();
        tracing::info!(
            task = self.id,
            result = %result.result,
            completed = result.completed_length,
            "task finished"
        );
        result
    }

    /// Close an on-disk destination. In-memory content stays available to
    /// post-download handlers.
    pub fn close_file(&mut self) {
        if let Some(WriteTarget::Disk(writer)) = &self.target {
            if let Err(e) = writer.sync() {
                tracing::warn!(task = self.id, error = %e, "sync before close failed");
            }
            self.target = None;
        }
    }

    /// Drop protocol runtime references and tell the scheduler how many
    /// outstanding commands it should now abort. `None` when already
    /// released.
    pub fn release_runtime_resource(&mut self) -> Option<usize> {
        if self.runtime_released {
            return None;
        }
        self.runtime_released = true;
        self.runtime.release(self.id);
        tracing::debug!(task = self.id, outstanding = self.num_command, "runtime resources released");
        Some(self.num_command)
    }

    /// Stamp finished files with the newest remote modification time.
    pub fn apply_last_modified_time_to_local_files(&self) -> Result<(), TaskError> {
        if !self.config.remote_time || self.in_memory_download {
            return Ok(());
        }
        let Some(time) = self.last_modified_time else {
            return Ok(());
        };
        for entry in self.context.file_entries() {
            if !entry.path.exists() {
                continue;
            }
            let file = std::fs::File::options()
                .write(true)
                .open(&entry.path)
                .map_err(|e| TaskError::Storage(format!("open {}: {}", entry.path.display(), e)))?;
            file.set_modified(time)
                .map_err(|e| TaskError::Storage(format!("set mtime on {}: {}", entry.path.display(), e)))?;
        }
        tracing::debug!(task = self.id, "applied remote modification time");
        Ok(())
    }
}
