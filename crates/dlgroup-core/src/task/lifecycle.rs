//! Command generation, command completion, halt and pause.

use std::time::Instant;

use crate::error::TaskError;
use crate::handler::HandlerOutcome;
use crate::piece_store::BitfieldPieceStore;
use crate::result_code::ResultCode;
use crate::segmenter::Segment;
use crate::storage::{StorageWriter, StorageWriterBuilder};
use crate::uri_selector::UriResult;

use super::command::{CommandKind, CommandOutcome, TransferCommand};
use super::state::{HaltReason, RunState, TaskPhase};
use super::transfer::{TransferState, WriteTarget};
use super::DownloadTask;

impl DownloadTask {
    /// Start the task: run pre-download handlers, validate the descriptor,
    /// build the piece store, load resume state, check the destination and
    /// open it. Returns the first commands.
    ///
    /// Returns no commands (and stays `Created`) while the dependency gate
    /// is closed or a halt or pause is pending. Calling it again after a successful
    /// start is a no-op. On error the task is failed and the error is its
    /// terminal result.
    pub fn create_initial_command(&mut self) -> Result<Vec<TransferCommand>, TaskError> {
        self.create_initial_command_with_limit(self.num_concurrent_command)
    }

    /// [`create_initial_command`](Self::create_initial_command) emitting at
    /// most `max` commands, for schedulers with a shared connection budget.
    pub fn create_initial_command_with_limit(&mut self, max: usize) -> Result<Vec<TransferCommand>, TaskError> {
        if self.phase != TaskPhase::Created {
            tracing::debug!(task = self.id, phase = ?self.phase, "already started");
            return Ok(Vec::new());
        }
        if !self.is_dependency_resolved() {
            tracing::debug!(task = self.id, "waiting on dependency");
            return Ok(Vec::new());
        }
        if self.run_state != RunState::Running {
            return Ok(Vec::new());
        }
        self.phase = TaskPhase::Initializing;
        match self.initialize(max) {
            Ok(commands) => Ok(commands),
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    fn initialize(&mut self, max: usize) -> Result<Vec<TransferCommand>, TaskError> {
        self.pre_download_processing();

        if self.context.uris().is_empty() {
            return Err(TaskError::NoUri {
                path: self.context.first_file_path().map(Into::into).unwrap_or_default(),
            });
        }
        let current = self.context.first_file().map(|f| f.basename()).unwrap_or_default();
        self.validate_filename(&current)?;
        if let Some(len) = self.context.total_length() {
            self.validate_total_length(len)?;
        }

        let resume = self.load_resume_state()?;
        if let Some(state) = &resume {
            if self.context.total_length().is_none() {
                self.context.set_total_length(state.total_length);
            }
        }
        if self.transfer.is_none() {
            self.init_piece_storage(resume.as_ref().map(|s| s.piece_length));
        }
        if let (Some(state), Some(t)) = (&resume, self.transfer.as_mut()) {
            t.pieces_mut().restore_bitfield(&state.bitfield);
            self.stats.set_prior_upload_length(state.upload_length);
            tracing::info!(
                task = self.id,
                done = state.completed_pieces(),
                pieces = state.piece_count(),
                "resuming from control file"
            );
        }

        if resume.is_none() && self.download_finished_by_file_length() {
            if let Some(t) = self.transfer.as_mut() {
                t.complete_all();
            }
            self.phase = TaskPhase::Active;
            tracing::info!(
                task = self.id,
                path = ?self.context.first_file_path(),
                "destination already has the expected length; download already completed"
            );
            return Ok(Vec::new());
        }

        if self.in_memory_download {
            self.target = Some(WriteTarget::Memory(Vec::new()));
        } else {
            self.should_cancel_download_for_safety(resume.is_some())?;
            self.open_destination(resume.is_some())?;
        }
        self.phase = TaskPhase::Active;
        tracing::info!(
            task = self.id,
            path = ?self.context.first_file_path(),
            length = ?self.total_length(),
            in_memory = self.in_memory_download,
            "task started"
        );

        if self.download_finished() {
            tracing::info!(task = self.id, "content already complete");
            return Ok(Vec::new());
        }
        Ok(self.create_commands(max, self.num_concurrent_command))
    }

    /// Up to `n` further commands, bounded by the concurrency limit and the
    /// unassigned pieces. Empty while halted, paused, gated, not yet active
    /// or finished. While the length is unknown at most one command exists.
    pub fn create_next_command(&mut self, n: usize) -> Vec<TransferCommand> {
        self.create_commands(n, self.num_concurrent_command)
    }

    /// Like [`create_next_command`](Self::create_next_command) with the
    /// concurrency limit shifted by `delta` for this call only.
    pub fn create_next_command_with_adj(&mut self, n: usize, delta: isize) -> Vec<TransferCommand> {
        let limit = self.num_concurrent_command.saturating_add_signed(delta);
        self.create_commands(n, limit)
    }

    fn can_create_commands(&self) -> bool {
        self.phase == TaskPhase::Active
            && !self.failed
            && self.run_state == RunState::Running
            && self.is_dependency_resolved()
            && self.transfer.is_some()
            && !self.download_finished()
    }

    fn create_commands(&mut self, n: usize, limit: usize) -> Vec<TransferCommand> {
        if !self.can_create_commands() {
            return Vec::new();
        }
        let room = limit.saturating_sub(self.num_command);
        let Some(t) = self.transfer.as_mut() else {
            return Vec::new();
        };
        if !t.length_known() {
            // A single initiating command until the length is known; it is
            // re-issued if the previous one failed.
            if n == 0 || room == 0 || self.num_command > 0 {
                return Vec::new();
            }
            return self.create_initiate_command().into_iter().collect();
        }
        let want = n.min(room).min(t.unassigned_count());
        if want == 0 {
            return Vec::new();
        }
        let segments = t.acquire(want);

        let mut commands = Vec::with_capacity(segments.len());
        for (piece, segment) in segments {
            match self.select_uri() {
                Some(uri) => {
                    let cmd = self.make_command(CommandKind::FetchSegment, uri, piece, segment);
                    self.count_issued(&cmd);
                    commands.push(cmd);
                }
                None => {
                    if let Some(t) = self.transfer.as_mut() {
                        t.release(piece);
                    }
                }
            }
        }
        tracing::debug!(
            task = self.id,
            created = commands.len(),
            outstanding = self.num_command,
            "created commands"
        );
        commands
    }

    fn create_initiate_command(&mut self) -> Option<TransferCommand> {
        let uri = self.select_uri()?;
        let t = self.transfer.as_mut()?;
        if !t.assign(0) {
            return None;
        }
        let cmd = self.make_command(CommandKind::Initiate, uri, 0, Segment { start: 0, end: 0 });
        self.count_issued(&cmd);
        Some(cmd)
    }

    /// Streaming commands are counted twice: as commands and as stream
    /// connections.
    fn count_issued(&mut self, command: &TransferCommand) {
        self.increase_num_command();
        if command.streaming {
            self.increase_stream_connection();
        }
    }

    fn make_command(&self, kind: CommandKind, uri: String, piece: usize, segment: Segment) -> TransferCommand {
        TransferCommand {
            task_id: self.id,
            kind,
            streaming: TransferCommand::is_streaming_uri(&uri),
            uri,
            piece,
            segment,
            timeout: self.timeout,
        }
    }

    fn select_uri(&self) -> Option<String> {
        self.uri_selector
            .select(self.context.uris(), self.uri_results.last())
    }

    /// Account for a finished command: free its slot, complete or release
    /// its piece, and record the URI outcome. An error means the task just
    /// failed. Commands draining from an already failed task only free
    /// their slot and piece, so the failure stays the task's last result.
    pub fn finish_command(
        &mut self,
        command: &TransferCommand,
        outcome: CommandOutcome,
    ) -> Result<(), TaskError> {
        self.decrease_num_command();
        if command.streaming {
            self.decrease_stream_connection();
        }
        if self.failed {
            self.release_piece(command.piece);
            return Ok(());
        }
        let result = self.apply_outcome(command, outcome);
        if let Err(e) = &result {
            self.fail(e);
        }
        result
    }

    fn apply_outcome(&mut self, command: &TransferCommand, outcome: CommandOutcome) -> Result<(), TaskError> {
        match outcome {
            CommandOutcome::Completed { bytes } => {
                let length_known = self.transfer.as_ref().is_some_and(TransferState::length_known);
                if !length_known {
                    self.resolve_total_length(bytes)?;
                    if let Some(t) = self.transfer.as_mut() {
                        t.complete_all();
                    }
                } else if let Some(t) = self.transfer.as_mut() {
                    t.complete(command.piece);
                }
                tracing::trace!(task = self.id, piece = command.piece, bytes, "command completed");
                Ok(())
            }
            CommandOutcome::Failed { code } => {
                self.release_piece(command.piece);
                tracing::debug!(task = self.id, uri = %command.uri, %code, "command failed");
                self.uri_results.push(UriResult::new(&command.uri, code));
                Ok(())
            }
            CommandOutcome::NotFound => {
                self.release_piece(command.piece);
                tracing::debug!(task = self.id, uri = %command.uri, "resource not found");
                self.uri_results
                    .push(UriResult::new(&command.uri, ResultCode::ResourceNotFound));
                self.increase_and_validate_file_not_found_count()
            }
        }
    }

    fn release_piece(&mut self, piece: usize) {
        if let Some(t) = self.transfer.as_mut() {
            t.release(piece);
        }
    }

    /// The server reported the content length. Validates it, rebuilds the
    /// piece store for the real layout and keeps the in-flight initiating
    /// command on piece 0.
    pub fn resolve_total_length(&mut self, length: u64) -> Result<(), TaskError> {
        if self.total_length() == Some(length)
            && self.transfer.as_ref().is_some_and(TransferState::length_known)
        {
            return Ok(());
        }
        self.validate_total_length(length)?;
        let initiator_in_flight = self
            .transfer
            .as_ref()
            .is_some_and(|t| !t.length_known() && t.segments().is_assigned(0));
        self.context.set_total_length(length);
        self.init_piece_storage(None);
        if initiator_in_flight && self.num_command > 0 {
            if let Some(t) = self.transfer.as_mut() {
                t.assign(0);
            }
        }
        tracing::info!(task = self.id, length, "content length resolved");
        Ok(())
    }

    /// Create the piece store and its segment tracker together. The layout
    /// comes from the descriptor, the task config, a resumed control file,
    /// or an even split across the concurrency limit, in that order.
    fn init_piece_storage(&mut self, resumed_piece_length: Option<u64>) {
        let pieces = match self.context.total_length() {
            Some(total) => {
                let piece_length = self
                    .context
                    .piece_length()
                    .or(self.config.piece_length)
                    .or(resumed_piece_length);
                BitfieldPieceStore::with_layout(total, piece_length, self.num_concurrent_command)
                    .with_digests(self.context.piece_hashes().to_vec())
            }
            None => BitfieldPieceStore::unknown_length(),
        };
        self.transfer = Some(TransferState::new(Box::new(pieces)));
    }

    /// Release the piece store and segment tracker together.
    pub fn drop_piece_storage(&mut self) {
        self.transfer = None;
    }

    fn open_destination(&mut self, resuming: bool) -> Result<(), TaskError> {
        let Some(path) = self.context.first_file_path().map(ToOwned::to_owned) else {
            return Err(TaskError::Storage("task has no destination file".into()));
        };
        let writer = if resuming && path.exists() {
            StorageWriter::open_existing(&path).map_err(TaskError::storage)?
        } else {
            let mut builder = StorageWriterBuilder::create(&path).map_err(TaskError::storage)?;
            if self.needs_file_allocation() {
                if let Some(len) = self.context.total_length() {
                    builder.preallocate(len).map_err(TaskError::storage)?;
                }
            }
            builder.build()
        };
        tracing::debug!(task = self.id, path = %path.display(), resuming, "destination opened");
        self.target = Some(WriteTarget::Disk(writer));
        self.destination_opened = true;
        Ok(())
    }

    /// Write received bytes at `offset` of the destination (file or memory).
    /// Writes past the known length are rejected; while the length is
    /// unknown an in-memory target only accepts contiguous writes.
    pub fn write_data(&mut self, offset: u64, data: &[u8]) -> Result<(), TaskError> {
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or_else(|| TaskError::Storage(format!("write at {} overflows", offset)))?;
        let total = self.total_length();
        if let Some(total) = total.filter(|&t| end > t) {
            return Err(TaskError::Storage(format!(
                "write of {} bytes at {} exceeds length {}",
                data.len(),
                offset,
                total
            )));
        }
        let Some(target) = self.target.as_mut() else {
            return Err(TaskError::Storage(format!("task {} has no open destination", self.id)));
        };
        if let (None, WriteTarget::Memory(buf)) = (total, &*target) {
            if offset > buf.len() as u64 {
                return Err(TaskError::Storage(format!(
                    "write at {} leaves a gap after {} buffered bytes",
                    offset,
                    buf.len()
                )));
            }
        }
        target.write_at(offset, data).map_err(TaskError::storage)?;
        self.stats.record_download(data.len() as u64, Instant::now());
        Ok(())
    }

    /// Check `data` against the piece digest, if the descriptor has one.
    /// Executors call this before reporting `Completed` and report a
    /// mismatch as `Failed { code: ContentMismatch }`.
    pub fn verify_piece(&self, piece: usize, data: &[u8]) -> bool {
        self.transfer
            .as_ref()
            .map_or(false, |t| t.pieces().verify_piece(piece, data))
    }

    /// Record a terminal failure: the error's code becomes the most recent
    /// URI result and the destination is closed.
    pub(super) fn fail(&mut self, err: &TaskError) {
        if self.failed {
            return;
        }
        tracing::error!(task = self.id, error = %err, "task failed");
        let uri = self.context.uris().first().cloned().unwrap_or_default();
        self.uri_results.push(UriResult::new(uri, err.result_code()));
        self.error_message = Some(err.to_string());
        self.failed = true;
        self.close_file();
    }

    pub(super) fn pre_download_processing(&mut self) {
        let handlers = std::mem::take(&mut self.pre_handlers);
        for handler in &handlers {
            match handler.apply(self) {
                Ok(HandlerOutcome::Applied) => {
                    tracing::debug!(task = self.id, handler = handler.name(), "pre-download handler applied");
                    break;
                }
                Ok(HandlerOutcome::NotApplicable) => {}
                Err(e) => tracing::warn!(task = self.id, error = %e, "pre-download handler failed"),
            }
        }
        self.pre_handlers = handlers;
    }

    pub fn is_halt_requested(&self) -> bool {
        matches!(self.run_state, RunState::Halting(_) | RunState::ForceHalting(_))
    }

    pub fn is_force_halt_requested(&self) -> bool {
        matches!(self.run_state, RunState::ForceHalting(_))
    }

    pub fn is_pause_requested(&self) -> bool {
        self.run_state == RunState::Paused
    }

    pub fn halt_reason(&self) -> Option<HaltReason> {
        self.run_state.halt_reason()
    }

    /// Stop creating commands and let outstanding ones drain. Clearing the
    /// request resumes a task that is not force-halting.
    pub fn set_halt_requested(&mut self, requested: bool, reason: HaltReason) {
        if requested {
            if !self.is_force_halt_requested() {
                tracing::info!(task = self.id, %reason, "halt requested");
                self.run_state = RunState::Halting(reason);
            }
        } else if matches!(self.run_state, RunState::Halting(_)) {
            self.run_state = RunState::Running;
        }
    }

    /// Halt immediately: runtime references and the destination are
    /// released before the next scheduler tick.
    pub fn set_force_halt_requested(&mut self, requested: bool, reason: HaltReason) {
        if requested {
            tracing::info!(task = self.id, %reason, "force halt requested");
            self.run_state = RunState::ForceHalting(reason);
            self.release_runtime_resource();
            self.close_file();
        } else if self.is_force_halt_requested() {
            self.run_state = RunState::Running;
        }
    }

    /// Pausing keeps every piece of state; unpausing lets the scheduler ask
    /// for commands again. Has no effect on a halting task.
    pub fn set_pause_requested(&mut self, requested: bool) {
        match (requested, self.run_state) {
            (true, RunState::Running) => {
                tracing::info!(task = self.id, "paused");
                self.run_state = RunState::Paused;
            }
            (false, RunState::Paused) => {
                tracing::info!(task = self.id, "unpaused");
                self.run_state = RunState::Running;
            }
            _ => {}
        }
    }
}
