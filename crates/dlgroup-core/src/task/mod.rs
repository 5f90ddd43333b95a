//! One logical download and everything it owns.
//!
//! A `DownloadTask` is driven by the engine's scheduler: it is asked for
//! transfer commands, told how each command ended, and eventually finalized
//! into a [`DownloadResult`](crate::DownloadResult). It owns its piece store,
//! segment assignment and destination exclusively; protocol runtimes it uses
//! are only borrowed weakly. All of it runs on the scheduler thread.

mod command;
mod finish;
mod id;
mod lifecycle;
mod resume;
mod state;
mod transfer;

#[cfg(test)]
mod tests;

use std::collections::BTreeSet;
use std::rc::Rc;
use std::time::{Duration, Instant, SystemTime};

use crate::config::TaskConfig;
use crate::context::DownloadContext;
use crate::control_file::{JsonControlFile, ProgressPersistence};
use crate::dependency::DependencyGate;
use crate::handler::{PostDownloadHandler, PreDownloadHandler, SpawnMetadata};
use crate::piece_store::PieceStore;
use crate::runtime::{ProtocolRuntime, RuntimeRef};
use crate::stat::{TransferStat, TransferStats};
use crate::uri_selector::{InorderUriSelector, UriResult, UriSelector};

pub use command::{CommandKind, CommandOutcome, TransferCommand};
pub use finish::Spawner;
pub use id::TaskIdCounter;
pub use state::{HaltReason, RunState, TaskPhase};
pub use transfer::TransferState;

use transfer::WriteTarget;

pub type TaskId = u64;

/// Parent id of tasks that were not spawned by another task.
pub const ROOT_PARENT: TaskId = 0;

pub struct DownloadTask {
    id: TaskId,
    config: TaskConfig,
    context: DownloadContext,
    phase: TaskPhase,
    run_state: RunState,

    num_concurrent_command: usize,
    num_command: usize,
    num_stream_connection: usize,

    transfer: Option<TransferState>,
    target: Option<WriteTarget>,
    destination_opened: bool,

    persistence: Box<dyn ProgressPersistence>,
    dependency: Option<Box<dyn DependencyGate>>,
    pre_handlers: Vec<Box<dyn PreDownloadHandler>>,
    post_handlers: Vec<Box<dyn PostDownloadHandler>>,
    uri_selector: Box<dyn UriSelector>,
    runtime: RuntimeRef,
    runtime_released: bool,

    stats: TransferStats,
    accept_types: BTreeSet<String>,
    file_allocation_enabled: bool,
    pre_local_file_check_enabled: bool,
    save_control_file_enabled: bool,
    in_memory_download: bool,
    last_modified_time: Option<SystemTime>,
    file_not_found_count: u32,
    resume_failure_count: u32,
    timeout: Duration,
    max_download_speed_limit: u64,
    max_upload_speed_limit: u64,

    uri_results: Vec<UriResult>,
    error_message: Option<String>,
    failed: bool,
    parent_id: TaskId,
    child_ids: Vec<TaskId>,
    metadata: Option<Rc<SpawnMetadata>>,
}

impl DownloadTask {
    /// New task in phase `Created`, with the next id from `ids`. Per-task
    /// knobs are copied from `config` and can be changed independently.
    pub fn new(ids: &mut TaskIdCounter, config: TaskConfig, mut context: DownloadContext) -> Self {
        let id = ids.next_id();
        context.set_owner(id);
        tracing::debug!(
            task = id,
            path = ?context.first_file_path(),
            uris = context.uris().len(),
            "task created"
        );
        Self {
            id,
            phase: TaskPhase::Created,
            run_state: RunState::Running,
            num_concurrent_command: config.max_connections.max(1),
            num_command: 0,
            num_stream_connection: 0,
            transfer: None,
            target: None,
            destination_opened: false,
            persistence: Box::new(JsonControlFile),
            dependency: None,
            pre_handlers: Vec::new(),
            post_handlers: Vec::new(),
            uri_selector: Box::new(InorderUriSelector),
            runtime: RuntimeRef::default(),
            runtime_released: false,
            stats: TransferStats::default(),
            accept_types: config.accept_types.iter().cloned().collect(),
            file_allocation_enabled: config.file_allocation,
            pre_local_file_check_enabled: config.check_local_file,
            save_control_file_enabled: config.save_control_file,
            in_memory_download: false,
            last_modified_time: None,
            file_not_found_count: 0,
            resume_failure_count: 0,
            timeout: config.timeout(),
            max_download_speed_limit: config.max_download_limit,
            max_upload_speed_limit: config.max_upload_limit,
            uri_results: Vec::new(),
            error_message: None,
            failed: false,
            parent_id: ROOT_PARENT,
            child_ids: Vec::new(),
            metadata: None,
            config,
            context,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    pub fn context(&self) -> &DownloadContext {
        &self.context
    }

    pub fn phase(&self) -> TaskPhase {
        self.phase
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn set_persistence(&mut self, persistence: Box<dyn ProgressPersistence>) {
        self.persistence = persistence;
    }

    pub fn set_uri_selector(&mut self, selector: Box<dyn UriSelector>) {
        self.uri_selector = selector;
    }

    /// Hold the task in `Created` until `gate` resolves.
    pub fn depends_on(&mut self, gate: Box<dyn DependencyGate>) {
        self.dependency = Some(gate);
    }

    pub fn is_dependency_resolved(&self) -> bool {
        self.dependency.as_ref().map_or(true, |g| g.is_resolved())
    }

    pub fn add_pre_download_handler(&mut self, handler: Box<dyn PreDownloadHandler>) {
        self.pre_handlers.push(handler);
    }

    pub fn add_post_download_handler(&mut self, handler: Box<dyn PostDownloadHandler>) {
        self.post_handlers.push(handler);
    }

    pub fn clear_pre_download_handlers(&mut self) {
        self.pre_handlers.clear();
    }

    pub fn clear_post_download_handlers(&mut self) {
        self.post_handlers.clear();
    }

    pub fn attach_runtime(&mut self, runtime: &Rc<dyn ProtocolRuntime>) {
        self.runtime.attach(runtime);
        self.runtime_released = false;
    }

    pub fn runtime(&self) -> Option<Rc<dyn ProtocolRuntime>> {
        self.runtime.get()
    }

    /// Whether a live peer-to-peer runtime is serving this task.
    pub fn p2p_involved(&self) -> bool {
        self.runtime.get().is_some_and(|rt| rt.is_p2p())
    }

    /// Install a custom piece store. Only honored before initialization;
    /// the segment tracker is rebuilt to match it.
    pub fn set_piece_store(&mut self, pieces: Box<dyn PieceStore>) -> bool {
        if self.phase != TaskPhase::Created {
            tracing::warn!(task = self.id, phase = ?self.phase, "piece store can only be set before start");
            return false;
        }
        self.transfer = Some(TransferState::new(pieces));
        true
    }

    pub fn transfer(&self) -> Option<&TransferState> {
        self.transfer.as_ref()
    }

    pub fn piece_store(&self) -> Option<&dyn PieceStore> {
        self.transfer.as_ref().map(TransferState::pieces)
    }

    pub fn parent_id(&self) -> TaskId {
        self.parent_id
    }

    pub fn belongs_to(&mut self, parent: TaskId) {
        self.parent_id = parent;
    }

    pub fn child_ids(&self) -> &[TaskId] {
        &self.child_ids
    }

    pub fn metadata(&self) -> Option<&Rc<SpawnMetadata>> {
        self.metadata.as_ref()
    }

    pub fn set_metadata(&mut self, metadata: Rc<SpawnMetadata>) {
        self.metadata = Some(metadata);
    }

    pub fn num_command(&self) -> usize {
        self.num_command
    }

    pub fn increase_num_command(&mut self) {
        self.num_command += 1;
    }

    /// Panics on underflow: a command finished that was never counted.
    pub fn decrease_num_command(&mut self) {
        assert!(self.num_command > 0, "task {}: command counter underflow", self.id);
        self.num_command -= 1;
    }

    pub fn num_stream_connection(&self) -> usize {
        self.num_stream_connection
    }

    pub fn increase_stream_connection(&mut self) {
        self.num_stream_connection += 1;
    }

    pub fn decrease_stream_connection(&mut self) {
        assert!(
            self.num_stream_connection > 0,
            "task {}: stream connection counter underflow",
            self.id
        );
        self.num_stream_connection -= 1;
    }

    pub fn num_concurrent_command(&self) -> usize {
        self.num_concurrent_command
    }

    pub fn set_num_concurrent_command(&mut self, n: usize) {
        self.num_concurrent_command = n.max(1);
    }

    pub fn file_not_found_count(&self) -> u32 {
        self.file_not_found_count
    }

    pub fn resume_failure_count(&self) -> u32 {
        self.resume_failure_count
    }

    pub fn is_file_allocation_enabled(&self) -> bool {
        self.file_allocation_enabled
    }

    pub fn set_file_allocation_enabled(&mut self, f: bool) {
        self.file_allocation_enabled = f;
    }

    /// Preallocation applies to on-disk downloads of known length only.
    pub fn needs_file_allocation(&self) -> bool {
        self.file_allocation_enabled
            && !self.in_memory_download
            && self.context.total_length().is_some_and(|len| len > 0)
    }

    pub fn is_pre_local_file_check_enabled(&self) -> bool {
        self.pre_local_file_check_enabled
    }

    pub fn set_pre_local_file_check_enabled(&mut self, f: bool) {
        self.pre_local_file_check_enabled = f;
    }

    pub fn is_save_control_file_enabled(&self) -> bool {
        self.save_control_file_enabled
    }

    pub fn set_save_control_file_enabled(&mut self, f: bool) {
        self.save_control_file_enabled = f;
    }

    pub fn in_memory_download(&self) -> bool {
        self.in_memory_download
    }

    /// Receive into memory instead of a file. In-memory downloads never
    /// write a control file.
    pub fn mark_in_memory_download(&mut self) {
        self.in_memory_download = true;
        self.save_control_file_enabled = false;
    }

    /// Bytes received by an in-memory download.
    pub fn in_memory_content(&self) -> Option<&[u8]> {
        match &self.target {
            Some(WriteTarget::Memory(buf)) => Some(buf.as_slice()),
            _ => None,
        }
    }

    /// Returns false if `mime` was already accepted.
    pub fn add_accept_type(&mut self, mime: impl Into<String>) -> bool {
        self.accept_types.insert(mime.into())
    }

    pub fn remove_accept_type(&mut self, mime: &str) -> bool {
        self.accept_types.remove(mime)
    }

    pub fn accept_types(&self) -> impl Iterator<Item = &str> {
        self.accept_types.iter().map(String::as_str)
    }

    /// An empty accept set accepts anything.
    pub fn accepts_type(&self, mime: &str) -> bool {
        self.accept_types.is_empty() || self.accept_types.contains(mime)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn max_download_speed_limit(&self) -> u64 {
        self.max_download_speed_limit
    }

    pub fn set_max_download_speed_limit(&mut self, bytes_per_sec: u64) {
        self.max_download_speed_limit = bytes_per_sec;
    }

    pub fn max_upload_speed_limit(&self) -> u64 {
        self.max_upload_speed_limit
    }

    pub fn set_max_upload_speed_limit(&mut self, bytes_per_sec: u64) {
        self.max_upload_speed_limit = bytes_per_sec;
    }

    pub fn record_upload(&mut self, bytes: u64) {
        self.stats.record_upload(bytes, Instant::now());
    }

    pub fn calculate_stat(&self) -> TransferStat {
        self.calculate_stat_at(Instant::now())
    }

    pub fn calculate_stat_at(&self, now: Instant) -> TransferStat {
        self.stats.snapshot(now)
    }

    pub fn does_download_speed_exceed(&self) -> bool {
        self.does_download_speed_exceed_at(Instant::now())
    }

    pub fn does_download_speed_exceed_at(&self, now: Instant) -> bool {
        self.max_download_speed_limit > 0
            && self.stats.snapshot(now).download_speed > self.max_download_speed_limit
    }

    pub fn does_upload_speed_exceed(&self) -> bool {
        self.does_upload_speed_exceed_at(Instant::now())
    }

    pub fn does_upload_speed_exceed_at(&self, now: Instant) -> bool {
        self.max_upload_speed_limit > 0
            && self.stats.snapshot(now).upload_speed > self.max_upload_speed_limit
    }

    pub fn last_modified_time(&self) -> Option<SystemTime> {
        self.last_modified_time
    }

    /// Keep the newest remote modification time seen.
    pub fn update_last_modified_time(&mut self, time: SystemTime) {
        if self.last_modified_time.map_or(true, |t| time > t) {
            self.last_modified_time = Some(time);
        }
    }

    /// Every recorded URI outcome, oldest first.
    pub fn uri_results(&self) -> &[UriResult] {
        &self.uri_results
    }

    pub fn last_uri_result(&self) -> Option<&UriResult> {
        self.uri_results.last()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn total_length(&self) -> Option<u64> {
        match &self.transfer {
            Some(t) => t.pieces().total_length(),
            None => self.context.total_length(),
        }
    }

    pub fn completed_length(&self) -> u64 {
        self.transfer.as_ref().map_or(0, |t| t.pieces().completed_length())
    }
}

impl std::fmt::Debug for DownloadTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadTask")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .field("run_state", &self.run_state)
            .field("num_command", &self.num_command)
            .field("transfer", &self.transfer)
            .field("in_memory", &self.in_memory_download)
            .field("parent_id", &self.parent_id)
            .finish_non_exhaustive()
    }
}
