//! The set of live tasks and the scheduler-facing operations on it.
//!
//! `TaskDirectory` owns every task, the id counter and the shared
//! connection budget. The engine's event loop calls `fill_commands` to get
//! work, hands each `TransferCommand` to an executor, reports back through
//! `command_finished`, and calls `reap` to collect tasks that are done.

mod budget;


use std::collections::{BTreeMap, HashMap};

use anyhow::{bail, Result};

use crate::config::{EngineConfig, TaskConfig};
use crate::context::DownloadContext;
use crate::dependency::{GateHandle, ManualGate};
use crate::download_result::DownloadResult;
use crate::handler::{InMemoryPreHandler, UriListPostHandler};
use crate::result_code::ResultCode;
use crate::task::{
    CommandOutcome, DownloadTask, HaltReason, TaskId, TaskIdCounter, TaskPhase, TransferCommand,
};

pub use budget::ConnectionBudget;

pub struct TaskDirectory {
    config: EngineConfig,
    ids: TaskIdCounter,
    tasks: BTreeMap<TaskId, DownloadTask>,
    budget: ConnectionBudget,
    /// Gates to open when the keyed task leaves the directory.
    waiters: HashMap<TaskId, Vec<GateHandle>>,
    results: Vec<DownloadResult>,
}

impl TaskDirectory {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            ids: TaskIdCounter::new(config.first_task_id),
            budget: ConnectionBudget::new(config.max_overall_connections),
            tasks: BTreeMap::new(),
            waiters: HashMap::new(),
            results: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn budget(&self) -> &ConnectionBudget {
        &self.budget
    }

    /// Counter for building tasks outside the directory before `add_task`.
    pub fn id_counter_mut(&mut self) -> &mut TaskIdCounter {
        &mut self.ids
    }

    /// Create a task with the engine's default task options.
    pub fn new_task(&mut self, context: DownloadContext) -> TaskId {
        let config = self.config.task.clone();
        self.new_task_with(config, context)
    }

    pub fn new_task_with(&mut self, config: TaskConfig, context: DownloadContext) -> TaskId {
        let task = DownloadTask::new(&mut self.ids, config, context);
        self.add_task(task)
    }

    /// Register a task and install the default handlers.
    pub fn add_task(&mut self, mut task: DownloadTask) -> TaskId {
        task.add_pre_download_handler(Box::new(InMemoryPreHandler::new(
            self.config.in_memory_suffixes.clone(),
        )));
        task.add_post_download_handler(Box::new(UriListPostHandler::new(
            self.config.uri_list_suffixes.clone(),
        )));
        let id = task.id();
        tracing::debug!(task = id, parent = task.parent_id(), "task registered");
        self.tasks.insert(id, task);
        id
    }

    /// Hold `dependent` until `dependee` has left the directory, whatever
    /// its result.
    pub fn add_dependency(&mut self, dependent: TaskId, dependee: TaskId) -> Result<()> {
        if dependent == dependee {
            bail!("task {} cannot depend on itself", dependent);
        }
        if !self.tasks.contains_key(&dependee) {
            bail!("unknown dependee task {}", dependee);
        }
        let Some(task) = self.tasks.get_mut(&dependent) else {
            bail!("unknown dependent task {}", dependent);
        };
        if task.phase() != TaskPhase::Created {
            bail!("task {} has already started", dependent);
        }
        let (gate, handle) = ManualGate::new();
        task.depends_on(Box::new(gate));
        self.waiters.entry(dependee).or_default().push(handle);
        Ok(())
    }

    pub fn task(&self, id: TaskId) -> Option<&DownloadTask> {
        self.tasks.get(&id)
    }

    pub fn task_mut(&mut self, id: TaskId) -> Option<&mut DownloadTask> {
        self.tasks.get_mut(&id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &DownloadTask> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Results of every task reaped so far, in reap order.
    pub fn results(&self) -> &[DownloadResult] {
        &self.results
    }

    /// Ask every task, lowest id first, for as many commands as the budget
    /// allows. Tasks that fail to start are left for `reap`.
    pub fn fill_commands(&mut self) -> Vec<TransferCommand> {
        let mut commands = Vec::new();
        for (id, task) in self.tasks.iter_mut() {
            let available = self.budget.available();
            if available == 0 {
                break;
            }
            let created = if task.phase() == TaskPhase::Created {
                match task.create_initial_command_with_limit(available) {
                    Ok(c) => c,
                    Err(e) => {
                        tracing::warn!(task = *id, error = %e, "task failed to start");
                        continue;
                    }
                }
            } else {
                task.create_next_command(available)
            };
            let granted = self.budget.reserve(created.len());
            debug_assert_eq!(granted, created.len());
            commands.extend(created);
        }
        commands
    }

    /// Report a command's outcome to its task and return its budget slot.
    pub fn command_finished(&mut self, command: &TransferCommand, outcome: CommandOutcome) -> Result<()> {
        let Some(task) = self.tasks.get_mut(&command.task_id) else {
            bail!("command for unknown task {}", command.task_id);
        };
        self.budget.release(1);
        if let Err(e) = task.finish_command(command, outcome) {
            tracing::warn!(task = command.task_id, error = %e, "task failed");
        }
        Ok(())
    }

    /// Write received bytes through to the owning task.
    pub fn write_data(&mut self, task: TaskId, offset: u64, data: &[u8]) -> Result<()> {
        let Some(t) = self.tasks.get_mut(&task) else {
            bail!("data for unknown task {}", task);
        };
        t.write_data(offset, data)?;
        Ok(())
    }

    /// An executor found a task's on-disk state unusable mid-transfer (e.g.
    /// the server no longer honors ranges). The task fails once its resume
    /// failure limit is reached; siblings are unaffected.
    pub fn report_resume_failure(&mut self, id: TaskId, reason: &str) -> Result<()> {
        let Some(task) = self.tasks.get_mut(&id) else {
            bail!("unknown task {}", id);
        };
        if let Err(e) = task.record_resume_failure(reason) {
            tracing::warn!(task = id, error = %e, "task failed");
        }
        Ok(())
    }

    pub fn halt_all(&mut self, reason: HaltReason) {
        for task in self.tasks.values_mut() {
            task.set_halt_requested(true, reason);
        }
    }

    /// Force-halt every task. Returns the number of outstanding commands
    /// the executor should abort.
    pub fn force_halt_all(&mut self, reason: HaltReason) -> usize {
        self.tasks
            .values_mut()
            .map(|task| {
                let outstanding = task.num_command();
                task.set_force_halt_requested(true, reason);
                outstanding
            })
            .sum()
    }

    pub fn pause(&mut self, id: TaskId) -> bool {
        match self.tasks.get_mut(&id) {
            Some(task) => {
                task.set_pause_requested(true);
                task.is_pause_requested()
            }
            None => false,
        }
    }

    pub fn unpause(&mut self, id: TaskId) -> bool {
        match self.tasks.get_mut(&id) {
            Some(task) => {
                task.set_pause_requested(false);
                !task.is_pause_requested()
            }
            None => false,
        }
    }

    /// Remove tasks that are done: finished ones run post-download
    /// processing first and their spawned children are registered. Opens
    /// dependency gates waiting on removed tasks.
    pub fn reap(&mut self) -> Vec<DownloadResult> {
        let done: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|(_, t)| t.is_terminal())
            .map(|(id, _)| *id)
            .collect();

        let mut reaped = Vec::with_capacity(done.len());
        for id in done {
            let Some(mut task) = self.tasks.remove(&id) else {
                continue;
            };
            let children = task.post_download_processing(&mut self.ids);
            let mut result = task.finalize();
            if task.is_halt_requested() && !task.download_finished() && !task.is_failed() {
                result.result = ResultCode::InProgress;
            }
            for child in children {
                self.add_task(child);
            }
            if let Some(handles) = self.waiters.remove(&id) {
                handles.iter().for_each(GateHandle::resolve);
            }
            self.results.push(result.clone());
            reaped.push(result);
        }
        reaped
    }

    /// Restart task ids from the configured base. Only allowed while the
    /// directory holds no tasks.
    pub fn reset_id_counter(&mut self) -> Result<()> {
        if !self.tasks.is_empty() {
            bail!("cannot reset task ids while {} tasks are live", self.tasks.len());
        }
        self.ids.reset();
        Ok(())
    }
}
