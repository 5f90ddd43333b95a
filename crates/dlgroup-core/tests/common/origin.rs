//! In-process origin and executor for driving a `TaskDirectory` end to end.
//!
//! Serves static bodies keyed by URI. Executes each `TransferCommand`
//! synchronously: writes the requested range through the directory and
//! reports the outcome the way a protocol executor would.

use std::collections::HashMap;

use dlgroup_core::{CommandKind, CommandOutcome, DownloadResult, ResultCode, TaskDirectory, TransferCommand};

#[derive(Debug, Clone, Default)]
pub struct Origin {
    bodies: HashMap<String, Vec<u8>>,
    /// URIs whose responses omit the content length.
    chunked: Vec<String>,
    /// URIs whose bytes are corrupted in flight.
    corrupt: Vec<String>,
}

impl Origin {
    pub fn serve(mut self, uri: &str, body: Vec<u8>) -> Self {
        self.bodies.insert(uri.to_string(), body);
        self
    }

    pub fn without_length(mut self, uri: &str) -> Self {
        self.chunked.push(uri.to_string());
        self
    }

    pub fn corrupting(mut self, uri: &str) -> Self {
        self.corrupt.push(uri.to_string());
        self
    }

    pub fn execute(&self, directory: &mut TaskDirectory, cmd: &TransferCommand) {
        let outcome = self.run(directory, cmd);
        directory.command_finished(cmd, outcome).expect("known task");
    }

    fn run(&self, directory: &mut TaskDirectory, cmd: &TransferCommand) -> CommandOutcome {
        let Some(body) = self.bodies.get(&cmd.uri) else {
            return CommandOutcome::NotFound;
        };
        let range = match cmd.kind {
            CommandKind::FetchSegment => cmd.segment.start..cmd.segment.end,
            CommandKind::Initiate if self.chunked.contains(&cmd.uri) => 0..body.len() as u64,
            CommandKind::Initiate => {
                let task = directory.task_mut(cmd.task_id).expect("task exists");
                if let Err(e) = task.resolve_total_length(body.len() as u64) {
                    return CommandOutcome::Failed { code: e.result_code() };
                }
                let piece = task
                    .piece_store()
                    .and_then(|p| p.piece(cmd.piece))
                    .expect("piece 0 exists once length is known");
                piece.start..piece.end
            }
        };
        let mut data = body[range.start as usize..range.end as usize].to_vec();
        if self.corrupt.contains(&cmd.uri) {
            data.iter_mut().for_each(|b| *b = !*b);
        }
        let task = directory.task(cmd.task_id).expect("task exists");
        if cmd.kind == CommandKind::FetchSegment && !task.verify_piece(cmd.piece, &data) {
            return CommandOutcome::Failed {
                code: ResultCode::ContentMismatch,
            };
        }
        if directory.write_data(cmd.task_id, range.start, &data).is_err() {
            return CommandOutcome::Failed {
                code: ResultCode::FileIoError,
            };
        }
        CommandOutcome::Completed {
            bytes: data.len() as u64,
        }
    }

    /// Run until the directory is empty or `max_ticks` is reached.
    pub fn drive(&self, directory: &mut TaskDirectory, max_ticks: usize) -> Vec<DownloadResult> {
        let mut results = Vec::new();
        for _ in 0..max_ticks {
            for cmd in directory.fill_commands() {
                self.execute(directory, &cmd);
            }
            results.extend(directory.reap());
            if directory.is_empty() {
                break;
            }
        }
        results
    }
}
