//! `dlgroup plan` – dry run of a task's first commands.
//!
//! The task is switched to an in-memory download before it starts, so
//! planning never creates or modifies files.

use anyhow::{bail, Result};
use dlgroup_core::config::EngineConfig;
use dlgroup_core::{CommandKind, DownloadContext, TaskDirectory};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct PlanArgs {
    pub uris: Vec<String>,
    pub out: Option<String>,
    pub dir: Option<PathBuf>,
    pub length: Option<u64>,
    pub connections: Option<usize>,
    pub piece_length: Option<u64>,
}

pub fn run_plan(cfg: &EngineConfig, args: PlanArgs) -> Result<i32> {
    let mut task_cfg = cfg.task.clone();
    if let Some(dir) = args.dir {
        task_cfg.dir = dir;
    }
    if let Some(n) = args.connections {
        task_cfg.max_connections = n;
    }
    if args.piece_length.is_some() {
        task_cfg.piece_length = args.piece_length;
    }

    let mut ctx = DownloadContext::from_uris(&task_cfg.dir, args.uris, args.out.as_deref());
    if let Some(len) = args.length {
        ctx = ctx.with_expected_length(len);
    }

    let mut directory = TaskDirectory::new(cfg.clone());
    let id = directory.new_task_with(task_cfg, ctx);
    let Some(task) = directory.task_mut(id) else {
        bail!("task {} vanished", id);
    };
    task.mark_in_memory_download();
    let commands = match task.create_initial_command() {
        Ok(c) => c,
        Err(e) => {
            println!("Task would fail: {} ({})", e, e.result_code());
            return Ok(i32::from(e.result_code().code()));
        }
    };

    let path = task
        .context()
        .first_file_path()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    println!("destination: {}", path);
    match (task.total_length(), task.piece_store()) {
        (Some(len), Some(pieces)) => println!(
            "length: {} bytes in {} pieces of {}",
            len,
            pieces.piece_count(),
            pieces.piece_length()
        ),
        _ => println!("length: unknown until the first response"),
    }
    println!("{:<6} {:<14} {:<22} {}", "PIECE", "KIND", "RANGE", "URI");
    for cmd in &commands {
        let kind = match cmd.kind {
            CommandKind::Initiate => "initiate",
            CommandKind::FetchSegment => "fetch-segment",
        };
        println!(
            "{:<6} {:<14} {:<22} {}",
            cmd.piece,
            kind,
            cmd.segment.range_header_value(),
            cmd.uri
        );
    }
    Ok(0)
}
