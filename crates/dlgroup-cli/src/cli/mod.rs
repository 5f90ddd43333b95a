//! CLI for the dlgroup download orchestrator.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use dlgroup_core::config;
use std::path::PathBuf;

use commands::{run_completions, run_config, run_discard, run_inspect, run_man, run_plan, PlanArgs};

/// Top-level CLI for the dlgroup download orchestrator.
#[derive(Debug, Parser)]
#[command(name = "dlgroup")]
#[command(about = "dlgroup: multi-source download task orchestrator", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Show the resume state stored next to a destination file.
    Inspect {
        /// Destination file (its `.dlgroup` control file is read).
        path: PathBuf,
        /// Print the control file as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Delete the control file of a destination so the next run starts fresh.
    Discard {
        /// Destination file.
        path: PathBuf,
    },

    /// Dry run: show the commands a new task would issue first.
    Plan {
        /// Source URIs, mirrors of the same content.
        #[arg(required = true)]
        uris: Vec<String>,
        /// Destination basename (default: derived from the first URI).
        #[arg(long, short = 'o')]
        out: Option<String>,
        /// Destination directory (default: config, then current directory).
        #[arg(long, short = 'd')]
        dir: Option<PathBuf>,
        /// Content length, if known.
        #[arg(long, value_name = "BYTES")]
        length: Option<u64>,
        /// Concurrency limit for this task.
        #[arg(long, short = 'x', value_name = "N")]
        connections: Option<usize>,
        /// Fixed piece length in bytes.
        #[arg(long, value_name = "BYTES")]
        piece_length: Option<u64>,
    },

    /// Print the effective configuration and where it is stored.
    Config,

    /// Generate shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Generate a man page (roff) on stdout.
    Man,
}

impl CliCommand {
    /// Runs the parsed command and returns the process exit code.
    pub fn run_from_args() -> Result<i32> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Inspect { path, json } => run_inspect(&path, json),
            CliCommand::Discard { path } => run_discard(&path),
            CliCommand::Plan {
                uris,
                out,
                dir,
                length,
                connections,
                piece_length,
            } => {
                let cfg = config::load_or_init()?;
                tracing::debug!("loaded config: {:?}", cfg);
                run_plan(
                    &cfg,
                    PlanArgs {
                        uris,
                        out,
                        dir,
                        length,
                        connections,
                        piece_length,
                    },
                )
            }
            CliCommand::Config => {
                let cfg = config::load_or_init()?;
                run_config(&cfg)
            }
            CliCommand::Completions { shell } => run_completions(shell),
            CliCommand::Man => run_man(),
        }
    }
}

#[cfg(test)]
mod tests;
