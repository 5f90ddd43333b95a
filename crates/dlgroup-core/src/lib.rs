//! Task orchestration core of a multi-protocol download engine.
//!
//! A [`DownloadTask`] is one logical download: it turns a
//! [`DownloadContext`] into transfer commands, tracks piece completion,
//! persists progress in a control file, and reports a [`DownloadResult`].
//! [`TaskDirectory`] owns the live tasks and the shared connection budget.
//! Wire protocols are not part of this crate; executors plug in through
//! [`TransferCommand`] and [`CommandOutcome`].

pub mod config;
pub mod context;
pub mod control_file;
pub mod dependency;
pub mod directory;
pub mod download_result;
pub mod error;
pub mod handler;
pub mod logging;
pub mod naming;
pub mod piece_store;
pub mod result_code;
pub mod runtime;
pub mod segmenter;
pub mod stat;
pub mod storage;
pub mod task;
pub mod uri_selector;

pub use config::{EngineConfig, TaskConfig};
pub use context::{DownloadContext, FileEntry};
pub use directory::TaskDirectory;
pub use download_result::DownloadResult;
pub use error::{HandlerError, TaskError};
pub use result_code::ResultCode;
pub use task::{CommandKind, CommandOutcome, DownloadTask, TaskId, TaskIdCounter, TransferCommand};
