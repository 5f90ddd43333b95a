use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Per-task options. Every task owns its own copy; changing the engine
/// defaults later does not affect tasks already created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Directory every destination file must live under.
    pub dir: PathBuf,
    /// Concurrency limit: maximum number of outstanding transfer commands.
    pub max_connections: usize,
    /// Piece length in bytes. When unset the content is split into
    /// `max_connections` near-equal pieces.
    pub piece_length: Option<u64>,
    /// Download speed cap in bytes per second (0 = unlimited).
    pub max_download_limit: u64,
    /// Upload speed cap in bytes per second (0 = unlimited).
    pub max_upload_limit: u64,
    /// How long a command may wait for progress before giving up.
    pub timeout_secs: u64,
    /// Try to resume from an existing control file.
    pub continue_download: bool,
    /// Truncate an existing destination file that has no resume state.
    pub allow_overwrite: bool,
    /// Rename the destination (`name.1.ext`, ...) instead of failing on a
    /// collision. Also tolerates a server-reported basename that differs
    /// from the expected one.
    pub auto_file_renaming: bool,
    pub max_auto_rename_tries: u32,
    /// Give up after this many "not found" responses (0 = never).
    pub max_file_not_found: u32,
    /// Fail the task after this many incompatible control files (0 = never,
    /// stale state is always discarded and the download restarts).
    pub max_resume_failure_tries: u32,
    pub save_control_file: bool,
    /// Preallocate the destination file once the length is known.
    pub file_allocation: bool,
    /// Inspect the destination (existing file, control file) before opening it.
    pub check_local_file: bool,
    /// Accept a total length that differs from the expected one.
    pub ignore_length_mismatch: bool,
    /// Apply the remote Last-Modified time to the finished file.
    pub remote_time: bool,
    /// Content types a response must match (empty = anything).
    pub accept_types: Vec<String>,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            max_connections: 5,
            piece_length: None,
            max_download_limit: 0,
            max_upload_limit: 0,
            timeout_secs: 60,
            continue_download: true,
            allow_overwrite: false,
            auto_file_renaming: true,
            max_auto_rename_tries: 100,
            max_file_not_found: 0,
            max_resume_failure_tries: 0,
            save_control_file: true,
            file_allocation: false,
            check_local_file: true,
            ignore_length_mismatch: false,
            remote_time: false,
            accept_types: Vec::new(),
        }
    }
}

impl TaskConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Global configuration loaded from `~/.config/dlgroup/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Connection budget shared by every task in the directory.
    pub max_overall_connections: usize,
    /// First id handed out by the task id counter.
    #[serde(default = "default_first_task_id")]
    pub first_task_id: u64,
    /// Basename suffixes that are downloaded to memory instead of disk.
    #[serde(default = "default_in_memory_suffixes")]
    pub in_memory_suffixes: Vec<String>,
    /// In-memory downloads whose content is a list of URIs to enqueue.
    #[serde(default = "default_uri_list_suffixes")]
    pub uri_list_suffixes: Vec<String>,
    /// Defaults copied into every new task.
    #[serde(default)]
    pub task: TaskConfig,
}

fn default_first_task_id() -> u64 {
    1
}

fn default_in_memory_suffixes() -> Vec<String> {
    vec![".uris".to_string()]
}

fn default_uri_list_suffixes() -> Vec<String> {
    vec![".uris".to_string()]
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_overall_connections: 32,
            first_task_id: default_first_task_id(),
            in_memory_suffixes: default_in_memory_suffixes(),
            uri_list_suffixes: default_uri_list_suffixes(),
            task: TaskConfig::default(),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("dlgroup")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<EngineConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = EngineConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: EngineConfig = toml::from_str(&data)?;
    Ok(cfg)
}
