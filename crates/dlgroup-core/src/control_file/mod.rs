//! Resumption state persisted next to the destination file.
//!
//! The control file records where the content came from, its layout, and
//! which pieces are complete, so a restarted task can skip finished work.
//! A missing file means "no resume state"; an unreadable or incompatible one
//! is discarded by the task and the download restarts from scratch.

mod state;
mod validate;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub use state::{ControlFileState, CONTROL_FILE_VERSION};
pub use validate::{check_compatible, ResumeMismatch};

/// Suffix appended to the destination path.
pub const CONTROL_SUFFIX: &str = ".dlgroup";

/// `file.iso` → `file.iso.dlgroup`.
pub fn control_file_path(destination: &Path) -> PathBuf {
    let mut o = destination.as_os_str().to_owned();
    o.push(CONTROL_SUFFIX);
    PathBuf::from(o)
}

/// Storage backend for control files.
pub trait ProgressPersistence {
    /// `Ok(None)` when no control file exists. Unreadable or unparseable
    /// content is an error.
    fn load(&self, path: &Path) -> Result<Option<ControlFileState>>;
    fn save(&self, state: &ControlFileState, path: &Path) -> Result<()>;
    /// Removing a file that does not exist succeeds.
    fn remove(&self, path: &Path) -> Result<()>;
}

/// JSON control files, written via a temp file and rename so a crash never
/// leaves a half-written state behind.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonControlFile;

impl ProgressPersistence for JsonControlFile {
    fn load(&self, path: &Path) -> Result<Option<ControlFileState>> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("read control file: {}", path.display())),
        };
        let state: ControlFileState = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse control file: {}", path.display()))?;
        if state.version > CONTROL_FILE_VERSION {
            anyhow::bail!(
                "control file {} has unsupported version {}",
                path.display(),
                state.version
            );
        }
        Ok(Some(state))
    }

    fn save(&self, state: &ControlFileState, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| format!("create dir: {}", parent.display()))?;
        }
        let json = serde_json::to_vec_pretty(state).context("serialize control file")?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, json).with_context(|| format!("write control file: {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("rename {} to {}", tmp.display(), path.display()))?;
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove control file: {}", path.display())),
        }
    }
}
