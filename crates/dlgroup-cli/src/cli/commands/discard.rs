//! `dlgroup discard` – drop a destination's resume state.

use anyhow::Result;
use dlgroup_core::control_file::{control_file_path, JsonControlFile, ProgressPersistence};
use std::path::Path;

pub fn run_discard(path: &Path) -> Result<i32> {
    let control = control_file_path(path);
    if !control.exists() {
        println!("No resume state for {}", path.display());
        return Ok(0);
    }
    JsonControlFile.remove(&control)?;
    tracing::info!(path = %control.display(), "control file discarded");
    println!("Discarded {}", control.display());
    Ok(0)
}
