//! `dlgroup inspect` – show a destination's resume state.

use anyhow::{Context, Result};
use dlgroup_core::control_file::{control_file_path, JsonControlFile, ProgressPersistence};
use dlgroup_core::segmenter::Bitfield;
use std::path::Path;

/// Exit code 0 when resume state exists, 3 when there is none.
pub fn run_inspect(path: &Path, json: bool) -> Result<i32> {
    let control = control_file_path(path);
    let Some(state) = JsonControlFile.load(&control)? else {
        println!("No resume state for {}", path.display());
        return Ok(3);
    };
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&state).context("serialize control file")?
        );
        return Ok(0);
    }

    let pieces = state.piece_count();
    let done = Bitfield::from_bytes(&state.bitfield, pieces);
    let done_bytes: u64 = (0..pieces)
        .filter(|&i| done.get(i))
        .map(|i| {
            let start = i as u64 * state.piece_length;
            (start + state.piece_length).min(state.total_length) - start
        })
        .sum();
    println!("{:<14} {}", "control file", control.display());
    println!("{:<14} {}", "files", state.files.join(", "));
    println!("{:<14} {}", "length", state.total_length);
    println!("{:<14} {}", "piece length", state.piece_length);
    println!("{:<14} {}/{}", "pieces done", done.count_set(), pieces);
    println!("{:<14} {}", "completed", done_bytes);
    println!("{:<14} {}", "uploaded", state.upload_length);
    for uri in &state.uris {
        println!("{:<14} {}", "uri", uri);
    }
    Ok(0)
}
