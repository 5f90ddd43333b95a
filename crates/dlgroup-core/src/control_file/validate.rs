//! Compares a stored control file with the task that wants to resume from it.

use std::fmt;

use super::ControlFileState;

/// Which stored fields disagree with the current task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumeMismatch {
    pub length_changed: bool,
    pub piece_length_changed: bool,
    pub files_changed: bool,
    pub bitfield_invalid: bool,
}

impl fmt::Display for ResumeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let changed: Vec<&str> = [
            (self.length_changed, "total length"),
            (self.piece_length_changed, "piece length"),
            (self.files_changed, "file names"),
            (self.bitfield_invalid, "bitfield size"),
        ]
        .iter()
        .filter(|(hit, _)| *hit)
        .map(|(_, name)| *name)
        .collect();
        write!(f, "stored state differs ({})", changed.join(", "))
    }
}

impl std::error::Error for ResumeMismatch {}

/// Returns Ok(()) when `state` can seed the task's piece store.
///
/// `total_length` and `piece_length` are only compared when the task
/// already knows them; an unknown value is taken from the control file.
pub fn check_compatible(
    state: &ControlFileState,
    total_length: Option<u64>,
    piece_length: Option<u64>,
    basenames: &[String],
) -> Result<(), ResumeMismatch> {
    let length_changed = total_length.is_some_and(|len| len != state.total_length);
    let piece_length_changed =
        state.piece_length == 0 || piece_length.is_some_and(|len| len != state.piece_length);
    let files_changed = state.files != basenames;
    let bitfield_invalid = state.bitfield.len() != state.piece_count().div_ceil(8);

    let mismatch = ResumeMismatch {
        length_changed,
        piece_length_changed,
        files_changed,
        bitfield_invalid,
    };
    if length_changed || piece_length_changed || files_changed || bitfield_invalid {
        return Err(mismatch);
    }
    Ok(())
}
