//! Descriptor validation, destination safety and control-file handling.

use std::path::{Component, Path, PathBuf};

use crate::control_file::{self, check_compatible, ControlFileState};
use crate::error::TaskError;
use crate::naming;

use super::DownloadTask;

impl DownloadTask {
    /// Path of this task's control file, next to the first destination file.
    pub fn control_file_path(&self) -> Option<PathBuf> {
        self.context.first_file_path().map(control_file::control_file_path)
    }

    /// Compare a server-reported basename with the expected one. A mismatch
    /// is tolerated when auto renaming is on.
    pub fn validate_filename(&self, actual: &str) -> Result<(), TaskError> {
        let Some(expected) = self.context.expected_basename() else {
            return Ok(());
        };
        if expected == actual {
            return Ok(());
        }
        if self.config.auto_file_renaming {
            tracing::debug!(task = self.id, %expected, %actual, "basename differs; renaming allowed");
            return Ok(());
        }
        Err(TaskError::ContentMismatch {
            field: "filename",
            expected,
            actual: actual.to_string(),
        })
    }

    /// Compare a reported length with the expected one (the descriptor's, or
    /// the one already established for this transfer).
    pub fn validate_total_length(&self, actual: u64) -> Result<(), TaskError> {
        let established = self
            .transfer
            .as_ref()
            .and_then(|t| t.pieces().total_length());
        let Some(expected) = self.context.expected_length().or(established) else {
            return Ok(());
        };
        if expected == actual {
            return Ok(());
        }
        if self.config.ignore_length_mismatch {
            tracing::warn!(task = self.id, expected, actual, "length mismatch ignored");
            return Ok(());
        }
        Err(TaskError::ContentMismatch {
            field: "length",
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }

    /// Count a "not found" response. Fails the task once the configured
    /// limit is reached and nothing has been downloaded this session.
    pub fn increase_and_validate_file_not_found_count(&mut self) -> Result<(), TaskError> {
        self.file_not_found_count += 1;
        let limit = self.config.max_file_not_found;
        if limit > 0
            && self.file_not_found_count >= limit
            && self.stats.session_download_length() == 0
        {
            let err = TaskError::FileNotFoundExceeded {
                count: self.file_not_found_count,
                limit,
            };
            self.fail(&err);
            return Err(err);
        }
        Ok(())
    }

    /// Count a resume attempt that could not use the persisted state.
    /// Fails the task once the configured limit is reached.
    pub fn record_resume_failure(&mut self, reason: &str) -> Result<(), TaskError> {
        self.resume_failure_count += 1;
        tracing::warn!(
            task = self.id,
            count = self.resume_failure_count,
            reason,
            "resume state unusable"
        );
        let limit = self.config.max_resume_failure_tries;
        if limit > 0 && self.resume_failure_count >= limit {
            let err = TaskError::ResumeInconsistency {
                path: self.control_file_path().unwrap_or_default(),
                reason: reason.to_string(),
            };
            self.fail(&err);
            return Err(err);
        }
        Ok(())
    }

    /// Load and check the control file. Stale or corrupt state is removed
    /// so the download starts fresh, unless the resume failure limit makes
    /// that fatal.
    pub(super) fn load_resume_state(&mut self) -> Result<Option<ControlFileState>, TaskError> {
        if self.in_memory_download
            || !self.save_control_file_enabled
            || !self.config.continue_download
            || !self.pre_local_file_check_enabled
        {
            return Ok(None);
        }
        let Some(path) = self.control_file_path() else {
            return Ok(None);
        };
        let reason = match self.persistence.load(&path) {
            Ok(None) => return Ok(None),
            Ok(Some(state)) => {
                let piece_length = self.context.piece_length().or(self.config.piece_length);
                let basenames: Vec<String> =
                    self.context.file_entries().iter().map(|f| f.basename()).collect();
                match check_compatible(&state, self.context.total_length(), piece_length, &basenames) {
                    Ok(()) if self.destination_exists() => return Ok(Some(state)),
                    Ok(()) => {
                        self.persistence.remove(&path).map_err(TaskError::storage)?;
                        tracing::info!(
                            task = self.id,
                            path = %path.display(),
                            "destination missing; discarded its control file"
                        );
                        return Ok(None);
                    }
                    Err(mismatch) => mismatch.to_string(),
                }
            }
            Err(e) => format!("{:#}", e),
        };
        self.record_resume_failure(&reason)?;
        self.persistence.remove(&path).map_err(TaskError::storage)?;
        tracing::info!(task = self.id, path = %path.display(), "discarded stale control file");
        Ok(None)
    }

    fn destination_exists(&self) -> bool {
        self.context.first_file_path().is_some_and(Path::exists)
    }

    /// With no resume state, an existing destination that already has the
    /// expected length is taken as a finished download. Not applied when
    /// overwriting is allowed or piece digests would need checking.
    pub fn download_finished_by_file_length(&self) -> bool {
        if self.in_memory_download
            || !self.config.continue_download
            || !self.pre_local_file_check_enabled
            || self.config.allow_overwrite
            || !self.context.piece_hashes().is_empty()
        {
            return false;
        }
        let (Some(total), Some(path)) = (self.context.total_length(), self.context.first_file_path()) else {
            return false;
        };
        is_within(path, &self.config.dir)
            && std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.len() == total)
    }

    /// Refuse destinations outside the configured directory, and existing
    /// files that have no resume state unless overwriting or renaming is
    /// allowed. May rename the destination.
    pub fn should_cancel_download_for_safety(&mut self, resuming: bool) -> Result<(), TaskError> {
        let Some(path) = self.context.first_file_path().map(Path::to_path_buf) else {
            return Err(TaskError::Storage("task has no destination file".into()));
        };
        if !is_within(&path, &self.config.dir) {
            return Err(TaskError::SafetyViolation {
                path,
                reason: format!("outside of {}", self.config.dir.display()),
            });
        }
        if resuming || !self.pre_local_file_check_enabled || !path.exists() {
            return Ok(());
        }
        if self.config.allow_overwrite {
            tracing::info!(task = self.id, path = %path.display(), "overwriting existing file");
            return Ok(());
        }
        if self.config.auto_file_renaming {
            self.try_auto_file_renaming()?;
            return Ok(());
        }
        Err(TaskError::SafetyViolation {
            path,
            reason: "file exists and neither overwrite nor renaming is allowed".into(),
        })
    }

    /// Move the destination to the first free `name.N.ext`.
    pub fn try_auto_file_renaming(&mut self) -> Result<PathBuf, TaskError> {
        let Some(original) = self.context.first_file_path().map(Path::to_path_buf) else {
            return Err(TaskError::Storage("task has no destination file".into()));
        };
        let tries = self.config.max_auto_rename_tries;
        for n in 1..=tries {
            let candidate = naming::numbered_path(&original, n);
            if !candidate.exists() && !control_file::control_file_path(&candidate).exists() {
                tracing::info!(
                    task = self.id,
                    from = %original.display(),
                    to = %candidate.display(),
                    "renamed destination"
                );
                self.context.set_first_file_path(candidate.clone());
                return Ok(candidate);
            }
        }
        Err(TaskError::RenameExhausted { path: original, tries })
    }

    /// Persist progress. A no-op when control files are disabled, the
    /// length is unknown, or the destination was never opened.
    pub fn save_control_file(&self) -> Result<(), TaskError> {
        if !self.save_control_file_enabled || !self.destination_opened {
            return Ok(());
        }
        let (Some(path), Some(t)) = (self.control_file_path(), self.transfer.as_ref()) else {
            return Ok(());
        };
        let Some(total_length) = t.pieces().total_length() else {
            return Ok(());
        };
        let state = ControlFileState {
            version: control_file::CONTROL_FILE_VERSION,
            uris: self.context.uris().to_vec(),
            total_length,
            piece_length: t.pieces().piece_length(),
            bitfield: t.pieces().bitfield().as_bytes().to_vec(),
            files: self.context.file_entries().iter().map(|f| f.basename()).collect(),
            upload_length: self.calculate_stat().all_time_upload_length,
        };
        self.persistence.save(&state, &path).map_err(TaskError::storage)?;
        tracing::debug!(task = self.id, path = %path.display(), "control file saved");
        Ok(())
    }

    pub fn remove_control_file(&self) -> Result<(), TaskError> {
        if !self.save_control_file_enabled {
            return Ok(());
        }
        let Some(path) = self.control_file_path() else {
            return Ok(());
        };
        self.persistence.remove(&path).map_err(TaskError::storage)
    }
}

/// Lexical containment: no `..` components and `dir` is a prefix.
fn is_within(path: &Path, dir: &Path) -> bool {
    if path.components().any(|c| c == Component::ParentDir) {
        return false;
    }
    path.starts_with(dir)
}
