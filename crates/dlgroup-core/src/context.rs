//! Static description of what a task fetches.

use std::path::{Path, PathBuf};

use crate::naming;
use crate::task::TaskId;

/// One destination file and the URIs it can be fetched from.
#[derive(Debug, Clone, PartialEq)]
pub struct FileEntry {
    pub path: PathBuf,
    /// Length in bytes; `None` until a response reports it.
    pub length: Option<u64>,
    pub uris: Vec<String>,
}

impl FileEntry {
    pub fn new(path: impl Into<PathBuf>, length: Option<u64>, uris: Vec<String>) -> Self {
        Self {
            path: path.into(),
            length,
            uris,
        }
    }

    pub fn basename(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Describes the content of one task: ordered file entries, the values a
/// trusted source (e.g. a Metalink document) promised, and optional
/// per-piece SHA-256 digests.
#[derive(Debug, Clone, Default)]
pub struct DownloadContext {
    files: Vec<FileEntry>,
    expected_basename: Option<String>,
    expected_length: Option<u64>,
    piece_length: Option<u64>,
    piece_hashes: Vec<String>,
    owner: Option<TaskId>,
}

impl DownloadContext {
    pub fn new(files: Vec<FileEntry>) -> Self {
        Self {
            files,
            ..Self::default()
        }
    }

    /// Single-file context for `uris`, saved under `dir` as `out` or the
    /// basename of the first URI.
    pub fn from_uris(dir: &Path, uris: Vec<String>, out: Option<&str>) -> Self {
        let name = out
            .map(naming::sanitize_basename)
            .filter(|s| !s.is_empty())
            .or_else(|| uris.first().and_then(|u| naming::basename_from_uri(u)))
            .unwrap_or_else(|| naming::DEFAULT_BASENAME.to_string());
        Self::new(vec![FileEntry::new(dir.join(name), None, uris)])
    }

    pub fn with_expected_basename(mut self, name: impl Into<String>) -> Self {
        self.expected_basename = Some(name.into());
        self
    }

    pub fn with_expected_length(mut self, length: u64) -> Self {
        self.expected_length = Some(length);
        if let Some(first) = self.files.first_mut() {
            first.length.get_or_insert(length);
        }
        self
    }

    pub fn with_piece_length(mut self, piece_length: u64) -> Self {
        self.piece_length = Some(piece_length);
        self
    }

    pub fn with_piece_hashes(mut self, hashes: Vec<String>) -> Self {
        self.piece_hashes = hashes;
        self
    }

    pub fn file_entries(&self) -> &[FileEntry] {
        &self.files
    }

    pub fn first_file(&self) -> Option<&FileEntry> {
        self.files.first()
    }

    pub fn first_file_path(&self) -> Option<&Path> {
        self.files.first().map(|f| f.path.as_path())
    }

    pub(crate) fn set_first_file_path(&mut self, path: PathBuf) {
        if let Some(first) = self.files.first_mut() {
            first.path = path;
        }
    }

    /// Basename the first file is expected to have, falling back to the
    /// basename it currently has.
    pub fn expected_basename(&self) -> Option<String> {
        self.expected_basename
            .clone()
            .or_else(|| self.files.first().map(FileEntry::basename))
    }

    pub fn expected_length(&self) -> Option<u64> {
        self.expected_length
    }

    /// Sum of all file lengths, or `None` while any length is unknown.
    pub fn total_length(&self) -> Option<u64> {
        if self.files.is_empty() {
            return None;
        }
        self.files.iter().map(|f| f.length).sum()
    }

    /// Record the length a response reported for a single-file context.
    pub(crate) fn set_total_length(&mut self, length: u64) {
        if let [only] = self.files.as_mut_slice() {
            only.length = Some(length);
        }
    }

    pub fn piece_length(&self) -> Option<u64> {
        self.piece_length
    }

    pub fn piece_hashes(&self) -> &[String] {
        &self.piece_hashes
    }

    /// URIs of the first file, in preference order.
    pub fn uris(&self) -> &[String] {
        self.files.first().map(|f| f.uris.as_slice()).unwrap_or(&[])
    }

    pub fn owner(&self) -> Option<TaskId> {
        self.owner
    }

    pub(crate) fn set_owner(&mut self, id: TaskId) {
        self.owner = Some(id);
    }
}
