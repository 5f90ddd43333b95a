//! Piece store and segment tracker, owned together, plus the write target.

use anyhow::{Context, Result};

use crate::piece_store::PieceStore;
use crate::segmenter::{Segment, SegmentTracker};
use crate::storage::StorageWriter;

/// Pieces and their assignment live in one value so they are created and
/// dropped together.
pub struct TransferState {
    pieces: Box<dyn PieceStore>,
    segments: SegmentTracker,
}

impl TransferState {
    pub fn new(pieces: Box<dyn PieceStore>) -> Self {
        let segments = SegmentTracker::new(pieces.piece_count());
        Self { pieces, segments }
    }

    pub fn pieces(&self) -> &dyn PieceStore {
        self.pieces.as_ref()
    }

    pub fn pieces_mut(&mut self) -> &mut dyn PieceStore {
        self.pieces.as_mut()
    }

    pub fn segments(&self) -> &SegmentTracker {
        &self.segments
    }

    pub fn length_known(&self) -> bool {
        self.pieces.total_length().is_some()
    }

    pub fn unassigned_count(&self) -> usize {
        self.segments.unassigned_count(self.pieces.as_ref())
    }

    pub fn acquire(&mut self, n: usize) -> Vec<(usize, Segment)> {
        self.segments.acquire(n, self.pieces.as_ref())
    }

    pub fn assign(&mut self, index: usize) -> bool {
        self.segments.assign(index)
    }

    pub fn release(&mut self, index: usize) {
        self.segments.release(index);
    }

    pub fn complete(&mut self, index: usize) {
        self.pieces.mark_piece_done(index);
        self.segments.release(index);
    }

    pub fn complete_all(&mut self) {
        (0..self.pieces.piece_count()).for_each(|i| self.pieces.mark_piece_done(i));
        self.segments.release_all();
    }
}

impl std::fmt::Debug for TransferState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferState")
            .field("total_length", &self.pieces.total_length())
            .field("pieces", &self.pieces.piece_count())
            .field("done", &self.pieces.bitfield().count_set())
            .field("assigned", &self.segments.assigned_count())
            .finish()
    }
}

/// Where received bytes go.
#[derive(Debug)]
pub enum WriteTarget {
    Disk(StorageWriter),
    Memory(Vec<u8>),
}

impl WriteTarget {
    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        match self {
            WriteTarget::Disk(w) => w.write_at(offset, data),
            WriteTarget::Memory(buf) => {
                let start = usize::try_from(offset).context("write offset does not fit in memory")?;
                let end = start
                    .checked_add(data.len())
                    .context("write end does not fit in memory")?;
                if buf.len() < end {
                    buf.resize(end, 0);
                }
                buf[start..end].copy_from_slice(data);
                Ok(())
            }
        }
    }
}
