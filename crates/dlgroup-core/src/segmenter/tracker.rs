//! Assignment of segments to in-flight commands.

use crate::piece_store::PieceStore;

use super::{Bitfield, Segment};

/// Tracks which pieces are currently assigned to an outstanding command.
/// Completion is owned by the [`PieceStore`]; a piece that is done is never
/// handed out again.
#[derive(Debug, Clone, Default)]
pub struct SegmentTracker {
    assigned: Bitfield,
}

impl SegmentTracker {
    pub fn new(segment_count: usize) -> Self {
        Self {
            assigned: Bitfield::new(segment_count),
        }
    }

    pub fn segment_count(&self) -> usize {
        self.assigned.len()
    }

    /// Assign up to `n` free segments, lowest offset first.
    pub fn acquire(&mut self, n: usize, pieces: &dyn PieceStore) -> Vec<(usize, Segment)> {
        let free: Vec<usize> = (0..self.assigned.len())
            .filter(|&i| !self.assigned.get(i) && !pieces.has_piece(i))
            .take(n)
            .collect();
        free.into_iter()
            .filter_map(|i| {
                let seg = pieces.piece(i)?;
                self.assigned.set(i);
                Some((i, seg))
            })
            .collect()
    }

    /// Assign a specific segment. Returns false if it was already assigned.
    pub fn assign(&mut self, index: usize) -> bool {
        if self.assigned.get(index) {
            return false;
        }
        self.assigned.set(index);
        self.assigned.get(index)
    }

    /// Return a segment to the free pool (command failed or was dropped).
    pub fn release(&mut self, index: usize) {
        self.assigned.unset(index);
    }

    pub fn is_assigned(&self, index: usize) -> bool {
        self.assigned.get(index)
    }

    pub fn assigned_count(&self) -> usize {
        self.assigned.count_set()
    }

    /// Segments neither assigned nor already complete.
    pub fn unassigned_count(&self, pieces: &dyn PieceStore) -> usize {
        (0..self.assigned.len())
            .filter(|&i| !self.assigned.get(i) && !pieces.has_piece(i))
            .count()
    }

    pub fn release_all(&mut self) {
        self.assigned.clear();
    }
}
