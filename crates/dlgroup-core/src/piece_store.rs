//! Piece-level completion tracking for resumable transfers.
//!
//! A piece is the unit a single command fetches and the unit recorded in the
//! control file. When the descriptor carries per-piece SHA-256 digests the
//! executor checks the received bytes with `verify_piece` and reports a
//! mismatch as a failed command, so a piece is only marked done after it
//! verified.

use sha2::{Digest, Sha256};

use crate::segmenter::{plan_pieces, Bitfield, Segment};

pub trait PieceStore {
    /// `None` while the content length is unknown.
    fn total_length(&self) -> Option<u64>;
    fn piece_length(&self) -> u64;
    fn piece_count(&self) -> usize;
    fn piece(&self, index: usize) -> Option<Segment>;
    fn has_piece(&self, index: usize) -> bool;
    fn mark_piece_done(&mut self, index: usize);
    /// True when `data` matches the expected digest for `index`, or when no
    /// digest is known for it.
    fn verify_piece(&self, index: usize, data: &[u8]) -> bool;
    /// Every required piece has been marked done.
    fn all_pieces_done(&self) -> bool;
    fn completed_length(&self) -> u64;
    fn bitfield(&self) -> &Bitfield;
    fn restore_bitfield(&mut self, bytes: &[u8]);
}

#[derive(Debug, Clone)]
pub struct BitfieldPieceStore {
    total_length: Option<u64>,
    piece_length: u64,
    pieces: Vec<Segment>,
    done: Bitfield,
    digests: Vec<String>,
}

impl BitfieldPieceStore {
    pub fn new(total_length: u64, piece_length: u64) -> Self {
        let piece_length = piece_length.max(1);
        let pieces = plan_pieces(total_length, piece_length);
        let done = Bitfield::new(pieces.len());
        Self {
            total_length: Some(total_length),
            piece_length,
            pieces,
            done,
            digests: Vec::new(),
        }
    }

    /// One open-ended piece; replaced once the length is known.
    pub fn unknown_length() -> Self {
        Self {
            total_length: None,
            piece_length: 0,
            pieces: vec![Segment { start: 0, end: 0 }],
            done: Bitfield::new(1),
            digests: Vec::new(),
        }
    }

    /// Layout for `total_length`: fixed `piece_length` when given, otherwise
    /// `split` near-equal pieces.
    pub fn with_layout(total_length: u64, piece_length: Option<u64>, split: usize) -> Self {
        let piece_length = piece_length.unwrap_or_else(|| {
            let split = split.max(1) as u64;
            total_length.div_ceil(split).max(1)
        });
        Self::new(total_length, piece_length)
    }

    /// Expected lowercase-hex SHA-256 per piece. Ignored unless there is
    /// exactly one digest per piece.
    pub fn with_digests(mut self, digests: Vec<String>) -> Self {
        if digests.len() == self.pieces.len() {
            self.digests = digests.into_iter().map(|d| d.to_ascii_lowercase()).collect();
        } else if !digests.is_empty() {
            tracing::warn!(
                expected = self.pieces.len(),
                got = digests.len(),
                "piece digest count does not match layout; verification disabled"
            );
        }
        self
    }
}

impl PieceStore for BitfieldPieceStore {
    fn total_length(&self) -> Option<u64> {
        self.total_length
    }

    fn piece_length(&self) -> u64 {
        self.piece_length
    }

    fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    fn piece(&self, index: usize) -> Option<Segment> {
        self.pieces.get(index).copied()
    }

    fn has_piece(&self, index: usize) -> bool {
        self.done.get(index)
    }

    fn mark_piece_done(&mut self, index: usize) {
        self.done.set(index);
    }

    fn verify_piece(&self, index: usize, data: &[u8]) -> bool {
        match self.digests.get(index) {
            Some(expected) => hex::encode(Sha256::digest(data)) == *expected,
            None => true,
        }
    }

    fn all_pieces_done(&self) -> bool {
        self.total_length.is_some() && self.done.all_set()
    }

    fn completed_length(&self) -> u64 {
        self.pieces
            .iter()
            .enumerate()
            .filter(|(i, _)| self.done.get(*i))
            .map(|(_, p)| p.len())
            .sum()
    }

    fn bitfield(&self) -> &Bitfield {
        &self.done
    }

    fn restore_bitfield(&mut self, bytes: &[u8]) {
        self.done = Bitfield::from_bytes(bytes, self.pieces.len());
    }
}
