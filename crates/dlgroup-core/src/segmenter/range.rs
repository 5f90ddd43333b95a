//! Segment type and range planning.

/// Byte range [start, end) of the task's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Start offset (inclusive).
    pub start: u64,
    /// End offset (exclusive). Equal to `start` for the open-ended segment
    /// of a transfer whose length is not known yet.
    pub end: u64,
}

impl Segment {
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// HTTP Range header value (inclusive end). Open-ended for an empty segment.
    pub fn range_header_value(&self) -> String {
        if self.is_empty() {
            format!("bytes={}-", self.start)
        } else {
            format!("bytes={}-{}", self.start, self.end - 1)
        }
    }
}

/// Split `total_size` into `segment_count` near-equal segments; the first
/// `total_size % segment_count` segments are one byte longer.
pub fn plan_segments(total_size: u64, segment_count: usize) -> Vec<Segment> {
    if total_size == 0 || segment_count == 0 {
        return Vec::new();
    }
    let count = (segment_count as u64).min(total_size);
    let base = total_size / count;
    let remainder = total_size % count;

    let mut offset = 0u64;
    (0..count)
        .map(|i| {
            let len = base + u64::from(i < remainder);
            let seg = Segment {
                start: offset,
                end: offset + len,
            };
            offset += len;
            seg
        })
        .collect()
}

/// Split `total_size` into fixed-size pieces; the last piece may be shorter.
pub fn plan_pieces(total_size: u64, piece_length: u64) -> Vec<Segment> {
    if total_size == 0 || piece_length == 0 {
        return Vec::new();
    }
    (0..total_size)
        .step_by(piece_length as usize)
        .map(|start| Segment {
            start,
            end: (start + piece_length).min(total_size),
        })
        .collect()
}
