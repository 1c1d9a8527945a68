//! Segment planning
//!
//! A download is split into contiguous, non-overlapping byte ranges that
//! are fetched in parallel. Planning is pure and deterministic: the same
//! size and count always yield the same partition.

use serde::{Deserialize, Serialize};

/// One byte range of the target resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Segment index (0-based)
    pub index: usize,
    /// Start byte offset (inclusive)
    pub start: u64,
    /// End byte offset (inclusive), `None` for an unknown-length stream
    pub end: Option<u64>,
    /// Bytes written so far
    pub bytes_written: u64,
}

impl Segment {
    /// Create a bounded segment covering `start..=end`
    pub fn new(index: usize, start: u64, end: u64) -> Self {
        Self {
            index,
            start,
            end: Some(end),
            bytes_written: 0,
        }
    }

    /// Create a segment that reads from `start` until the stream ends
    pub fn unbounded(index: usize) -> Self {
        Self {
            index,
            start: 0,
            end: None,
            bytes_written: 0,
        }
    }

    /// Length of the range, `None` when unbounded
    pub fn size(&self) -> Option<u64> {
        self.end.map(|end| end - self.start + 1)
    }

    /// Remaining bytes, `None` when unbounded
    pub fn remaining(&self) -> Option<u64> {
        self.size().map(|size| size.saturating_sub(self.bytes_written))
    }

    /// Check if every byte of a bounded segment has been written
    pub fn is_complete(&self) -> bool {
        self.remaining() == Some(0)
    }

    /// Offset of the next byte to write
    pub fn next_offset(&self) -> u64 {
        self.start + self.bytes_written
    }

    /// `Range` header value for the unwritten part of this segment
    pub fn range_header(&self) -> Option<String> {
        self.end
            .map(|end| format!("bytes={}-{}", self.next_offset(), end))
    }
}

/// Partition `[0, total_size)` into at most `segment_count` segments.
///
/// A zero `total_size` means the length is unknown and yields a single
/// unbounded segment. Every emitted segment is non-empty.
pub fn plan_segments(total_size: u64, segment_count: usize) -> Vec<Segment> {
    if total_size == 0 {
        return vec![Segment::unbounded(0)];
    }
    if segment_count <= 1 {
        return vec![Segment::new(0, 0, total_size - 1)];
    }

    let chunk = total_size.div_ceil(segment_count as u64);
    let mut segments = Vec::with_capacity(segment_count);
    let mut start = 0u64;
    while start < total_size {
        let end = (start + chunk - 1).min(total_size - 1);
        segments.push(Segment::new(segments.len(), start, end));
        start = end + 1;
    }
    segments
}
