//! Page arithmetic over message sequence numbers.
//!
//! A folder's messages are numbered `1..=total`, oldest first. Showing the
//! newest `page_size` messages skipping the newest `offset` ones means asking
//! the server for a contiguous window near the top of that numbering.

use std::fmt;

/// Window of indices `[start, start + length]`, both ends inclusive.
///
/// `length` counts the indices after `start`, so the window always holds
/// `length + 1` indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRange {
    /// First index.
    pub start: u32,
    /// Number of indices following `start`.
    pub length: u32,
}

impl IndexRange {
    /// Last index in the window.
    #[must_use]
    pub const fn end(&self) -> u32 {
        self.start.saturating_add(self.length)
    }

    /// Clamps the window to the sequence numbers that exist in a folder.
    ///
    /// Returns `None` when no part of the window falls inside `1..=total`.
    #[must_use]
    pub fn to_sequence(&self, total: u32) -> Option<SequenceRange> {
        let first = self.start.max(1);
        let last = self.end().min(total);
        (total > 0 && first <= last).then_some(SequenceRange { first, last })
    }
}

/// Computes the window holding the newest `page_size` messages after skipping
/// `offset` of them in a folder of `total` messages.
///
/// When the window would start below zero, the start is pinned to `1` and the
/// length kept, so the window may reach past the page the caller asked for.
#[must_use]
pub fn compute_range(page_size: u32, total: u32, offset: u32) -> IndexRange {
    let length = page_size.saturating_sub(1);
    let diff = i64::from(total) - i64::from(length) - i64::from(offset);
    let start = u32::try_from(diff).unwrap_or(1);
    IndexRange { start, length }
}

/// Inclusive range of message sequence numbers as sent to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceRange {
    /// First sequence number.
    pub first: u32,
    /// Last sequence number.
    pub last: u32,
}

impl fmt::Display for SequenceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.first == self.last {
            write!(f, "{}", self.first)
        } else {
            write!(f, "{}:{}", self.first, self.last)
        }
    }
}
