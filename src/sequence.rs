//! Per-board packet counter tracking
//!
//! Every board increments `pno` by one per frame. Any other step means a frame
//! was lost or the board restarted, and the caller should ask that board for
//! its full state.

use std::collections::HashMap;

/// Kind of discontinuity, used for logging only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapKind {
    /// Counter jumped ahead: frames were lost
    Missed,
    /// Counter went back or repeated: board restarted or frame duplicated
    Reset,
}

/// Result of observing one counter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceStatus {
    /// Counter is negative and was not recorded
    Ignored,
    /// First frame from this source, or exactly one more than the previous
    Continuous,
    /// Counter is not the previous value plus one
    Gap { previous: i64, received: i64 },
}

impl SequenceStatus {
    pub fn is_gap(&self) -> bool {
        matches!(self, SequenceStatus::Gap { .. })
    }

    pub fn gap_kind(&self) -> Option<GapKind> {
        match *self {
            SequenceStatus::Gap { previous, received } if received > previous => {
                Some(GapKind::Missed)
            }
            SequenceStatus::Gap { .. } => Some(GapKind::Reset),
            _ => None,
        }
    }
}

/// Last seen counter per source id
///
/// Entries are never evicted; boards on a show network are few and stable.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    last_seen: HashMap<String, i64>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `seq` for `source` and report whether it continues the sequence
    pub fn observe(&mut self, source: &str, seq: i64) -> SequenceStatus {
        if seq < 0 {
            return SequenceStatus::Ignored;
        }

        let status = match self.last_seen.get(source) {
            None => SequenceStatus::Continuous,
            Some(&previous) if previous.checked_add(1) == Some(seq) => SequenceStatus::Continuous,
            Some(&previous) => SequenceStatus::Gap {
                previous,
                received: seq,
            },
        };

        self.last_seen.insert(source.to_string(), seq);
        status
    }

    /// Last recorded counter for a source
    pub fn last_seen(&self, source: &str) -> Option<i64> {
        self.last_seen.get(source).copied()
    }

    /// Number of distinct sources seen so far
    pub fn source_count(&self) -> usize {
        self.last_seen.len()
    }
}
