//! Zoom levels of recently drawn frames, used to decide whether fade
//! animations still need frames.

use std::time::Duration;

/// Oldest entries are dropped beyond this; they are far outside any fade
/// window by then.
const MAX_ENTRIES: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameHistoryEntry {
    pub timestamp: Duration,
    pub zoom: f64,
}

#[derive(Debug, Clone, Default)]
pub struct FrameHistory {
    entries: Vec<FrameHistoryEntry>,
}

impl FrameHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[FrameHistoryEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The first record seeds two entries at time zero so the window scan
    /// always has a predecessor; afterwards only zoom changes are kept.
    pub fn record(&mut self, now: Duration, zoom: f64) {
        if self.entries.is_empty() {
            let seed = FrameHistoryEntry {
                timestamp: Duration::ZERO,
                zoom,
            };
            self.entries.push(seed);
            self.entries.push(seed);
        }

        let Some(last) = self.entries.last() else {
            return;
        };
        if last.zoom != zoom {
            self.entries.push(FrameHistoryEntry {
                timestamp: now,
                zoom,
            });
        }

        if self.entries.len() > MAX_ENTRIES {
            let excess = self.entries.len() - MAX_ENTRIES;
            self.entries.drain(..excess);
        }
    }

    /// Whether the zoom changed within `duration` of the newest entry.
    /// The scan starts at the last entry that is already older than the
    /// window, because its zoom was still on screen when the window opened.
    pub fn needs_animation(&self, duration: Duration) -> bool {
        let Some(pivot) = self.entries.last() else {
            return false;
        };

        let mut start = 0;
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.timestamp + duration < pivot.timestamp {
                start = index;
            } else {
                break;
            }
        }

        self.entries[start..]
            .iter()
            .any(|entry| entry.zoom != pivot.zoom)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
