//! Cursor pagination state.

use std::collections::BTreeSet;

use crate::models::PageRequest;

/// Lazy, finite sequence of page cursors `start, start+step, ..` up to
/// `ceiling` inclusive.
///
/// Cursors are issued in order and never revisited. Completion can arrive
/// out of order; the pager tracks a confirmed watermark so a resume never
/// skips a page that was issued but not finished.
#[derive(Debug, Clone)]
pub struct CursorPager {
    start: u64,
    step: u64,
    ceiling: u64,
    next: u64,
    terminated: bool,
    /// Highest cursor with every predecessor (from `start`) completed
    watermark: Option<u64>,
    /// Completed cursors above the watermark
    completed_ahead: BTreeSet<u64>,
}

impl CursorPager {
    pub fn new(start: u64, step: u64, ceiling: u64) -> Self {
        Self {
            start,
            step: step.max(1),
            ceiling,
            next: start,
            terminated: false,
            watermark: None,
            completed_ahead: BTreeSet::new(),
        }
    }

    /// Restart from a persisted cursor (normally a previous `resume_cursor`).
    pub fn resume(cursor: u64, step: u64, ceiling: u64) -> Self {
        Self::new(cursor, step, ceiling)
    }

    /// Stop issuing cursors; a page reported no more data.
    pub fn terminate(&mut self) {
        self.terminated = true;
    }

    /// True once no further cursor will be issued.
    pub fn is_exhausted(&self) -> bool {
        self.terminated || self.next > self.ceiling
    }

    /// Mark a page as fully processed. Abandoned pages must not be confirmed.
    pub fn complete(&mut self, cursor: u64) {
        if cursor < self.start || (cursor - self.start) % self.step != 0 {
            log::debug!("Ignoring completion of off-grid cursor {}", cursor);
            return;
        }
        if self.watermark.is_some_and(|w| cursor <= w) {
            return;
        }
        self.completed_ahead.insert(cursor);

        let mut expected = self.watermark.map_or(self.start, |w| w + self.step);
        while self.completed_ahead.remove(&expected) {
            self.watermark = Some(expected);
            expected += self.step;
        }
    }

    /// Cursor to persist for resumption: the first not-yet-confirmed page.
    pub fn resume_cursor(&self) -> u64 {
        self.watermark.map_or(self.start, |w| w + self.step)
    }

    /// Number of cursors between `start` and `ceiling`, inclusive.
    pub fn total_pages(&self) -> usize {
        if self.ceiling < self.start {
            return 0;
        }
        ((self.ceiling - self.start) / self.step + 1) as usize
    }
}

impl Iterator for CursorPager {
    type Item = PageRequest;

    fn next(&mut self) -> Option<PageRequest> {
        if self.is_exhausted() {
            return None;
        }
        let cursor = self.next;
        self.next = cursor.saturating_add(self.step);
        if self.next == cursor {
            // saturated; make this the last one
            self.terminated = true;
        }
        Some(PageRequest { cursor })
    }
}
