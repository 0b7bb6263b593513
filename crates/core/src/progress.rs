//! Progress arithmetic and document-order reconstruction.

use std::collections::BTreeMap;

/// Completed share of `total`, as a whole percentage rounded down.
/// An empty workload counts as done.
pub fn percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    (completed.min(total) * 100 / total) as u8
}

/// Put out-of-order page results back in page order.  A page reported
/// twice keeps its last result.
pub fn reorder_pages<T>(results: impl IntoIterator<Item = (usize, T)>) -> BTreeMap<usize, T> {
    results.into_iter().collect()
}

/// Tracks completions and only ever reports a non-decreasing percentage.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total: usize,
    completed: usize,
    last: u8,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        ProgressTracker {
            total,
            completed: 0,
            last: 0,
        }
    }

    /// Record one finished unit and return the new percentage.
    pub fn complete_one(&mut self) -> u8 {
        self.completed += 1;
        self.last = self.last.max(percent(self.completed, self.total));
        self.last
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn is_done(&self) -> bool {
        self.completed >= self.total
    }
}
