//! Baseline window resolution
//!
//! Normal windows sit between a fault interval and its neighbours in the
//! ordered interval sequence, starting a fixed guard gap after the earlier
//! interval ends and stopping just before the later one starts.

use crate::models::{FaultInterval, Window, NANOS_PER_SEC};
use tracing::debug;

/// Guard gap after a fault interval ends (10 minutes)
pub const GUARD_NS: i64 = 10 * 60 * NANOS_PER_SEC;

/// Windows for one fault interval
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedWindows {
    pub fault: Window,
    /// Zero, one or two baseline windows, predecessor first
    pub baseline: Vec<Window>,
}

impl ResolvedWindows {
    pub fn has_baseline(&self) -> bool {
        !self.baseline.is_empty()
    }
}

/// Resolve the fault window and its baseline windows for `intervals[index]`
///
/// Returns `None` only if `index` is out of range. An empty baseline list
/// is a valid outcome.
pub fn resolve(intervals: &[FaultInterval], index: usize) -> Option<ResolvedWindows> {
    let current = intervals.get(index)?;
    let mut baseline = Vec::with_capacity(2);

    if index > 0 {
        let prev = &intervals[index - 1];
        push_window(
            &mut baseline,
            Window::new(prev.end_ts_ns + GUARD_NS, current.start_ts_ns - 1),
        );
    }

    if let Some(next) = intervals.get(index + 1) {
        push_window(
            &mut baseline,
            Window::new(current.end_ts_ns + GUARD_NS, next.start_ts_ns - 1),
        );
    }

    Some(ResolvedWindows {
        fault: current.window(),
        baseline,
    })
}

fn push_window(windows: &mut Vec<Window>, window: Window) {
    if window.is_empty() {
        debug!(window = %window, "Dropping baseline window shorter than guard gap");
        return;
    }
    windows.push(window);
}
